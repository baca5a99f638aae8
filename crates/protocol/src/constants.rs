/// Default UDP port the server listens on.
pub const DEFAULT_PORT: u16 = 8082;

/// Default maximum payload carried by one data chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 256;

/// Largest UDP payload deliverable over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Payload of the terminal chunk; no data chunk follows it.
pub const END_MARKER: &[u8] = b"EOF";

/// Header datagram terminating a retransmission reply.
pub const FINISHED: &str = "Finished";

/// Terminates the client's list of `Retransmit` claims.
pub const FINISHED_RETRANSMISSION: &str = "FinishedRetransmission";

/// Sent by the client to release its session.
pub const FINISH_CONNECTION: &str = "Finish connection";

/// Reply to a request naming a file the server does not have.
pub const FILE_NOT_FOUND: &str = "File does not exist";
