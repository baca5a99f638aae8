//! Transfer-side building blocks shared by the ferry server and client.
//!
//! The server chunks a file ([`chunk_file`]), withholds some chunks
//! ([`LossSimulator`]) and answers retransmission rounds
//! ([`RetransmitRound`]); the client collects chunks into a
//! [`ReceiveBuffer`], writes the reassembled file and checks it with
//! [`verify`].

mod chunker;
mod integrity;
mod loss;
mod reassembly;
mod retransmit;
mod types;
mod validation;

pub use chunker::{ChunkReader, chunk_file, resolve_source};
pub use integrity::{Digest, digest_bytes, digest_chunks, digest_file, verify};
pub use loss::{LossOutcome, LossSimulator};
pub use reassembly::{Inserted, ReceiveBuffer};
pub use retransmit::{RetransmitRound, missing_sequence_numbers};
pub use types::{Chunk, ChunkSet};
pub use validation::validate_file_name;

pub use ferry_protocol::DEFAULT_CHUNK_SIZE;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}
