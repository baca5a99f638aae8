//! UDP client for ferry transfers.
//!
//! [`Client::request`] fetches a file, writes it under
//! `<root>/<ip>_<port>/` and checks it against the server's digest. After a
//! [`TransferOutcome::Mismatch`], [`Client::retransmit`] runs one
//! retransmission round and checks again.

mod client;
mod error;
mod receiver;

pub use client::{Client, TransferOutcome};
pub use error::ClientError;
pub use receiver::{Phase, Receiver, Step};

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use ferry_protocol::{DEFAULT_PORT, Framing};

/// Bound on every receive.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: SocketAddr,
    /// Received files land in `root/<ip>_<port>/`.
    pub root: PathBuf,
    pub receive_timeout: Duration,
    pub framing: Framing,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            root: PathBuf::from("client_files"),
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            framing: Framing::Split,
        }
    }
}
