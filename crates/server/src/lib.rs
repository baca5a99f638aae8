//! UDP server for ferry transfers.
//!
//! A single receive loop ([`Server::run`]) routes every datagram to the
//! session of its sender. Each client address is served by one worker task
//! that owns that client's [`Session`]; a semaphore sized by
//! [`ServerConfig::workers`] bounds how many workers process a datagram at
//! the same time.

mod dispatcher;
mod session;
mod transmitter;

pub use dispatcher::Server;
pub use session::{Outgoing, PreparedFile, Session};
pub use transmitter::Transmitter;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use ferry_protocol::{DEFAULT_CHUNK_SIZE, DEFAULT_PORT};

/// Number of datagrams processed concurrently by default.
pub const DEFAULT_WORKERS: usize = 10;

/// How long a silent client keeps its session.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind (port 0 = OS-assigned).
    pub bind: SocketAddr,
    /// Directory requested file names are resolved against.
    pub root: PathBuf,
    /// Maximum payload per data chunk.
    pub chunk_size: usize,
    /// Size of the worker pool.
    pub workers: usize,
    pub idle_timeout: Duration,
    /// Seed for loss injection; `None` draws from OS entropy.
    pub loss_seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            root: PathBuf::from("server_files"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: DEFAULT_WORKERS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            loss_seed: None,
        }
    }
}

/// Errors produced by the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ferry_protocol::ProtocolError),

    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("invalid configuration: {0}")]
    Config(String),
}
