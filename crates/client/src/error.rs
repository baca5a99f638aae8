//! Error types for the ferry client.

use std::time::Duration;

/// Errors produced by the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no datagram within {0:?}")]
    Timeout(Duration),

    #[error("protocol error: {0}")]
    Protocol(#[from] ferry_protocol::ProtocolError),

    #[error("server refused: {0}")]
    Rejected(String),

    #[error("unexpected datagram: {0}")]
    Unexpected(String),

    #[error(transparent)]
    Transfer(#[from] ferry_transfer::TransferError),

    #[error("no transfer awaiting retransmission")]
    NoTransferInProgress,

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
