//! Wire format for the ferry datagram file-transfer protocol.
//!
//! Control messages are short UTF-8 datagrams (JSON objects or literal
//! strings, see [`control`]); file data travels as chunk frames (see
//! [`frame`]), either split across a header and a payload datagram or packed
//! into a single framed datagram.

pub mod constants;
pub mod control;
pub mod frame;

pub use constants::{DEFAULT_CHUNK_SIZE, DEFAULT_PORT, END_MARKER, MAX_DATAGRAM_SIZE};
pub use control::{ClientMessage, Framing, ServerMessage, TransferRequest};
pub use frame::{Frame, FrameHeader, Payload};

/// Errors produced while encoding or decoding datagrams.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("datagram is not valid UTF-8")]
    NotText,

    #[error("unrecognized control message: {0}")]
    Unrecognized(String),

    #[error("invalid sequence header: {0}")]
    InvalidHeader(String),

    #[error("frame too short: need at least {required} bytes, got {actual}")]
    FrameTooShort { required: usize, actual: usize },

    #[error("unknown frame kind: {0:#04x}")]
    UnknownFrameKind(u8),

    #[error("payload length mismatch: header says {expected}, got {actual}")]
    PayloadLengthMismatch { expected: usize, actual: usize },

    #[error("payload of {size} bytes exceeds datagram limit of {max}")]
    PayloadTooLarge { size: usize, max: usize },
}

/// Shortens a datagram for inclusion in error messages and logs.
pub(crate) fn preview(text: &str) -> String {
    const MAX: usize = 64;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
