//! Chunk frames.
//!
//! # Wire format
//!
//! ```text
//! SPLIT (two datagrams per chunk):
//!   [UTF-8 decimal sequence number | "Finished"]
//!   [raw payload bytes | "EOF"]
//!
//! FRAMED (one datagram per chunk):
//!   [1 byte: kind 0x00 data, 0x01 end marker, 0x02 finished]
//!   [8 bytes BE: sequence number]
//!   [4 bytes BE: payload length]
//!   [payload_len bytes: payload]
//! ```

use crate::constants::{END_MARKER, FINISHED, MAX_DATAGRAM_SIZE};
use crate::control::Framing;
use crate::{ProtocolError, preview};

/// Length of the framed-mode header.
pub const FRAME_HEADER_LEN: usize = 13;

const KIND_DATA: u8 = 0x00;
const KIND_END_MARKER: u8 = 0x01;
const KIND_FINISHED: u8 = 0x02;

/// Contents of one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Data(Vec<u8>),
    EndMarker,
}

impl Payload {
    /// Bytes placed on the wire for this payload.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Data(data) => data,
            Payload::EndMarker => END_MARKER,
        }
    }

    /// Interprets a split-mode payload datagram.
    pub fn from_datagram(datagram: &[u8]) -> Self {
        if datagram == END_MARKER {
            Payload::EndMarker
        } else {
            Payload::Data(datagram.to_vec())
        }
    }

    pub fn is_end_marker(&self) -> bool {
        matches!(self, Payload::EndMarker)
    }
}

/// What a frame's header announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameHeader {
    Sequence(u64),
    /// Terminates a retransmission reply.
    Finished,
}

impl FrameHeader {
    /// Parses a split-mode header datagram.
    pub fn decode(datagram: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(datagram).map_err(|_| ProtocolError::NotText)?;
        if text == FINISHED {
            return Ok(FrameHeader::Finished);
        }
        text.parse::<u64>()
            .map(FrameHeader::Sequence)
            .map_err(|_| ProtocolError::InvalidHeader(preview(text)))
    }

    fn encode(&self) -> Vec<u8> {
        match self {
            FrameHeader::Sequence(seq) => seq.to_string().into_bytes(),
            FrameHeader::Finished => FINISHED.as_bytes().to_vec(),
        }
    }
}

/// A chunk (or retransmission terminator) as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Payload,
}

impl Frame {
    pub fn chunk(sequence_number: u64, payload: Payload) -> Self {
        Self {
            header: FrameHeader::Sequence(sequence_number),
            payload,
        }
    }

    /// The `Finished` + END_MARKER pair closing a retransmission reply.
    pub fn finished() -> Self {
        Self {
            header: FrameHeader::Finished,
            payload: Payload::EndMarker,
        }
    }

    /// Encodes the frame into the datagrams that carry it, in send order.
    pub fn encode(&self, framing: Framing) -> Result<Vec<Vec<u8>>, ProtocolError> {
        let payload = self.payload.as_bytes();
        match framing {
            Framing::Split => {
                if payload.len() > MAX_DATAGRAM_SIZE {
                    return Err(ProtocolError::PayloadTooLarge {
                        size: payload.len(),
                        max: MAX_DATAGRAM_SIZE,
                    });
                }
                Ok(vec![self.header.encode(), payload.to_vec()])
            }
            Framing::Framed => {
                let max = MAX_DATAGRAM_SIZE - FRAME_HEADER_LEN;
                if payload.len() > max {
                    return Err(ProtocolError::PayloadTooLarge {
                        size: payload.len(),
                        max,
                    });
                }
                let (kind, seq) = match (self.header, &self.payload) {
                    (FrameHeader::Finished, _) => (KIND_FINISHED, 0),
                    (FrameHeader::Sequence(seq), Payload::EndMarker) => (KIND_END_MARKER, seq),
                    (FrameHeader::Sequence(seq), Payload::Data(_)) => (KIND_DATA, seq),
                };

                let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
                buf.push(kind);
                buf.extend_from_slice(&seq.to_be_bytes());
                buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
                buf.extend_from_slice(payload);
                Ok(vec![buf])
            }
        }
    }

    /// Decodes a framed-mode datagram.
    pub fn decode_framed(datagram: &[u8]) -> Result<Self, ProtocolError> {
        if datagram.len() < FRAME_HEADER_LEN {
            return Err(ProtocolError::FrameTooShort {
                required: FRAME_HEADER_LEN,
                actual: datagram.len(),
            });
        }

        let kind = datagram[0];
        let mut seq_bytes = [0u8; 8];
        seq_bytes.copy_from_slice(&datagram[1..9]);
        let seq = u64::from_be_bytes(seq_bytes);
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&datagram[9..FRAME_HEADER_LEN]);
        let expected = u32::from_be_bytes(len_bytes) as usize;

        let payload = &datagram[FRAME_HEADER_LEN..];
        if payload.len() != expected {
            return Err(ProtocolError::PayloadLengthMismatch {
                expected,
                actual: payload.len(),
            });
        }

        match kind {
            KIND_DATA => Ok(Frame::chunk(seq, Payload::Data(payload.to_vec()))),
            KIND_END_MARKER => Ok(Frame::chunk(seq, Payload::EndMarker)),
            KIND_FINISHED => Ok(Frame::finished()),
            other => Err(ProtocolError::UnknownFrameKind(other)),
        }
    }
}
