use serde::{Deserialize, Serialize};

use crate::constants::{FILE_NOT_FOUND, FINISH_CONNECTION, FINISHED_RETRANSMISSION};
use crate::{ProtocolError, preview};

/// How chunk frames are laid out on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// Header datagram (decimal sequence number) followed by a payload datagram.
    #[default]
    Split,
    /// One length-prefixed datagram per chunk.
    Framed,
}

impl Framing {
    pub fn is_split(&self) -> bool {
        matches!(self, Framing::Split)
    }
}

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

/// Requests a file transfer with `discarded_chunks` chunks withheld.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub file_name: String,
    pub discarded_chunks: u64,
    #[serde(default, skip_serializing_if = "Framing::is_split")]
    pub framing: Framing,
}

#[derive(Serialize, Deserialize)]
struct RetransmitBody {
    #[serde(rename = "Retransmit")]
    sequence_number: u64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ClientJson {
    Transfer(TransferRequest),
    Retransmit(RetransmitBody),
}

/// A control datagram sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// `{"fileName": ..., "discardedChunks": ...}`
    Transfer(TransferRequest),
    /// `{"Retransmit": n}`: the client already holds chunk `n`.
    Retransmit(u64),
    /// Ends the list of `Retransmit` claims.
    FinishedRetransmission,
    /// Releases the client's session.
    FinishConnection,
}

impl ClientMessage {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(match self {
            ClientMessage::Transfer(req) => serde_json::to_vec(req)?,
            ClientMessage::Retransmit(seq) => serde_json::to_vec(&RetransmitBody {
                sequence_number: *seq,
            })?,
            ClientMessage::FinishedRetransmission => FINISHED_RETRANSMISSION.as_bytes().to_vec(),
            ClientMessage::FinishConnection => FINISH_CONNECTION.as_bytes().to_vec(),
        })
    }

    pub fn decode(datagram: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(datagram).map_err(|_| ProtocolError::NotText)?;
        match text {
            FINISHED_RETRANSMISSION => return Ok(ClientMessage::FinishedRetransmission),
            FINISH_CONNECTION => return Ok(ClientMessage::FinishConnection),
            _ => {}
        }

        match serde_json::from_str::<ClientJson>(text) {
            Ok(ClientJson::Transfer(req)) => Ok(ClientMessage::Transfer(req)),
            Ok(ClientJson::Retransmit(body)) => Ok(ClientMessage::Retransmit(body.sequence_number)),
            Err(_) => Err(ProtocolError::Unrecognized(preview(text))),
        }
    }
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct DigestBody {
    digest: String,
}

#[derive(Serialize, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ServerJson {
    Digest(DigestBody),
    Error(ErrorBody),
}

/// A control datagram sent by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// `{"digest": hex}` over the original file; chunk frames follow.
    Digest(String),
    /// Plain-text `File does not exist`.
    FileNotFound,
    /// `{"error": ...}` for requests the server refuses.
    Error(String),
}

impl ServerMessage {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(match self {
            ServerMessage::Digest(digest) => serde_json::to_vec(&DigestBody {
                digest: digest.clone(),
            })?,
            ServerMessage::FileNotFound => FILE_NOT_FOUND.as_bytes().to_vec(),
            ServerMessage::Error(message) => serde_json::to_vec(&ErrorBody {
                error: message.clone(),
            })?,
        })
    }

    pub fn decode(datagram: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(datagram).map_err(|_| ProtocolError::NotText)?;
        if text == FILE_NOT_FOUND {
            return Ok(ServerMessage::FileNotFound);
        }

        match serde_json::from_str::<ServerJson>(text) {
            Ok(ServerJson::Digest(body)) => Ok(ServerMessage::Digest(body.digest)),
            Ok(ServerJson::Error(body)) => Ok(ServerMessage::Error(body.error)),
            Err(_) => Err(ProtocolError::Unrecognized(preview(text))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_request_wire_shape() {
        let msg = ClientMessage::Transfer(TransferRequest {
            file_name: "a.txt".into(),
            discarded_chunks: 1,
            framing: Framing::Split,
        });
        let bytes = msg.encode().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json, serde_json::json!({"fileName": "a.txt", "discardedChunks": 1}));
    }

    #[test]
    fn transfer_request_framed_is_explicit() {
        let msg = ClientMessage::Transfer(TransferRequest {
            file_name: "a.txt".into(),
            discarded_chunks: 0,
            framing: Framing::Framed,
        });
        let text = String::from_utf8(msg.encode().unwrap()).unwrap();
        assert!(text.contains(r#""framing":"framed""#));
        assert_eq!(ClientMessage::decode(text.as_bytes()).unwrap(), msg);
    }

    #[test]
    fn decode_transfer_request_from_plain_json() {
        let msg = ClientMessage::decode(br#"{"fileName": "b.bin", "discardedChunks": 3}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Transfer(TransferRequest {
                file_name: "b.bin".into(),
                discarded_chunks: 3,
                framing: Framing::Split,
            })
        );
    }

    #[test]
    fn retransmit_wire_shape() {
        let bytes = ClientMessage::Retransmit(7).encode().unwrap();
        assert_eq!(bytes, br#"{"Retransmit":7}"#);
        assert_eq!(ClientMessage::decode(&bytes).unwrap(), ClientMessage::Retransmit(7));
    }

    #[test]
    fn literal_client_messages() {
        assert_eq!(
            ClientMessage::decode(b"FinishedRetransmission").unwrap(),
            ClientMessage::FinishedRetransmission
        );
        assert_eq!(
            ClientMessage::decode(b"Finish connection").unwrap(),
            ClientMessage::FinishConnection
        );
        assert_eq!(
            ClientMessage::FinishConnection.encode().unwrap(),
            b"Finish connection"
        );
    }

    #[test]
    fn negative_discard_count_rejected() {
        let result = ClientMessage::decode(br#"{"fileName": "a", "discardedChunks": -1}"#);
        assert!(matches!(result, Err(ProtocolError::Unrecognized(_))));
    }

    #[test]
    fn garbage_is_a_protocol_error() {
        assert!(matches!(
            ClientMessage::decode(b"hello"),
            Err(ProtocolError::Unrecognized(_))
        ));
        assert!(matches!(
            ClientMessage::decode(&[0xff, 0xfe]),
            Err(ProtocolError::NotText)
        ));
    }

    #[test]
    fn server_messages() {
        let digest = ServerMessage::Digest("ab12".into());
        assert_eq!(digest.encode().unwrap(), br#"{"digest":"ab12"}"#);
        assert_eq!(ServerMessage::decode(br#"{"digest":"ab12"}"#).unwrap(), digest);

        assert_eq!(
            ServerMessage::decode(b"File does not exist").unwrap(),
            ServerMessage::FileNotFound
        );

        let err = ServerMessage::Error("busy".into());
        assert_eq!(ServerMessage::decode(&err.encode().unwrap()).unwrap(), err);
    }

    #[test]
    fn chunk_header_is_not_a_server_message() {
        assert!(ServerMessage::decode(b"0").is_err());
    }

    #[test]
    fn long_garbage_is_truncated_in_error() {
        let text = "x".repeat(500);
        match ClientMessage::decode(text.as_bytes()) {
            Err(ProtocolError::Unrecognized(shown)) => assert!(shown.len() < 80),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
