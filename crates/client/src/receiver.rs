//! Receive-side state machine for one transfer attempt.
//!
//! ```text
//!   AwaitMetadata ──digest──▶ Receiving ──END_MARKER──▶ Reassembled
//!                                                        │      ▲
//!                                          begin_round() ▼      │ Finished
//!                                                     Retransmitting
//! ```
//!
//! The receiver never touches the socket; it is fed datagrams one by one
//! and reports when the current phase is complete.

use ferry_protocol::{Frame, FrameHeader, Framing, Payload, ProtocolError, ServerMessage};
use ferry_transfer::{Digest, Inserted, ReceiveBuffer};
use tracing::{debug, trace};

use crate::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitMetadata,
    Receiving,
    Reassembled,
    Retransmitting,
}

/// Result of feeding one datagram to the [`Receiver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// More datagrams are needed.
    Continue,
    /// The phase ended: first pass or retransmission round complete.
    Done,
    /// The server does not have the requested file.
    NotFound,
}

#[derive(Debug)]
pub struct Receiver {
    framing: Framing,
    phase: Phase,
    digest: Option<Digest>,
    buffer: ReceiveBuffer,
    /// Split mode: header waiting for its payload datagram.
    pending_header: Option<FrameHeader>,
}

impl Receiver {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            phase: Phase::AwaitMetadata,
            digest: None,
            buffer: ReceiveBuffer::new(),
            pending_header: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Digest announced by the server for this attempt.
    pub fn digest(&self) -> Option<&Digest> {
        self.digest.as_ref()
    }

    pub fn buffer(&self) -> &ReceiveBuffer {
        &self.buffer
    }

    /// Data sequence numbers still absent, known once the END_MARKER arrived.
    pub fn missing(&self) -> Vec<u64> {
        self.buffer.missing().unwrap_or_default()
    }

    pub fn accept(&mut self, datagram: &[u8]) -> Result<Step, ClientError> {
        match self.phase {
            Phase::AwaitMetadata => self.accept_metadata(datagram),
            Phase::Receiving | Phase::Retransmitting => {
                let Some(frame) = self.decode_frame(datagram)? else {
                    return Ok(Step::Continue);
                };
                self.accept_frame(frame)
            }
            Phase::Reassembled => Err(ClientError::Unexpected(format!(
                "{} byte datagram after reassembly",
                datagram.len()
            ))),
        }
    }

    /// Opens a retransmission round. Returns the sequence numbers to claim.
    pub fn begin_round(&mut self) -> Result<Vec<u64>, ClientError> {
        if self.phase != Phase::Reassembled {
            return Err(ClientError::NoTransferInProgress);
        }
        self.phase = Phase::Retransmitting;
        self.pending_header = None;
        Ok(self.buffer.sequence_numbers().collect())
    }

    fn accept_metadata(&mut self, datagram: &[u8]) -> Result<Step, ClientError> {
        match ServerMessage::decode(datagram)? {
            ServerMessage::Digest(hex) => {
                debug!(digest = %hex, "transfer metadata received");
                self.digest = Some(Digest::from(hex));
                self.phase = Phase::Receiving;
                Ok(Step::Continue)
            }
            ServerMessage::FileNotFound => Ok(Step::NotFound),
            ServerMessage::Error(message) => Err(ClientError::Rejected(message)),
        }
    }

    /// Decodes the next frame; `None` while a split-mode pair is incomplete.
    fn decode_frame(&mut self, datagram: &[u8]) -> Result<Option<Frame>, ClientError> {
        match self.framing {
            Framing::Split => {
                if let Some(header) = self.pending_header.take() {
                    return Ok(Some(Frame {
                        header,
                        payload: Payload::from_datagram(datagram),
                    }));
                }
                let header = FrameHeader::decode(datagram).map_err(|e| rejection(datagram, e))?;
                self.pending_header = Some(header);
                Ok(None)
            }
            Framing::Framed => Frame::decode_framed(datagram)
                .map(Some)
                .map_err(|e| rejection(datagram, e)),
        }
    }

    fn accept_frame(&mut self, frame: Frame) -> Result<Step, ClientError> {
        match (self.phase, frame.header) {
            (Phase::Receiving, FrameHeader::Sequence(seq)) => {
                if self.buffer.insert(seq, frame.payload) == Inserted::EndMarker {
                    debug!(
                        end_marker = seq,
                        chunks = self.buffer.len(),
                        "first pass complete"
                    );
                    self.phase = Phase::Reassembled;
                    return Ok(Step::Done);
                }
                trace!(seq, "chunk stored");
                Ok(Step::Continue)
            }
            (Phase::Retransmitting, FrameHeader::Sequence(seq)) => {
                match frame.payload {
                    // The marker position is already known from the first pass.
                    Payload::EndMarker => {}
                    payload => {
                        if self.buffer.insert(seq, payload) == Inserted::Duplicate {
                            trace!(seq, "duplicate chunk ignored");
                        }
                    }
                }
                Ok(Step::Continue)
            }
            (Phase::Retransmitting, FrameHeader::Finished) => {
                debug!(chunks = self.buffer.len(), "retransmission round complete");
                self.phase = Phase::Reassembled;
                Ok(Step::Done)
            }
            (phase, header) => Err(ClientError::Unexpected(format!(
                "{header:?} while {phase:?}"
            ))),
        }
    }
}

/// Maps an undecodable frame to the server's `{"error"}` reply if it was one.
fn rejection(datagram: &[u8], error: ProtocolError) -> ClientError {
    match ServerMessage::decode(datagram) {
        Ok(ServerMessage::Error(message)) => ClientError::Rejected(message),
        _ => ClientError::Protocol(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(receiver: &mut Receiver, frames: &[Frame]) -> Vec<Step> {
        let mut steps = Vec::new();
        for frame in frames {
            for datagram in frame.encode(receiver.framing).unwrap() {
                steps.push(receiver.accept(&datagram).unwrap());
            }
        }
        steps
    }

    fn digest() -> Vec<u8> {
        ServerMessage::Digest("ab".repeat(32)).encode().unwrap()
    }

    #[test]
    fn split_first_pass_then_round() {
        let mut rx = Receiver::new(Framing::Split);
        assert_eq!(rx.accept(&digest()).unwrap(), Step::Continue);
        assert_eq!(rx.phase(), Phase::Receiving);
        assert_eq!(rx.digest().unwrap().as_str(), "ab".repeat(32));

        let steps = feed(
            &mut rx,
            &[
                Frame::chunk(2, Payload::Data(b"EE".to_vec())),
                Frame::chunk(0, Payload::Data(b"AABB".to_vec())),
                Frame::chunk(3, Payload::EndMarker),
            ],
        );
        assert_eq!(steps.last(), Some(&Step::Done));
        assert_eq!(rx.phase(), Phase::Reassembled);
        assert_eq!(rx.missing(), vec![1]);

        assert_eq!(rx.begin_round().unwrap(), vec![0, 2]);
        let steps = feed(
            &mut rx,
            &[
                Frame::chunk(1, Payload::Data(b"CCDD".to_vec())),
                Frame::finished(),
            ],
        );
        assert_eq!(steps.last(), Some(&Step::Done));
        assert!(rx.missing().is_empty());
        assert_eq!(rx.buffer().assemble(), b"AABBCCDDEE");
    }

    #[test]
    fn framed_mode_takes_one_datagram_per_chunk() {
        let mut rx = Receiver::new(Framing::Framed);
        rx.accept(&digest()).unwrap();
        let steps = feed(
            &mut rx,
            &[
                Frame::chunk(0, Payload::Data(b"EOF".to_vec())),
                Frame::chunk(1, Payload::EndMarker),
            ],
        );
        assert_eq!(steps, vec![Step::Continue, Step::Done]);
        // Framed mode tells a literal "EOF" payload apart from the marker.
        assert_eq!(rx.buffer().assemble(), b"EOF");
    }

    #[test]
    fn round_does_not_overwrite_held_chunks() {
        let mut rx = Receiver::new(Framing::Split);
        rx.accept(&digest()).unwrap();
        feed(
            &mut rx,
            &[
                Frame::chunk(0, Payload::Data(b"good".to_vec())),
                Frame::chunk(1, Payload::EndMarker),
            ],
        );
        rx.begin_round().unwrap();
        feed(
            &mut rx,
            &[
                Frame::chunk(0, Payload::Data(b"evil".to_vec())),
                Frame::finished(),
            ],
        );
        assert_eq!(rx.buffer().assemble(), b"good");
    }

    #[test]
    fn not_found_and_error_replies() {
        let mut rx = Receiver::new(Framing::Split);
        let not_found = ServerMessage::FileNotFound.encode().unwrap();
        assert_eq!(rx.accept(&not_found).unwrap(), Step::NotFound);

        let refused = ServerMessage::Error("retransmission in progress".into())
            .encode()
            .unwrap();
        assert!(matches!(
            rx.accept(&refused),
            Err(ClientError::Rejected(m)) if m == "retransmission in progress"
        ));
    }

    #[test]
    fn error_reply_during_round_is_a_rejection() {
        let mut rx = Receiver::new(Framing::Split);
        rx.accept(&digest()).unwrap();
        feed(&mut rx, &[Frame::chunk(0, Payload::EndMarker)]);
        rx.begin_round().unwrap();

        let refused = ServerMessage::Error("no transfer in progress".into())
            .encode()
            .unwrap();
        assert!(matches!(rx.accept(&refused), Err(ClientError::Rejected(_))));
    }

    #[test]
    fn finished_outside_round_is_unexpected() {
        let mut rx = Receiver::new(Framing::Split);
        rx.accept(&digest()).unwrap();
        rx.accept(b"Finished").unwrap();
        assert!(matches!(
            rx.accept(b"EOF"),
            Err(ClientError::Unexpected(_))
        ));
    }

    #[test]
    fn round_requires_a_completed_pass() {
        let mut rx = Receiver::new(Framing::Split);
        assert!(matches!(
            rx.begin_round(),
            Err(ClientError::NoTransferInProgress)
        ));
    }

    #[test]
    fn only_marker_means_everything_is_missing() {
        let mut rx = Receiver::new(Framing::Split);
        rx.accept(&digest()).unwrap();
        feed(&mut rx, &[Frame::chunk(3, Payload::EndMarker)]);
        assert_eq!(rx.missing(), vec![0, 1, 2]);
        assert_eq!(rx.begin_round().unwrap(), Vec::<u64>::new());
    }
}
