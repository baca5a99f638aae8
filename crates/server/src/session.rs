//! Per-client session state.
//!
//! ```text
//!            TransferRequest                 Retransmit(n)
//!   Idle ─────────────────────▶ Transferred ───────────────▶ Retransmitting
//!    ▲  (file missing: stays)        ▲                            │
//!    │                               └── FinishedRetransmission ──┘
//!    └── Finish connection / idle timeout releases the whole session
//! ```
//!
//! A session is owned by exactly one worker, so none of these methods
//! synchronize.

use std::net::SocketAddr;
use std::path::Path;

use ferry_protocol::{Frame, Framing, ServerMessage, TransferRequest};
use ferry_transfer::{
    ChunkSet, Digest, LossSimulator, RetransmitRound, TransferError, chunk_file, digest_chunks,
};
use tracing::{debug, info, warn};

/// Error text sent when a request arrives during a retransmission round.
pub const RETRANSMISSION_IN_PROGRESS: &str = "retransmission in progress";

/// Error text sent for retransmission messages outside a transfer.
pub const NO_TRANSFER: &str = "no transfer in progress";

/// A datagram-level reply produced by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Control(ServerMessage),
    Frame(Frame),
}

/// A source file read and hashed, ready for loss injection.
#[derive(Debug, Clone)]
pub struct PreparedFile {
    pub chunks: ChunkSet,
    pub digest: Digest,
}

impl PreparedFile {
    /// Chunks and hashes `root/file_name`. Blocking.
    pub fn load(root: &Path, file_name: &str, chunk_size: usize) -> Result<Self, TransferError> {
        let chunks = chunk_file(root, file_name, chunk_size)?;
        let digest = digest_chunks(&chunks);
        Ok(Self { chunks, digest })
    }
}

#[derive(Debug)]
struct ActiveTransfer {
    file_name: String,
    /// Undamaged chunk set; never modified after loss injection.
    authoritative: ChunkSet,
    withheld: Vec<u64>,
    framing: Framing,
}

#[derive(Debug)]
enum SessionState {
    Idle,
    Transferred(ActiveTransfer),
    Retransmitting(ActiveTransfer, RetransmitRound),
}

/// Transfer state for one client address.
#[derive(Debug)]
pub struct Session {
    peer: SocketAddr,
    state: SessionState,
    loss: LossSimulator,
}

impl Session {
    pub fn new(peer: SocketAddr, loss: LossSimulator) -> Self {
        Self {
            peer,
            state: SessionState::Idle,
            loss,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Framing of the current transfer (split when idle).
    pub fn framing(&self) -> Framing {
        match &self.state {
            SessionState::Idle => Framing::default(),
            SessionState::Transferred(t) | SessionState::Retransmitting(t, _) => t.framing,
        }
    }

    pub fn is_retransmitting(&self) -> bool {
        matches!(self.state, SessionState::Retransmitting(..))
    }

    /// Sequence numbers withheld from the current transfer's first pass.
    pub fn withheld(&self) -> &[u64] {
        match &self.state {
            SessionState::Idle => &[],
            SessionState::Transferred(t) | SessionState::Retransmitting(t, _) => &t.withheld,
        }
    }

    /// Returns the refusal to send if a new transfer may not start now.
    pub fn refuse_transfer(&self) -> Option<Outgoing> {
        if self.is_retransmitting() {
            warn!(peer = %self.peer, "transfer request during retransmission round");
            return Some(Outgoing::Control(ServerMessage::Error(
                RETRANSMISSION_IN_PROGRESS.into(),
            )));
        }
        None
    }

    /// Starts a transfer: digest first, then every chunk surviving loss injection.
    ///
    /// Any previous transfer of this session is discarded.
    pub fn begin_transfer(
        &mut self,
        request: &TransferRequest,
        prepared: Result<PreparedFile, TransferError>,
    ) -> Vec<Outgoing> {
        if let Some(refusal) = self.refuse_transfer() {
            return vec![refusal];
        }
        self.state = SessionState::Idle;

        let prepared = match prepared {
            Ok(p) => p,
            Err(TransferError::FileNotFound(name)) => {
                info!(peer = %self.peer, file = %name, "requested file does not exist");
                return vec![Outgoing::Control(ServerMessage::FileNotFound)];
            }
            Err(TransferError::InvalidPath(reason)) => {
                warn!(peer = %self.peer, %reason, "rejected file name");
                return vec![Outgoing::Control(ServerMessage::Error(reason))];
            }
            Err(e) => {
                warn!(peer = %self.peer, file = %request.file_name, "failed to read file: {e}");
                return vec![Outgoing::Control(ServerMessage::Error(format!(
                    "failed to read {}",
                    request.file_name
                )))];
            }
        };

        let outcome = self.loss.apply(&prepared.chunks, request.discarded_chunks);
        info!(
            peer = %self.peer,
            file = %request.file_name,
            chunks = prepared.chunks.data_len(),
            withheld = ?outcome.withheld,
            framing = ?request.framing,
            "transfer started"
        );

        let mut out = Vec::with_capacity(outcome.sent.len() + 1);
        out.push(Outgoing::Control(ServerMessage::Digest(
            prepared.digest.as_str().to_string(),
        )));
        out.extend(outcome.sent.frames().map(Outgoing::Frame));

        self.state = SessionState::Transferred(ActiveTransfer {
            file_name: request.file_name.clone(),
            authoritative: prepared.chunks,
            withheld: outcome.withheld,
            framing: request.framing,
        });
        out
    }

    /// Records that the client holds chunk `sequence_number`.
    pub fn on_retransmit(&mut self, sequence_number: u64) -> Vec<Outgoing> {
        match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Idle => {
                warn!(
                    peer = %self.peer,
                    seq = sequence_number,
                    "retransmit claim outside a transfer"
                );
                vec![Outgoing::Control(ServerMessage::Error(NO_TRANSFER.into()))]
            }
            SessionState::Transferred(transfer) => {
                debug!(
                    peer = %self.peer,
                    file = %transfer.file_name,
                    "retransmission round opened"
                );
                let mut round = RetransmitRound::new();
                round.claim(sequence_number);
                self.state = SessionState::Retransmitting(transfer, round);
                Vec::new()
            }
            SessionState::Retransmitting(transfer, mut round) => {
                round.claim(sequence_number);
                self.state = SessionState::Retransmitting(transfer, round);
                Vec::new()
            }
        }
    }

    /// Closes the round: resends every unclaimed data chunk, then `Finished`.
    ///
    /// A round with no claims at all resends the whole file.
    pub fn on_finished_retransmission(&mut self) -> Vec<Outgoing> {
        let (transfer, round) = match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Idle => {
                warn!(peer = %self.peer, "retransmission finish outside a transfer");
                return vec![Outgoing::Control(ServerMessage::Error(NO_TRANSFER.into()))];
            }
            SessionState::Transferred(transfer) => (transfer, RetransmitRound::new()),
            SessionState::Retransmitting(transfer, round) => (transfer, round),
        };

        let missing = round.missing(&transfer.authoritative);
        info!(
            peer = %self.peer,
            file = %transfer.file_name,
            claimed = round.claimed_len(),
            resent = missing.len(),
            "retransmitting missing chunks"
        );

        let mut out: Vec<Outgoing> = missing
            .iter()
            .map(|chunk| Outgoing::Frame(chunk.to_frame()))
            .collect();
        out.push(Outgoing::Frame(Frame::finished()));

        self.state = SessionState::Transferred(transfer);
        out
    }
}
