use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use ferry_protocol::{ClientMessage, MAX_DATAGRAM_SIZE, TransferRequest};
use ferry_transfer::{validate_file_name, verify};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::receiver::{Receiver, Step};
use crate::{ClientConfig, ClientError};

/// How a request or retransmission round ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The written file matches the server's digest.
    Verified { path: PathBuf },
    /// The written file is incomplete; `missing` lists absent data chunks.
    Mismatch { path: PathBuf, missing: Vec<u64> },
    /// The server replied `File does not exist`.
    NotFound,
}

/// A transfer whose file failed verification and may be retransmitted.
#[derive(Debug)]
struct PendingTransfer {
    path: PathBuf,
    receiver: Receiver,
}

/// Connected client. One request at a time.
pub struct Client {
    config: ClientConfig,
    socket: UdpSocket,
    local_addr: SocketAddr,
    pending: Option<PendingTransfer>,
}

impl Client {
    /// Binds an ephemeral local port and connects it to the server.
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let socket = UdpSocket::bind(local_bind_addr(config.server.ip())).await?;
        socket.connect(config.server).await?;
        let local_addr = socket.local_addr()?;
        info!(server = %config.server, local = %local_addr, "client ready");

        Ok(Self {
            config,
            socket,
            local_addr,
            pending: None,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Directory this client writes received files to.
    pub fn output_dir(&self) -> PathBuf {
        self.config.root.join(format!(
            "{}_{}",
            self.local_addr.ip(),
            self.local_addr.port()
        ))
    }

    /// Whether the last transfer failed verification and can be retransmitted.
    pub fn can_retransmit(&self) -> bool {
        self.pending.is_some()
    }

    /// Requests `file_name` with `discarded_chunks` chunks withheld by the server.
    ///
    /// Any transfer still awaiting retransmission is abandoned.
    pub async fn request(
        &mut self,
        file_name: &str,
        discarded_chunks: u64,
    ) -> Result<TransferOutcome, ClientError> {
        validate_file_name(file_name)?;
        self.pending = None;
        self.drain();

        let request = ClientMessage::Transfer(TransferRequest {
            file_name: file_name.to_string(),
            discarded_chunks,
            framing: self.config.framing,
        });
        self.send(&request).await?;
        info!(file = file_name, discarded_chunks, "transfer requested");

        let mut receiver = Receiver::new(self.config.framing);
        if receive_phase(&self.socket, self.config.receive_timeout, &mut receiver).await?
            == Step::NotFound
        {
            info!(file = file_name, "server does not have the file");
            return Ok(TransferOutcome::NotFound);
        }

        let pending = PendingTransfer {
            path: self.output_dir().join(file_name),
            receiver,
        };
        self.conclude(pending).await
    }

    /// Runs one retransmission round for the last mismatched transfer.
    pub async fn retransmit(&mut self) -> Result<TransferOutcome, ClientError> {
        let mut pending = self
            .pending
            .take()
            .ok_or(ClientError::NoTransferInProgress)?;
        self.drain();

        let claims = pending.receiver.begin_round()?;
        for seq in &claims {
            self.send(&ClientMessage::Retransmit(*seq)).await?;
        }
        self.send(&ClientMessage::FinishedRetransmission).await?;
        info!(claimed = claims.len(), "retransmission requested");

        receive_phase(
            &self.socket,
            self.config.receive_timeout,
            &mut pending.receiver,
        )
        .await?;
        self.conclude(pending).await
    }

    /// Tells the server to release this client's session.
    pub async fn finish(self) -> Result<(), ClientError> {
        self.send(&ClientMessage::FinishConnection).await?;
        info!(local = %self.local_addr, "connection finished");
        Ok(())
    }

    /// Writes the reassembled file and checks it against the announced digest.
    async fn conclude(&mut self, pending: PendingTransfer) -> Result<TransferOutcome, ClientError> {
        let Some(digest) = pending.receiver.digest().cloned() else {
            return Err(ClientError::Unexpected("transfer without digest".into()));
        };

        let (pending, size, matches) = tokio::task::spawn_blocking(move || {
            let size = pending.receiver.buffer().write_to(&pending.path)?;
            let matches = verify(&pending.path, &digest)?;
            Ok::<_, ferry_transfer::TransferError>((pending, size, matches))
        })
        .await??;

        if matches {
            info!(path = %pending.path.display(), size, "file verified");
            return Ok(TransferOutcome::Verified { path: pending.path });
        }

        let missing = pending.receiver.missing();
        warn!(
            path = %pending.path.display(),
            size,
            missing = missing.len(),
            "integrity mismatch"
        );
        let path = pending.path.clone();
        self.pending = Some(pending);
        Ok(TransferOutcome::Mismatch { path, missing })
    }

    async fn send(&self, message: &ClientMessage) -> Result<(), ClientError> {
        self.socket.send(&message.encode()?).await?;
        Ok(())
    }

    /// Discards datagrams left over from an earlier attempt.
    fn drain(&self) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut stale = 0usize;
        loop {
            match self.socket.try_recv(&mut buf) {
                Ok(_) => stale += 1,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    debug!("drain stopped: {e}");
                    break;
                }
            }
        }
        if stale > 0 {
            debug!(stale, "discarded stale datagrams");
        }
    }
}

/// Feeds datagrams to `receiver` until its current phase ends.
async fn receive_phase(
    socket: &UdpSocket,
    timeout: Duration,
    receiver: &mut Receiver,
) -> Result<Step, ClientError> {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        let n = tokio::time::timeout(timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| ClientError::Timeout(timeout))??;
        match receiver.accept(&buf[..n])? {
            Step::Continue => {}
            step => return Ok(step),
        }
    }
}

fn local_bind_addr(server: IpAddr) -> SocketAddr {
    let ip = match server {
        IpAddr::V4(v4) if v4.is_loopback() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(v6) if v6.is_loopback() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    SocketAddr::new(ip, 0)
}
