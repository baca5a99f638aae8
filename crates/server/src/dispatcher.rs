//! Receive loop and per-address workers.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ferry_protocol::frame::FRAME_HEADER_LEN;
use ferry_protocol::{ClientMessage, MAX_DATAGRAM_SIZE, ServerMessage};
use ferry_transfer::{LossSimulator, TransferError};
use tokio::net::UdpSocket;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::session::{Outgoing, PreparedFile, Session};
use crate::transmitter::Transmitter;
use crate::{ServerConfig, ServerError};

/// Whether a worker keeps its session after a datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Datagrams a worker may have queued before new ones are dropped.
const INBOX_CAPACITY: usize = 1024;

/// What [`SessionStore::route`] did with a datagram.
#[derive(Debug, PartialEq, Eq)]
enum Route {
    Delivered,
    /// The worker is behind; the datagram was dropped.
    Full,
    /// No live worker for the address; the datagram is handed back.
    Vacant(Vec<u8>),
}

/// A finished worker's address and the datagrams it never processed.
type Released = (SocketAddr, Vec<Vec<u8>>);

/// Inboxes of live workers, keyed by client address.
///
/// Owned by the receive loop; never shared.
#[derive(Default)]
struct SessionStore {
    inboxes: HashMap<SocketAddr, mpsc::Sender<Vec<u8>>>,
}

impl SessionStore {
    /// Hands `datagram` to the worker for `peer`.
    fn route(&mut self, peer: SocketAddr, datagram: Vec<u8>) -> Route {
        let Some(inbox) = self.inboxes.get(&peer) else {
            return Route::Vacant(datagram);
        };
        match inbox.try_send(datagram) {
            Ok(()) => Route::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => Route::Full,
            Err(mpsc::error::TrySendError::Closed(datagram)) => {
                self.inboxes.remove(&peer);
                Route::Vacant(datagram)
            }
        }
    }

    fn insert(&mut self, peer: SocketAddr, inbox: mpsc::Sender<Vec<u8>>) {
        self.inboxes.insert(peer, inbox);
    }

    /// Forgets `peer` unless a newer worker already took its place.
    fn release(&mut self, peer: SocketAddr) {
        if self.inboxes.get(&peer).is_some_and(|inbox| inbox.is_closed()) {
            self.inboxes.remove(&peer);
        }
    }

    fn len(&self) -> usize {
        self.inboxes.len()
    }
}

/// Datagram file-transfer server.
pub struct Server {
    config: ServerConfig,
    socket: UdpSocket,
    permits: Semaphore,
    cancel: CancellationToken,
    active: AtomicUsize,
}

impl Server {
    /// Validates `config` and binds the UDP socket.
    pub async fn bind(config: ServerConfig) -> Result<Arc<Self>, ServerError> {
        if config.workers == 0 {
            return Err(ServerError::Config("workers must be at least 1".into()));
        }
        let max_chunk = MAX_DATAGRAM_SIZE - FRAME_HEADER_LEN;
        if config.chunk_size > max_chunk {
            return Err(ServerError::Config(format!(
                "chunk size {} exceeds {max_chunk} bytes",
                config.chunk_size
            )));
        }

        let socket = UdpSocket::bind(config.bind).await?;
        info!(
            addr = %socket.local_addr()?,
            root = %config.root.display(),
            chunk_size = config.chunk_size,
            workers = config.workers,
            "server listening"
        );

        Ok(Arc::new(Self {
            permits: Semaphore::new(config.workers),
            config,
            socket,
            cancel: CancellationToken::new(),
            active: AtomicUsize::new(0),
        }))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    /// Number of client sessions currently held.
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Stops the receive loop and every worker.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Receives datagrams until [`shutdown`](Self::shutdown) is called.
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        let mut store = SessionStore::default();
        let (released_tx, mut released_rx) = mpsc::unbounded_channel::<Released>();
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                Some((peer, leftovers)) = released_rx.recv() => {
                    store.release(peer);
                    if !leftovers.is_empty() {
                        debug!(%peer, count = leftovers.len(), "re-routing queued datagrams");
                    }
                    for datagram in leftovers {
                        self.dispatch(&mut store, &released_tx, peer, datagram);
                    }
                }
                result = self.socket.recv_from(&mut buf) => {
                    let (n, peer) = match result {
                        Ok(received) => received,
                        Err(e) => {
                            warn!("receive failed: {e}");
                            continue;
                        }
                    };
                    self.dispatch(&mut store, &released_tx, peer, buf[..n].to_vec());
                }
            }
        }

        info!("server stopped");
        Ok(())
    }

    /// Routes `datagram` to the worker of `peer`, spawning one if needed.
    fn dispatch(
        self: &Arc<Self>,
        store: &mut SessionStore,
        released: &mpsc::UnboundedSender<Released>,
        peer: SocketAddr,
        datagram: Vec<u8>,
    ) {
        let datagram = match store.route(peer, datagram) {
            Route::Delivered => return,
            Route::Full => {
                warn!(%peer, "worker inbox full, datagram dropped");
                return;
            }
            Route::Vacant(datagram) => datagram,
        };

        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
        // Fresh channel with a live receiver: cannot be full or closed.
        let _ = inbox_tx.try_send(datagram);
        store.insert(peer, inbox_tx);

        let server = Arc::clone(self);
        let released = released.clone();
        tokio::spawn(async move {
            let leftovers = server.serve_peer(peer, inbox_rx).await;
            let _ = released.send((peer, leftovers));
        });
        debug!(%peer, routed = store.len(), "worker spawned");
    }

    /// Owns the session of `peer` until it finishes, idles out or the server stops.
    ///
    /// Returns datagrams that were queued but not processed.
    async fn serve_peer(
        &self,
        peer: SocketAddr,
        mut inbox: mpsc::Receiver<Vec<u8>>,
    ) -> Vec<Vec<u8>> {
        let loss = match self.config.loss_seed {
            Some(seed) => LossSimulator::seeded(seed),
            None => LossSimulator::from_entropy(),
        };
        let mut session = Session::new(peer, loss);
        let sessions = self.active.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(%peer, sessions, "session opened");

        loop {
            let datagram = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                next = tokio::time::timeout(self.config.idle_timeout, inbox.recv()) => match next {
                    Ok(Some(datagram)) => datagram,
                    Ok(None) => break,
                    Err(_) => {
                        info!(%peer, "session idle, releasing");
                        break;
                    }
                },
            };

            let Ok(_permit) = self.permits.acquire().await else {
                break;
            };
            match self.handle_datagram(&mut session, &datagram).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Close) => {
                    info!(%peer, "connection finished");
                    break;
                }
                Err(e) => warn!(%peer, "failed to serve datagram: {e}"),
            }
        }

        inbox.close();
        let mut leftovers = Vec::new();
        while let Ok(datagram) = inbox.try_recv() {
            leftovers.push(datagram);
        }

        let sessions = self.active.fetch_sub(1, Ordering::Relaxed) - 1;
        debug!(%peer, sessions, "session released");
        leftovers
    }

    async fn handle_datagram(
        &self,
        session: &mut Session,
        datagram: &[u8],
    ) -> Result<Flow, ServerError> {
        let peer = session.peer();
        let replies = match ClientMessage::decode(datagram) {
            Ok(ClientMessage::Transfer(request)) => match session.refuse_transfer() {
                Some(refusal) => vec![refusal],
                None => {
                    let prepared = self.prepare(&request.file_name).await?;
                    session.begin_transfer(&request, prepared)
                }
            },
            Ok(ClientMessage::Retransmit(seq)) => session.on_retransmit(seq),
            Ok(ClientMessage::FinishedRetransmission) => session.on_finished_retransmission(),
            Ok(ClientMessage::FinishConnection) => return Ok(Flow::Close),
            Err(e) => {
                warn!(%peer, "protocol violation: {e}");
                vec![Outgoing::Control(ServerMessage::Error(format!(
                    "protocol violation: {e}"
                )))]
            }
        };

        if !replies.is_empty() {
            let sent = Transmitter::new(&self.socket, peer, session.framing())
                .send_all(&replies)
                .await?;
            debug!(%peer, sent, "replies sent");
        }
        Ok(Flow::Continue)
    }

    /// Reads and hashes the requested file off the runtime threads.
    async fn prepare(
        &self,
        file_name: &str,
    ) -> Result<Result<PreparedFile, TransferError>, ServerError> {
        let root = self.config.root.clone();
        let file_name = file_name.to_string();
        let chunk_size = self.config.chunk_size;
        let prepared =
            tokio::task::spawn_blocking(move || PreparedFile::load(&root, &file_name, chunk_size))
                .await?;
        Ok(prepared)
    }
}
