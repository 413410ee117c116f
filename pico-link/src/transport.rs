//! The UDP socket shared by every device on an endpoint

use std::{
    io,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use bytes::Bytes;
use proto::{Message, MAX_DATAGRAM_SIZE};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::{
    net::UdpSocket,
    sync::{mpsc, watch},
};
use tracing::{debug, trace};

use crate::{error::TransportError, mutex::Mutex};

/// Consumer of decoded inbound frames
pub(crate) trait InboundSink: Send + Sync + 'static {
    fn deliver(&self, message: Message, from: SocketAddr);
}

/// Owns a bound UDP socket and the task draining it
///
/// Every datagram that decodes as a JSON object is handed to the [`InboundSink`]; anything
/// else is counted and dropped. The receive task stops on [`shutdown`](Self::shutdown) or when
/// the transport is dropped.
pub(crate) struct Transport {
    /// `None` once shut down
    socket: Mutex<Option<Arc<UdpSocket>>>,
    local_addr: SocketAddr,
    stats: Arc<Counters>,
    shutdown_tx: mpsc::Sender<()>,
    /// Closed by the receive task after it has let go of the socket
    recv_done: watch::Receiver<()>,
}

impl Transport {
    /// Bind `addr` and start receiving
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn bind(
        addr: SocketAddr,
        reuse_address: bool,
        sink: Arc<dyn InboundSink>,
    ) -> Result<Self, TransportError> {
        let socket = bind_socket(addr, reuse_address)
            .map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;
        let socket = Arc::new(socket);
        let stats = Arc::new(Counters::default());
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (done_tx, recv_done) = watch::channel(());

        tokio::spawn(recv_loop(
            socket.clone(),
            sink,
            stats.clone(),
            shutdown_rx,
            done_tx,
        ));
        debug!(%local_addr, "transport bound");

        Ok(Self {
            socket: Mutex::new(Some(socket)),
            local_addr,
            stats,
            shutdown_tx,
            recv_done,
        })
    }

    /// Transmit one datagram
    pub(crate) async fn send(
        &self,
        dest: SocketAddr,
        datagram: Bytes,
    ) -> Result<(), TransportError> {
        let socket = self
            .socket
            .lock("send")
            .clone()
            .ok_or(TransportError::Closed)?;

        match socket.send_to(&datagram, dest).await {
            Ok(sent) => {
                self.stats.datagrams_sent.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .bytes_sent
                    .fetch_add(sent as u64, Ordering::Relaxed);
                trace!(%dest, len = sent, "sent datagram");
                Ok(())
            }
            Err(source) => {
                self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
                Err(TransportError::Send { dest, source })
            }
        }
    }

    /// Stop the receive task and refuse further sends
    ///
    /// The socket is released once the receive task has wound down, see
    /// [`closed`](Self::closed).
    pub(crate) fn shutdown(&self) {
        if self.socket.lock("shutdown").take().is_some() {
            let _ = self.shutdown_tx.try_send(());
            debug!(local_addr = %self.local_addr, "transport shut down");
        }
    }

    /// Wait for the receive task to finish
    ///
    /// After [`shutdown`](Self::shutdown), the local address can be bound again once this
    /// returns, provided no send is still in flight.
    pub(crate) async fn closed(&self) {
        // Nothing is ever sent on the channel; it only closes
        let _ = self.recv_done.clone().changed().await;
    }

    pub(crate) fn is_online(&self) -> bool {
        self.socket.lock("is_online").is_some()
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub(crate) fn stats(&self) -> TransportStats {
        self.stats.snapshot()
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn bind_socket(addr: SocketAddr, reuse_address: bool) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    if reuse_address {
        socket.set_reuse_address(true)?;
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    UdpSocket::from_std(socket.into())
}

async fn recv_loop(
    socket: Arc<UdpSocket>,
    sink: Arc<dyn InboundSink>,
    stats: Arc<Counters>,
    mut shutdown_rx: mpsc::Receiver<()>,
    done: watch::Sender<()>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => match result {
                Ok((len, from)) => {
                    stats.datagrams_received.fetch_add(1, Ordering::Relaxed);
                    stats.bytes_received.fetch_add(len as u64, Ordering::Relaxed);
                    match Message::decode(&buf[..len]) {
                        Ok(message) => sink.deliver(message, from),
                        Err(e) => {
                            stats.malformed.fetch_add(1, Ordering::Relaxed);
                            debug!(%from, len, "dropping malformed datagram: {}", e);
                        }
                    }
                }
                // Reported on some platforms after an ICMP port unreachable
                Err(e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                Err(e) => {
                    stats.receive_errors.fetch_add(1, Ordering::Relaxed);
                    debug!("receive error: {}", e);
                }
            },
            _ = shutdown_rx.recv() => break,
        }
    }
    drop(socket);
    drop(done);
    trace!("receive loop finished");
}

#[derive(Default)]
struct Counters {
    datagrams_sent: AtomicU64,
    datagrams_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    send_errors: AtomicU64,
    receive_errors: AtomicU64,
    malformed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> TransportStats {
        TransportStats {
            datagrams_sent: self.datagrams_sent.load(Ordering::Relaxed),
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }
}

/// Socket-level counters of an endpoint
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct TransportStats {
    /// Datagrams handed to the operating system
    pub datagrams_sent: u64,
    /// Datagrams read from the socket, including malformed ones
    pub datagrams_received: u64,
    /// Payload bytes sent
    pub bytes_sent: u64,
    /// Payload bytes received
    pub bytes_received: u64,
    /// Failed sends
    pub send_errors: u64,
    /// Failed receives, other than connection resets
    pub receive_errors: u64,
    /// Datagrams that were not a JSON object
    pub malformed: u64,
}
