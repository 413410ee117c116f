use std::{fmt, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use tracing::debug;

use crate::{
    config::EndpointConfig,
    error::{Error, TransportError},
    events::EventHandlers,
    router::Router,
    session::DeviceSession,
    transport::{Transport, TransportStats},
};

/// A local UDP socket shared by any number of devices
///
/// May be cloned to obtain another handle to the same endpoint. Each device registered on it
/// gets its own [`DeviceSession`]; inbound frames are routed to sessions by IDP.
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<EndpointInner>,
}

struct EndpointInner {
    transport: Transport,
    router: Arc<Router>,
}

impl Endpoint {
    /// Bind a socket on `addr`
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(addr: SocketAddr, config: EndpointConfig) -> Result<Self, Error> {
        let router = Arc::new(Router::new(&config));
        let transport = Transport::bind(addr, config.reuse_address, router.clone())?;
        Ok(Self {
            inner: Arc::new(EndpointInner { transport, router }),
        })
    }

    /// Register a device, or look up its session if it is already registered
    pub fn register_device(
        &self,
        id: &str,
        remote: SocketAddr,
        events: EventHandlers,
    ) -> Result<Arc<DeviceSession>, Error> {
        if !self.inner.transport.is_online() {
            return Err(TransportError::Closed.into());
        }
        Ok(self.inner.router.register(id, remote, events)?)
    }

    /// Remove a device
    pub fn unregister_device(&self, id: &str) -> bool {
        self.inner.router.unregister_device(id)
    }

    /// Look up a registered device
    pub fn session(&self, id: &str) -> Option<Arc<DeviceSession>> {
        self.inner.router.session(id)
    }

    /// The session registry
    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    pub(crate) async fn send(
        &self,
        dest: SocketAddr,
        datagram: Bytes,
    ) -> Result<(), TransportError> {
        self.inner.transport.send(dest, datagram).await
    }

    /// The local address the socket is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.transport.local_addr()
    }

    /// Socket-level counters
    pub fn stats(&self) -> TransportStats {
        self.inner.transport.stats()
    }

    /// Stop the socket and unregister every device
    ///
    /// Operations in progress on any handle to this endpoint fail promptly. The socket itself is
    /// released in the background; await [`wait_closed`](Self::wait_closed) before binding the
    /// same local address again.
    pub fn close(&self) {
        self.inner.transport.shutdown();
        self.inner.router.clear();
        debug!(local_addr = %self.local_addr(), "endpoint closed");
    }

    /// Wait until a closed endpoint has released its socket
    ///
    /// Does not return before [`close`](Self::close) is called on some handle.
    pub async fn wait_closed(&self) {
        self.inner.transport.closed().await;
    }

    /// Whether [`close`](Self::close) was called
    pub fn is_closed(&self) -> bool {
        !self.inner.transport.is_online()
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("local_addr", &self.local_addr())
            .field("closed", &self.is_closed())
            .field("router", &self.inner.router)
            .finish()
    }
}
