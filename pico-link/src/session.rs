use std::{fmt, net::SocketAddr};

use proto::{IdpCounter, IdpRange, Message};
use tokio::sync::{mpsc, Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::{events::EventHandlers, mutex::Mutex};

/// A frame routed to a session, with the address it came from
#[derive(Debug, Clone)]
pub struct Inbound {
    /// The decoded frame
    pub message: Message,
    /// Sender of the datagram
    pub from: SocketAddr,
}

/// Per-device state on an endpoint
///
/// The session owns the device's IDP range and counter and the receiving half of its inbox.
/// The sending half is held by the router; once the session is unregistered, the inbox
/// drains and then reports closure.
pub struct DeviceSession {
    id: String,
    remote: SocketAddr,
    range: IdpRange,
    counter: Mutex<IdpCounter>,
    inbox: AsyncMutex<mpsc::Receiver<Inbound>>,
    events: EventHandlers,
}

impl DeviceSession {
    pub(crate) fn new(
        id: String,
        remote: SocketAddr,
        range: IdpRange,
        inbox: mpsc::Receiver<Inbound>,
        events: EventHandlers,
    ) -> Self {
        Self {
            id,
            remote,
            range,
            counter: Mutex::new(IdpCounter::new(range)),
            inbox: AsyncMutex::new(inbox),
            events,
        }
    }

    /// Registration name
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Address requests are sent to
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// IDPs reserved for this device
    pub fn range(&self) -> IdpRange {
        self.range
    }

    /// Draw the next IDP, wrapping within the range
    pub fn next_idp(&self) -> u32 {
        self.counter.lock("next_idp").next_idp()
    }

    /// Restart the counter from the beginning of the range
    pub fn reset_counter(&self) {
        self.counter.lock("reset_counter").reset();
    }

    /// The IDP the next call to [`next_idp`](Self::next_idp) will return
    pub fn peek_idp(&self) -> u32 {
        self.counter.lock("peek_idp").peek()
    }

    pub(crate) fn events(&self) -> &EventHandlers {
        &self.events
    }

    /// Exclusive access to the inbox; held for a whole operation so exchanges never interleave
    pub(crate) async fn inbox(&self) -> AsyncMutexGuard<'_, mpsc::Receiver<Inbound>> {
        self.inbox.lock().await
    }
}

impl fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("id", &self.id)
            .field("remote", &self.remote)
            .field("range", &self.range)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}
