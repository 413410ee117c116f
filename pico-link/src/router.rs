//! Maps IDPs to the device sessions that own them

use std::{collections::BTreeMap, fmt, net::SocketAddr, sync::Arc};

use proto::{IdpAllocator, IdpRange, Message, RangeExhausted};
use rustc_hash::FxHashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace, warn};

use crate::{
    config::EndpointConfig,
    events::EventHandlers,
    mutex::Mutex,
    session::{DeviceSession, Inbound},
    transport::InboundSink,
};

/// Session registry of an endpoint
///
/// Each registered device receives a fixed-size IDP range that no other device on the
/// endpoint will ever be given, so the `idp` of an inbound frame identifies its session
/// regardless of which address it arrived from.
pub struct Router {
    state: Mutex<State>,
    inbox_capacity: usize,
}

struct State {
    allocator: IdpAllocator,
    sessions: FxHashMap<String, Entry>,
    /// Session ids keyed by the first IDP of their range
    by_start: BTreeMap<u32, String>,
}

struct Entry {
    session: Arc<DeviceSession>,
    inbox: mpsc::Sender<Inbound>,
}

impl State {
    fn owner(&self, idp: u32) -> Option<&Entry> {
        let (_, id) = self.by_start.range(..=idp).next_back()?;
        let entry = self.sessions.get(id)?;
        entry.session.range().contains(idp).then_some(entry)
    }
}

impl Router {
    pub(crate) fn new(config: &EndpointConfig) -> Self {
        Self {
            state: Mutex::new(State {
                allocator: IdpAllocator::new(config.first_idp, config.idp_range_size),
                sessions: FxHashMap::default(),
                by_start: BTreeMap::new(),
            }),
            inbox_capacity: config.inbox_capacity,
        }
    }

    /// Register a device and return its IDP range
    ///
    /// Registering an id that is already present returns the existing range without
    /// allocating.
    pub fn register_device(
        &self,
        id: &str,
        remote: SocketAddr,
        events: EventHandlers,
    ) -> Result<IdpRange, RangeExhausted> {
        self.register(id, remote, events).map(|session| session.range())
    }

    pub(crate) fn register(
        &self,
        id: &str,
        remote: SocketAddr,
        events: EventHandlers,
    ) -> Result<Arc<DeviceSession>, RangeExhausted> {
        let mut state = self.state.lock("register");
        if let Some(entry) = state.sessions.get(id) {
            trace!(id, "device already registered");
            return Ok(entry.session.clone());
        }

        let range = state.allocator.allocate()?;
        let (tx, rx) = mpsc::channel(self.inbox_capacity);
        let session = Arc::new(DeviceSession::new(id.to_owned(), remote, range, rx, events));
        state.by_start.insert(range.start(), id.to_owned());
        state.sessions.insert(
            id.to_owned(),
            Entry {
                session: session.clone(),
                inbox: tx,
            },
        );
        debug!(id, %remote, %range, "registered device");
        Ok(session)
    }

    /// Remove a device; operations waiting on its inbox fail with `SessionClosed`
    pub fn unregister_device(&self, id: &str) -> bool {
        let mut state = self.state.lock("unregister");
        let Some(entry) = state.sessions.remove(id) else {
            return false;
        };
        state.by_start.remove(&entry.session.range().start());
        debug!(id, range = %entry.session.range(), "unregistered device");
        true
    }

    /// Look up a registered device
    pub fn session(&self, id: &str) -> Option<Arc<DeviceSession>> {
        let state = self.state.lock("session");
        state.sessions.get(id).map(|entry| entry.session.clone())
    }

    /// The session whose range contains `idp`
    pub fn owner_of(&self, idp: u32) -> Option<Arc<DeviceSession>> {
        let state = self.state.lock("owner_of");
        state.owner(idp).map(|entry| entry.session.clone())
    }

    /// Deliver a frame to the inbox of the session owning its IDP
    ///
    /// Returns whether the frame was queued. Frames without an IDP, frames no session
    /// claims, and frames arriving at a full inbox are dropped.
    pub fn route_inbound(&self, message: Message, from: SocketAddr) -> bool {
        let Some(idp) = message.idp() else {
            trace!(%from, "dropping frame without idp");
            return false;
        };
        let (session, inbox) = {
            let state = self.state.lock("route");
            match state.owner(idp) {
                Some(entry) => (entry.session.clone(), entry.inbox.clone()),
                None => {
                    trace!(idp, %from, "dropping frame for unowned idp");
                    return false;
                }
            }
        };

        session.events().dispatch(&message);
        match inbox.try_send(Inbound { message, from }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(device = session.id(), idp, "inbox full, dropping frame");
                false
            }
            Err(TrySendError::Closed(_)) => {
                trace!(device = session.id(), idp, "inbox closed");
                false
            }
        }
    }

    /// Number of registered devices
    pub fn len(&self) -> usize {
        self.state.lock("len").sessions.len()
    }

    /// Whether no device is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unregister every device
    ///
    /// Ranges already handed out stay retired.
    pub fn clear(&self) {
        let mut state = self.state.lock("clear");
        state.sessions.clear();
        state.by_start.clear();
    }
}

impl InboundSink for Router {
    fn deliver(&self, message: Message, from: SocketAddr) {
        self.route_inbound(message, from);
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock("debug");
        f.debug_struct("Router")
            .field("sessions", &state.by_start)
            .field("inbox_capacity", &self.inbox_capacity)
            .finish()
    }
}
