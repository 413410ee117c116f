//! Callbacks for frames the device sends on its own initiative

use std::{
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use proto::Message;
use rustc_hash::FxHashMap;
use tokio::runtime::Handle;
use tracing::warn;

/// Reacts to inbound frames carrying a particular command name
pub trait EventHandler: Send + Sync + 'static {
    /// Called with every routed frame whose `cmd` the handler was registered for
    fn handle(&self, message: &Message);
}

impl<F> EventHandler for F
where
    F: Fn(&Message) + Send + Sync + 'static,
{
    fn handle(&self, message: &Message) {
        self(message)
    }
}

/// Handlers of one device session, keyed by command name
#[derive(Clone, Default)]
pub struct EventHandlers {
    handlers: FxHashMap<String, Arc<dyn EventHandler>>,
}

impl EventHandlers {
    /// An empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for frames whose `cmd` is `command`, replacing any previous one
    pub fn on(&mut self, command: impl Into<String>, handler: impl EventHandler) -> &mut Self {
        self.handlers.insert(command.into(), Arc::new(handler));
        self
    }

    /// Remove the handler for `command`, returning whether one was registered
    pub fn remove(&mut self, command: &str) -> bool {
        self.handlers.remove(command).is_some()
    }

    /// Whether no handlers are registered
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub(crate) fn get(&self, command: &str) -> Option<Arc<dyn EventHandler>> {
        self.handlers.get(command).cloned()
    }

    /// Run the handler registered for `message`'s command, if any, off the caller's task
    ///
    /// A panicking handler is logged and otherwise ignored.
    pub(crate) fn dispatch(&self, message: &Message) {
        let Some(command) = message.command() else {
            return;
        };
        let Some(handler) = self.get(command) else {
            return;
        };
        let command = command.to_owned();
        let message = message.clone();
        let run = move || {
            if catch_unwind(AssertUnwindSafe(|| handler.handle(&message))).is_err() {
                warn!(%command, "event handler panicked");
            }
        };
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { run() });
            }
            Err(_) => run(),
        }
    }
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn message(value: serde_json::Value) -> Message {
        Message::from_value(value).unwrap()
    }

    #[test]
    fn dispatch_by_command() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut handlers = EventHandlers::new();
        handlers.on("evt", move |_: &Message| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        handlers.dispatch(&message(json!({"cmd": "evt", "idp": 1})));
        handlers.dispatch(&message(json!({"cmd": "other", "idp": 1})));
        handlers.dispatch(&message(json!({"res": 1, "idp": 1})));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panics_are_contained() {
        let mut handlers = EventHandlers::new();
        handlers.on("evt", |_: &Message| panic!("handler failure"));
        handlers.dispatch(&message(json!({"cmd": "evt"})));
        assert!(handlers.remove("evt"));
        assert!(handlers.is_empty());
    }
}
