use std::{future::Future, pin::Pin};

use tracing::{debug, warn};

use crate::{config::ReconnectConfig, error::Error};

/// Completes once a torn-down link has released its resources
pub(crate) type Teardown = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Something that can be connected, used and torn down again
pub(crate) trait Link {
    /// What an operation needs from an established link
    type Binding;

    /// The current binding, if connected
    fn current(&self) -> Option<Self::Binding>;

    /// Establish a binding, or return the current one
    fn connect(&self) -> Result<Self::Binding, Error>;

    /// Drop the current binding
    ///
    /// The binding is gone when this returns; the future resolves once it can be rebuilt.
    fn teardown(&self) -> Teardown;
}

/// Run `op`, rebuilding the link after transport-level failures
///
/// With reconnection disabled, `op` runs once on the current binding. Otherwise the link is
/// connected on demand and `op` runs up to `max_attempts` times; errors that do not concern
/// the link are returned immediately.
pub(crate) async fn run<L, T, F, Fut>(
    policy: &ReconnectConfig,
    link: &L,
    mut op: F,
) -> Result<T, Error>
where
    L: Link,
    F: FnMut(L::Binding) -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    if !policy.enabled {
        let binding = link.current().ok_or(Error::NotConnected)?;
        return op(binding).await;
    }

    let mut attempts = 0;
    loop {
        attempts += 1;
        let result = match link.current() {
            Some(binding) => op(binding).await,
            None => match link.connect() {
                Ok(binding) => op(binding).await,
                Err(e) => Err(e),
            },
        };
        let err = match result {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transport() => return Err(e),
            Err(e) => e,
        };

        if attempts >= policy.max_attempts {
            warn!(attempts, "giving up on reconnection: {}", err);
            return Err(Error::ReconnectFailed {
                attempts,
                last: Box::new(err),
            });
        }
        warn!(
            attempt = attempts,
            max = policy.max_attempts,
            "link lost, reconnecting: {}",
            err
        );
        link.teardown().await;
        if !policy.delay.is_zero() {
            tokio::time::sleep(policy.delay).await;
        }
        debug!("reconnecting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use proto::{ExchangeFailure, RangeExhausted};
    use std::{
        cell::Cell,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        time::Duration,
    };

    #[derive(Default)]
    struct FakeLink {
        connected: Cell<bool>,
        connects: Cell<u32>,
        teardowns: Cell<u32>,
        /// Set by the teardown future once it has run to completion
        released: Arc<AtomicBool>,
        refuse_connect: bool,
    }

    impl Link for FakeLink {
        type Binding = u32;

        fn current(&self) -> Option<u32> {
            self.connected.get().then(|| self.connects.get())
        }

        fn connect(&self) -> Result<u32, Error> {
            if self.refuse_connect {
                return Err(Error::Registry(RangeExhausted { next: 0, size: 1 }));
            }
            assert!(
                self.teardowns.get() == 0 || self.released.load(Ordering::SeqCst),
                "rebuilt before the previous link was released"
            );
            self.connects.set(self.connects.get() + 1);
            self.connected.set(true);
            Ok(self.connects.get())
        }

        fn teardown(&self) -> Teardown {
            self.teardowns.set(self.teardowns.get() + 1);
            self.connected.set(false);
            let released = self.released.clone();
            released.store(false, Ordering::SeqCst);
            Box::pin(async move {
                tokio::task::yield_now().await;
                released.store(true, Ordering::SeqCst);
            })
        }
    }

    fn policy(enabled: bool) -> ReconnectConfig {
        let mut policy = ReconnectConfig::default();
        policy
            .enabled(enabled)
            .delay(Duration::from_millis(1))
            .max_attempts(3)
            .unwrap();
        policy
    }

    #[tokio::test]
    async fn disabled_requires_connection() {
        let link = FakeLink::default();
        let result = run(&policy(false), &link, |_| async { Ok(()) }).await;
        assert!(matches!(result, Err(Error::NotConnected)));
        assert_eq!(link.connects.get(), 0);
    }

    #[tokio::test]
    async fn connects_on_demand() {
        let link = FakeLink::default();
        let binding = run(&policy(true), &link, |b| async move { Ok(b) }).await.unwrap();
        assert_eq!(binding, 1);
        assert_eq!(link.teardowns.get(), 0);
    }

    #[tokio::test]
    async fn rebinds_after_transport_failure() {
        let link = FakeLink::default();
        let result = run(&policy(true), &link, |binding| async move {
            match binding {
                1 => Err(TransportError::Closed.into()),
                n => Ok(n),
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(link.teardowns.get(), 1);
    }

    #[tokio::test]
    async fn rebinds_after_release_without_delay() {
        let link = FakeLink::default();
        let mut policy = policy(true);
        policy.delay(Duration::ZERO);
        let result = run(&policy, &link, |binding| async move {
            match binding {
                1 | 2 => Err(Error::SessionClosed),
                n => Ok(n),
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(link.teardowns.get(), 2);
        assert!(link.released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn exhaustion() {
        let link = FakeLink::default();
        let result: Result<(), _> =
            run(&policy(true), &link, |_| async { Err(Error::SessionClosed) }).await;
        match result {
            Err(Error::ReconnectFailed { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, Error::SessionClosed));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(link.connects.get(), 3);
        assert_eq!(link.teardowns.get(), 2);
    }

    #[tokio::test]
    async fn timeouts_are_not_retried() {
        let link = FakeLink::default();
        let mut calls = 0;
        let result: Result<(), _> = run(&policy(true), &link, |_| {
            calls += 1;
            async {
                Err(Error::Timeout {
                    device: "d".into(),
                    exchanges: 1,
                    last: ExchangeFailure::NoAck,
                })
            }
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout { .. })));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn connect_errors_surface() {
        let link = FakeLink {
            refuse_connect: true,
            ..FakeLink::default()
        };
        let result = run(&policy(true), &link, |_| async { Ok(()) }).await;
        assert!(matches!(result, Err(Error::Registry(_))));
    }
}
