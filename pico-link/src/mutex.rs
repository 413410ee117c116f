use std::{
    fmt,
    ops::{Deref, DerefMut},
    sync::PoisonError,
};

#[cfg(feature = "lock_tracking")]
use std::time::{Duration, Instant};

#[cfg(feature = "lock_tracking")]
use tracing::warn;

/// Locks held at least this long are reported when `lock_tracking` is enabled
#[cfg(feature = "lock_tracking")]
const SLOW_LOCK: Duration = Duration::from_millis(1);

/// A blocking mutex whose acquisitions are labelled with their purpose
///
/// Poisoning is ignored. With the `lock_tracking` feature, slow acquisitions and long critical
/// sections are logged together with the label.
pub(crate) struct Mutex<T> {
    inner: std::sync::Mutex<T>,
}

impl<T> Mutex<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            inner: std::sync::Mutex::new(value),
        }
    }

    /// Acquire the lock on behalf of `purpose`
    pub(crate) fn lock(&self, purpose: &'static str) -> MutexGuard<'_, T> {
        #[cfg(feature = "lock_tracking")]
        let requested = Instant::now();
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        #[cfg(feature = "lock_tracking")]
        {
            let waited = requested.elapsed();
            if waited >= SLOW_LOCK {
                warn!(purpose, ?waited, "slow lock acquisition");
            }
        }

        MutexGuard {
            guard,
            #[cfg(feature = "lock_tracking")]
            acquired: Instant::now(),
            #[cfg(feature = "lock_tracking")]
            purpose,
            #[cfg(not(feature = "lock_tracking"))]
            _purpose: purpose,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_lock() {
            Ok(value) => f.debug_tuple("Mutex").field(&*value).finish(),
            Err(_) => f.write_str("Mutex(<locked>)"),
        }
    }
}

pub(crate) struct MutexGuard<'a, T> {
    guard: std::sync::MutexGuard<'a, T>,
    #[cfg(feature = "lock_tracking")]
    acquired: Instant,
    #[cfg(feature = "lock_tracking")]
    purpose: &'static str,
    #[cfg(not(feature = "lock_tracking"))]
    _purpose: &'static str,
}

#[cfg(feature = "lock_tracking")]
impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        let held = self.acquired.elapsed();
        if held >= SLOW_LOCK {
            warn!(purpose = self.purpose, ?held, "lock held for a long time");
        }
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}
