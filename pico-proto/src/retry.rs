use std::time::Duration;

use crate::config::{OperationKind, RetryConfig};

/// What to do after an exchange failed
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RetryStep {
    /// Wait `delay`, then run another exchange with a fresh IDP
    Retry {
        /// Pause before the next exchange
        delay: Duration,
        /// Whether the session counter must restart from the beginning of its range
        reset_counter: bool,
    },
    /// The budget is spent
    GiveUp,
}

/// Nested retry/resynchronization schedule of one logical operation
///
/// The plan only counts; the caller runs the exchanges and reports each failure through
/// [`on_failure`](Self::on_failure). It never yields more than
/// [`RetryConfig::max_exchanges`] exchanges in total.
#[derive(Debug, Clone)]
pub struct RetryPlan {
    attempts: u32,
    sync_attempts: u32,
    retry_delay: Duration,
    idp_sync_delay: Duration,
    /// Outer attempt in progress, starting at 0
    attempt: u32,
    /// Exchanges made within the current outer attempt
    sync: u32,
    exchanges: u32,
}

impl RetryPlan {
    /// Plan an operation of the given kind
    pub fn new(config: &RetryConfig, kind: OperationKind) -> Self {
        Self {
            attempts: config.attempts.max(1),
            sync_attempts: config.idp_sync_attempts(kind).max(1),
            retry_delay: config.retry_delay,
            idp_sync_delay: config.idp_sync_delay,
            attempt: 0,
            sync: 0,
            exchanges: 0,
        }
    }

    /// Record a failed exchange and decide how to continue
    pub fn on_failure(&mut self) -> RetryStep {
        self.exchanges += 1;
        self.sync += 1;
        if self.sync < self.sync_attempts {
            return RetryStep::Retry {
                delay: self.idp_sync_delay,
                reset_counter: false,
            };
        }

        self.sync = 0;
        self.attempt += 1;
        if self.attempt < self.attempts {
            RetryStep::Retry {
                delay: self.retry_delay,
                reset_counter: true,
            }
        } else {
            RetryStep::GiveUp
        }
    }

    /// Failed exchanges recorded so far
    pub fn exchanges(&self) -> u32 {
        self.exchanges
    }

    /// One-based number of the outer attempt in progress
    pub fn attempt(&self) -> u32 {
        self.attempt + 1
    }

    /// One-based number of the next exchange within the current outer attempt
    pub fn sync_attempt(&self) -> u32 {
        self.sync + 1
    }
}
