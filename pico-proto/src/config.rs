use std::{fmt, time::Duration};

use thiserror::Error;

/// Timing of a single request/response exchange
///
/// The device answers every request with an ACK frame followed by the substantive response.
/// `response_timeout` bounds the whole exchange; once an ACK is seen, `ack_timeout` bounds how
/// long the payload may lag behind it. An ACK that is never followed up usually means the
/// device and client disagree about the current IDP.
#[derive(Clone)]
pub struct ExchangeConfig {
    pub(crate) response_timeout: Duration,
    pub(crate) ack_timeout: Duration,
}

impl ExchangeConfig {
    /// Maximum time to wait for the response to a single request
    pub fn response_timeout(&mut self, value: Duration) -> &mut Self {
        self.response_timeout = value;
        self
    }

    /// Maximum time to wait for the payload after the device acknowledged a request
    pub fn ack_timeout(&mut self, value: Duration) -> &mut Self {
        self.ack_timeout = value;
        self
    }

    /// Get the current value of `response_timeout`
    pub fn get_response_timeout(&self) -> Duration {
        self.response_timeout
    }

    /// Get the current value of `ack_timeout`
    pub fn get_ack_timeout(&self) -> Duration {
        self.ack_timeout
    }

    /// Check that every timeout is nonzero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.response_timeout.is_zero() {
            return Err(ConfigError::Zero("response_timeout"));
        }
        if self.ack_timeout.is_zero() {
            return Err(ConfigError::Zero("ack_timeout"));
        }
        Ok(())
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(15),
            ack_timeout: Duration::from_secs(3),
        }
    }
}

impl fmt::Debug for ExchangeConfig {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("ExchangeConfig")
            .field("response_timeout", &self.response_timeout)
            .field("ack_timeout", &self.ack_timeout)
            .finish()
    }
}

/// Retry and IDP resynchronization budget of a logical operation
///
/// An operation runs up to `attempts` outer attempts. Within each, up to
/// `query_idp_sync_attempts` (status queries) or `command_idp_sync_attempts` (mutating
/// commands) exchanges are made, each with a freshly drawn IDP, so a client whose counter
/// drifted from the device's converges without outside help.
#[derive(Clone)]
pub struct RetryConfig {
    pub(crate) attempts: u32,
    pub(crate) query_idp_sync_attempts: u32,
    pub(crate) command_idp_sync_attempts: u32,
    pub(crate) retry_delay: Duration,
    pub(crate) idp_sync_delay: Duration,
}

impl RetryConfig {
    /// Number of outer attempts; must be at least 1
    pub fn attempts(&mut self, value: u32) -> Result<&mut Self, ConfigError> {
        self.attempts = nonzero("attempts", value)?;
        Ok(self)
    }

    /// Exchanges per outer attempt for status queries; must be at least 1
    pub fn query_idp_sync_attempts(&mut self, value: u32) -> Result<&mut Self, ConfigError> {
        self.query_idp_sync_attempts = nonzero("query_idp_sync_attempts", value)?;
        Ok(self)
    }

    /// Exchanges per outer attempt for mutating commands; must be at least 1
    pub fn command_idp_sync_attempts(&mut self, value: u32) -> Result<&mut Self, ConfigError> {
        self.command_idp_sync_attempts = nonzero("command_idp_sync_attempts", value)?;
        Ok(self)
    }

    /// Pause before each outer attempt after the first
    pub fn retry_delay(&mut self, value: Duration) -> &mut Self {
        self.retry_delay = value;
        self
    }

    /// Pause between exchanges within one outer attempt
    pub fn idp_sync_delay(&mut self, value: Duration) -> &mut Self {
        self.idp_sync_delay = value;
        self
    }

    /// Get the current value of `attempts`
    pub fn get_attempts(&self) -> u32 {
        self.attempts
    }

    /// Get the current value of `retry_delay`
    pub fn get_retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Upper bound on the number of exchanges a single operation may make
    pub fn max_exchanges(&self, kind: OperationKind) -> u32 {
        self.attempts.saturating_mul(self.idp_sync_attempts(kind))
    }

    pub(crate) fn idp_sync_attempts(&self, kind: OperationKind) -> u32 {
        match kind {
            OperationKind::Query => self.query_idp_sync_attempts,
            OperationKind::Command => self.command_idp_sync_attempts,
        }
    }

    /// Check the invariants the fallible setters enforce, for values built by hand
    pub fn validate(&self) -> Result<(), ConfigError> {
        nonzero("attempts", self.attempts)?;
        nonzero("query_idp_sync_attempts", self.query_idp_sync_attempts)?;
        nonzero("command_idp_sync_attempts", self.command_idp_sync_attempts)?;
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            query_idp_sync_attempts: 10,
            command_idp_sync_attempts: 5,
            retry_delay: Duration::from_secs(2),
            idp_sync_delay: Duration::ZERO,
        }
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            attempts,
            query_idp_sync_attempts,
            command_idp_sync_attempts,
            retry_delay,
            idp_sync_delay,
        } = self;
        fmt.debug_struct("RetryConfig")
            .field("attempts", attempts)
            .field("query_idp_sync_attempts", query_idp_sync_attempts)
            .field("command_idp_sync_attempts", command_idp_sync_attempts)
            .field("retry_delay", retry_delay)
            .field("idp_sync_delay", idp_sync_delay)
            .finish()
    }
}

/// Whether an operation only reads device state or changes it
///
/// Status queries are cheap and idempotent, so they get a larger resynchronization budget.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OperationKind {
    /// `stato_sync`
    Query,
    /// Anything else, typically `upd_pico`
    Command,
}

fn nonzero(field: &'static str, value: u32) -> Result<u32, ConfigError> {
    match value {
        0 => Err(ConfigError::Zero(field)),
        v => Ok(v),
    }
}

/// Errors in the parameters being used to create a client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A count or duration that must be positive was zero
    #[error("{0} must be nonzero")]
    Zero(&'static str),
    /// Value exceeds supported bounds
    #[error("{0} exceeds supported bounds")]
    OutOfBounds(&'static str),
    /// A required value was left empty
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let exchange = ExchangeConfig::default();
        assert_eq!(exchange.get_response_timeout(), Duration::from_secs(15));
        assert_eq!(exchange.get_ack_timeout(), Duration::from_secs(3));
        let retry = RetryConfig::default();
        assert_eq!(retry.max_exchanges(OperationKind::Query), 30);
        assert_eq!(retry.max_exchanges(OperationKind::Command), 15);
    }

    #[test]
    fn zero_attempts_rejected() {
        let mut retry = RetryConfig::default();
        assert_eq!(retry.attempts(0).unwrap_err(), ConfigError::Zero("attempts"));
        assert_eq!(retry.get_attempts(), 3);
        retry.attempts(1).unwrap().retry_delay(Duration::ZERO);
        assert_eq!(retry.max_exchanges(OperationKind::Query), 10);
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut exchange = ExchangeConfig::default();
        exchange.ack_timeout(Duration::ZERO);
        assert_eq!(
            exchange.validate().unwrap_err(),
            ConfigError::Zero("ack_timeout")
        );
    }
}
