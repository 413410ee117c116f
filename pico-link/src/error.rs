use std::{io, net::SocketAddr};

use proto::{ConfigError, ExchangeFailure, NotSupported, ProtocolError, RangeExhausted};
use thiserror::Error;

/// Errors that can arise when operating a device
#[derive(Debug, Error)]
pub enum Error {
    /// The socket failed
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The link could not be re-established
    #[error("reconnection failed after {attempts} attempts: {last}")]
    ReconnectFailed {
        /// Number of times the operation was run
        attempts: u32,
        /// The error that ended the final attempt
        #[source]
        last: Box<Error>,
    },
    /// The retry budget of an operation was spent without a response
    #[error("{device}: no response after {exchanges} exchanges ({last})")]
    Timeout {
        /// Identifier of the device session
        device: String,
        /// Number of exchanges made
        exchanges: u32,
        /// How the final exchange failed
        last: ExchangeFailure,
    },
    /// The device's current mode does not accept the requested adjustment
    #[error(transparent)]
    NotSupported(#[from] NotSupported),
    /// The device sent a response that could not be decoded
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The session was unregistered or its endpoint closed while in use
    #[error("device session closed")]
    SessionClosed,
    /// The operation requires a connection and automatic reconnection is disabled
    #[error("not connected")]
    NotConnected,
    /// The endpoint has no IDP range left for another device
    #[error(transparent)]
    Registry(#[from] RangeExhausted),
    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Whether the failure concerns the link itself, which a reconnection may repair
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::SessionClosed | Self::NotConnected
        )
    }
}

/// Errors raised by the UDP socket
#[derive(Debug, Error)]
pub enum TransportError {
    /// The local address could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The requested local address
        addr: SocketAddr,
        /// The underlying I/O error
        source: io::Error,
    },
    /// A datagram could not be sent
    #[error("failed to send to {dest}: {source}")]
    Send {
        /// The intended recipient
        dest: SocketAddr,
        /// The underlying I/O error
        source: io::Error,
    },
    /// The endpoint was closed
    #[error("endpoint closed")]
    Closed,
}
