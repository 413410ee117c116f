//! Client for Pico ventilation controllers
//!
//! Pico units are controlled over UDP with a small JSON protocol. Every request carries a
//! sequence number (the IDP); the device acknowledges it, sends its response on the same IDP,
//! and expects an acknowledgment in return. Packets get lost and devices reboot, so the client
//! retries with fresh IDPs until its counter and the device's agree again.
//!
//! The entry point of this crate is the [`PicoClient`]. Many clients can share a single
//! [`Endpoint`]: each registered device owns a disjoint range of IDPs, which is how inbound
//! frames find their way to the right client even though they all arrive on one socket.
//!
//! The protocol logic itself lives in `pico-proto`, which performs no I/O.
#![warn(missing_docs)]
#![warn(unreachable_pub)]
#![warn(clippy::use_self)]

mod client;
mod config;
mod endpoint;
mod error;
mod events;
mod exchange;
mod mutex;
mod reconnect;
mod router;
mod session;
mod transport;

pub use proto::{
    Capability, Command, ConfigError, DeviceMode, DeviceStatus, ExchangeConfig, ExchangeFailure,
    IdpRange, Message, NotSupported, OnOff, ProtocolError, RangeExhausted, RetryConfig,
    TargetHumidity, DEFAULT_DEVICE_PORT, DEFAULT_LOCAL_PORT,
};

pub use crate::client::{quick_status, PicoClient};
pub use crate::config::{ClientConfig, EndpointConfig, ReconnectConfig};
pub use crate::endpoint::Endpoint;
pub use crate::error::{Error, TransportError};
pub use crate::events::{EventHandler, EventHandlers};
pub use crate::router::Router;
pub use crate::session::{DeviceSession, Inbound};
pub use crate::transport::TransportStats;
