//! Low-level protocol logic for Pico ventilation controllers
//!
//! pico-proto contains a deterministic implementation of the Pico UDP/JSON protocol. It contains
//! no networking code and does not read the clock. Most users will want the Tokio-based
//! `pico-link` crate instead.
//!
//! Every request carries an IDP (a sequence number). The device answers with an ACK frame and
//! then with the actual response on the same IDP; the client closes the exchange with an ACK of
//! its own. [`Exchange`] tracks one such handshake, [`RetryPlan`] decides how often to try again
//! with fresh IDPs when the device's counter has drifted, and [`IdpAllocator`] partitions the
//! IDP space so many devices can share one socket.

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod capability;
pub use crate::capability::{Capability, NotSupported};

mod command;
pub use crate::command::Command;

mod config;
pub use crate::config::{ConfigError, ExchangeConfig, OperationKind, RetryConfig};

mod device;
pub use crate::device::{DeviceMode, OnOff, TargetHumidity};

mod exchange;
pub use crate::exchange::{Exchange, ExchangeEvent, ExchangeFailure, ExchangeState};

pub mod frame;
pub use crate::frame::{FrameKind, Message, ProtocolError, Role};

mod idp;
pub use crate::idp::{IdpAllocator, IdpCounter, IdpRange, RangeExhausted};

mod retry;
pub use crate::retry::{RetryPlan, RetryStep};

pub mod status;
pub use crate::status::DeviceStatus;

/// UDP port the devices listen on
pub const DEFAULT_DEVICE_PORT: u16 = 40070;

/// Local UDP port clients bind by default
pub const DEFAULT_LOCAL_PORT: u16 = 40069;

/// Largest datagram the receive path accepts
pub const MAX_DATAGRAM_SIZE: usize = 65_535;

/// First IDP handed out on a fresh endpoint
pub const DEFAULT_FIRST_IDP: u32 = 1;

/// Number of IDPs reserved for each registered device
pub const DEFAULT_IDP_RANGE_SIZE: u32 = 10_000;
