use std::sync::Arc;

use proto::{Capability, Command, DeviceMode, DeviceStatus, Message, OnOff, TargetHumidity};
use tracing::{debug, info};

use crate::{
    config::ClientConfig,
    endpoint::Endpoint,
    error::Error,
    events::EventHandlers,
    exchange::{self, Operation},
    mutex::Mutex,
    reconnect::{self, Link, Teardown},
    session::DeviceSession,
};

/// High-level handle to one Pico device
///
/// A client either owns a dedicated [`Endpoint`] bound to its configured local address, or
/// shares an endpoint with other clients (see [`with_endpoint`](Self::with_endpoint)). Unless
/// reconnection is disabled, every operation connects on demand and rebuilds the link after
/// transport failures.
pub struct PicoClient {
    config: ClientConfig,
    shared: Option<Endpoint>,
    events: EventHandlers,
    binding: Mutex<Option<Binding>>,
    last_status: Mutex<Option<DeviceStatus>>,
}

/// An established link: the endpoint and this device's session on it
#[derive(Clone)]
pub(crate) struct Binding {
    endpoint: Endpoint,
    session: Arc<DeviceSession>,
}

impl PicoClient {
    /// A client with its own socket
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        Self::build(config, None)
    }

    /// A client registered on an existing, possibly shared, endpoint
    pub fn with_endpoint(config: ClientConfig, endpoint: Endpoint) -> Result<Self, Error> {
        Self::build(config, Some(endpoint))
    }

    fn build(config: ClientConfig, shared: Option<Endpoint>) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            config,
            shared,
            events: EventHandlers::new(),
            binding: Mutex::new(None),
            last_status: Mutex::new(None),
        })
    }

    /// Handlers for unsolicited frames, applied on the next connection
    pub fn with_handlers(mut self, events: EventHandlers) -> Self {
        self.events = events;
        self
    }

    /// Bind the socket (or register on the shared endpoint)
    ///
    /// Does nothing if already connected. Must be called from within a Tokio runtime.
    pub fn connect(&self) -> Result<(), Error> {
        Link::connect(self).map(|_| ())
    }

    /// Release the socket (or the registration on the shared endpoint)
    ///
    /// A dedicated socket is closed and its local address is free again once this returns.
    pub async fn disconnect(&self) {
        if let Some(endpoint) = self.release() {
            endpoint.wait_closed().await;
        }
    }

    /// Whether a link is currently established
    pub fn is_connected(&self) -> bool {
        self.binding.lock("is_connected").is_some()
    }

    /// The endpoint this client is currently bound to
    pub fn endpoint(&self) -> Option<Endpoint> {
        let binding = self.binding.lock("endpoint");
        binding.as_ref().map(|b| b.endpoint.clone())
    }

    /// The device session, while connected
    pub fn session(&self) -> Option<Arc<DeviceSession>> {
        let binding = self.binding.lock("session");
        binding.as_ref().map(|b| b.session.clone())
    }

    /// The configuration this client was created with
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Query the device status without decoding it
    pub async fn get_raw_status(&self) -> Result<Message, Error> {
        self.send_command(&Command::status_query()).await
    }

    /// Query and decode the device status
    pub async fn get_status(&self) -> Result<DeviceStatus, Error> {
        let raw = self.get_raw_status().await?;
        let status = DeviceStatus::from_message(&raw)?;
        *self.last_status.lock("last_status") = Some(status.clone());
        Ok(status)
    }

    /// The most recently decoded status, if any
    pub fn last_status(&self) -> Option<DeviceStatus> {
        self.last_status.lock("last_status").clone()
    }

    /// Run an arbitrary command and return the device's response
    pub async fn send_command(&self, command: &Command) -> Result<Message, Error> {
        let config = &self.config;
        reconnect::run(&config.reconnect, self, move |binding: Binding| async move {
            let op = Operation {
                pin: &config.pin,
                exchange: &config.exchange,
                retry: &config.retry,
            };
            exchange::execute(&binding.endpoint, &binding.session, command, op).await
        })
        .await
    }

    /// Switch the unit on or off
    pub async fn set_power(&self, state: OnOff) -> Result<Message, Error> {
        self.send_command(&Command::power(state)).await
    }

    /// Select an operating preset
    pub async fn set_mode(&self, mode: DeviceMode) -> Result<Message, Error> {
        self.send_command(&Command::set_mode(mode)).await
    }

    /// Set the manual fan speed
    ///
    /// Fails with [`Error::NotSupported`] unless the current mode allows manual speed
    /// control; `force` skips the check.
    pub async fn set_fan_speed(&self, speed: u8, force: bool) -> Result<Message, Error> {
        self.require(Capability::FanSpeed, force).await?;
        self.send_command(&Command::fan_speed(speed)).await
    }

    /// Select the humidity setpoint
    ///
    /// Only humidity-driven modes accept a setpoint; `force` skips the check.
    pub async fn set_target_humidity(
        &self,
        target: TargetHumidity,
        force: bool,
    ) -> Result<Message, Error> {
        self.require(Capability::TargetHumidity, force).await?;
        self.send_command(&Command::target_humidity(target)).await
    }

    /// Turn the front LED on or off
    pub async fn set_led(&self, on: bool) -> Result<Message, Error> {
        self.send_command(&Command::led(on)).await
    }

    /// Enable or disable night mode
    ///
    /// Night mode is gated like the fan speed; `force` skips the check.
    pub async fn set_night_mode(&self, on: bool, force: bool) -> Result<Message, Error> {
        self.require(Capability::NightMode, force).await?;
        self.send_command(&Command::night_mode(on)).await
    }

    /// Check the device's current mode against `capability`
    ///
    /// Only `mod` has to decode; the full status is cached when it decodes as well.
    async fn require(&self, capability: Capability, force: bool) -> Result<(), Error> {
        if force {
            return Ok(());
        }
        let raw = self.get_raw_status().await?;
        let mode = DeviceMode::from_status(&raw)?;
        if let Ok(status) = DeviceStatus::from_message(&raw) {
            *self.last_status.lock("last_status") = Some(status);
        }
        capability.check(mode, false)?;
        Ok(())
    }

    /// Drop the binding, closing a dedicated endpoint
    ///
    /// Returns the closed endpoint so callers can wait for its socket to be released.
    fn release(&self) -> Option<Endpoint> {
        let binding = self.binding.lock("release").take()?;
        debug!(device = binding.session.id(), "disconnected");
        match self.shared {
            Some(_) => {
                binding.endpoint.unregister_device(binding.session.id());
                None
            }
            None => {
                binding.endpoint.close();
                Some(binding.endpoint)
            }
        }
    }

    fn device_id(&self) -> String {
        self.config.get_device_id()
    }
}

impl Link for PicoClient {
    type Binding = Binding;

    fn current(&self) -> Option<Binding> {
        self.binding.lock("current").clone()
    }

    fn connect(&self) -> Result<Binding, Error> {
        let mut current = self.binding.lock("connect");
        if let Some(binding) = &*current {
            return Ok(binding.clone());
        }

        let endpoint = match &self.shared {
            Some(endpoint) => endpoint.clone(),
            None => Endpoint::bind(self.config.local_addr, self.config.endpoint.clone())?,
        };
        let session = endpoint.register_device(
            &self.device_id(),
            self.config.device_addr(),
            self.events.clone(),
        );
        let session = match session {
            Ok(session) => session,
            Err(e) => {
                if self.shared.is_none() {
                    endpoint.close();
                }
                return Err(e);
            }
        };
        info!(
            device = session.id(),
            local_addr = %endpoint.local_addr(),
            range = %session.range(),
            "connected"
        );
        let binding = Binding { endpoint, session };
        *current = Some(binding.clone());
        Ok(binding)
    }

    fn teardown(&self) -> Teardown {
        let closed = self.release();
        Box::pin(async move {
            if let Some(endpoint) = closed {
                endpoint.wait_closed().await;
            }
        })
    }
}

impl Drop for PicoClient {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for PicoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PicoClient")
            .field("config", &self.config)
            .field("shared", &self.shared.is_some())
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Connect, read the status once, and disconnect
pub async fn quick_status(config: ClientConfig) -> Result<DeviceStatus, Error> {
    let client = PicoClient::new(config)?;
    client.connect()?;
    let status = client.get_status().await;
    client.disconnect().await;
    status
}
