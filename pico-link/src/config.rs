use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    time::Duration,
};

use proto::{
    ConfigError, ExchangeConfig, RetryConfig, DEFAULT_DEVICE_PORT, DEFAULT_FIRST_IDP,
    DEFAULT_IDP_RANGE_SIZE, DEFAULT_LOCAL_PORT,
};

/// Global configuration for an endpoint, affecting all devices registered on it
#[derive(Clone)]
pub struct EndpointConfig {
    pub(crate) idp_range_size: NonZeroU32,
    pub(crate) first_idp: u32,
    pub(crate) inbox_capacity: usize,
    pub(crate) reuse_address: bool,
}

impl EndpointConfig {
    /// Number of IDPs reserved for each registered device
    ///
    /// Larger ranges delay counter wraparound; smaller ones allow more devices per endpoint.
    pub fn idp_range_size(&mut self, value: u32) -> Result<&mut Self, ConfigError> {
        self.idp_range_size = NonZeroU32::new(value).ok_or(ConfigError::Zero("idp_range_size"))?;
        Ok(self)
    }

    /// First IDP of the first registered device
    pub fn first_idp(&mut self, value: u32) -> &mut Self {
        self.first_idp = value;
        self
    }

    /// Number of inbound frames buffered per device before further frames are dropped
    pub fn inbox_capacity(&mut self, value: usize) -> Result<&mut Self, ConfigError> {
        if value == 0 {
            return Err(ConfigError::Zero("inbox_capacity"));
        }
        self.inbox_capacity = value;
        Ok(self)
    }

    /// Whether to set `SO_REUSEADDR` on the socket before binding
    pub fn reuse_address(&mut self, value: bool) -> &mut Self {
        self.reuse_address = value;
        self
    }

    /// Get the current value of `idp_range_size`
    pub fn get_idp_range_size(&self) -> u32 {
        self.idp_range_size.get()
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            idp_range_size: NonZeroU32::new(DEFAULT_IDP_RANGE_SIZE).unwrap_or(NonZeroU32::MIN),
            first_idp: DEFAULT_FIRST_IDP,
            inbox_capacity: 64,
            reuse_address: false,
        }
    }
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("EndpointConfig")
            .field("idp_range_size", &self.idp_range_size)
            .field("first_idp", &self.first_idp)
            .field("inbox_capacity", &self.inbox_capacity)
            .field("reuse_address", &self.reuse_address)
            .finish()
    }
}

/// How a client recovers from a broken link
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub(crate) enabled: bool,
    pub(crate) max_attempts: u32,
    pub(crate) delay: Duration,
}

impl ReconnectConfig {
    /// Whether operations connect on demand and rebuild the link after transport failures
    ///
    /// When disabled, operations on a disconnected client fail with
    /// [`Error::NotConnected`](crate::Error::NotConnected).
    pub fn enabled(&mut self, value: bool) -> &mut Self {
        self.enabled = value;
        self
    }

    /// How many times an operation is run before giving up; must be at least 1
    pub fn max_attempts(&mut self, value: u32) -> Result<&mut Self, ConfigError> {
        if value == 0 {
            return Err(ConfigError::Zero("max_reconnect_attempts"));
        }
        self.max_attempts = value;
        Ok(self)
    }

    /// Pause between tearing the link down and rebuilding it
    pub fn delay(&mut self, value: Duration) -> &mut Self {
        self.delay = value;
        self
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

/// Configuration for talking to one device
#[derive(Clone)]
pub struct ClientConfig {
    pub(crate) ip: IpAddr,
    pub(crate) pin: String,
    pub(crate) device_port: u16,
    pub(crate) local_addr: SocketAddr,
    pub(crate) device_id: Option<String>,
    pub(crate) exchange: ExchangeConfig,
    pub(crate) retry: RetryConfig,
    pub(crate) reconnect: ReconnectConfig,
    pub(crate) endpoint: EndpointConfig,
}

impl ClientConfig {
    /// Configuration for the device at `ip`, authenticated with `pin`
    pub fn new(ip: IpAddr, pin: impl Into<String>) -> Self {
        Self {
            ip,
            pin: pin.into(),
            device_port: DEFAULT_DEVICE_PORT,
            local_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_LOCAL_PORT),
            device_id: None,
            exchange: ExchangeConfig::default(),
            retry: RetryConfig::default(),
            reconnect: ReconnectConfig::default(),
            endpoint: EndpointConfig::default(),
        }
    }

    /// UDP port the device listens on
    pub fn device_port(&mut self, value: u16) -> &mut Self {
        self.device_port = value;
        self
    }

    /// Local port of a dedicated endpoint, on all interfaces
    pub fn local_port(&mut self, value: u16) -> &mut Self {
        self.local_addr.set_port(value);
        self
    }

    /// Local address of a dedicated endpoint
    ///
    /// Ignored by clients created with
    /// [`PicoClient::with_endpoint`](crate::PicoClient::with_endpoint).
    pub fn local_addr(&mut self, value: SocketAddr) -> &mut Self {
        self.local_addr = value;
        self
    }

    /// Name under which the device is registered on its endpoint
    ///
    /// Defaults to the device's socket address.
    pub fn device_id(&mut self, value: impl Into<String>) -> &mut Self {
        self.device_id = Some(value.into());
        self
    }

    /// Timing of individual exchanges
    pub fn exchange_config(&mut self, value: ExchangeConfig) -> &mut Self {
        self.exchange = value;
        self
    }

    /// Retry and IDP resynchronization budget
    pub fn retry_config(&mut self, value: RetryConfig) -> &mut Self {
        self.retry = value;
        self
    }

    /// Reconnection behavior
    pub fn reconnect_config(&mut self, value: ReconnectConfig) -> &mut Self {
        self.reconnect = value;
        self
    }

    /// Settings of the dedicated endpoint
    pub fn endpoint_config(&mut self, value: EndpointConfig) -> &mut Self {
        self.endpoint = value;
        self
    }

    /// The device's socket address
    pub fn device_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.device_port)
    }

    /// Registration name of the device
    pub fn get_device_id(&self) -> String {
        match &self.device_id {
            Some(id) => id.clone(),
            None => self.device_addr().to_string(),
        }
    }

    /// Check that the configuration can be used to reach a device
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pin.is_empty() {
            return Err(ConfigError::Empty("pin"));
        }
        if self.device_port == 0 {
            return Err(ConfigError::Zero("device_port"));
        }
        if matches!(&self.device_id, Some(id) if id.is_empty()) {
            return Err(ConfigError::Empty("device_id"));
        }
        self.exchange.validate()?;
        self.retry.validate()
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("ClientConfig")
            .field("device", &self.device_addr())
            .field("pin", &"<redacted>")
            .field("local_addr", &self.local_addr)
            .field("device_id", &self.device_id)
            .field("exchange", &self.exchange)
            .field("retry", &self.retry)
            .field("reconnect", &self.reconnect)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}
