//! Network address of the forklift controller.

use std::fmt;

use thiserror::Error;

/// Address of the controller when it runs as its own Wi-Fi access point.
pub const DEFAULT_HOST: &str = "192.168.4.1";

/// WebSocket port the controller firmware listens on.
pub const DEFAULT_PORT: u16 = 81;

/// Reasons an endpoint is rejected before any network operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EndpointError {
    /// The host string is empty (or only whitespace).
    #[error("host must not be empty")]
    EmptyHost,

    /// The port is outside `1..=65535`.
    #[error("port {0} is outside 1..=65535")]
    PortOutOfRange(i64),

    /// The port text could not be read as an integer.
    #[error("port {0:?} is not a number")]
    PortNotNumeric(String),
}

/// Host and port identifying the controller on the local network.
///
/// An `Endpoint` can only be built through [`Endpoint::new`] or
/// [`Endpoint::parse`], so holding one means the host is non-empty and the
/// port is in range.
///
/// # Example
///
/// ```rust
/// use forklift_core::Endpoint;
///
/// let ep = Endpoint::new("192.168.4.1", 81).unwrap();
/// assert_eq!(ep.ws_url(), "ws://192.168.4.1:81/");
/// assert!(Endpoint::new("", 81).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Validates and builds an endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::EmptyHost`] for a blank host and
    /// [`EndpointError::PortOutOfRange`] for port `0`.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, EndpointError> {
        let host = host.into().trim().to_string();
        if host.is_empty() {
            return Err(EndpointError::EmptyHost);
        }
        if port == 0 {
            return Err(EndpointError::PortOutOfRange(0));
        }
        Ok(Self { host, port })
    }

    /// Builds an endpoint from free-form text, as typed into a settings field.
    ///
    /// # Errors
    ///
    /// Same as [`Endpoint::new`], plus [`EndpointError::PortNotNumeric`] when
    /// `port` is not an integer.
    pub fn parse(host: &str, port: &str) -> Result<Self, EndpointError> {
        let port_text = port.trim();
        let value: i64 = port_text
            .parse()
            .map_err(|_| EndpointError::PortNotNumeric(port_text.to_string()))?;
        let port = u16::try_from(value).map_err(|_| EndpointError::PortOutOfRange(value))?;
        Self::new(host, port)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// WebSocket URL of the controller's command socket.
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}/", self.host, self.port)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
