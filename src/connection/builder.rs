use crate::error::Result;
use crate::sasl::{self, AuthMechanism};

use super::{BusKind, Connection, Transport};

/// Configures and opens a [`Connection`].
///
/// # Examples
///
/// ```no_run
/// use wirebus::{AuthMechanism, ConnectionBuilder};
///
/// # #[tokio::main] async fn main() -> wirebus::Result<()> {
/// let connection = ConnectionBuilder::new()
///     .system_bus()
///     .auth_mechanism(AuthMechanism::external())
///     .connect()
///     .await?;
/// # Ok(()) }
/// ```
pub struct ConnectionBuilder {
    bus: BusKind,
    address: Option<String>,
    mechanisms: Vec<AuthMechanism>,
}

impl ConnectionBuilder {
    /// Construct a builder targeting the session bus with the default
    /// authentication chain.
    pub fn new() -> Self {
        Self {
            bus: BusKind::Session,
            address: None,
            mechanisms: Vec::new(),
        }
    }

    /// Target the session bus.
    pub fn session_bus(mut self) -> Self {
        self.bus = BusKind::Session;
        self
    }

    /// Target the system bus.
    pub fn system_bus(mut self) -> Self {
        self.bus = BusKind::System;
        self
    }

    /// Target an explicit bus address instead of resolving one from the
    /// environment.
    pub fn address(mut self, address: &str) -> Self {
        self.address = Some(address.to_owned());
        self
    }

    /// Offer an authentication mechanism. May be called repeatedly;
    /// mechanisms are tried in the order added.
    pub fn auth_mechanism(mut self, mechanism: AuthMechanism) -> Self {
        self.mechanisms.push(mechanism);
        self
    }

    /// Open the transport, authenticate, and return an active connection
    /// that has completed its `Hello` exchange with the bus.
    pub async fn connect(self) -> Result<Connection> {
        let mut transport = match &self.address {
            Some(address) => Transport::connect_address(address).await?,
            None => Transport::connect(self.bus).await?,
        };

        let mechanisms = if self.mechanisms.is_empty() {
            AuthMechanism::default_chain()
        } else {
            self.mechanisms
        };

        sasl::authenticate(&mut transport, &mechanisms).await?;
        Connection::start(transport).await
    }
}

impl Default for ConnectionBuilder {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
