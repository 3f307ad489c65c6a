//! Configuration for the managed TCP client.

use std::time::Duration;

use crate::tls::TlsConfig;

/// Configuration for a [`TcpClient`](crate::TcpClient).
///
/// No connect timeout is applied unless one is set here; callers wanting a
/// bounded wait either configure [`connect_timeout`](Self::connect_timeout)
/// or wrap the connect future externally.
#[derive(Clone, Debug, Default)]
pub struct ClientConfig {
    /// Enable TCP_NODELAY (disable Nagle's algorithm).
    pub no_delay: bool,
    /// Connection timeout. `None` means the attempt waits indefinitely.
    pub connect_timeout: Option<Duration>,
    /// TLS settings used by secure connects.
    pub tls: TlsConfig,
}

impl ClientConfig {
    /// Create a new client configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable TCP_NODELAY.
    pub fn no_delay(mut self, enabled: bool) -> Self {
        self.no_delay = enabled;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the TLS configuration used by secure connects.
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }
}
