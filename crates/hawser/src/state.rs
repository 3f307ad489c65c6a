//! Connection lifecycle states.

/// Current state of a managed TCP client.
///
/// States advance monotonically: a client that reached
/// [`Disconnected`](Self::Disconnected) cannot be taken back to
/// [`Unconnected`](Self::Unconnected) for a new connection attempt, and
/// [`Disposed`](Self::Disposed) is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection has been established yet. A failed connection attempt
    /// returns the client to this state, keeping it usable for a retry.
    Unconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Connected over a plain TCP stream.
    Connected,
    /// The TCP connection is established and the TLS handshake is in flight.
    SecureHandshaking,
    /// Connected with an established TLS session.
    SecureConnected,
    /// The connection was closed. The client cannot be reconnected.
    Disconnected,
    /// All resources have been released. Terminal.
    Disposed,
}

impl ConnectionState {
    /// Whether the client currently holds a usable connection.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::SecureConnected)
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Unconnected
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unconnected => write!(f, "Unconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::SecureHandshaking => write!(f, "SecureHandshaking"),
            Self::SecureConnected => write!(f, "SecureConnected"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Disposed => write!(f, "Disposed"),
        }
    }
}
