//! Error types for the client lifecycle, stream access, and TLS upgrade.

use std::io;

use thiserror::Error;

/// Errors returned by a connection attempt.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The remote endpoint could not be reached.
    #[error("endpoint unreachable: {0}")]
    Unreachable(#[source] io::Error),

    /// The connection attempt exceeded the configured timeout.
    #[error("connection attempt timed out")]
    Timeout,

    /// The remote endpoint refused the connection.
    #[error("connection refused by the remote endpoint")]
    Refused,

    /// The TCP connection succeeded but the TLS upgrade failed. The raw
    /// socket is closed before this error is returned.
    #[error("TLS handshake failed")]
    TlsHandshakeFailed(#[source] TlsError),

    /// A connection attempt is already in flight, or the client is already
    /// connected.
    #[error("a connection is already active or being established")]
    AlreadyConnecting,

    /// The client has been disposed and cannot connect again.
    #[error("client has been disposed")]
    Disposed,

    /// The client went through a disconnect and cannot be reused for a new
    /// connection.
    #[error("client is no longer usable for new connections")]
    Unusable,
}

/// Errors returned when closing an established connection.
///
/// Calling disconnect while not connected is a no-op, not an error.
#[derive(Error, Debug)]
pub enum DisconnectError {
    /// Shutting down the underlying stream failed. The client still
    /// transitions to the disconnected state and releases its resources.
    #[error("failed to shut down the stream: {0}")]
    Shutdown(#[source] io::Error),
}

/// Errors returned by the stream and endpoint accessors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamAccessError {
    /// The client holds no active connection.
    #[error("not connected")]
    NotConnected,
}

/// Errors produced while configuring or performing the TLS upgrade.
#[derive(Error, Debug)]
pub enum TlsError {
    /// The TLS configuration could not be built (unparseable certificates,
    /// empty trust store, invalid server name, ...).
    #[error("invalid TLS configuration: {0}")]
    Config(String),

    /// The TLS client handshake failed.
    #[error("TLS handshake failed: {0}")]
    Handshake(String),
}
