//! Managed TCP client socket with optional TLS upgrade.
//!
//! This crate provides a single-connection TCP client that owns its socket,
//! tracks an explicit connection lifecycle, and can upgrade an established
//! connection to TLS:
//!
//! - **TcpClient**: connect, disconnect, dispose; stream and endpoint
//!   accessors valid only while connected
//! - **SocketConnector**: the seam to the platform socket backend,
//!   injectable for alternative platforms and for tests
//! - **SecureConnector**: TLS client handshake over an established raw
//!   stream, with a certificate-validation policy reported to an
//!   injectable observer
//!
//! # Connecting
//!
//! ```ignore
//! use hawser::{ClientConfig, TcpClient};
//! use tokio::io::{AsyncReadExt, AsyncWriteExt};
//!
//! let client = TcpClient::new(ClientConfig::new().no_delay(true));
//! client.connect("127.0.0.1", 8080).await?;
//!
//! println!("connected to {}:{}", client.remote_address()?, client.remote_port()?);
//!
//! let mut writer = client.write_stream()?;
//! writer.write_all(b"Hello, Server!").await?;
//!
//! client.disconnect().await?;
//! ```
//!
//! # TLS upgrade
//!
//! ```ignore
//! use hawser::{ClientConfig, TcpClient, TlsConfig};
//!
//! let config = ClientConfig::new().tls(TlsConfig::new().enforce_validation());
//! let client = TcpClient::new(config);
//! client.connect_secure("example.com", 443).await?;
//! ```
//!
//! The certificate-validation policy classifies every handshake into a
//! [`CertificateValidationOutcome`] and reports it to a
//! [`ValidationObserver`] before the handshake result is returned. By
//! default the outcome is observational only — see [`TlsConfig`] for why
//! and how to turn on enforcement.

mod client;
mod config;
mod error;
mod secure;
mod socket;
mod state;
mod tls;

pub use client::{ReadStream, TcpClient, WriteStream};
pub use config::ClientConfig;
pub use error::{ConnectError, DisconnectError, StreamAccessError, TlsError};
pub use secure::SecureConnector;
pub use socket::{SocketConnector, SocketStream, TokioConnector};
pub use state::ConnectionState;
pub use tls::{
    Certificate, CertificateValidationOutcome, TlsConfig, TlsVersion, TracingObserver,
    ValidationObserver,
};
