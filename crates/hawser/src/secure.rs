//! Secure stream adapter: upgrades an established raw stream to TLS.

use std::sync::Arc;

use rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::error::TlsError;
use crate::socket::SocketStream;
use crate::tls::{TlsConfig, ValidationObserver};

/// Performs the TLS client handshake over an already-connected raw stream.
///
/// The rustls client configuration, including the certificate-validation
/// policy and its observer, is built once at construction. Each
/// [`handshake`](Self::handshake) call consumes a raw stream and yields the
/// TLS-wrapped stream that all subsequent reads and writes route through.
pub struct SecureConnector {
    connector: TlsConnector,
}

impl std::fmt::Debug for SecureConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureConnector").finish()
    }
}

impl SecureConnector {
    /// Build the adapter from a TLS configuration and a validation observer.
    pub fn new(
        config: &TlsConfig,
        observer: Arc<dyn ValidationObserver>,
    ) -> Result<Self, TlsError> {
        let client_config = config.build_client_config(observer)?;
        Ok(Self {
            connector: TlsConnector::from(client_config),
        })
    }

    /// Run the TLS client handshake against `host` over `raw`.
    ///
    /// Suspends until the handshake completes or fails. On failure the raw
    /// stream has been consumed and dropped, so the underlying socket is
    /// already closed when the error is returned.
    pub async fn handshake(
        &self,
        host: &str,
        raw: Box<dyn SocketStream>,
    ) -> Result<TlsStream<Box<dyn SocketStream>>, TlsError> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| TlsError::Config(format!("invalid server name '{host}': {e}")))?;

        tracing::debug!(target: "hawser::tls", "Starting TLS handshake with '{}'", host);

        self.connector
            .connect(server_name, raw)
            .await
            .map_err(|e| TlsError::Handshake(e.to_string()))
    }
}
