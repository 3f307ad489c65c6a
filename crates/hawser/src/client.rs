//! Managed TCP client: connection lifecycle, TLS upgrade, stream access.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf, ReadHalf, WriteHalf};
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;

use crate::config::ClientConfig;
use crate::error::{ConnectError, DisconnectError, StreamAccessError};
use crate::secure::SecureConnector;
use crate::socket::{SocketConnector, SocketStream, TokioConnector};
use crate::state::ConnectionState;
use crate::tls::{TracingObserver, ValidationObserver};

/// A stream that may or may not be TLS-encrypted.
///
/// The client splits this into read/write halves exactly once, after the
/// final stream is known, so the accessors can never hand out a mix of raw
/// and TLS directions.
enum MaybeTlsStream {
    Plain(Box<dyn SocketStream>),
    Tls(TlsStream<Box<dyn SocketStream>>),
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            MaybeTlsStream::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            MaybeTlsStream::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(stream) => Pin::new(stream).poll_flush(cx),
            MaybeTlsStream::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            MaybeTlsStream::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

type SharedReadHalf = Arc<Mutex<Option<ReadHalf<MaybeTlsStream>>>>;
type SharedWriteHalf = Arc<Mutex<Option<WriteHalf<MaybeTlsStream>>>>;

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection closed")
}

/// Readable half of an active connection.
///
/// Obtained from [`TcpClient::read_stream`]. Handles stay valid across the
/// life of the connection; once the client disconnects or is disposed,
/// reads fail with a `NotConnected` I/O error instead of hanging. Reads on
/// clones of the same handle are serialized against each other.
pub struct ReadStream {
    half: SharedReadHalf,
}

impl Clone for ReadStream {
    fn clone(&self) -> Self {
        Self {
            half: self.half.clone(),
        }
    }
}

impl std::fmt::Debug for ReadStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadStream")
            .field("open", &self.half.lock().is_some())
            .finish()
    }
}

impl AsyncRead for ReadStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut guard = self.half.lock();
        match guard.as_mut() {
            Some(half) => Pin::new(half).poll_read(cx, buf),
            None => Poll::Ready(Err(closed_error())),
        }
    }
}

/// Writable half of an active connection.
///
/// Obtained from [`TcpClient::write_stream`]. Same lifetime rules as
/// [`ReadStream`].
pub struct WriteStream {
    half: SharedWriteHalf,
}

impl Clone for WriteStream {
    fn clone(&self) -> Self {
        Self {
            half: self.half.clone(),
        }
    }
}

impl std::fmt::Debug for WriteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteStream")
            .field("open", &self.half.lock().is_some())
            .finish()
    }
}

impl AsyncWrite for WriteStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut guard = self.half.lock();
        match guard.as_mut() {
            Some(half) => Pin::new(half).poll_write(cx, buf),
            None => Poll::Ready(Err(closed_error())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut guard = self.half.lock();
        match guard.as_mut() {
            Some(half) => Pin::new(half).poll_flush(cx),
            None => Poll::Ready(Err(closed_error())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut guard = self.half.lock();
        match guard.as_mut() {
            Some(half) => Pin::new(half).poll_shutdown(cx),
            None => Poll::Ready(Err(closed_error())),
        }
    }
}

/// Internal state for the TCP client.
struct ClientInner {
    state: ConnectionState,
    remote: Option<SocketAddr>,
    read: Option<SharedReadHalf>,
    write: Option<SharedWriteHalf>,
}

/// Restores a stable state if a connect attempt fails or its future is
/// dropped at an await point. Never downgrades a `Disposed` state.
struct TransientGuard<'a> {
    inner: &'a Mutex<ClientInner>,
    failure_state: ConnectionState,
    armed: bool,
}

impl<'a> TransientGuard<'a> {
    fn new(inner: &'a Mutex<ClientInner>) -> Self {
        Self {
            inner,
            failure_state: ConnectionState::Unconnected,
            armed: true,
        }
    }

    /// Change the state a failure from this point on lands in.
    fn fail_to(&mut self, state: ConnectionState) {
        self.failure_state = state;
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TransientGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.state != ConnectionState::Disposed {
            inner.state = self.failure_state;
        }
    }
}

/// A managed TCP client with an optional TLS upgrade.
///
/// The client owns one raw socket per connection, obtained from an injected
/// [`SocketConnector`]. A secure connect layers a TLS session on top of the
/// raw socket after it is established; from then on the stream accessors
/// route through the TLS session.
///
/// Lifecycle operations are serialized per instance: a second `connect`
/// while one is in flight fails with
/// [`ConnectError::AlreadyConnecting`], and a client that has disconnected
/// cannot be reconnected. [`dispose`](Self::dispose) releases everything
/// unconditionally from any state and is also run on drop.
///
/// # Example
///
/// ```ignore
/// use hawser::{ClientConfig, TcpClient};
/// use tokio::io::{AsyncReadExt, AsyncWriteExt};
///
/// let client = TcpClient::new(ClientConfig::new().no_delay(true));
/// client.connect("127.0.0.1", 8080).await?;
///
/// let mut writer = client.write_stream()?;
/// writer.write_all(b"Hello, Server!").await?;
///
/// let mut reader = client.read_stream()?;
/// let mut buf = vec![0u8; 1024];
/// let n = reader.read(&mut buf).await?;
///
/// client.disconnect().await?;
/// ```
pub struct TcpClient {
    config: ClientConfig,
    connector: Arc<dyn SocketConnector>,
    observer: Arc<dyn ValidationObserver>,
    inner: Mutex<ClientInner>,
}

impl TcpClient {
    /// Create a new client with the default tokio socket backend.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, Arc::new(TokioConnector))
    }

    /// Create a new client with an injected socket backend.
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn SocketConnector>) -> Self {
        Self {
            config,
            connector,
            observer: Arc::new(TracingObserver),
            inner: Mutex::new(ClientInner {
                state: ConnectionState::Unconnected,
                remote: None,
                read: None,
                write: None,
            }),
        }
    }

    /// Replace the certificate-validation observer.
    pub fn with_observer(mut self, observer: Arc<dyn ValidationObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Check if the client currently holds a usable connection.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Connect to `host:port` over plain TCP.
    ///
    /// On success the client is `Connected` and the stream and endpoint
    /// accessors become valid. On a socket-level failure the client returns
    /// to `Unconnected` and stays usable for a retry.
    pub async fn connect(&self, host: &str, port: u16) -> Result<(), ConnectError> {
        self.connect_inner(host, port, false).await
    }

    /// Connect to `host:port` and upgrade the connection to TLS.
    ///
    /// The TCP connection is established first, then the TLS client
    /// handshake runs against `host` using the configured
    /// [`TlsConfig`](crate::TlsConfig). A handshake failure closes the raw
    /// socket before the error is returned and leaves the client
    /// `Disconnected`.
    pub async fn connect_secure(&self, host: &str, port: u16) -> Result<(), ConnectError> {
        self.connect_inner(host, port, true).await
    }

    async fn connect_inner(&self, host: &str, port: u16, secure: bool) -> Result<(), ConnectError> {
        self.begin_connect()?;
        let mut guard = TransientGuard::new(&self.inner);

        tracing::debug!(target: "hawser::client", "Connecting to {}:{}", host, port);

        let raw = self.open_socket(host, port).await?;

        // A dispose() may have landed while the connect was suspended.
        if self.inner.lock().state == ConnectionState::Disposed {
            guard.disarm();
            return Err(ConnectError::Disposed);
        }

        if let Err(e) = raw.set_nodelay(self.config.no_delay) {
            tracing::debug!(target: "hawser::client", "Failed to set TCP_NODELAY: {}", e);
        }

        // The effective endpoint comes from the negotiated connection, not
        // from the caller-supplied host: DNS may have remapped it.
        let remote = raw.peer_addr().map_err(ConnectError::Unreachable)?;

        let stream = if secure {
            self.inner.lock().state = ConnectionState::SecureHandshaking;
            // From here on, a failure means the connection is gone for good.
            guard.fail_to(ConnectionState::Disconnected);

            let adapter = SecureConnector::new(&self.config.tls, self.observer.clone())
                .map_err(ConnectError::TlsHandshakeFailed)?;
            let tls_stream = adapter
                .handshake(host, raw)
                .await
                .map_err(ConnectError::TlsHandshakeFailed)?;
            MaybeTlsStream::Tls(tls_stream)
        } else {
            MaybeTlsStream::Plain(raw)
        };

        let (read_half, write_half) = tokio::io::split(stream);

        {
            let mut inner = self.inner.lock();
            if inner.state == ConnectionState::Disposed {
                guard.disarm();
                drop(inner);
                // read_half/write_half fall out of scope here, closing the
                // socket that was established during the race.
                return Err(ConnectError::Disposed);
            }
            inner.state = if secure {
                ConnectionState::SecureConnected
            } else {
                ConnectionState::Connected
            };
            inner.remote = Some(remote);
            inner.read = Some(Arc::new(Mutex::new(Some(read_half))));
            inner.write = Some(Arc::new(Mutex::new(Some(write_half))));
        }
        guard.disarm();

        tracing::debug!(target: "hawser::client", "Connected to {} (secure: {})", remote, secure);
        Ok(())
    }

    /// Atomically claim the state machine for a new connection attempt.
    fn begin_connect(&self) -> Result<(), ConnectError> {
        let mut inner = self.inner.lock();
        match inner.state {
            ConnectionState::Unconnected => {
                inner.state = ConnectionState::Connecting;
                Ok(())
            }
            ConnectionState::Connecting
            | ConnectionState::SecureHandshaking
            | ConnectionState::Connected
            | ConnectionState::SecureConnected => Err(ConnectError::AlreadyConnecting),
            ConnectionState::Disconnected => Err(ConnectError::Unusable),
            ConnectionState::Disposed => Err(ConnectError::Disposed),
        }
    }

    async fn open_socket(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Box<dyn SocketStream>, ConnectError> {
        let attempt = self.connector.connect(host, port);
        match self.config.connect_timeout {
            Some(limit) => match timeout(limit, attempt).await {
                Ok(Ok(stream)) => Ok(stream),
                Ok(Err(e)) => Err(map_socket_error(e)),
                Err(_) => Err(ConnectError::Timeout),
            },
            None => attempt.await.map_err(map_socket_error),
        }
    }

    /// Close the active connection.
    ///
    /// Shuts down the write direction first (sending the TLS close-notify
    /// when the connection is secure) and awaits completion before
    /// returning, then releases both halves so reads and writes on
    /// outstanding handles fail instead of hanging. Calling this while not
    /// connected is a no-op returning `Ok`.
    pub async fn disconnect(&self) -> Result<(), DisconnectError> {
        let (read, write) = {
            let mut inner = self.inner.lock();
            if !inner.state.is_connected() {
                return Ok(());
            }
            match (inner.read.take(), inner.write.take()) {
                (Some(read), Some(write)) => (read, write),
                // Another disconnect already claimed the halves.
                _ => {
                    inner.state = ConnectionState::Disconnected;
                    inner.remote = None;
                    return Ok(());
                }
            }
        };

        let write_half = write.lock().take();
        let shutdown_result = match write_half {
            Some(mut half) => half.shutdown().await,
            None => Ok(()),
        };
        read.lock().take();

        {
            let mut inner = self.inner.lock();
            if inner.state != ConnectionState::Disposed {
                inner.state = ConnectionState::Disconnected;
            }
            inner.remote = None;
        }

        tracing::debug!(target: "hawser::client", "Disconnected");
        shutdown_result.map_err(DisconnectError::Shutdown)
    }

    /// Release the connection and all resources unconditionally.
    ///
    /// Safe to call any number of times from any state, including before
    /// any connect. The client transitions to `Disposed`; later connects
    /// fail with [`ConnectError::Disposed`]. No close-notify is sent on a
    /// secure connection: this is the unconditional release path.
    pub fn dispose(&self) {
        let (previous, read, write) = {
            let mut inner = self.inner.lock();
            let previous = inner.state;
            inner.state = ConnectionState::Disposed;
            inner.remote = None;
            (previous, inner.read.take(), inner.write.take())
        };

        if let Some(read) = read {
            read.lock().take();
        }
        if let Some(write) = write {
            write.lock().take();
        }

        if previous != ConnectionState::Disposed {
            tracing::debug!(target: "hawser::client", "Client disposed");
        }
    }

    /// Get a handle to the readable side of the active connection.
    ///
    /// Routes through the TLS session when one is established, and through
    /// the raw socket otherwise.
    pub fn read_stream(&self) -> Result<ReadStream, StreamAccessError> {
        let inner = self.inner.lock();
        if !inner.state.is_connected() {
            return Err(StreamAccessError::NotConnected);
        }
        let half = inner.read.as_ref().ok_or(StreamAccessError::NotConnected)?;
        Ok(ReadStream { half: half.clone() })
    }

    /// Get a handle to the writable side of the active connection.
    pub fn write_stream(&self) -> Result<WriteStream, StreamAccessError> {
        let inner = self.inner.lock();
        if !inner.state.is_connected() {
            return Err(StreamAccessError::NotConnected);
        }
        let half = inner.write.as_ref().ok_or(StreamAccessError::NotConnected)?;
        Ok(WriteStream { half: half.clone() })
    }

    /// The remote address of the active connection.
    pub fn remote_address(&self) -> Result<IpAddr, StreamAccessError> {
        let inner = self.inner.lock();
        if !inner.state.is_connected() {
            return Err(StreamAccessError::NotConnected);
        }
        inner
            .remote
            .map(|addr| addr.ip())
            .ok_or(StreamAccessError::NotConnected)
    }

    /// The remote port of the active connection.
    pub fn remote_port(&self) -> Result<u16, StreamAccessError> {
        let inner = self.inner.lock();
        if !inner.state.is_connected() {
            return Err(StreamAccessError::NotConnected);
        }
        inner
            .remote
            .map(|addr| addr.port())
            .ok_or(StreamAccessError::NotConnected)
    }
}

fn map_socket_error(e: io::Error) -> ConnectError {
    match e.kind() {
        io::ErrorKind::ConnectionRefused => ConnectError::Refused,
        io::ErrorKind::TimedOut => ConnectError::Timeout,
        _ => ConnectError::Unreachable(e),
    }
}

impl Drop for TcpClient {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for TcpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("TcpClient")
            .field("state", &inner.state)
            .field("remote", &inner.remote)
            .finish()
    }
}
