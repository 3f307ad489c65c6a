//! Socket primitive seam: the raw TCP transport behind the managed client.
//!
//! The client never touches a concrete socket type directly. It connects
//! through a [`SocketConnector`], which yields a boxed [`SocketStream`] —
//! whatever platform backend the connector wraps. The default backend is
//! [`TokioConnector`]; tests and alternative platforms supply their own
//! connector at client construction time.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// A connected raw byte stream.
///
/// Extends the tokio I/O traits with the two pieces of socket state the
/// client needs: the negotiated remote endpoint and the no-delay option.
pub trait SocketStream: AsyncRead + AsyncWrite + Send + Unpin {
    /// The remote endpoint this stream is connected to.
    ///
    /// This is the address the connection was actually established against,
    /// which may differ from the host passed to the connector when DNS
    /// resolution is involved.
    fn peer_addr(&self) -> io::Result<SocketAddr>;

    /// Set TCP_NODELAY on the underlying socket.
    fn set_nodelay(&self, nodelay: bool) -> io::Result<()>;
}

impl SocketStream for TcpStream {
    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }

    fn set_nodelay(&self, nodelay: bool) -> io::Result<()> {
        TcpStream::set_nodelay(self, nodelay)
    }
}

/// Trait for establishing raw socket connections.
///
/// Implementations own the platform-specific connect path. The managed
/// client calls `connect` once per connection attempt and takes exclusive
/// ownership of the returned stream.
#[async_trait]
pub trait SocketConnector: Send + Sync {
    /// Connect to `host:port`, suspending until the connection is
    /// established or fails.
    async fn connect(&self, host: &str, port: u16) -> io::Result<Box<dyn SocketStream>>;
}

/// The default socket backend, connecting via [`tokio::net::TcpStream`].
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioConnector;

#[async_trait]
impl SocketConnector for TokioConnector {
    async fn connect(&self, host: &str, port: u16) -> io::Result<Box<dyn SocketStream>> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(Box::new(stream))
    }
}
