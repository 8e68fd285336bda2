//! Transport abstraction: connect, listen, accept.
//!
//! The protocol layer only needs a bidirectional byte stream and a way to
//! accept or dial one. This trait pair captures exactly that surface; the
//! hub consumes [`NetworkProvider::bind`] and [`TcpListenerTrait::accept`],
//! while client-side code uses [`NetworkProvider::connect`]. Dropping a
//! stream closes the transport.

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};

/// Provider of network connections and listeners.
///
/// No `Send` bounds: the crate runs single-threaded. `Clone` lets one
/// provider be shared across the hub and every messenger it creates.
#[async_trait(?Send)]
pub trait NetworkProvider: Clone {
    /// The byte-stream type produced by this provider.
    type TcpStream: AsyncRead + AsyncWrite + Unpin + 'static;
    /// The listener type produced by [`bind`](Self::bind).
    type TcpListener: TcpListenerTrait<TcpStream = Self::TcpStream> + 'static;

    /// Bind a listener on the given address (`host:port`).
    async fn bind(&self, addr: &str) -> io::Result<Self::TcpListener>;

    /// Dial a remote address and return the established stream.
    async fn connect(&self, addr: &str) -> io::Result<Self::TcpStream>;
}

/// A bound listener that accepts incoming streams.
#[async_trait(?Send)]
pub trait TcpListenerTrait {
    /// The byte-stream type this listener produces.
    type TcpStream: AsyncRead + AsyncWrite + Unpin + 'static;

    /// Wait for one incoming connection; returns the stream and the remote
    /// address in `host:port` form.
    async fn accept(&self) -> io::Result<(Self::TcpStream, String)>;

    /// The local address this listener is bound to. With port 0 in `bind`,
    /// this reveals the port the OS picked.
    fn local_addr(&self) -> io::Result<String>;
}

/// Production networking over `tokio::net`.
#[derive(Debug, Clone, Default)]
pub struct TokioNetworkProvider;

impl TokioNetworkProvider {
    /// Create a Tokio-backed network provider.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait(?Send)]
impl NetworkProvider for TokioNetworkProvider {
    type TcpStream = tokio::net::TcpStream;
    type TcpListener = TokioTcpListener;

    async fn bind(&self, addr: &str) -> io::Result<Self::TcpListener> {
        let inner = tokio::net::TcpListener::bind(addr).await?;
        Ok(TokioTcpListener { inner })
    }

    async fn connect(&self, addr: &str) -> io::Result<Self::TcpStream> {
        tokio::net::TcpStream::connect(addr).await
    }
}

/// Listener wrapper adapting `tokio::net::TcpListener` to the trait.
#[derive(Debug)]
pub struct TokioTcpListener {
    inner: tokio::net::TcpListener,
}

#[async_trait(?Send)]
impl TcpListenerTrait for TokioTcpListener {
    type TcpStream = tokio::net::TcpStream;

    async fn accept(&self) -> io::Result<(Self::TcpStream, String)> {
        let (stream, addr) = self.inner.accept().await?;
        Ok((stream, addr.to_string()))
    }

    fn local_addr(&self) -> io::Result<String> {
        Ok(self.inner.local_addr()?.to_string())
    }
}
