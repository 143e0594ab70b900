//! Raw transport dialing.
//!
//! The session owns at most one transport produced by a [`Dialer`] at any
//! time; a failed attempt leaves nothing open behind it.

use async_trait::async_trait;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::error::{timed_out, Stage};

/// Opens raw transports to single endpoints
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Transport produced by a successful dial
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open a transport to `addr`
    async fn dial(&self, addr: SocketAddr) -> io::Result<Self::Stream>;
}

/// Plain TCP dialer with a connect deadline
#[derive(Debug, Clone)]
pub struct TcpDialer {
    connect_timeout: Duration,
}

impl TcpDialer {
    /// Create a dialer that gives up on an endpoint after `connect_timeout`
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    type Stream = TcpStream;

    async fn dial(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        debug!(component = "connector", "Connecting to {}", addr);

        let stream = connect_within(self.connect_timeout, connect_tcp(addr)).await?;

        if let Err(e) = stream.set_nodelay(true) {
            warn!(component = "connector", "Failed to set TCP_NODELAY on {}: {}", addr, e);
        }
        Ok(stream)
    }
}

/// Bound a connect attempt by `timeout`; expiry surfaces as `TimedOut`
async fn connect_within<F, T>(timeout: Duration, connect: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    tokio::time::timeout(timeout, connect)
        .await
        .map_err(|_| timed_out(Stage::Connect, timeout))?
}

/// Connect to a TCP address
pub async fn connect_tcp(addr: SocketAddr) -> io::Result<TcpStream> {
    TcpStream::connect(addr).await
}
