//! One connect/handshake/write/read exchange.
//!
//! [`Session::run`] feeds the [`State`] machine one completion at a time on
//! the calling task. Only one operation is ever outstanding, and the
//! transport is owned by the loop alone.

use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

use crate::buffer::{MessageBuffer, MAX_LENGTH};
use crate::connector::Dialer;
use crate::endpoint::EndpointList;
use crate::error::SessionError;
use crate::exchange::{read_reply, read_request, write_request};
use crate::state::{Action, Event, State};
use crate::tls;

/// Prompt written to the output before the request line is read
pub const PROMPT: &[u8] = b"Enter message: ";

/// Timeouts and limits for a session
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Deadline for the TLS handshake
    pub handshake_timeout: Duration,
    /// Deadline for each of the write and the read
    pub io_timeout: Duration,
    /// Request/reply buffer capacity
    pub max_length: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(10),
            max_length: MAX_LENGTH,
        }
    }
}

/// Reply received from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Endpoint the exchange ran against
    pub endpoint: SocketAddr,
    /// Reply payload
    pub bytes: Vec<u8>,
}

/// Client side of a single mutual-TLS exchange
pub struct Session<D: Dialer> {
    config: SessionConfig,
    connector: TlsConnector,
    dialer: D,
}

impl<D: Dialer> Session<D> {
    /// Create a session using `client_config` for the handshake
    pub fn new(config: SessionConfig, client_config: Arc<ClientConfig>, dialer: D) -> Self {
        Self {
            config,
            connector: TlsConnector::from(client_config),
            dialer,
        }
    }

    /// Connect to the first reachable endpoint, secure the channel, send one
    /// line read from `input` and return the equally long reply
    pub async fn run<I, O>(
        &self,
        mut endpoints: EndpointList,
        server_name: ServerName<'static>,
        input: &mut I,
        output: &mut O,
    ) -> Result<Reply, SessionError>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let mut buffer = MessageBuffer::new(self.config.max_length);
        let mut transport: Option<D::Stream> = None;
        let mut channel: Option<TlsStream<D::Stream>> = None;
        let mut endpoint: Option<SocketAddr> = None;

        let (mut state, mut action) = State::Idle.step(Event::Start)?;

        loop {
            debug!(component = "session", "state={} action={:?}", state.name(), action);

            let event = match action {
                Action::Dial { attempt } => {
                    // At most one transport is held; release it before dialing again
                    drop(transport.take());

                    match endpoints.advance() {
                        Some(addr) => {
                            endpoint = Some(addr);
                            match self.dialer.dial(addr).await {
                                Ok(stream) => {
                                    info!(
                                        component = "session",
                                        "Connected to {} (attempt {}/{})",
                                        addr,
                                        attempt,
                                        endpoints.len()
                                    );
                                    transport = Some(stream);
                                    Event::Connected
                                }
                                Err(e) => {
                                    warn!(
                                        component = "session",
                                        "Failed to connect to {} (attempt {}/{}): {}",
                                        addr,
                                        attempt,
                                        endpoints.len(),
                                        e
                                    );
                                    Event::ConnectFailed {
                                        source: e,
                                        remaining: endpoints.has_remaining(),
                                    }
                                }
                            }
                        }
                        None => Event::ConnectFailed {
                            source: io::Error::new(
                                io::ErrorKind::NotFound,
                                "endpoint list exhausted",
                            ),
                            remaining: false,
                        },
                    }
                }

                Action::Handshake => {
                    let stream = transport.take().ok_or_else(|| missing(state, "handshake"))?;
                    match tls::handshake(
                        &self.connector,
                        server_name.clone(),
                        stream,
                        self.config.handshake_timeout,
                    )
                    .await
                    {
                        Ok(stream) => {
                            channel = Some(stream);
                            Event::HandshakeDone
                        }
                        Err(e) => Event::HandshakeFailed(e),
                    }
                }

                Action::ReadRequest => {
                    output.write_all(PROMPT).await.map_err(SessionError::Output)?;
                    output.flush().await.map_err(SessionError::Output)?;

                    match read_request(input, &mut buffer).await {
                        Ok(len) => Event::RequestReady { len },
                        Err(e) => Event::InputFailed(e),
                    }
                }

                Action::Write { .. } => {
                    let stream = channel.as_mut().ok_or_else(|| missing(state, "write"))?;
                    match write_request(stream, buffer.request(), self.config.io_timeout).await {
                        Ok(bytes) => Event::Written { bytes },
                        Err(e) => Event::WriteFailed(e),
                    }
                }

                Action::Read { len } => {
                    let stream = channel.as_mut().ok_or_else(|| missing(state, "read"))?;
                    let slot = buffer.reply_slot(len);
                    match read_reply(stream, slot, self.config.io_timeout).await {
                        Ok(bytes) => Event::ReplyRead { bytes },
                        Err(e) => Event::ReadFailed(e),
                    }
                }

                Action::Emit { len } => {
                    let endpoint = endpoint.ok_or_else(|| missing(state, "emit"))?;
                    if let Some(mut stream) = channel.take() {
                        let shutdown = stream.shutdown();
                        match tokio::time::timeout(self.config.io_timeout, shutdown).await {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => {
                                debug!(component = "session", "TLS shutdown to {} failed: {}", endpoint, e);
                            }
                            Err(_) => {
                                debug!(
                                    component = "session",
                                    "TLS shutdown to {} timed out after {:?}",
                                    endpoint,
                                    self.config.io_timeout
                                );
                            }
                        }
                    }
                    info!(component = "session", "Received {} byte reply from {}", len, endpoint);
                    return Ok(Reply {
                        endpoint,
                        bytes: buffer.take_reply(),
                    });
                }

                Action::Abort(err) => {
                    warn!(component = "session", "Exchange aborted: {}", err);
                    return Err(err);
                }
            };

            (state, action) = state.step(event)?;
        }
    }
}

fn missing(state: State, action: &'static str) -> SessionError {
    SessionError::InvalidTransition {
        state: state.name(),
        event: action,
    }
}
