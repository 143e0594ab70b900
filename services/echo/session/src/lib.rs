//! Endpoint fallback, mutual-TLS handshake and a one-line request/reply
//! exchange.
//!
//! This crate holds the client core: it dials resolved endpoints in order
//! until one accepts, secures the transport with a client-authenticated TLS
//! handshake, writes a single line and reads back a reply of the same length.
//!
//! ## Features
//!
//! - **Endpoint Fallback**: try each resolved endpoint once, in order
//! - **Mutual TLS**: rustls client with a pinned CA and client certificate
//! - **Explicit State Machine**: pure transitions, one outstanding operation
//! - **Stage Timeouts**: connect, handshake, write and read are each bounded
//!
//! ## Example
//!
//! ```rust,no_run
//! use echo_session::{
//!     make_client_config, resolve, server_name, CertificateConfig, Credentials, Session,
//!     SessionConfig, TcpDialer,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio::io::BufReader;
//!
//! # async fn example() -> Result<(), echo_session::SessionError> {
//! let certs = CertificateConfig::from_folder("certs/client", "certs/server.crt");
//! let client_config = make_client_config(Credentials::load(&certs)?)?;
//!
//! let session = Session::new(
//!     SessionConfig::default(),
//!     Arc::new(client_config),
//!     TcpDialer::new(Duration::from_secs(10)),
//! );
//!
//! let endpoints = resolve("localhost", 443).await?;
//! let mut input = BufReader::new(&b"hello\n"[..]);
//! let mut output = Vec::new();
//! let reply = session
//!     .run(endpoints, server_name("localhost", None)?, &mut input, &mut output)
//!     .await?;
//! println!("Reply: {}", String::from_utf8_lossy(&reply.bytes));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod connector;
pub mod endpoint;
pub mod error;
pub mod exchange;
pub mod session;
pub mod state;
pub mod tls;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types
pub use buffer::{MessageBuffer, MAX_LENGTH};
pub use connector::{connect_tcp, Dialer, TcpDialer};
pub use endpoint::{resolve, EndpointList};
pub use error::{SessionError, Stage};
pub use session::{Reply, Session, SessionConfig, PROMPT};
pub use state::{Action, Event, State};
pub use tls::{
    handshake, make_client_config, peer_subject, server_name, CertificateConfig, Credentials,
    DEFAULT_CA_FILE, DEFAULT_CERT_FILE, DEFAULT_DH_FILE, DEFAULT_KEY_FILE,
};
