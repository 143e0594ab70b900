//! Session error types.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Stage of the exchange a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Startup credential loading
    Config,
    /// Host/port resolution
    Resolve,
    /// Raw transport connection
    Connect,
    /// TLS handshake
    Handshake,
    /// Reading the request line from the input
    Input,
    /// Writing the request to the channel
    Write,
    /// Reading the reply from the channel
    Read,
    /// Writing the reply to the output sink
    Output,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Config => "config",
            Stage::Resolve => "resolve",
            Stage::Connect => "connect",
            Stage::Handshake => "handshake",
            Stage::Input => "input",
            Stage::Write => "write",
            Stage::Read => "read",
            Stage::Output => "output",
        };
        f.write_str(name)
    }
}

/// Errors raised while establishing the channel or running the exchange
#[derive(Error, Debug)]
pub enum SessionError {
    /// A credential file could not be read
    #[error("configuration error: failed to read {kind} file {path:?}")]
    ConfigRead {
        /// Which credential the file holds
        kind: &'static str,
        /// Offending path
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },

    /// A credential file was read but its contents are unusable
    #[error("configuration error: invalid {kind} file {path:?}: {reason}")]
    ConfigInvalid {
        /// Which credential the file holds
        kind: &'static str,
        /// Offending path
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// rustls refused the assembled client configuration
    #[error("configuration error: TLS client configuration rejected")]
    Tls(#[from] rustls::Error),

    /// The configured server name is not a valid DNS name or IP address
    #[error("configuration error: invalid server name {0:?}")]
    ServerName(String),

    /// Host/port lookup failed
    #[error("resolve failed for {host}:{port}")]
    Resolve {
        /// Host that was looked up
        host: String,
        /// Port that was looked up
        port: u16,
        /// Underlying I/O error
        source: io::Error,
    },

    /// Lookup succeeded but produced no endpoint
    #[error("resolve failed for {0}: no endpoints")]
    NoEndpoints(String),

    /// Every endpoint was tried and none accepted the connection
    #[error("connect failed after {attempts} attempt(s)")]
    Connect {
        /// Number of endpoints tried
        attempts: usize,
        /// Error from the last attempt
        source: io::Error,
    },

    /// The TLS handshake failed, including peer verification failures
    #[error("handshake failed")]
    Handshake(#[source] io::Error),

    /// The request line could not be read from the input
    #[error("input failed")]
    Input(#[source] io::Error),

    /// The request could not be written to the channel
    #[error("write failed")]
    Write(#[source] io::Error),

    /// The reply could not be read from the channel
    #[error("read failed")]
    Read(#[source] io::Error),

    /// The prompt could not be written to the output sink
    #[error("output failed")]
    Output(#[source] io::Error),

    /// The state machine received an event it has no transition for
    #[error("invalid transition: {event} while {state}")]
    InvalidTransition {
        /// State name at the time of the event
        state: &'static str,
        /// Event name
        event: &'static str,
    },
}

impl SessionError {
    /// Stage this error terminated, if it belongs to one
    pub fn stage(&self) -> Option<Stage> {
        match self {
            SessionError::ConfigRead { .. }
            | SessionError::ConfigInvalid { .. }
            | SessionError::Tls(_)
            | SessionError::ServerName(_) => Some(Stage::Config),
            SessionError::Resolve { .. } | SessionError::NoEndpoints(_) => Some(Stage::Resolve),
            SessionError::Connect { .. } => Some(Stage::Connect),
            SessionError::Handshake(_) => Some(Stage::Handshake),
            SessionError::Input(_) => Some(Stage::Input),
            SessionError::Write(_) => Some(Stage::Write),
            SessionError::Read(_) => Some(Stage::Read),
            SessionError::Output(_) => Some(Stage::Output),
            SessionError::InvalidTransition { .. } => None,
        }
    }

    /// Whether the failure happened after resolution, on the network path
    pub fn is_exchange_failure(&self) -> bool {
        matches!(
            self.stage(),
            Some(Stage::Connect | Stage::Handshake | Stage::Input | Stage::Write | Stage::Read)
        )
    }
}

/// Build a `TimedOut` I/O error for a stage that exceeded its deadline
pub(crate) fn timed_out(stage: Stage, after: std::time::Duration) -> io::Error {
    io::Error::new(
        io::ErrorKind::TimedOut,
        format!("{} timed out after {:?}", stage, after),
    )
}
