//! Exchange state machine.
//!
//! ```text
//! Idle -> Connecting(1) -> Connecting(2) ... -> Handshaking -> Secured
//!      -> Writing -> Reading -> Done
//! ```
//!
//! Every stage may instead move to `Failed`. Only a connect failure with
//! endpoints left re-enters `Connecting`; all other failures are terminal.
//! [`State::step`] has no side effects: it returns the next state plus the
//! [`Action`] the driver must perform to produce the following event.

use std::io;

use crate::error::{SessionError, Stage};

/// Where the exchange currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Nothing started yet
    Idle,
    /// Dialing the `attempt`-th endpoint (1-based)
    Connecting {
        /// Attempt number
        attempt: usize,
    },
    /// Raw transport open, TLS handshake in progress
    Handshaking,
    /// Handshake complete, waiting for the request line
    Secured,
    /// Writing a request of `len` bytes
    Writing {
        /// Request length
        len: usize,
    },
    /// Reading exactly `expected` reply bytes
    Reading {
        /// Reply length, equal to the bytes written
        expected: usize,
    },
    /// Reply of `len` bytes received
    Done {
        /// Reply length
        len: usize,
    },
    /// Terminated by a failure in `Stage`
    Failed(Stage),
}

impl State {
    /// Short name for logs and transition errors
    pub fn name(&self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::Connecting { .. } => "connecting",
            State::Handshaking => "handshaking",
            State::Secured => "secured",
            State::Writing { .. } => "writing",
            State::Reading { .. } => "reading",
            State::Done { .. } => "done",
            State::Failed(_) => "failed",
        }
    }

    /// Whether no further event is accepted
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Done { .. } | State::Failed(_))
    }

    /// Apply `event` and return the next state and the action to run
    pub fn step(self, event: Event) -> Result<(State, Action), SessionError> {
        let transition = match (self, event) {
            (State::Idle, Event::Start) => {
                (State::Connecting { attempt: 1 }, Action::Dial { attempt: 1 })
            }

            (State::Connecting { .. }, Event::Connected) => (State::Handshaking, Action::Handshake),
            (State::Connecting { attempt }, Event::ConnectFailed { remaining: true, .. }) => {
                let attempt = attempt + 1;
                (State::Connecting { attempt }, Action::Dial { attempt })
            }
            (State::Connecting { attempt }, Event::ConnectFailed { source, remaining: false }) => (
                State::Failed(Stage::Connect),
                Action::Abort(SessionError::Connect {
                    attempts: attempt,
                    source,
                }),
            ),

            (State::Handshaking, Event::HandshakeDone) => (State::Secured, Action::ReadRequest),
            (State::Handshaking, Event::HandshakeFailed(source)) => (
                State::Failed(Stage::Handshake),
                Action::Abort(SessionError::Handshake(source)),
            ),

            (State::Secured, Event::RequestReady { len }) => {
                (State::Writing { len }, Action::Write { len })
            }
            (State::Secured, Event::InputFailed(source)) => (
                State::Failed(Stage::Input),
                Action::Abort(SessionError::Input(source)),
            ),

            (State::Writing { .. }, Event::Written { bytes }) => (
                State::Reading { expected: bytes },
                Action::Read { len: bytes },
            ),
            (State::Writing { .. }, Event::WriteFailed(source)) => (
                State::Failed(Stage::Write),
                Action::Abort(SessionError::Write(source)),
            ),

            (State::Reading { expected }, Event::ReplyRead { bytes }) if bytes == expected => {
                (State::Done { len: bytes }, Action::Emit { len: bytes })
            }
            (State::Reading { expected }, Event::ReplyRead { bytes }) => (
                State::Failed(Stage::Read),
                Action::Abort(SessionError::Read(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("expected {} reply bytes, got {}", expected, bytes),
                ))),
            ),
            (State::Reading { .. }, Event::ReadFailed(source)) => (
                State::Failed(Stage::Read),
                Action::Abort(SessionError::Read(source)),
            ),

            (state, event) => {
                return Err(SessionError::InvalidTransition {
                    state: state.name(),
                    event: event.name(),
                })
            }
        };
        Ok(transition)
    }
}

/// Completion of the previous action
#[derive(Debug)]
pub enum Event {
    /// Begin the exchange
    Start,
    /// The current endpoint accepted the connection
    Connected,
    /// The current endpoint could not be reached
    ConnectFailed {
        /// Dial error
        source: io::Error,
        /// Whether untried endpoints remain
        remaining: bool,
    },
    /// TLS handshake succeeded
    HandshakeDone,
    /// TLS handshake failed
    HandshakeFailed(io::Error),
    /// Request line read, `len` bytes
    RequestReady {
        /// Request length
        len: usize,
    },
    /// Request line could not be read
    InputFailed(io::Error),
    /// Request written, `bytes` bytes
    Written {
        /// Bytes written
        bytes: usize,
    },
    /// Request write failed
    WriteFailed(io::Error),
    /// Reply read, `bytes` bytes
    ReplyRead {
        /// Bytes read
        bytes: usize,
    },
    /// Reply read failed
    ReadFailed(io::Error),
}

impl Event {
    /// Short name for logs and transition errors
    pub fn name(&self) -> &'static str {
        match self {
            Event::Start => "start",
            Event::Connected => "connected",
            Event::ConnectFailed { .. } => "connect-failed",
            Event::HandshakeDone => "handshake-done",
            Event::HandshakeFailed(_) => "handshake-failed",
            Event::RequestReady { .. } => "request-ready",
            Event::InputFailed(_) => "input-failed",
            Event::Written { .. } => "written",
            Event::WriteFailed(_) => "write-failed",
            Event::ReplyRead { .. } => "reply-read",
            Event::ReadFailed(_) => "read-failed",
        }
    }
}

/// Work the driver performs after a transition
#[derive(Debug)]
pub enum Action {
    /// Release any open transport and dial the next endpoint
    Dial {
        /// Attempt number
        attempt: usize,
    },
    /// Start the TLS handshake on the open transport
    Handshake,
    /// Prompt for and read the request line
    ReadRequest,
    /// Write the `len`-byte request
    Write {
        /// Request length
        len: usize,
    },
    /// Read a `len`-byte reply
    Read {
        /// Reply length
        len: usize,
    },
    /// Hand the `len`-byte reply to the caller
    Emit {
        /// Reply length
        len: usize,
    },
    /// Stop with this error
    Abort(SessionError),
}
