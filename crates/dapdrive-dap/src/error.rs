//! DAP error types.

use thiserror::Error;

use crate::session::SessionState;

/// Errors from DAP driver operations.
#[derive(Debug, Error)]
pub enum DapError {
    /// Connecting to the debug adapter failed.
    #[error("failed to connect to debug adapter: {0}")]
    Connect(#[from] std::io::Error),

    /// An outgoing document could not be serialized.
    #[error("failed to encode message: {0}")]
    Encoding(String),

    /// The adapter sent a malformed frame header or body.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The connection is gone, either closed by the peer or locally.
    #[error("connection closed")]
    ConnectionClosed,

    /// A local wait exceeded its deadline.
    #[error("timed out waiting for {waiting_for}")]
    Timeout {
        /// What the wait was for, e.g. `response to seq 3`.
        waiting_for: String,
    },

    /// The adapter answered a request with `success: false`.
    #[error("{command} request failed: {message}")]
    RequestFailed {
        /// The command that failed.
        command: String,
        /// The adapter's error message, if any.
        message: String,
    },

    /// A waiter is already registered for the same response or event.
    #[error("already waiting for {0}")]
    DuplicateWait(String),

    /// The session cannot move between these two states.
    #[error("invalid session transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// The current state.
        from: SessionState,
        /// The requested state.
        to: SessionState,
    },

    /// A successful response carried a body of the wrong shape.
    #[error("adapter sent invalid response: {0}")]
    InvalidResponse(String),
}

impl DapError {
    /// Whether the session can carry on after this error.
    ///
    /// Timeouts and failed requests are step-level failures. Everything
    /// else either tears the connection down or indicates a usage bug.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DapError::Timeout { .. } | DapError::RequestFailed { .. } | DapError::InvalidResponse(_)
        )
    }

    /// Whether this error means the connection can no longer be used.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DapError::ConnectionClosed | DapError::Protocol(_) | DapError::Connect(_)
        )
    }
}
