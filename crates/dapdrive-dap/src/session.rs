//! DAP session state machine.

use crate::capabilities::DapCapabilities;
use crate::error::DapError;
use crate::protocol::Capabilities;

/// The current state of a debug session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection. Both the initial and the terminal state.
    Disconnected,
    /// The byte stream is being established.
    Connecting,
    /// Connected; the `initialize` handshake is in progress.
    Initializing,
    /// `launch`/`attach` sent; breakpoints and other configuration go here.
    Configuring,
    /// The debuggee is executing.
    Running,
    /// The debuggee is suspended (e.g. at a breakpoint).
    Stopped,
    /// `disconnect` has been sent; the stream is about to close.
    Disconnecting,
}

impl SessionState {
    /// Whether moving from `self` to `next` is a legal edge.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Initializing)
                | (Initializing, Configuring)
                | (Configuring, Running)
                | (Running, Stopped)
                | (Stopped, Running)
                | (Initializing | Configuring | Running | Stopped, Disconnecting)
                | (_, Disconnected)
        )
    }

    /// Whether requests other than `disconnect` may be sent.
    pub fn accepts_requests(self) -> bool {
        matches!(
            self,
            SessionState::Initializing
                | SessionState::Configuring
                | SessionState::Running
                | SessionState::Stopped
        )
    }
}

/// Tracks the lifecycle state and adapter capabilities of one session.
#[derive(Debug)]
pub struct DapSession {
    state: SessionState,
    capabilities: DapCapabilities,
}

impl DapSession {
    /// Create a new session in the [`Disconnected`](SessionState::Disconnected) state.
    pub fn new() -> Self {
        Self {
            state: SessionState::Disconnected,
            capabilities: DapCapabilities::default(),
        }
    }

    /// Return the current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Return the resolved adapter capabilities.
    pub fn capabilities(&self) -> &DapCapabilities {
        &self.capabilities
    }

    /// Record the capabilities from a successful `initialize` response.
    pub fn set_capabilities(&mut self, caps: &Capabilities) {
        self.capabilities = DapCapabilities::from_initialize_response(caps);
    }

    /// Move to `next`, rejecting edges the state machine does not have.
    pub fn transition(&mut self, next: SessionState) -> Result<(), DapError> {
        if !self.state.can_transition_to(next) {
            return Err(DapError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(from = ?self.state, to = ?next, "session state change");
        self.state = next;
        Ok(())
    }

    /// Transition: Stopped → Running, or stay Running.
    ///
    /// The first `continue` after `configurationDone` is sent while the
    /// debuggee is already running.
    pub fn resume(&mut self) -> Result<(), DapError> {
        match self.state {
            SessionState::Running => Ok(()),
            _ => self.transition(SessionState::Running),
        }
    }

    /// Transition: Running → Stopped (when a stopped event is received).
    pub fn handle_stopped(&mut self) -> Result<(), DapError> {
        match self.state {
            SessionState::Stopped => Ok(()),
            _ => self.transition(SessionState::Stopped),
        }
    }

    /// Transition: any open state → Disconnecting. Repeated calls are no-ops.
    pub fn begin_disconnect(&mut self) -> Result<(), DapError> {
        match self.state {
            SessionState::Disconnecting => Ok(()),
            _ => self.transition(SessionState::Disconnecting),
        }
    }

    /// Transition: any → Disconnected.
    pub fn closed(&mut self) {
        if self.state != SessionState::Disconnected {
            tracing::debug!(from = ?self.state, "session closed");
        }
        self.state = SessionState::Disconnected;
    }
}

impl Default for DapSession {
    fn default() -> Self {
        Self::new()
    }
}
