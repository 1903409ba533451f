//! Async Debug Adapter Protocol client driver.
//!
//! This crate frames and routes DAP traffic over any async byte stream,
//! tracks the session lifecycle, and runs a scripted debugging session
//! against an adapter. One background task reads the stream; callers
//! block only in explicit waits with deadlines.

pub mod breakpoint;
pub mod capabilities;
pub mod codec;
pub mod driver;
pub mod error;
pub mod protocol;
pub mod receiver;
pub mod router;
pub mod script;
pub mod seq;
pub mod session;
pub mod variables;

#[cfg(test)]
mod testing;

// Re-export key types for convenience.
pub use breakpoint::{Breakpoint, BreakpointManager};
pub use capabilities::{DapCapabilities, Feature};
pub use codec::{encode_message, FrameReader};
pub use driver::{RunOutcome, SessionDriver, Timeouts};
pub use error::DapError;
pub use protocol::*;
pub use router::{Incoming, MessageRouter};
pub use script::{
    Inspection, ScopeVariables, ScriptOptions, SessionReport, SessionScript, StepOutcome,
    StepReport, Target, WatchValue,
};
pub use seq::SequenceAllocator;
pub use session::{DapSession, SessionState};
pub use variables::{Expansion, VariableNode};
