//! Session management core module.
//!
//! A session is one start-to-stop lifetime of the receive loop together with its socket and
//! output file. [`receiver::Receiver`] owns the lifecycle; the submodules hold the state shared
//! with the worker and the values reported back to callers.

use std::fmt;

/// Submodule for the state shared between the receiver and its worker.
pub mod active_session;
/// Submodule for the receiver lifecycle (configure, start, stop, status).
pub mod receiver;
/// Submodule for session data structures and lifecycle outcomes.
pub mod session;

/// Represents the current status of a session.
///
/// Variants:
/// - `Idle`: no session was started yet.
/// - `Running`: the worker is consuming the socket.
/// - `StopRequested`: `stop` raised the cancellation flag and waits for the worker.
/// - `Stopped`: the worker is gone and the socket closed; a new session may start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionStatus {
    #[default]
    Idle,
    Running,
    StopRequested,
    Stopped,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Running => "running",
            SessionStatus::StopRequested => "stop requested",
            SessionStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}
