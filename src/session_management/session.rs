use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use uuid::Uuid;

use crate::error_handling::types::NetworkError;
use crate::SessionStatus;

/// Metadata of one capture session.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: Uuid,
    pub output_path: PathBuf,
    /// Address the socket is bound to
    pub local_addr: SocketAddr,
    pub started_at: DateTime<Local>,
    pub stopped_at: Option<DateTime<Local>>,
}

/// Snapshot returned by [`Receiver::status`](super::receiver::Receiver::status).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceiverStatus {
    pub status: SessionStatus,
    /// Current session, or the last one once stopped
    pub session: Option<Session>,
    pub records_written: u64,
    /// Datagrams that could not be decoded or appended
    pub datagrams_dropped: u64,
    pub observer_failures: u64,
}

impl ReceiverStatus {
    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }

    /// Output file of the running session, `None` when nothing is running.
    pub fn active_output(&self) -> Option<&Path> {
        if self.is_running() {
            self.session.as_ref().map(|s| s.output_path.as_path())
        } else {
            None
        }
    }
}

/// What `start` did.
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Started {
        session_id: Uuid,
        output_path: PathBuf,
        local_addr: SocketAddr,
    },
    /// A session was already running; nothing changed.
    AlreadyActive { output_path: PathBuf },
}

/// What `stop` did.
#[derive(Debug)]
pub enum StopOutcome {
    Stopped(StopReport),
    /// No session was running; nothing changed.
    NothingToStop,
}

#[derive(Debug)]
pub struct StopReport {
    pub session_id: Uuid,
    pub output_path: PathBuf,
    pub stopped_at: DateTime<Local>,
    pub records_written: u64,
    /// Set when the worker could not be shut down cleanly; the session is stopped anyway.
    pub teardown_error: Option<NetworkError>,
}
