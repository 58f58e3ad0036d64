use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{debug, warn};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::data_capture::stream_recorder::LoopExit;
use crate::session_management::session::{ReceiverStatus, Session};
use crate::SessionStatus;

/// Status and counters written by the worker and read by `Receiver::status`.
#[derive(Debug, Default)]
pub struct SharedState {
    inner: RwLock<ReceiverStatus>,
}

impl SharedState {
    fn read(&self) -> RwLockReadGuard<'_, ReceiverStatus> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ReceiverStatus> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> ReceiverStatus {
        self.read().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.read().status
    }

    /// Resets the counters and marks `session` as running.
    pub fn begin(&self, session: Session) {
        *self.write() = ReceiverStatus {
            status: SessionStatus::Running,
            session: Some(session),
            ..Default::default()
        };
    }

    /// Moves `Running` to `StopRequested`; returns whether a session was running.
    pub fn request_stop(&self) -> bool {
        let mut state = self.write();
        if state.status == SessionStatus::Running {
            state.status = SessionStatus::StopRequested;
            true
        } else {
            false
        }
    }

    /// Marks the session stopped. Calling it again keeps the first stop time.
    pub fn finish(&self, stopped_at: DateTime<Local>) -> ReceiverStatus {
        let mut state = self.write();
        if matches!(state.status, SessionStatus::Running | SessionStatus::StopRequested) {
            state.status = SessionStatus::Stopped;
            if let Some(session) = state.session.as_mut() {
                session.stopped_at = Some(stopped_at);
            }
        }
        state.clone()
    }

    pub fn record_written(&self) {
        self.write().records_written += 1;
    }

    pub fn datagram_dropped(&self) {
        self.write().datagrams_dropped += 1;
    }

    pub fn observer_failed(&self) {
        self.write().observer_failures += 1;
    }
}

/// Handles to the worker of the current session, held by the receiver.
pub struct ActiveSession {
    pub session_id: Uuid,
    pub output_path: PathBuf,
    pub stop_flag: Arc<AtomicBool>,
    pub stop_timeout: Duration,
    worker: Option<JoinHandle<LoopExit>>,
}

impl ActiveSession {
    pub fn new(
        session_id: Uuid,
        output_path: PathBuf,
        stop_flag: Arc<AtomicBool>,
        stop_timeout: Duration,
        worker: JoinHandle<LoopExit>,
    ) -> Self {
        Self {
            session_id,
            output_path,
            stop_flag,
            stop_timeout,
            worker: Some(worker),
        }
    }

    pub fn take_worker(&mut self) -> Option<JoinHandle<LoopExit>> {
        self.worker.take()
    }

    /// Collects a worker that ended on its own (socket failure).
    pub async fn reap(mut self) {
        if let Some(worker) = self.worker.take() {
            if !worker.is_finished() {
                warn!("[{}] Reaping a worker that is still running", self.session_id);
                self.stop_flag.store(true, Ordering::Release);
                worker.abort();
            }
            match worker.await {
                Ok(LoopExit::Cancelled(source)) => source.release(),
                Ok(LoopExit::Failed(e)) => debug!("[{}] Worker had ended with: {}", self.session_id, e),
                Err(e) => debug!("[{}] Worker join error: {}", self.session_id, e),
            }
        }
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            if !worker.is_finished() {
                debug!("[{}] Aborting receive worker on drop", self.session_id);
                self.stop_flag.store(true, Ordering::Release);
                worker.abort();
            }
        }
    }
}
