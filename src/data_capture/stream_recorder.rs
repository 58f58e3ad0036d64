//! Receive loop of one session.
//!
//! The worker drains the session socket until its cancellation flag is raised, turning each
//! datagram into a row: decode → stamp → append → observers. Per-record problems are logged
//! and counted; only a failing socket ends the loop early, in which case the worker tears
//! the session down itself.
//!
//! The append and the observers are blocking code and may be slow or stuck, so they run on
//! tokio's blocking pool. The loop awaits each delivery before reading the next datagram,
//! which keeps rows in arrival order while leaving the runtime free to fire the stop timeout.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use log::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::error_handling::types::NetworkError;
use crate::network::network_listener::{DatagramSource, Received, MAX_DATAGRAM_SIZE};
use crate::session_management::active_session::SharedState;

use super::observer::{notify_isolated, RecordObserver};
use super::recorder::CsvRecorder;
use super::types::{CaptureClock, Record};

/// How the worker ended.
#[derive(Debug)]
pub enum LoopExit {
    /// Cancellation observed; the socket is handed back for the stopper to close.
    Cancelled(Box<dyn DatagramSource>),
    /// The socket failed; it has already been dropped and the session marked stopped.
    Failed(NetworkError),
}

/// Output side of a session: the csv file plus the observers.
struct RowSink {
    session_id: Uuid,
    recorder: CsvRecorder,
    observers: Vec<Arc<dyn RecordObserver>>,
    state: Arc<SharedState>,
}

impl RowSink {
    fn deliver(&self, record: &Record, from: SocketAddr, size: usize) {
        if let Err(e) = self.recorder.append(record) {
            error!("[{}] Record lost: {}", self.session_id, e);
            self.state.datagram_dropped();
            return;
        }
        self.state.record_written();

        let preview: String = record.payload.chars().take(64).collect();
        trace!(
            "[{}] captured {} byte(s) from {}: {}{}",
            self.session_id,
            size,
            from,
            preview,
            if record.payload.len() > preview.len() { " ..." } else { "" }
        );

        for observer in &self.observers {
            if let Err(e) = notify_isolated(observer.as_ref(), record) {
                warn!("[{}] {}", self.session_id, e);
                self.state.observer_failed();
            }
        }
    }
}

pub struct StreamRecorder {
    session_id: Uuid,
    source: Box<dyn DatagramSource>,
    sink: Arc<RowSink>,
    stop_flag: Arc<AtomicBool>,
    state: Arc<SharedState>,
    recv_timeout: Duration,
    clock: CaptureClock,
}

impl StreamRecorder {
    pub fn new(
        session_id: Uuid,
        source: Box<dyn DatagramSource>,
        recorder: CsvRecorder,
        observers: Vec<Arc<dyn RecordObserver>>,
        stop_flag: Arc<AtomicBool>,
        state: Arc<SharedState>,
        recv_timeout: Duration,
    ) -> Self {
        debug!("[{}] StreamRecorder created", session_id);
        Self {
            session_id,
            source,
            sink: Arc::new(RowSink {
                session_id,
                recorder,
                observers,
                state: Arc::clone(&state),
            }),
            stop_flag,
            state,
            recv_timeout,
            clock: CaptureClock::default(),
        }
    }

    pub async fn run(mut self) -> LoopExit {
        info!(
            "[{}] Streaming data from {} to {}",
            self.session_id,
            self.source.local_addr(),
            self.sink.recorder.path().display()
        );

        loop {
            if self.stop_flag.load(Ordering::Acquire) {
                debug!("[{}] Cancellation observed", self.session_id);
                return LoopExit::Cancelled(self.source);
            }

            let received = self.source.recv_within(self.recv_timeout).await;
            match received {
                Ok(Received::Timeout) => continue,
                Ok(Received::Datagram {
                    payload,
                    from,
                    truncated,
                }) => self.handle_datagram(&payload, from, truncated).await,
                Err(e) => {
                    error!("[{}] Error in receiving data: {}", self.session_id, e);
                    self.source.release();
                    let stopped_at = Local::now();
                    let status = self.state.finish(stopped_at);
                    info!(
                        "[{}] End of streaming to {} after {} record(s), streaming ended on {}",
                        self.session_id,
                        self.sink.recorder.path().display(),
                        status.records_written,
                        stopped_at.format("%Y-%m-%d at %H:%M:%S")
                    );
                    return LoopExit::Failed(e);
                }
            }
        }
    }

    async fn handle_datagram(&mut self, bytes: &[u8], from: SocketAddr, truncated: bool) {
        if truncated {
            warn!(
                "[{}] Datagram from {} exceeds {} bytes and was truncated",
                self.session_id, from, MAX_DATAGRAM_SIZE
            );
        }

        let payload = match Record::decode_payload(bytes) {
            Ok(p) => p,
            Err(e) => {
                warn!(
                    "[{}] Dropping {} byte datagram from {}: {}",
                    self.session_id,
                    bytes.len(),
                    from,
                    e
                );
                self.state.datagram_dropped();
                return;
            }
        };

        let record = Record {
            captured_at: self.clock.stamp(),
            payload,
        };

        let sink = Arc::clone(&self.sink);
        let size = bytes.len();
        if let Err(e) = tokio::task::spawn_blocking(move || sink.deliver(&record, from, size)).await
        {
            error!("[{}] Record delivery did not complete: {}", self.session_id, e);
        }
    }
}
