use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Local;
use log::{error, info, warn};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::configuration::types::ReceiverConfig;
use crate::data_capture::observer::{ConsoleEcho, RecordObserver};
use crate::data_capture::recorder::CsvRecorder;
use crate::data_capture::stream_recorder::{LoopExit, StreamRecorder};
use crate::data_capture::types::OutputTarget;
use crate::error_handling::types::{ConfigError, NetworkError, SessionError};
use crate::network::network_listener::{DatagramListener, DatagramSource};
use crate::session_management::active_session::{ActiveSession, SharedState};
use crate::session_management::session::{
    ReceiverStatus, Session, StartOutcome, StopOutcome, StopReport,
};

/// Owner of the receive/record lifecycle.
///
/// A `Receiver` binds the configured UDP port on [`start`](Self::start), spawns a worker task
/// that appends every datagram to a fresh csv file, and tears everything down again on
/// [`stop`](Self::stop). All operations take `&self`, so a driver (CLI, console, display)
/// shares it through an `Arc` and may call them from any task.
///
/// - `start` and `stop` are serialised; a second `start` while running, or a `stop` with
///   nothing running, is reported through the returned outcome and changes nothing.
/// - `status` never waits on a start or stop in progress.
///
/// # Examples
///
/// ```rust,no_run
/// use novespace_stream::configuration::types::ReceiverConfig;
/// use novespace_stream::session_management::receiver::Receiver;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let receiver = Receiver::new(ReceiverConfig::default());
/// receiver.start().await?;
/// println!("{:?}", receiver.status().active_output());
/// receiver.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct Receiver {
    config: RwLock<ReceiverConfig>,
    observers: RwLock<Vec<Arc<dyn RecordObserver>>>,
    state: Arc<SharedState>,
    lifecycle: Mutex<Option<ActiveSession>>,
}

impl Receiver {
    /// Creates an idle receiver. A missing output folder is only logged here; `start` refuses
    /// to run until it exists.
    pub fn new(config: ReceiverConfig) -> Self {
        if let Err(e) = config.check_output_directory() {
            error!("No valid folder for csv files is given: {}", e);
        }
        Self {
            config: RwLock::new(config),
            observers: RwLock::new(Vec::new()),
            state: Arc::new(SharedState::default()),
            lifecycle: Mutex::new(None),
        }
    }

    /// Applies output folder, port and console echo for the next session.
    ///
    /// The settings are stored even when the folder does not exist; the returned error lets
    /// the caller decide whether to go on. A running session keeps its settings.
    pub fn configure(
        &self,
        output_directory: impl Into<PathBuf>,
        port: u16,
        echo_to_console: bool,
    ) -> Result<(), ConfigError> {
        let mut config = self.config.write().unwrap_or_else(|p| p.into_inner());
        config.output_directory = output_directory.into();
        config.port = port;
        config.echo_to_console = echo_to_console;
        config.check_output_directory().map_err(|e| {
            warn!("Receiver configured with an invalid folder: {}", e);
            e
        })
    }

    pub fn config(&self) -> ReceiverConfig {
        self.config.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Registers an observer for the rows of every session started afterwards.
    pub fn on_record<O>(&self, observer: O)
    where
        O: RecordObserver + 'static,
    {
        self.add_observer(Arc::new(observer));
    }

    pub fn add_observer(&self, observer: Arc<dyn RecordObserver>) {
        self.observers
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(observer);
    }

    /// Starts a session writing to a generated file in the output folder.
    pub async fn start(&self) -> Result<StartOutcome, SessionError> {
        self.start_with(OutputTarget::Generate).await
    }

    /// Starts a session.
    ///
    /// Errors leave the receiver exactly as it was: no socket bound, status unchanged.
    ///
    /// # Errors
    ///
    /// * `SessionError::Configuration` for an invalid configuration or output file
    /// * `SessionError::Network(NetworkError::BindError)` when the port cannot be bound
    /// * `SessionError::Storage` when the output file cannot be created
    pub async fn start_with(&self, output: OutputTarget) -> Result<StartOutcome, SessionError> {
        self.start_from(output, |port| async move {
            DatagramListener::bind(port)
                .await
                .map(|listener| Box::new(listener) as Box<dyn DatagramSource>)
        })
        .await
    }

    /// Same as [`start_with`](Self::start_with), with the datagram source opened by
    /// `open_source` from the configured port.
    pub(crate) async fn start_from<F, Fut>(
        &self,
        output: OutputTarget,
        open_source: F,
    ) -> Result<StartOutcome, SessionError>
    where
        F: FnOnce(u16) -> Fut,
        Fut: Future<Output = Result<Box<dyn DatagramSource>, NetworkError>>,
    {
        let mut slot = self.lifecycle.lock().await;

        if self.state.snapshot().is_running() {
            let output_path = slot
                .as_ref()
                .map(|a| a.output_path.clone())
                .unwrap_or_default();
            info!("The stream is already active: {}", output_path.display());
            return Ok(StartOutcome::AlreadyActive { output_path });
        }

        if let Some(previous) = slot.take() {
            previous.reap().await;
        }

        let config = self.config();
        config.validate()?;

        let source = open_source(config.port).await?;
        let local_addr = source.local_addr();

        let session_id = Uuid::new_v4();
        let started_at = Local::now();
        let recorder = CsvRecorder::create(session_id, &output, &config, &started_at)?;
        let output_path = recorder.path().to_path_buf();

        let mut observers: Vec<Arc<dyn RecordObserver>> = Vec::new();
        if config.echo_to_console {
            observers.push(Arc::new(ConsoleEcho));
        }
        observers.extend(
            self.observers
                .read()
                .unwrap_or_else(|p| p.into_inner())
                .iter()
                .cloned(),
        );

        self.state.begin(Session {
            id: session_id,
            output_path: output_path.clone(),
            local_addr,
            started_at,
            stopped_at: None,
        });

        let stop_flag = Arc::new(AtomicBool::new(false));
        let worker = tokio::spawn(
            StreamRecorder::new(
                session_id,
                source,
                recorder,
                observers,
                Arc::clone(&stop_flag),
                Arc::clone(&self.state),
                config.recv_timeout(),
            )
            .run(),
        );

        *slot = Some(ActiveSession::new(
            session_id,
            output_path.clone(),
            stop_flag,
            config.stop_timeout(),
            worker,
        ));

        info!(
            "[{}] Starting datastream from port {} to file: {}",
            session_id,
            local_addr.port(),
            output_path.display()
        );

        Ok(StartOutcome::Started {
            session_id,
            output_path,
            local_addr,
        })
    }

    /// Stops the running session.
    ///
    /// Raises the cancellation flag and waits, bounded by the configured stop timeout, for
    /// the worker to acknowledge before the socket is closed. A worker that does not answer
    /// in time is aborted, which drops its socket, and the report carries a teardown error;
    /// the session ends up `Stopped` either way.
    pub async fn stop(&self) -> StopOutcome {
        let mut slot = self.lifecycle.lock().await;

        if !self.state.request_stop() {
            if let Some(finished) = slot.take() {
                finished.reap().await;
            }
            info!("No active data-stream to be terminated.");
            return StopOutcome::NothingToStop;
        }

        let Some(mut active) = slot.take() else {
            // Running without handles cannot normally happen; settle the state anyway.
            self.state.finish(Local::now());
            warn!("Receiver was marked running without a worker");
            return StopOutcome::NothingToStop;
        };

        active.stop_flag.store(true, Ordering::Release);

        let teardown_error = match active.take_worker() {
            None => Some(NetworkError::Teardown("receive worker already gone".to_string())),
            Some(mut worker) => match tokio::time::timeout(active.stop_timeout, &mut worker).await {
                Ok(Ok(LoopExit::Cancelled(source))) => {
                    source.release();
                    None
                }
                Ok(Ok(LoopExit::Failed(e))) => Some(NetworkError::Teardown(format!(
                    "receive loop had already failed: {}",
                    e
                ))),
                Ok(Err(e)) => Some(NetworkError::Teardown(format!(
                    "receive worker did not finish cleanly: {}",
                    e
                ))),
                Err(_) => {
                    worker.abort();
                    Some(NetworkError::Teardown(format!(
                        "receive worker did not acknowledge within {:?} and was aborted",
                        active.stop_timeout
                    )))
                }
            },
        };

        let stopped_at = Local::now();
        let status = self.state.finish(stopped_at);

        match &teardown_error {
            None => info!(
                "[{}] End of streaming to {}, streaming ended on {}",
                active.session_id,
                active.output_path.display(),
                stopped_at.format("%Y-%m-%d at %H:%M:%S")
            ),
            Some(e) => error!(
                "[{}] Ending of datastream was not successful: {}",
                active.session_id, e
            ),
        }

        StopOutcome::Stopped(StopReport {
            session_id: active.session_id,
            output_path: active.output_path.clone(),
            stopped_at,
            records_written: status.records_written,
            teardown_error,
        })
    }

    /// Current status; a pure read.
    pub fn status(&self) -> ReceiverStatus {
        self.state.snapshot()
    }
}
