use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::configuration::config::Config;
use crate::configuration::types::parse_port;
use crate::error_handling::types::*;
use crate::session_management::receiver::Receiver;
use crate::session_management::session::{ReceiverStatus, StartOutcome, StopOutcome};

const HELP: &str = "\
commands:
  start          start recording into a new csv file
  stop           stop recording
  status         show the receiver status
  port <n>       listen on port <n> from the next start on
  dir <path>     write the csv files into <path>
  echo on|off    print every record on the console
  help           show this help
  quit           stop recording and leave";

/// One line of the control console.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Start,
    Stop,
    Status,
    Port(u16),
    Dir(PathBuf),
    Echo(bool),
    Help,
    Quit,
}

impl ConsoleCommand {
    /// Parses a console line. Blank lines give `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match (word.to_ascii_lowercase().as_str(), rest) {
            ("start", "") => ConsoleCommand::Start,
            ("stop", "") => ConsoleCommand::Stop,
            ("status", "") => ConsoleCommand::Status,
            ("help", "") | ("?", "") => ConsoleCommand::Help,
            ("quit", "") | ("exit", "") => ConsoleCommand::Quit,
            ("port", text) if !text.is_empty() => {
                ConsoleCommand::Port(parse_port(text).map_err(|e| e.to_string())?)
            }
            ("dir", path) if !path.is_empty() => ConsoleCommand::Dir(PathBuf::from(path)),
            ("echo", flag) => match flag.to_ascii_lowercase().as_str() {
                "on" => ConsoleCommand::Echo(true),
                "off" => ConsoleCommand::Echo(false),
                _ => return Err("usage: echo on|off".to_string()),
            },
            _ => return Err(format!("unknown command {:?}, try `help`", line)),
        };
        Ok(Some(command))
    }
}

/// Drives a [`Receiver`] for one of the binaries: record until a shutdown signal, or answer
/// console commands.
pub struct Controller {
    receiver: Arc<Receiver>,
}

impl Controller {
    pub fn new(config: &Config) -> Self {
        info!("Creating the receiver on port {}", config.receiver.port);
        Self::from_receiver(Arc::new(Receiver::new(config.receiver.clone())))
    }

    pub fn from_receiver(receiver: Arc<Receiver>) -> Self {
        Self { receiver }
    }

    pub fn receiver(&self) -> &Arc<Receiver> {
        &self.receiver
    }

    /// Starts a session, waits for `shutdown`, then stops it.
    pub async fn record_until<F>(&self, shutdown: F) -> Result<StopOutcome, ControllerError>
    where
        F: Future<Output = ()>,
    {
        match self.receiver.start().await {
            Ok(StartOutcome::Started { output_path, .. }) => {
                info!("Recording to {}", output_path.display())
            }
            Ok(StartOutcome::AlreadyActive { output_path }) => {
                info!("Already recording to {}", output_path.display())
            }
            Err(e) => {
                error!("Unable to start the data stream: {}", e);
                return Err(ControllerError::SessionError(e));
            }
        }

        shutdown.await;
        info!("Shutdown requested");
        Ok(self.shutdown().await)
    }

    /// Reads commands from `input` until `quit` or end of input and writes the replies to
    /// `output`. A session still running at that point is stopped.
    pub async fn run_console<R, W>(&self, input: R, mut output: W) -> Result<(), ControllerError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        output.write_all(b"type `help` for the list of commands\n").await?;
        output.flush().await?;

        while let Some(line) = lines.next_line().await? {
            let reply = match ConsoleCommand::parse(&line) {
                Ok(None) => continue,
                Ok(Some(ConsoleCommand::Quit)) => break,
                Ok(Some(command)) => {
                    debug!("Console command: {:?}", command);
                    self.execute(command).await
                }
                Err(message) => format!("error: {}", message),
            };
            output.write_all(reply.as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }

        if let StopOutcome::Stopped(report) = self.shutdown().await {
            let reply = format!(
                "stopped: {} record(s) written to {}\n",
                report.records_written,
                report.output_path.display()
            );
            output.write_all(reply.as_bytes()).await?;
        }
        output.write_all(b"bye\n").await?;
        output.flush().await?;
        Ok(())
    }

    /// Stops a running session; does nothing otherwise.
    pub async fn shutdown(&self) -> StopOutcome {
        let outcome = self.receiver.stop().await;
        if let StopOutcome::Stopped(report) = &outcome {
            if let Some(e) = &report.teardown_error {
                warn!("Session {} did not stop cleanly: {}", report.session_id, e);
            }
        }
        outcome
    }

    async fn execute(&self, command: ConsoleCommand) -> String {
        match command {
            ConsoleCommand::Start => match self.receiver.start().await {
                Ok(StartOutcome::Started {
                    output_path,
                    local_addr,
                    ..
                }) => format!(
                    "started: port {} -> {}",
                    local_addr.port(),
                    output_path.display()
                ),
                Ok(StartOutcome::AlreadyActive { output_path }) => {
                    format!("already running: {}", output_path.display())
                }
                Err(e) => format!("error: {}", e),
            },
            ConsoleCommand::Stop => match self.shutdown().await {
                StopOutcome::Stopped(report) => match report.teardown_error {
                    None => format!(
                        "stopped: {} record(s) written to {}",
                        report.records_written,
                        report.output_path.display()
                    ),
                    Some(e) => format!(
                        "stopped with error: {} ({} record(s) written to {})",
                        e,
                        report.records_written,
                        report.output_path.display()
                    ),
                },
                StopOutcome::NothingToStop => "not running".to_string(),
            },
            ConsoleCommand::Status => describe(&self.receiver.status()),
            ConsoleCommand::Port(port) => {
                let config = self.receiver.config();
                self.reconfigure(config.output_directory, port, config.echo_to_console)
            }
            ConsoleCommand::Dir(dir) => {
                let config = self.receiver.config();
                self.reconfigure(dir, config.port, config.echo_to_console)
            }
            ConsoleCommand::Echo(echo) => {
                let config = self.receiver.config();
                self.reconfigure(config.output_directory, config.port, echo)
            }
            ConsoleCommand::Help => HELP.to_string(),
            ConsoleCommand::Quit => "bye".to_string(),
        }
    }

    fn reconfigure(&self, dir: PathBuf, port: u16, echo: bool) -> String {
        let running = self.receiver.status().is_running();
        let applied = match self.receiver.configure(dir, port, echo) {
            Ok(()) => "ok".to_string(),
            Err(e) => format!("warning: {}", e),
        };
        if running {
            format!("{}, applies from the next start", applied)
        } else {
            applied
        }
    }
}

fn describe(status: &ReceiverStatus) -> String {
    let mut text = format!("status: {}", status.status);
    if let Some(session) = &status.session {
        text.push_str(&format!(
            "\nfile: {}\nport: {}\nrecords: {}\ndropped: {}",
            session.output_path.display(),
            session.local_addr.port(),
            status.records_written,
            status.datagrams_dropped
        ));
        if status.observer_failures > 0 {
            text.push_str(&format!("\nobserver failures: {}", status.observer_failures));
        }
    }
    text
}

/// Resolves on Ctrl+C, or on SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Unable to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::types::ReceiverConfig;
    use crate::SessionStatus;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::BufReader;

    fn controller_in(dir: &TempDir) -> Controller {
        let config = Config {
            receiver: ReceiverConfig {
                output_directory: dir.path().to_path_buf(),
                port: 0,
                recv_timeout_ms: 50,
                stop_timeout_ms: 1000,
                ..Default::default()
            },
            ..Default::default()
        };
        Controller::new(&config)
    }

    async fn console(controller: &Controller, script: &[u8]) -> String {
        let input = tokio_test::io::Builder::new().read(script).build();
        let mut output = Vec::new();
        controller
            .run_console(BufReader::new(input), &mut output)
            .await
            .unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(ConsoleCommand::parse("start"), Ok(Some(ConsoleCommand::Start)));
        assert_eq!(ConsoleCommand::parse("  STOP \r"), Ok(Some(ConsoleCommand::Stop)));
        assert_eq!(ConsoleCommand::parse("port 4000"), Ok(Some(ConsoleCommand::Port(4000))));
        assert_eq!(
            ConsoleCommand::parse("dir /tmp/flight 1"),
            Ok(Some(ConsoleCommand::Dir(PathBuf::from("/tmp/flight 1"))))
        );
        assert_eq!(ConsoleCommand::parse("echo off"), Ok(Some(ConsoleCommand::Echo(false))));
        assert_eq!(ConsoleCommand::parse(""), Ok(None));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(ConsoleCommand::parse("port abc").is_err());
        assert!(ConsoleCommand::parse("port 70000").is_err());
        assert!(ConsoleCommand::parse("echo maybe").is_err());
        assert!(ConsoleCommand::parse("dir").is_err());
        assert!(ConsoleCommand::parse("launch").is_err());
        assert!(ConsoleCommand::parse("start now").is_err());
    }

    #[tokio::test]
    async fn test_console_status_and_help() {
        let dir = TempDir::new().unwrap();
        let controller = controller_in(&dir);

        let output = console(&controller, b"status\nhelp\nstop\nbogus\n").await;

        assert!(output.contains("status: idle"));
        assert!(output.contains("echo on|off"));
        assert!(output.contains("not running"));
        assert!(output.contains("error: unknown command"));
        assert!(output.ends_with("bye\n"));
    }

    #[tokio::test]
    async fn test_console_configures_receiver() {
        let dir = TempDir::new().unwrap();
        let controller = controller_in(&dir);

        let output = console(&controller, b"port 4321\necho on\ndir /no/such/folder\n").await;

        let config = controller.receiver().config();
        assert_eq!(config.port, 4321);
        assert!(config.echo_to_console);
        assert_eq!(config.output_directory, PathBuf::from("/no/such/folder"));
        assert!(output.contains("warning:"));
    }

    #[tokio::test]
    async fn test_console_start_then_end_of_input_stops() {
        let dir = TempDir::new().unwrap();
        let controller = controller_in(&dir);

        let output = console(&controller, b"start\nstart\nstatus\n").await;

        assert!(output.contains("started: port"));
        assert!(output.contains("already running"));
        assert!(output.contains("status: running"));
        assert!(output.contains("stopped: 0 record(s)"));
        assert_eq!(controller.receiver().status().status, SessionStatus::Stopped);
    }

    #[tokio::test]
    async fn test_console_quit_stops_session() {
        let dir = TempDir::new().unwrap();
        let controller = controller_in(&dir);

        let output = console(&controller, b"start\nquit\n").await;

        assert!(output.contains("stopped:"));
        assert!(!controller.receiver().status().is_running());
    }

    #[tokio::test]
    async fn test_record_until_stops_after_shutdown() {
        let dir = TempDir::new().unwrap();
        let controller = controller_in(&dir);

        let outcome = controller
            .record_until(tokio::time::sleep(Duration::from_millis(100)))
            .await
            .unwrap();

        match outcome {
            StopOutcome::Stopped(report) => {
                assert!(report.teardown_error.is_none());
                assert!(report.output_path.starts_with(dir.path()));
            }
            StopOutcome::NothingToStop => panic!("session was not running"),
        }
    }

    #[tokio::test]
    async fn test_record_until_reports_start_failure() {
        let dir = TempDir::new().unwrap();
        let controller = controller_in(&dir);
        controller
            .receiver()
            .configure("/no/such/folder", 0, false)
            .unwrap_err();

        let err = controller.record_until(async {}).await.unwrap_err();
        assert!(matches!(
            err,
            ControllerError::SessionError(SessionError::Configuration(
                ConfigError::DirectoryDoesNotExist(_)
            ))
        ));
    }
}
