use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error_handling::types::ConfigError;

/// Port the data unit broadcasts on.
pub const DEFAULT_PORT: u16 = 3131;
pub const DEFAULT_FILE_PREFIX: &str = "NoveSpa_planedata";
pub const DEFAULT_RECV_TIMEOUT_MS: u64 = 200;
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 3 * DEFAULT_RECV_TIMEOUT_MS;
pub const DEFAULT_DESTINATION_HOST: &str = "127.0.0.1";
pub const DEFAULT_INTERVAL_MS: u64 = 100;

/// Settings of the receiver/recorder.
///
/// Every key is optional in the TOML file; missing keys fall back to
/// [`ReceiverConfig::default`].
#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReceiverConfig {
    /// Folder receiving one csv file per session
    pub output_directory: PathBuf,
    /// UDP port to listen on, `0` lets the OS pick one
    pub port: u16,
    /// Print every record on stdout as well
    pub echo_to_console: bool,
    /// First part of the generated file name
    pub file_prefix: String,
    /// Upper bound of one socket wait, also the cancellation poll interval
    pub recv_timeout_ms: u64,
    /// Upper bound `stop` waits for the worker to acknowledge
    pub stop_timeout_ms: u64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("."),
            port: DEFAULT_PORT,
            echo_to_console: false,
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            recv_timeout_ms: DEFAULT_RECV_TIMEOUT_MS,
            stop_timeout_ms: DEFAULT_STOP_TIMEOUT_MS,
        }
    }
}

impl ReceiverConfig {
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn check_output_directory(&self) -> Result<(), ConfigError> {
        check_directory(&self.output_directory)
    }

    /// Checks everything that has to hold before a session may acquire its socket.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.check_output_directory()?;

        if self.file_prefix.is_empty()
            || self
                .file_prefix
                .chars()
                .any(|c| std::path::is_separator(c) || c.is_control())
        {
            return Err(ConfigError::InvalidPrefix(self.file_prefix.clone()));
        }

        if self.recv_timeout_ms == 0 {
            return Err(ConfigError::NotInRange(
                "recv_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.stop_timeout_ms < self.recv_timeout_ms {
            return Err(ConfigError::NotInRange(format!(
                "stop_timeout_ms ({}) must be at least recv_timeout_ms ({})",
                self.stop_timeout_ms, self.recv_timeout_ms
            )));
        }

        Ok(())
    }
}

/// Settings of the replay emulator.
#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmulatorConfig {
    /// File to replay, the bundled example flight when unset
    pub source: Option<PathBuf>,
    pub destination_host: String,
    pub port: u16,
    pub interval_ms: u64,
    pub broadcast: bool,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            source: None,
            destination_host: DEFAULT_DESTINATION_HOST.to_string(),
            port: DEFAULT_PORT,
            interval_ms: DEFAULT_INTERVAL_MS,
            broadcast: true,
        }
    }
}

impl EmulatorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.destination_host.trim().is_empty() {
            return Err(ConfigError::NotInRange(
                "destination_host must not be empty".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(
                "cannot send to port 0".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn check_directory(path: &Path) -> Result<(), ConfigError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(ConfigError::DirectoryDoesNotExist(path.to_path_buf()))
    }
}

/// Parses a port typed by a user (console, display widgets).
pub fn parse_port(text: &str) -> Result<u16, ConfigError> {
    text.trim()
        .parse::<u16>()
        .map_err(|e| ConfigError::InvalidPort(format!("{:?}: {}", text.trim(), e)))
}
