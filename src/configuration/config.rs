use super::types::*;
use crate::error_handling::types::ConfigError;
use clap::Parser;
use log::LevelFilter;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Application configuration loaded from an optional TOML file.
///
/// The file mirrors the two programs shipped by this crate: a `[receiver]` table for the
/// recorder and an `[emulator]` table for the replay tool. Every key may be omitted.
///
/// # Examples
///
/// ```
/// use novespace_stream::configuration::config::Config;
///
/// let config = Config::from_toml_str(
///     r#"
///     log_level = "debug"
///
///     [receiver]
///     port = 4000
///     echo_to_console = true
///     "#,
/// )
/// .unwrap();
/// assert_eq!(config.receiver.port, 4000);
/// assert_eq!(config.emulator.port, 3131);
/// ```
#[derive(Debug, Default, PartialEq, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// `env_logger` filter level (`error`, `warn`, `info`, `debug`, `trace`)
    pub log_level: Option<String>,
    pub receiver: ReceiverConfig,
    pub emulator: EmulatorConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))
    }

    /// Filter level to initialise the logger with, `Info` unless the file says otherwise.
    pub fn log_filter(&self) -> Result<LevelFilter, ConfigError> {
        match &self.log_level {
            None => Ok(LevelFilter::Info),
            Some(level) => level
                .parse::<LevelFilter>()
                .map_err(|_| ConfigError::NotInRange(format!("unknown log level {:?}", level))),
        }
    }

    fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }
}

/// Command line of the `novespace-stream` receiver.
///
/// Flags override the values read from `--config`.
#[derive(Parser, Debug, Clone)]
#[command(name = "novespace-stream")]
#[command(version)]
#[command(
    about = "Receives the data unit UDP stream of a parabolic flight and writes it into a csv file"
)]
pub struct ReceiverArgs {
    /// Optional TOML configuration file
    ///
    /// # Command Line
    /// Use `--config <FILE>` to set this value from the CLI
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Folder in which the csv file is created
    ///
    /// Falls back to the `NOVESPACE_OUTPUT_DIR` environment variable, then to the configuration
    /// file, then to the current directory.
    #[arg(long, env = "NOVESPACE_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// UDP port to listen on
    #[arg(long)]
    pub port: Option<u16>,

    /// Print every received record on the console too
    ///
    /// # Command Line
    /// Use `--echo` flag to enable. This is a boolean flag that doesn't take a value
    #[arg(long, action = clap::ArgAction::SetTrue, overrides_with = "no_echo")]
    pub echo: bool,

    /// Keep received records off the console, even if the configuration file enables echo
    #[arg(long, action = clap::ArgAction::SetTrue, overrides_with = "echo")]
    pub no_echo: bool,

    /// Prefix of the generated csv file name
    #[arg(long)]
    pub prefix: Option<String>,

    /// Read `start`/`stop`/`status` commands from stdin instead of recording right away
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub interactive: bool,
}

impl ReceiverArgs {
    /// Parses the process arguments, exiting with a usage message on invalid input.
    pub fn from_args() -> Self {
        ReceiverArgs::parse()
    }

    /// Loads the configuration file (if any) and applies the command-line overrides.
    pub fn to_config(&self) -> Result<Config, ConfigError> {
        let mut config = Config::load(self.config.as_deref())?;

        if let Some(dir) = &self.output_dir {
            config.receiver.output_directory = dir.clone();
        }
        if let Some(port) = self.port {
            config.receiver.port = port;
        }
        if self.echo {
            config.receiver.echo_to_console = true;
        }
        if self.no_echo {
            config.receiver.echo_to_console = false;
        }
        if let Some(prefix) = &self.prefix {
            config.receiver.file_prefix = prefix.clone();
        }

        Ok(config)
    }
}

/// Command line of the `novespace-emulator` replay tool.
#[derive(Parser, Debug, Clone)]
#[command(name = "novespace-emulator")]
#[command(version)]
#[command(about = "Emulates the data unit UDP broadcast by replaying a csv file row by row")]
pub struct EmulatorArgs {
    /// Optional TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// File to stream (the bundled example flight when omitted)
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Address to send the datagrams to
    #[arg(long)]
    pub ip: Option<String>,

    /// Destination UDP port
    #[arg(long)]
    pub port: Option<u16>,

    /// Number of seconds to sleep between datagrams
    #[arg(long)]
    pub interval: Option<f64>,
}

impl EmulatorArgs {
    pub fn from_args() -> Self {
        EmulatorArgs::parse()
    }

    pub fn to_config(&self) -> Result<Config, ConfigError> {
        let mut config = Config::load(self.config.as_deref())?;

        if let Some(file) = &self.file {
            config.emulator.source = Some(file.clone());
        }
        if let Some(ip) = &self.ip {
            config.emulator.destination_host = ip.clone();
        }
        if let Some(port) = self.port {
            config.emulator.port = port;
        }
        if let Some(seconds) = self.interval {
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(ConfigError::NotInRange(format!(
                    "interval must be a positive number of seconds, got {}",
                    seconds
                )));
            }
            config.emulator.interval_ms = (seconds * 1000.0).round() as u64;
        }

        config.emulator.validate()?;
        Ok(config)
    }
}
