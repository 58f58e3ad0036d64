pub mod config;
pub mod types;

pub use config::{Config, EmulatorArgs, ReceiverArgs};
pub use types::{EmulatorConfig, ReceiverConfig, DEFAULT_PORT};
