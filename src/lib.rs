pub mod configuration;
pub use configuration::{Config, EmulatorConfig, ReceiverConfig};

pub mod controller;
pub use controller::Controller;

pub mod data_capture;

pub mod emulator;
pub use emulator::Replayer;

pub mod error_handling;

pub mod network;

pub mod session_management;
pub use session_management::receiver::Receiver;
pub use session_management::SessionStatus;
