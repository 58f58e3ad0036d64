pub mod controller_handler;

pub use controller_handler::{shutdown_signal, ConsoleCommand, Controller};
