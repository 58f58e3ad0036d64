pub mod network_listener;

pub use network_listener::{DatagramListener, DatagramSource, Received, MAX_DATAGRAM_SIZE};
