pub mod observer;
pub mod recorder;
pub mod stream_recorder;
pub mod types;

pub use observer::{ConsoleEcho, ObserverResult, RecordObserver};
pub use recorder::CsvRecorder;
pub use stream_recorder::StreamRecorder;
pub use types::{header_row, CaptureTimestamp, OutputTarget, Record, HEADER_FIELDS};
