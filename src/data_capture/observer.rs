//! Hooks invoked for every recorded row.
//!
//! Displays and consoles attach to a receiver by registering a [`RecordObserver`] instead of
//! extending it. Observers run on the receive worker right after the row has been appended;
//! anything they return or panic with is turned into a [`CaptureError::Callback`] by
//! [`notify_isolated`] so the worker keeps going.

use std::any::Any;
use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error_handling::types::CaptureError;

use super::types::Record;

pub type ObserverResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

pub trait RecordObserver: Send + Sync {
    /// Short label used in log lines.
    fn name(&self) -> &str {
        "record observer"
    }

    fn on_record(&self, record: &Record) -> ObserverResult;
}

impl<F> RecordObserver for F
where
    F: Fn(&Record) -> ObserverResult + Send + Sync,
{
    fn on_record(&self, record: &Record) -> ObserverResult {
        self(record)
    }
}

/// Prints each row on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleEcho;

impl RecordObserver for ConsoleEcho {
    fn name(&self) -> &str {
        "console echo"
    }

    fn on_record(&self, record: &Record) -> ObserverResult {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", record.to_row())?;
        Ok(())
    }
}

/// Runs one observer, catching both its error and a panic.
pub fn notify_isolated(observer: &dyn RecordObserver, record: &Record) -> Result<(), CaptureError> {
    match catch_unwind(AssertUnwindSafe(|| observer.on_record(record))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(CaptureError::Callback(format!("{}: {}", observer.name(), e))),
        Err(panic) => Err(CaptureError::Callback(format!(
            "{} panicked: {}",
            observer.name(),
            panic_message(panic.as_ref())
        ))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_capture::types::CaptureClock;
    use std::sync::Mutex;

    fn record(payload: &str) -> Record {
        Record {
            captured_at: CaptureClock::default().stamp(),
            payload: payload.to_string(),
        }
    }

    #[test]
    fn test_closure_observer_receives_record() {
        let seen = Mutex::new(Vec::new());
        let observer = |r: &Record| -> ObserverResult {
            seen.lock().unwrap().push(r.payload.clone());
            Ok(())
        };

        notify_isolated(&observer, &record("hello")).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["hello".to_string()]);
    }

    #[test]
    fn test_error_is_wrapped() {
        let observer = |_: &Record| -> ObserverResult { Err("display closed".into()) };
        let err = notify_isolated(&observer, &record("x")).unwrap_err();
        assert!(matches!(err, CaptureError::Callback(ref m) if m.contains("display closed")));
    }

    #[test]
    fn test_panic_is_caught() {
        let observer = |_: &Record| -> ObserverResult { panic!("widget gone") };
        let err = notify_isolated(&observer, &record("x")).unwrap_err();
        assert!(matches!(err, CaptureError::Callback(ref m) if m.contains("widget gone")));
    }

    #[test]
    fn test_console_echo() {
        assert_eq!(ConsoleEcho.name(), "console echo");
        assert!(notify_isolated(&ConsoleEcho, &record("echoed")).is_ok());
    }
}
