//! Session file handling.
//!
//! `CsvRecorder` owns the path of one session's output file. The file is never kept open:
//! the header is written through a handle that is closed right away, and every record is a
//! separate open-append-close, so a killed process loses at most the row being written.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::{debug, error, info};
use uuid::Uuid;

use crate::configuration::types::{check_directory, ReceiverConfig};
use crate::error_handling::types::{ConfigError, SessionError, StorageError};

use super::types::{header_row, OutputTarget, Record};

/// `strftime` layout of the timestamp embedded in generated file names.
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d-%Hh%Mm%Ss";

/// Upper bound on `_2`, `_3`, ... suffixes tried when a generated name is taken.
const MAX_NAME_ATTEMPTS: u32 = 100;

/// Builds `<prefix>_YYYYMMDD-HHhMMmSSs.csv`, with `_<attempt>` before the extension for
/// attempts after the first.
pub fn session_file_name(prefix: &str, started_at: &DateTime<Local>, attempt: u32) -> String {
    let stamp = started_at.format(FILE_TIMESTAMP_FORMAT);
    if attempt <= 1 {
        format!("{}_{}.csv", prefix, stamp)
    } else {
        format!("{}_{}_{}.csv", prefix, stamp, attempt)
    }
}

#[derive(Debug)]
pub struct CsvRecorder {
    session_id: Uuid,
    path: PathBuf,
}

impl CsvRecorder {
    /// Creates the session file and writes the header row.
    ///
    /// Errors
    /// - [`SessionError::Configuration`] when the target folder is missing or an explicit
    ///   file already holds data.
    /// - [`SessionError::Storage`] when the file cannot be created or written.
    pub fn create(
        session_id: Uuid,
        target: &OutputTarget,
        config: &ReceiverConfig,
        started_at: &DateTime<Local>,
    ) -> Result<Self, SessionError> {
        let (path, file) = match target {
            OutputTarget::Generate => {
                check_directory(&config.output_directory)?;
                Self::create_generated(&config.output_directory, &config.file_prefix, started_at)?
            }
            OutputTarget::Explicit(path) => (path.clone(), Self::open_explicit(path)?),
        };

        Self::write_header(&path, file)?;
        info!("[{}] Created output file {}", session_id, path.display());

        Ok(Self { session_id, path })
    }

    fn create_generated(
        directory: &Path,
        prefix: &str,
        started_at: &DateTime<Local>,
    ) -> Result<(PathBuf, File), StorageError> {
        for attempt in 1..=MAX_NAME_ATTEMPTS {
            let path = directory.join(session_file_name(prefix, started_at, attempt));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!("{} already exists, trying next name", path.display());
                }
                Err(e) => {
                    error!("Failed to create {}: {}", path.display(), e);
                    return Err(StorageError::CreateFailed(path, e));
                }
            }
        }

        let path = directory.join(session_file_name(prefix, started_at, MAX_NAME_ATTEMPTS));
        Err(StorageError::CreateFailed(
            path,
            io::Error::new(io::ErrorKind::AlreadyExists, "no free session file name"),
        ))
    }

    fn open_explicit(path: &Path) -> Result<File, SessionError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            check_directory(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| StorageError::CreateFailed(path.to_path_buf(), e))?;

        let len = file
            .metadata()
            .map_err(|e| StorageError::CreateFailed(path.to_path_buf(), e))?
            .len();
        if len > 0 {
            return Err(ConfigError::OutputFileNotEmpty(path.to_path_buf()).into());
        }

        Ok(file)
    }

    fn write_header(path: &Path, mut file: File) -> Result<(), StorageError> {
        let line = format!("{}\n", header_row());
        file.write_all(line.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| StorageError::WriteFailed(path.to_path_buf(), e))
    }

    /// Appends one row, opening and closing the file around the write.
    pub fn append(&self, record: &Record) -> Result<(), StorageError> {
        let mut line = record.to_row();
        line.push('\n');

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| StorageError::WriteFailed(self.path.clone(), e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| StorageError::WriteFailed(self.path.clone(), e))?;

        debug!("[{}] Appended {} byte(s)", self.session_id, line.len());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_capture::types::CaptureClock;
    use chrono::TimeZone;
    use regex::Regex;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> ReceiverConfig {
        ReceiverConfig {
            output_directory: dir.path().to_path_buf(),
            ..Default::default()
        }
    }

    fn record(clock: &mut CaptureClock, payload: &str) -> Record {
        Record {
            captured_at: clock.stamp(),
            payload: payload.to_string(),
        }
    }

    #[test]
    fn test_session_file_name() {
        let started = Local.with_ymd_and_hms(2025, 10, 23, 8, 47, 40).unwrap();
        assert_eq!(
            session_file_name("NoveSpa_planedata", &started, 1),
            "NoveSpa_planedata_20251023-08h47m40s.csv"
        );
        assert_eq!(
            session_file_name("Flight_data", &started, 3),
            "Flight_data_20251023-08h47m40s_3.csv"
        );
    }

    #[test]
    fn test_generated_file_starts_with_header() {
        let dir = TempDir::new().unwrap();
        let recorder = CsvRecorder::create(
            Uuid::new_v4(),
            &OutputTarget::Generate,
            &config_in(&dir),
            &Local::now(),
        )
        .unwrap();

        let name = recorder.path().file_name().unwrap().to_str().unwrap();
        let pattern = Regex::new(r"^NoveSpa_planedata_\d{8}-\d{2}h\d{2}m\d{2}s\.csv$").unwrap();
        assert!(pattern.is_match(name), "unexpected name {}", name);

        let content = std::fs::read_to_string(recorder.path()).unwrap();
        assert_eq!(content, format!("{}\n", header_row()));
    }

    #[test]
    fn test_same_second_gets_suffix_instead_of_reuse() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let started = Local::now();

        let first =
            CsvRecorder::create(Uuid::new_v4(), &OutputTarget::Generate, &config, &started)
                .unwrap();
        let second =
            CsvRecorder::create(Uuid::new_v4(), &OutputTarget::Generate, &config, &started)
                .unwrap();

        assert_ne!(first.path(), second.path());
        assert!(second.path().to_str().unwrap().ends_with("_2.csv"));
        let content = std::fs::read_to_string(first.path()).unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn test_append_rows_in_order() {
        let dir = TempDir::new().unwrap();
        let recorder = CsvRecorder::create(
            Uuid::new_v4(),
            &OutputTarget::Generate,
            &config_in(&dir),
            &Local::now(),
        )
        .unwrap();

        let mut clock = CaptureClock::default();
        for payload in ["a,1", "b,2", "c,3"] {
            recorder.append(&record(&mut clock, payload)).unwrap();
        }

        let content = std::fs::read_to_string(recorder.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], header_row());
        let payloads: Vec<&str> = lines[1..]
            .iter()
            .map(|l| l.split_once(';').unwrap().1)
            .collect();
        assert_eq!(payloads, vec!["a,1", "b,2", "c,3"]);
    }

    #[test]
    fn test_explicit_target() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Flight_data_manual.csv");
        File::create(&path).unwrap();

        let recorder = CsvRecorder::create(
            Uuid::new_v4(),
            &OutputTarget::Explicit(path.clone()),
            &ReceiverConfig::default(),
            &Local::now(),
        )
        .unwrap();
        assert_eq!(recorder.path(), path.as_path());

        // Starting again on the same file would add a second header
        let again = CsvRecorder::create(
            Uuid::new_v4(),
            &OutputTarget::Explicit(path.clone()),
            &ReceiverConfig::default(),
            &Local::now(),
        );
        assert!(matches!(
            again,
            Err(SessionError::Configuration(ConfigError::OutputFileNotEmpty(_)))
        ));
    }

    #[test]
    fn test_missing_directory_is_configuration_error() {
        let config = ReceiverConfig {
            output_directory: PathBuf::from("/no/such/folder"),
            ..Default::default()
        };
        let result =
            CsvRecorder::create(Uuid::new_v4(), &OutputTarget::Generate, &config, &Local::now());
        assert!(matches!(
            result,
            Err(SessionError::Configuration(ConfigError::DirectoryDoesNotExist(_)))
        ));
    }

    #[test]
    fn test_append_after_file_removed_fails() {
        let dir = TempDir::new().unwrap();
        let recorder = CsvRecorder::create(
            Uuid::new_v4(),
            &OutputTarget::Generate,
            &config_in(&dir),
            &Local::now(),
        )
        .unwrap();
        std::fs::remove_file(recorder.path()).unwrap();

        let mut clock = CaptureClock::default();
        assert!(matches!(
            recorder.append(&record(&mut clock, "x")),
            Err(StorageError::WriteFailed(_, _))
        ));
    }
}
