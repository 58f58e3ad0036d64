use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    DirectoryDoesNotExist(PathBuf),
    InvalidPort(String),
    InvalidPrefix(String),
    NotInRange(String),
    OutputFileNotEmpty(PathBuf),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::DirectoryDoesNotExist(p) => {
                write!(f, "Directory error: {} is not a valid folder", p.display())
            }
            ConfigError::InvalidPort(e) => write!(f, "Invalid port number: {}", e),
            ConfigError::InvalidPrefix(e) => write!(f, "Invalid file prefix: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
            ConfigError::OutputFileNotEmpty(p) => {
                write!(f, "Output file {} already contains data", p.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

#[derive(Debug)]
pub enum NetworkError {
    BindError(std::io::Error),
    SockError(std::io::Error),
    Teardown(String),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::BindError(e) => write!(f, "Network bind error: {}", e),
            NetworkError::SockError(e) => write!(f, "Socket error: {}", e),
            NetworkError::Teardown(e) => write!(f, "Socket teardown error: {}", e),
        }
    }
}

impl std::error::Error for NetworkError {}

#[derive(Debug)]
pub enum StorageError {
    CreateFailed(PathBuf, std::io::Error),
    WriteFailed(PathBuf, std::io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::CreateFailed(p, e) => {
                write!(f, "Storage create failed for {}: {}", p.display(), e)
            }
            StorageError::WriteFailed(p, e) => {
                write!(f, "Storage write failed for {}: {}", p.display(), e)
            }
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug)]
pub enum CaptureError {
    Decode(std::str::Utf8Error),
    Callback(String),
    StorageError(StorageError),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Decode(e) => write!(f, "Datagram decode error: {}", e),
            CaptureError::Callback(e) => write!(f, "Record observer error: {}", e),
            CaptureError::StorageError(e) => write!(f, "Capture storage error: {}", e),
        }
    }
}

impl std::error::Error for CaptureError {}

/// Errors that keep a session from reaching `Running`.
#[derive(Debug)]
pub enum SessionError {
    Configuration(ConfigError),
    Network(NetworkError),
    Storage(StorageError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Configuration(e) => write!(f, "Configuration error: {}", e),
            SessionError::Network(e) => write!(f, "Network error: {}", e),
            SessionError::Storage(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<ConfigError> for SessionError {
    fn from(err: ConfigError) -> Self {
        SessionError::Configuration(err)
    }
}

impl From<NetworkError> for SessionError {
    fn from(err: NetworkError) -> Self {
        SessionError::Network(err)
    }
}

impl From<StorageError> for SessionError {
    fn from(err: StorageError) -> Self {
        SessionError::Storage(err)
    }
}

#[derive(Debug)]
pub enum EmulatorError {
    SourceUnavailable(String),
    AddressResolution(String),
    SockError(std::io::Error),
}

impl fmt::Display for EmulatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmulatorError::SourceUnavailable(e) => write!(f, "Replay source unavailable: {}", e),
            EmulatorError::AddressResolution(e) => write!(f, "Cannot resolve destination: {}", e),
            EmulatorError::SockError(e) => write!(f, "Emulator socket error: {}", e),
        }
    }
}

impl std::error::Error for EmulatorError {}

#[derive(Debug)]
pub enum ControllerError {
    SessionError(SessionError),
    IoError(std::io::Error),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::SessionError(e) => write!(f, "Session error: {}", e),
            ControllerError::IoError(e) => write!(f, "Console IO error: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<std::io::Error> for ControllerError {
    fn from(err: std::io::Error) -> Self {
        ControllerError::IoError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_is_distinguishable_from_config_error() {
        let bind: SessionError = NetworkError::BindError(std::io::Error::new(
            std::io::ErrorKind::AddrInUse,
            "in use",
        ))
        .into();
        assert!(matches!(bind, SessionError::Network(NetworkError::BindError(_))));

        let config: SessionError = ConfigError::DirectoryDoesNotExist(PathBuf::from("/nope")).into();
        assert!(matches!(config, SessionError::Configuration(_)));
        assert_eq!(
            config.to_string(),
            "Configuration error: Directory error: /nope is not a valid folder"
        );
    }
}
