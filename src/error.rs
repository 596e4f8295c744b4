use std::path::PathBuf;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the library
#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),
    /// The host server exposes nothing the interceptor can hook into
    NoHookPoints(String),
    PackageInfo { path: PathBuf, message: String },
    Capture { file: PathBuf, line: usize, message: String },
    Patch(String),
    SerializationError(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::IoError(e) => write!(f, "IO error: {}", e),
            Error::NoHookPoints(host) => write!(f, "no hook points found on host: {}", host),
            Error::PackageInfo { path, message } => {
                write!(f, "invalid package metadata {}: {}", path.display(), message)
            }
            Error::Capture { file, line, message } => {
                write!(f, "invalid capture {}:{}: {}", file.display(), line, message)
            }
            Error::Patch(msg) => write!(f, "patch failed: {}", msg),
            Error::SerializationError(msg) => write!(f, "serialization error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(format!("JSON: {}", err))
    }
}
