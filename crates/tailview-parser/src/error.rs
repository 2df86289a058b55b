use std::fmt;
use std::path::PathBuf;

/// Result type for tailview-parser operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the parsing layer
#[derive(Debug)]
pub enum Error {
    /// IO operation failed
    Io(std::io::Error),

    /// JSON parsing failed
    Json(serde_json::Error),

    /// A one-shot session load hit a malformed line
    Snapshot(SnapshotParseError),

    /// Directory traversal error
    WalkDir(walkdir::Error),
}

/// Fatal diagnostic from the one-shot session loader.
///
/// The loader is strict: unlike the live tail path, which downgrades corrupt
/// lines to warnings, a bad line during a cold load aborts the whole parse.
#[derive(Debug)]
pub struct SnapshotParseError {
    pub file_path: PathBuf,
    pub line_number: usize,
    pub raw_line: String,
    pub validation_details: Option<String>,
}

impl fmt::Display for SnapshotParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: failed to parse line",
            self.file_path.display(),
            self.line_number
        )?;
        if let Some(details) = &self.validation_details {
            write!(f, ": {}", details)?;
        }
        Ok(())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Json(err) => write!(f, "JSON error: {}", err),
            Error::Snapshot(err) => write!(f, "Session parse error: {}", err),
            Error::WalkDir(err) => write!(f, "Directory traversal error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::WalkDir(err) => Some(err),
            Error::Snapshot(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Error::WalkDir(err)
    }
}
