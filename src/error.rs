//! Failure taxonomy shared by the readers, the classifier and the prober.
//!
//! Every check catches these at its own boundary and turns them into a
//! printed diagnostic; none of them reach `main` as control flow.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    /// A settings or credentials file does not exist.
    #[error("file not found: {}", .path.display())]
    FileNotFound { path: PathBuf },

    /// A file exists but is not a JSON object.
    #[error("invalid JSON in {}: {reason}", .path.display())]
    InvalidJson { path: PathBuf, reason: String },

    /// A required key path is absent from a JSON document.
    #[error("missing key `{key}` in {}", .path.display())]
    MissingKey { path: PathBuf, key: String },

    /// The subprocess did not exit within the allotted time.
    #[error("process did not exit within {timeout:?}")]
    SubprocessTimeout { timeout: Duration },

    /// The subprocess could not be spawned, exited non-zero, or replied
    /// without the expected content.
    #[error("{0}")]
    SubprocessFailure(String),

    /// The credentials document matches none of the known shapes.
    #[error("could not determine credential type in {}", .path.display())]
    UnknownCredentialVariant { path: PathBuf },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CheckError {
    pub(crate) fn missing_key(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self::MissingKey {
            path: path.into(),
            key: key.into(),
        }
    }
}

pub type CheckResult<T> = std::result::Result<T, CheckError>;
