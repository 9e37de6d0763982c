// ABOUTME: Errors from reading and writing per-application state files.
// ABOUTME: Every variant names the path involved.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("app {0} does not exist")]
    UnknownApp(String),

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{} does not contain a valid port: {value:?}", .path.display())]
    InvalidPort { path: PathBuf, value: String },
}

impl RegistryError {
    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RegistryError::Read {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RegistryError::Write {
            path: path.into(),
            source,
        }
    }
}
