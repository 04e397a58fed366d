use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error during {operation} of {path}: {source}")]
    Io {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid content hash {hash:?}: expected at least two characters of [A-Za-z0-9_-]")]
    InvalidHash { hash: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl CacheError {
    pub(crate) fn io(
        source: std::io::Error,
        path: impl Into<PathBuf>,
        operation: &'static str,
    ) -> Self {
        Self::Io {
            path: path.into(),
            operation,
            source,
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}

impl From<bincode::Error> for CacheError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for CacheError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Config {
            message: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
