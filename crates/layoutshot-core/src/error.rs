//! Error types for layoutshot.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure class visible at the process boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Launch,
    Navigation,
    Capture,
}

impl ErrorKind {
    /// Process exit code for this failure class. Success is 0.
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Config => 2,
            Self::Launch => 3,
            Self::Navigation => 4,
            Self::Capture => 5,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config => write!(f, "config"),
            Self::Launch => write!(f, "launch"),
            Self::Navigation => write!(f, "navigation"),
            Self::Capture => write!(f, "capture"),
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::Json(_) => ErrorKind::Config,
            Self::Launch(_) => ErrorKind::Launch,
            Self::Navigation(_) => ErrorKind::Navigation,
            Self::Capture(_) | Self::Write { .. } | Self::Protocol(_) | Self::Io(_) => {
                ErrorKind::Capture
            }
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.kind().exit_code()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
