//! Error types for solidq.
//!
//! An empty channel is not an error: pops return `None` or an empty `Vec`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Empty channel or id, reserved channel name, unsafe tenant name.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("database is not open")]
    NotOpen,

    /// Another handle (in this or another process) holds the file.
    #[error("database is locked by another handle: {}", .0.display())]
    Locked(PathBuf),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unauthorized")]
    Unauthorized,

    #[error("server is paused")]
    Paused,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Validation failures are caller misconfiguration; retrying cannot fix them.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
