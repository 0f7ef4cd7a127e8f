//! Error types for the file streaming service.

use std::path::PathBuf;

use thiserror::Error;

use crate::multiplexer::FrameKind;

/// The main error type for filewatch operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors outside of the tailed source (page reads, demo writes, binding).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File watching errors from the notify crate.
    #[error("File watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// The source file could not be opened.
    #[error("Cannot open source {}: {source}", path.display())]
    SourceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading the active source failed after streaming started.
    #[error("Cannot read source {}: {source}", path.display())]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A frame could not be written before its deadline.
    #[error("Write of {frame} frame timed out")]
    WriteTimeout { frame: FrameKind },

    /// WebSocket transport failure on read or write.
    #[error("Transport error: {0}")]
    Transport(#[from] axum::Error),

    /// Rejected configuration.
    #[error("Invalid configuration: {message}")]
    Config { message: String },
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }
}

/// A convenient Result type for filewatch operations.
pub type Result<T> = std::result::Result<T, Error>;
