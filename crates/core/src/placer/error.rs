//! Error types for the placer module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during file placement.
#[derive(Debug, Error)]
pub enum PlacerError {
    /// Source file not found.
    #[error("Source file not found: {path}")]
    SourceNotFound { path: PathBuf },

    /// Destination holds a different file.
    #[error("Destination already exists with different content: {path}")]
    DestinationConflict { path: PathBuf },

    /// Failed to create destination directory.
    #[error("Failed to create directory: {path}")]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to copy file.
    #[error("Failed to copy file from {source} to {destination}")]
    CopyFailed {
        source: PathBuf,
        destination: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// Failed to move/rename file.
    #[error("Failed to move file from {source} to {destination}")]
    MoveFailed {
        source: PathBuf,
        destination: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// Failed to calculate checksum.
    #[error("Failed to calculate checksum for {path}")]
    ChecksumCalculationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Rollback after a failed placement did not complete.
    #[error("Rollback failed: {reason}")]
    RollbackFailed { reason: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlacerError {
    pub fn copy_failed(source: PathBuf, destination: PathBuf, error: std::io::Error) -> Self {
        PlacerError::CopyFailed {
            source,
            destination,
            error,
        }
    }

    pub fn move_failed(source: PathBuf, destination: PathBuf, error: std::io::Error) -> Self {
        PlacerError::MoveFailed {
            source,
            destination,
            error,
        }
    }
}
