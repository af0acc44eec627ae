//! Error types for the monitor.
//!
//! Configuration and capture errors are fatal to a session. Log I/O errors are
//! recovered locally by the session and turned into warnings.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Top-level error for every fallible monitor operation.
#[derive(Error, Debug, Clone)]
pub enum MonitorError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("log I/O error: {0}")]
    LogIo(#[from] LogIoError),

    /// The worker thread panicked or was cancelled before reporting a result.
    #[error("monitor worker failed: {0}")]
    Worker(String),
}

impl MonitorError {
    /// Whether the monitoring loop may continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MonitorError::LogIo(_))
    }
}

/// Missing or malformed configuration. Fatal to session start.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("border file not found: {}", path.display())]
    MissingBorderFile { path: PathBuf },

    #[error("border file {} is malformed: {reason}", path.display())]
    MalformedBorderFile { path: PathBuf, reason: String },

    #[error("border file {} contains no contours", path.display())]
    NoContours { path: PathBuf },

    #[error("border rectangle must have positive size, got {w}x{h}")]
    InvalidBorder { w: i64, h: i64 },

    #[error("grid layout must have at least one row and column, got {rows}x{cols}")]
    InvalidLayout { rows: usize, cols: usize },

    #[error("monitor config {} is malformed: {reason}", path.display())]
    MalformedConfig { path: PathBuf, reason: String },
}

/// Frame acquisition failures. Fatal to the running session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("could not open a frame source on device indices {tried:?}: {reason}")]
    OpenFailed { tried: Vec<u32>, reason: String },

    #[error("frame source {} is unavailable: {reason}", path.display())]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("frame read failed: {0}")]
    ReadFailed(String),
}

/// Segment file failures. Never stop the monitoring loop.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LogIoError {
    #[error("could not create log directory {}: {reason}", path.display())]
    CreateDir { path: PathBuf, reason: String },

    #[error("could not read segment {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("segment {} is not valid JSON: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("could not write segment {}: {reason}", path.display())]
    Write { path: PathBuf, reason: String },
}
