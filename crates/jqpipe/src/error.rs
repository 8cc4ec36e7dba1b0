//! Error types for jqpipe operations.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// The error type for jqpipe operations.
///
/// Failures inside the background pipe writers are deliberately absent: once
/// the query process is running, its exit status decides the outcome and
/// writer failures are only logged.
#[derive(Debug, Error)]
pub enum Error {
    /// `build` was called before any filter was registered.
    #[error("no filter provided")]
    NoFilter,

    /// `build` was called with neither raw inputs nor input paths.
    #[error("no input files provided")]
    NoInputs,

    /// The staging path exists but is not a directory.
    #[error("path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Creating the staging directory, placeholder file, or FIFO failed.
    #[error("failed to stage pipe at {}: {source}", path.display())]
    Staging {
        /// The path being created.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// `execute` was called on a runner that has already run.
    #[error("cannot execute more than once")]
    AlreadyExecuted,

    /// The query program could not be found on the search path.
    #[error("program not found: {0}")]
    ProgramNotFound(String),

    /// The query program could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// The program that failed to start.
        program: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The query program exited unsuccessfully.
    #[error("{}", exited_message(.status, .stderr))]
    Exited {
        /// Exit status reported by the operating system.
        status: ExitStatus,
        /// Everything the program wrote to standard error.
        stderr: String,
    },

    /// Settings file could not be parsed or written.
    #[error("Settings error: {0}")]
    Settings(String),

    /// JSON decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn exited_message(status: &ExitStatus, stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("query process failed: {status}")
    } else {
        format!("query process failed: {status}: {stderr}")
    }
}

impl Error {
    /// Returns the child's standard error text when the process ran and failed.
    #[must_use]
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::Exited { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

/// A specialized Result type for jqpipe operations.
pub type Result<T> = std::result::Result<T, Error>;
