//! kind/Docker client errors

use thiserror::Error;

/// Errors that can occur when shelling out to `kind` or `docker`
#[derive(Debug, Error)]
pub enum KindError {
    /// The binary could not be spawned or its pipes failed
    #[error("IO error running {command}: {source}")]
    Io {
        /// Command line that was attempted
        command: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The command ran but exited unsuccessfully
    #[error("{command} failed ({status}): {stderr}")]
    CommandFailed {
        /// Command line that was run
        command: String,
        /// Exit status as reported by the OS
        status: String,
        /// Captured standard error, trimmed
        stderr: String,
    },

    /// The command produced output that could not be interpreted
    #[error("Invalid output from {command}: {reason}")]
    InvalidOutput {
        /// Command line that was run
        command: String,
        /// What was wrong with the output
        reason: String,
    },

    /// Requested cluster does not exist
    #[error("Cluster not found: {0}")]
    NotFound(String),
}
