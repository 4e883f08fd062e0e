//! Controller-specific error types.
//!
//! Every per-cluster failure is logged where it is detected and turned into
//! "this cluster has no instance yet"; only startup errors reach `main`.

use thiserror::Error;

/// Errors that can occur in the Fleet Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// HTTP client construction error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Kubeconfig could not be turned into a client configuration
    #[error("Invalid kubeconfig for cluster {cluster}: {reason}")]
    Kubeconfig {
        /// Cluster the kubeconfig belongs to
        cluster: String,
        /// Parse or conversion failure
        reason: String,
    },

    /// Neither endpoint variant produced a reachable apiserver
    #[error("No working administrative client for cluster {0}")]
    NoWorkingClient(String),

    /// Apiserver never reported ready within the readiness window
    #[error("Apiserver for cluster {cluster} not ready: {reason}")]
    NotReady {
        /// Cluster that was being waited on
        cluster: String,
        /// Timeout or last observed state
        reason: String,
    },

    /// The process is shutting down
    #[error("Operation cancelled")]
    Cancelled,

    /// A delegated controller could not be constructed
    #[error("Failed to build {controller} controller for cluster {cluster}: {reason}")]
    ControllerInit {
        /// Controller name
        controller: &'static str,
        /// Cluster the instance belongs to
        cluster: String,
        /// Construction failure
        reason: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Metrics/probe server error
    #[error("Server error: {0}")]
    Server(String),
}

impl ControllerError {
    /// Whether the error is only the shutdown signal propagating upwards
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
