//! Client traits for mocking
//!
//! These traits abstract the `kind` and `docker` command-line clients so the
//! fleet controller can be unit tested without either binary installed.

use crate::error::KindError;
use crate::models::KubeconfigEndpoint;

/// Cluster discovery operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait KindClientTrait: Send + Sync {
    /// List the names of all live clusters
    async fn list_clusters(&self) -> Result<Vec<String>, KindError>;

    /// Render the kubeconfig for a cluster, pointing at the requested endpoint
    async fn get_kubeconfig(&self, cluster: &str, endpoint: KubeconfigEndpoint) -> Result<String, KindError>;
}

/// Container operations needed by the shutdown sweep
#[async_trait::async_trait]
pub trait DockerClientTrait: Send + Sync {
    /// List IDs of all containers (running or not) carrying the label key
    async fn list_containers_by_label(&self, label: &str) -> Result<Vec<String>, KindError>;

    /// Force-remove a container
    async fn delete_container(&self, id: &str) -> Result<(), KindError>;
}
