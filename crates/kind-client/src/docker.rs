//! Docker CLI client
//!
//! Only the two operations the shutdown sweep needs: find labelled
//! containers and force-remove them.

use crate::common::{non_empty_lines, run_command};
use crate::error::KindError;
use crate::kind_trait::DockerClientTrait;
use tracing::debug;

/// Docker CLI client
#[derive(Debug, Clone)]
pub struct DockerClient {
    binary: String,
}

impl DockerClient {
    /// Create a new Docker client
    ///
    /// # Arguments
    /// * `binary` - Path or name of the container CLI (e.g., "docker" or "podman")
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Get the binary this client invokes
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// List IDs of all containers carrying `label`, including stopped ones
    pub async fn list_containers_by_label(&self, label: &str) -> Result<Vec<String>, KindError> {
        let filter = format!("label={}", label);
        let stdout = run_command(&self.binary, &["ps", "-a", "-q", "--filter", &filter]).await?;
        let ids = non_empty_lines(&stdout);
        debug!("Found {} container(s) labelled {}", ids.len(), label);
        Ok(ids)
    }

    /// Force-remove a container (stopping it first if needed)
    pub async fn delete_container(&self, id: &str) -> Result<(), KindError> {
        run_command(&self.binary, &["rm", "-f", id]).await?;
        debug!("Removed container {}", id);
        Ok(())
    }
}

impl Default for DockerClient {
    fn default() -> Self {
        Self::new("docker")
    }
}

#[async_trait::async_trait]
impl DockerClientTrait for DockerClient {
    async fn list_containers_by_label(&self, label: &str) -> Result<Vec<String>, KindError> {
        DockerClient::list_containers_by_label(self, label).await
    }

    async fn delete_container(&self, id: &str) -> Result<(), KindError> {
        DockerClient::delete_container(self, id).await
    }
}
