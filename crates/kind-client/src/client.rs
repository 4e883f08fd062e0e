//! kind CLI client
//!
//! Discovers clusters and renders their kubeconfigs by shelling out to the
//! `kind` binary, the same way a user would from a terminal.

use crate::common::{non_empty_lines, run_command};
use crate::error::KindError;
use crate::kind_trait::KindClientTrait;
use crate::models::KubeconfigEndpoint;
use tracing::debug;

/// stderr fragment kind prints when asked about a cluster with no nodes
const NO_NODES_MARKER: &str = "could not locate any control plane nodes";

/// kind CLI client
#[derive(Debug, Clone)]
pub struct KindClient {
    binary: String,
}

impl KindClient {
    /// Create a new kind client
    ///
    /// # Arguments
    /// * `binary` - Path or name of the `kind` executable (e.g., "kind")
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Get the binary this client invokes
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// List all kind clusters.
    ///
    /// kind reports "No kind clusters found." on stderr with a zero exit
    /// status, so an empty stdout is an empty list rather than an error.
    pub async fn list_clusters(&self) -> Result<Vec<String>, KindError> {
        let stdout = run_command(&self.binary, &["get", "clusters"]).await?;
        let clusters = non_empty_lines(&stdout);
        debug!("kind reported {} cluster(s)", clusters.len());
        Ok(clusters)
    }

    /// Render the kubeconfig for a cluster.
    ///
    /// # Arguments
    /// * `cluster` - kind cluster name
    /// * `endpoint` - Whether the server address should be the host-mapped
    ///   port or the control-plane container address
    ///
    /// # Returns
    /// * `Ok(String)` - Kubeconfig YAML
    /// * `Err(KindError::NotFound)` - If kind has no nodes for the cluster
    pub async fn get_kubeconfig(
        &self,
        cluster: &str,
        endpoint: KubeconfigEndpoint,
    ) -> Result<String, KindError> {
        let mut args = vec!["get", "kubeconfig", "--name", cluster];
        if endpoint.is_internal() {
            args.push("--internal");
        }

        let kubeconfig = run_command(&self.binary, &args).await.map_err(|e| match e {
            KindError::CommandFailed { ref stderr, .. } if stderr.contains(NO_NODES_MARKER) => {
                KindError::NotFound(cluster.to_string())
            }
            other => other,
        })?;

        if kubeconfig.trim().is_empty() {
            return Err(KindError::InvalidOutput {
                command: format!("{} {}", self.binary, args.join(" ")),
                reason: "empty kubeconfig".to_string(),
            });
        }

        Ok(kubeconfig)
    }
}

impl Default for KindClient {
    fn default() -> Self {
        Self::new("kind")
    }
}

#[async_trait::async_trait]
impl KindClientTrait for KindClient {
    async fn list_clusters(&self) -> Result<Vec<String>, KindError> {
        KindClient::list_clusters(self).await
    }

    async fn get_kubeconfig(&self, cluster: &str, endpoint: KubeconfigEndpoint) -> Result<String, KindError> {
        KindClient::get_kubeconfig(self, cluster, endpoint).await
    }
}
