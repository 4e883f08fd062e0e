//! Mock kind/Docker client for unit testing
//!
//! Stores clusters, kubeconfigs and containers in memory and records the
//! calls made against it, so controller tests can assert on ordering without
//! a container runtime.

use crate::error::KindError;
use crate::kind_trait::{DockerClientTrait, KindClientTrait};
use crate::models::KubeconfigEndpoint;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// Mock kind/Docker client for testing
///
/// Cloning shares the underlying state, so a test can keep one clone for
/// setup and assertions while the code under test owns another.
#[derive(Clone, Default)]
pub struct MockKindClient {
    pub(crate) clusters: Arc<Mutex<Vec<String>>>,
    pub(crate) list_error: Arc<Mutex<Option<String>>>,
    pub(crate) kubeconfigs: Arc<Mutex<HashMap<(String, KubeconfigEndpoint), String>>>,
    pub(crate) kubeconfig_calls: Arc<Mutex<Vec<(String, KubeconfigEndpoint)>>>,
    pub(crate) containers: Arc<Mutex<Vec<String>>>,
    pub(crate) container_list_error: Arc<Mutex<Option<String>>>,
    pub(crate) label_queries: Arc<Mutex<Vec<String>>>,
    pub(crate) failing_deletes: Arc<Mutex<HashSet<String>>>,
    pub(crate) deleted: Arc<Mutex<Vec<String>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl MockKindClient {
    /// Create a new, empty mock client
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the set of clusters returned by `list_clusters` (for test setup)
    pub fn set_clusters<I, S>(&self, clusters: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *lock(&self.clusters) = clusters.into_iter().map(Into::into).collect();
    }

    /// Make `list_clusters` fail until cleared with `None` (for test setup)
    pub fn set_list_error(&self, error: Option<&str>) {
        *lock(&self.list_error) = error.map(ToString::to_string);
    }

    /// Register a kubeconfig for a cluster/endpoint pair (for test setup)
    pub fn set_kubeconfig(&self, cluster: &str, endpoint: KubeconfigEndpoint, kubeconfig: impl Into<String>) {
        lock(&self.kubeconfigs).insert((cluster.to_string(), endpoint), kubeconfig.into());
    }

    /// Every `get_kubeconfig` call made so far, in order
    pub fn kubeconfig_calls(&self) -> Vec<(String, KubeconfigEndpoint)> {
        lock(&self.kubeconfig_calls).clone()
    }

    /// Add a labelled container (for test setup)
    pub fn add_container(&self, id: impl Into<String>) {
        lock(&self.containers).push(id.into());
    }

    /// Make `list_containers_by_label` fail (for test setup)
    pub fn set_container_list_error(&self, error: Option<&str>) {
        *lock(&self.container_list_error) = error.map(ToString::to_string);
    }

    /// Make deleting the given container fail (for test setup)
    pub fn fail_delete(&self, id: impl Into<String>) {
        lock(&self.failing_deletes).insert(id.into());
    }

    /// Label keys passed to `list_containers_by_label`, in order
    pub fn label_queries(&self) -> Vec<String> {
        lock(&self.label_queries).clone()
    }

    /// IDs of containers removed so far, in order
    pub fn deleted(&self) -> Vec<String> {
        lock(&self.deleted).clone()
    }

    /// IDs of containers still present
    pub fn containers(&self) -> Vec<String> {
        lock(&self.containers).clone()
    }
}

#[async_trait::async_trait]
impl KindClientTrait for MockKindClient {
    async fn list_clusters(&self) -> Result<Vec<String>, KindError> {
        if let Some(reason) = lock(&self.list_error).clone() {
            return Err(KindError::CommandFailed {
                command: "kind get clusters".to_string(),
                status: "exit status: 1".to_string(),
                stderr: reason,
            });
        }
        Ok(lock(&self.clusters).clone())
    }

    async fn get_kubeconfig(&self, cluster: &str, endpoint: KubeconfigEndpoint) -> Result<String, KindError> {
        lock(&self.kubeconfig_calls).push((cluster.to_string(), endpoint));
        lock(&self.kubeconfigs)
            .get(&(cluster.to_string(), endpoint))
            .cloned()
            .ok_or_else(|| KindError::NotFound(cluster.to_string()))
    }
}

#[async_trait::async_trait]
impl DockerClientTrait for MockKindClient {
    async fn list_containers_by_label(&self, label: &str) -> Result<Vec<String>, KindError> {
        lock(&self.label_queries).push(label.to_string());
        if let Some(reason) = lock(&self.container_list_error).clone() {
            return Err(KindError::CommandFailed {
                command: "docker ps".to_string(),
                status: "exit status: 1".to_string(),
                stderr: reason,
            });
        }
        Ok(lock(&self.containers).clone())
    }

    async fn delete_container(&self, id: &str) -> Result<(), KindError> {
        if lock(&self.failing_deletes).contains(id) {
            return Err(KindError::CommandFailed {
                command: format!("docker rm -f {}", id),
                status: "exit status: 1".to_string(),
                stderr: format!("Error response from daemon: could not kill container {}", id),
            });
        }
        lock(&self.containers).retain(|c| c != id);
        lock(&self.deleted).push(id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_list_and_error() {
        let mock = MockKindClient::new();
        mock.set_clusters(["a", "b"]);
        assert_eq!(mock.list_clusters().await.unwrap(), vec!["a", "b"]);

        mock.set_list_error(Some("docker daemon unavailable"));
        assert!(mock.list_clusters().await.is_err());

        mock.set_list_error(None);
        assert_eq!(mock.list_clusters().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_records_kubeconfig_calls() {
        let mock = MockKindClient::new();
        mock.set_kubeconfig("a", KubeconfigEndpoint::Internal, "apiVersion: v1");

        assert!(mock.get_kubeconfig("a", KubeconfigEndpoint::External).await.is_err());
        assert_eq!(
            mock.get_kubeconfig("a", KubeconfigEndpoint::Internal).await.unwrap(),
            "apiVersion: v1"
        );
        assert_eq!(
            mock.kubeconfig_calls(),
            vec![
                ("a".to_string(), KubeconfigEndpoint::External),
                ("a".to_string(), KubeconfigEndpoint::Internal),
            ]
        );
    }

    #[tokio::test]
    async fn test_mock_delete_failure_keeps_container() {
        let mock = MockKindClient::new();
        mock.add_container("c1");
        mock.add_container("c2");
        mock.fail_delete("c1");

        assert!(mock.delete_container("c1").await.is_err());
        mock.delete_container("c2").await.unwrap();

        assert_eq!(mock.containers(), vec!["c1"]);
        assert_eq!(mock.deleted(), vec!["c2"]);
    }
}
