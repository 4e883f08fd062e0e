//! A running per-cluster controller instance.

use crate::bootstrap::AdminClient;
use crate::informers::SharedInformers;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A delegated controller task spawned for an instance
#[derive(Debug)]
pub struct RunningController {
    name: &'static str,
    task: JoinHandle<()>,
}

impl RunningController {
    pub fn new(name: &'static str, task: JoinHandle<()>) -> Self {
        Self { name, task }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the controller task has returned
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Everything that runs on behalf of one cluster.
///
/// The handle owns the instance's cancellation token. Cancelling consumes
/// the handle, so an instance is stopped at most once and cannot be
/// observed afterwards.
#[derive(Debug)]
pub struct InstanceHandle {
    cluster: String,
    token: CancellationToken,
    client: AdminClient,
    informers: SharedInformers,
    controllers: Vec<RunningController>,
    started_at: DateTime<Utc>,
}

impl InstanceHandle {
    /// Wraps an instance whose tasks are already running under `token`.
    pub fn new(
        cluster: impl Into<String>,
        token: CancellationToken,
        client: AdminClient,
        informers: SharedInformers,
        controllers: Vec<RunningController>,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            token,
            client,
            informers,
            controllers,
            started_at: Utc::now(),
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn client(&self) -> &AdminClient {
        &self.client
    }

    pub fn informers(&self) -> &SharedInformers {
        &self.informers
    }

    /// Names of the delegated controllers, in start order
    pub fn controller_names(&self) -> Vec<&'static str> {
        self.controllers.iter().map(RunningController::name).collect()
    }

    /// Controllers whose task has already returned
    pub fn finished_controllers(&self) -> Vec<&'static str> {
        self.controllers
            .iter()
            .filter(|c| c.is_finished())
            .map(RunningController::name)
            .collect()
    }

    /// Time since the instance was started
    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }

    /// Whether the instance's token has fired, either directly or via its parent
    #[cfg(test)]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signals every task of the instance to stop. Returns immediately;
    /// the tasks wind down on their own.
    pub fn cancel(self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::offline_client;

    #[tokio::test]
    async fn test_cancel_stops_controller_tasks() {
        let token = CancellationToken::new();
        let client = offline_client("alpha");
        let informers = SharedInformers::new(client.kube().clone());
        let child = token.clone();
        let task = tokio::spawn(async move { child.cancelled().await });
        let handle = InstanceHandle::new(
            "alpha",
            token.clone(),
            client,
            informers,
            vec![RunningController::new("service", task)],
        );

        assert_eq!(handle.cluster(), "alpha");
        assert_eq!(handle.controller_names(), vec!["service"]);
        assert!(!handle.is_cancelled());
        assert!(handle.uptime() >= chrono::Duration::zero());

        handle.cancel();

        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_parent_cancellation_is_visible() {
        let parent = CancellationToken::new();
        let client = offline_client("beta");
        let informers = SharedInformers::new(client.kube().clone());
        let handle = InstanceHandle::new("beta", parent.child_token(), client, informers, Vec::new());

        parent.cancel();

        assert!(handle.is_cancelled());
    }
}
