//! Per-cluster instance launcher.
//!
//! Given a working admin client, waits for the apiserver to report healthy,
//! then constructs and starts the cluster's delegated controllers under a
//! cancellation token of their own.

use crate::backoff::{RetryError, RetryPolicy, retry_until};
use crate::bootstrap::AdminClient;
use crate::delegated::{ControllerBuilder, ControllerContext, DelegatedController};
use crate::error::ControllerError;
use crate::features::FeatureGates;
use crate::informers::SharedInformers;
use crate::instance::{InstanceHandle, RunningController};
use crate::metrics::FleetMetrics;
use kube::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Apiserver health endpoint polled before controllers start
pub const READINESS_PATH: &str = "/healthz";

/// Starts delegated controllers for a cluster.
pub struct Launcher {
    builders: Vec<Arc<dyn ControllerBuilder>>,
    metrics: FleetMetrics,
    features: FeatureGates,
    workers: usize,
    resync: Duration,
    readiness: RetryPolicy,
}

impl Launcher {
    /// Creates a launcher with 5 service workers, a 30s resync and the
    /// standard 30s readiness window.
    pub fn new(builders: Vec<Arc<dyn ControllerBuilder>>, metrics: FleetMetrics, features: FeatureGates) -> Self {
        Self {
            builders,
            metrics,
            features,
            workers: 5,
            resync: Duration::from_secs(30),
            readiness: RetryPolicy::readiness(),
        }
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_resync(mut self, resync: Duration) -> Self {
        self.resync = resync;
        self
    }

    #[must_use]
    pub fn with_readiness_policy(mut self, policy: RetryPolicy) -> Self {
        self.readiness = policy;
        self
    }

    /// Waits for the apiserver, then starts the instance under a child of `parent`.
    pub async fn launch(
        &self,
        parent: &CancellationToken,
        cluster: &str,
        client: AdminClient,
    ) -> Result<InstanceHandle, ControllerError> {
        self.wait_ready(parent, cluster, &client).await?;
        self.start(parent, cluster, client)
    }

    /// Polls `GET /healthz` until it answers `ok`.
    pub async fn wait_ready(
        &self,
        token: &CancellationToken,
        cluster: &str,
        client: &AdminClient,
    ) -> Result<(), ControllerError> {
        match retry_until(&self.readiness, token, |_| apiserver_ready(client.kube())).await {
            Ok(attempts) => {
                debug!("Apiserver for cluster {} ready after {} check(s)", cluster, attempts);
                Ok(())
            }
            Err(RetryError::Cancelled) => Err(ControllerError::Cancelled),
            Err(e) => Err(ControllerError::NotReady {
                cluster: cluster.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Builds every controller and starts the instance.
    ///
    /// Builders run in order; if one fails the instance token is cancelled,
    /// which stops the controllers already started, and the error is returned.
    pub fn start(
        &self,
        parent: &CancellationToken,
        cluster: &str,
        client: AdminClient,
    ) -> Result<InstanceHandle, ControllerError> {
        let token = parent.child_token();
        let mut informers = SharedInformers::new(client.kube().clone());
        let cluster_metrics = self.metrics.for_cluster(cluster).until(token.clone());
        let mut controllers = Vec::with_capacity(self.builders.len());

        for builder in &self.builders {
            let ctx = ControllerContext {
                cluster,
                client: &client,
                informers: &informers,
                metrics: &cluster_metrics,
                features: &self.features,
                resync: self.resync,
            };

            let controller: Box<dyn DelegatedController> = match builder.build(&ctx) {
                Ok(controller) => controller,
                Err(e) => {
                    error!("Failed to build {} controller for cluster {}: {}", builder.name(), cluster, e);
                    token.cancel();
                    return Err(match e {
                        ControllerError::ControllerInit { .. } => e,
                        other => ControllerError::ControllerInit {
                            controller: builder.name(),
                            cluster: cluster.to_string(),
                            reason: other.to_string(),
                        },
                    });
                }
            };

            let name = controller.name();
            let task = tokio::spawn(controller.run(token.clone(), self.workers, cluster_metrics.clone()));
            info!("Started {} controller for cluster {}", name, cluster);
            controllers.push(RunningController::new(name, task));
        }

        informers.start(&token);

        Ok(InstanceHandle::new(cluster, token, client, informers, controllers))
    }
}

/// Whether the apiserver's health endpoint answers `ok`
async fn apiserver_ready(client: &Client) -> bool {
    let request = match http::Request::get(READINESS_PATH).body(Vec::new()) {
        Ok(request) => request,
        Err(e) => {
            error!("Failed to build readiness request: {}", e);
            return false;
        }
    };

    match client.request_text(request).await {
        Ok(body) => body.trim() == "ok",
        Err(e) => {
            debug!("Apiserver not ready yet: {}", e);
            false
        }
    }
}
