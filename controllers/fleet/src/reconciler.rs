//! Fleet reconciliation.
//!
//! The reconciler periodically lists the clusters kind knows about and
//! converges the set of running instances onto that list: new clusters
//! get an instance, vanished clusters have theirs cancelled. It is the
//! only owner of the instance map.

use crate::error::ControllerError;
use crate::instance::InstanceHandle;
use crate::metrics::FleetMetrics;
use kind_client::KindClientTrait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Creates a running instance for one cluster.
#[async_trait::async_trait]
pub trait InstanceFactory: Send + Sync {
    /// Starts an instance whose token is a child of `token`.
    async fn create(&self, token: &CancellationToken, cluster: &str) -> Result<InstanceHandle, ControllerError>;
}

/// What one reconciliation cycle changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub started: Vec<String>,
    pub stopped: Vec<String>,
    pub failed: Vec<String>,
    /// Discovery failed; nothing was changed
    pub listing_failed: bool,
}

/// Converges running instances onto the discovered cluster set.
pub struct FleetReconciler<K, F> {
    kind: Arc<K>,
    factory: F,
    metrics: FleetMetrics,
    interval: Duration,
    instances: HashMap<String, InstanceHandle>,
    /// Listed clusters whose last launch failed
    failed: HashSet<String>,
}

impl<K: KindClientTrait, F: InstanceFactory> FleetReconciler<K, F> {
    /// Creates a reconciler with the default 30s interval.
    pub fn new(kind: Arc<K>, factory: F, metrics: FleetMetrics) -> Self {
        Self {
            kind,
            factory,
            metrics,
            interval: Duration::from_secs(30),
            instances: HashMap::new(),
            failed: HashSet::new(),
        }
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Clusters with a running instance, sorted
    pub fn managed_clusters(&self) -> Vec<&str> {
        let mut clusters: Vec<&str> = self.instances.keys().map(String::as_str).collect();
        clusters.sort_unstable();
        clusters
    }

    #[cfg(test)]
    pub fn instance(&self, cluster: &str) -> Option<&InstanceHandle> {
        self.instances.get(cluster)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Reconciles immediately, then every interval, until `token` is cancelled.
    ///
    /// Instances are children of `token`, so they stop along with the loop.
    pub async fn run(&mut self, token: &CancellationToken) {
        info!("Starting fleet reconciliation every {}s", self.interval.as_secs());

        loop {
            if token.is_cancelled() {
                break;
            }
            let report = self.reconcile_once(token).await;
            if report.listing_failed {
                warn!("Cluster listing failed; keeping {} running instance(s)", self.len());
            } else if !report.started.is_empty() || !report.stopped.is_empty() || !report.failed.is_empty() {
                info!(
                    "Reconciled fleet: {} started, {} stopped, {} failed, managing {:?}",
                    report.started.len(),
                    report.stopped.len(),
                    report.failed.len(),
                    self.managed_clusters()
                );
            }

            tokio::select! {
                () = token.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Stopping fleet reconciliation ({} instance(s) running)", self.len());
    }

    /// Runs a single reconciliation cycle.
    ///
    /// 1. List clusters; on failure log and change nothing
    /// 2. Start an instance for every listed cluster without one
    /// 3. Cancel and forget every instance whose cluster is no longer listed
    pub async fn reconcile_once(&mut self, token: &CancellationToken) -> CycleReport {
        let mut report = CycleReport::default();

        let listed = tokio::select! {
            () = token.cancelled() => return report,
            listed = self.kind.list_clusters() => listed,
        };
        let clusters: BTreeSet<String> = match listed {
            Ok(clusters) => clusters.into_iter().collect(),
            Err(e) => {
                warn!("Failed to list clusters: {}", e);
                self.metrics.inc_listing_errors();
                report.listing_failed = true;
                return report;
            }
        };
        debug!("Discovered {} cluster(s): {:?}", clusters.len(), clusters);

        let missing: Vec<&String> = clusters.iter().filter(|c| !self.instances.contains_key(*c)).collect();
        for cluster in missing {
            if token.is_cancelled() {
                return report;
            }

            info!("Creating controllers for cluster {}", cluster);
            match self.factory.create(token, cluster).await {
                Ok(handle) => {
                    info!(
                        "Controllers {:?} running for cluster {} via {} endpoint {}",
                        handle.controller_names(),
                        handle.cluster(),
                        handle.client().endpoint(),
                        handle.client().server()
                    );
                    self.failed.remove(cluster.as_str());
                    self.instances.insert(cluster.clone(), handle);
                    report.started.push(cluster.clone());
                }
                Err(e) if e.is_cancelled() => {
                    debug!("Startup of cluster {} interrupted by shutdown", cluster);
                    return report;
                }
                Err(e) => {
                    error!("Failed to start controllers for cluster {}: {}", cluster, e);
                    self.metrics.inc_launch_failures(cluster);
                    self.failed.insert(cluster.clone());
                    report.failed.push(cluster.clone());
                }
            }
        }

        let mut stale: Vec<String> = self
            .instances
            .keys()
            .filter(|cluster| !clusters.contains(*cluster))
            .cloned()
            .collect();
        stale.sort_unstable();
        for cluster in stale {
            if let Some(handle) = self.instances.remove(&cluster) {
                debug!(
                    "Cluster {} had {} service(s) and {} node(s) cached",
                    cluster,
                    handle.informers().services().state().len(),
                    handle.informers().nodes().state().len()
                );
                let finished = handle.finished_controllers();
                if !finished.is_empty() {
                    warn!("Controllers {:?} for cluster {} had already exited", finished, cluster);
                }
                info!(
                    "Stopping controllers for deleted cluster {} after {}s",
                    cluster,
                    handle.uptime().num_seconds()
                );
                handle.cancel();
                self.metrics.forget_cluster(&cluster);
                report.stopped.push(cluster);
            }
        }

        // Clusters that vanished before ever launching still own failure counters
        let vanished: Vec<String> = self.failed.iter().filter(|c| !clusters.contains(*c)).cloned().collect();
        for cluster in vanished {
            self.failed.remove(&cluster);
            self.metrics.forget_cluster(&cluster);
        }

        self.metrics.set_managed_clusters(self.len());
        self.metrics.inc_reconcile_cycles();
        report
    }
}
