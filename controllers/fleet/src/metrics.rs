//! Prometheus metrics for the fleet and its per-cluster controllers.

use crate::error::ControllerError;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

/// Controllers that have written series, keyed by cluster
type Written = Arc<Mutex<BTreeMap<String, BTreeSet<String>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fleet-wide metrics, cheap to clone.
#[derive(Clone)]
pub struct FleetMetrics {
    registry: Registry,
    managed_clusters: IntGauge,
    reconcile_cycles: IntCounter,
    listing_errors: IntCounter,
    launch_failures: IntCounterVec,
    controller_syncs: IntCounterVec,
    controller_objects: IntGaugeVec,
    written: Written,
}

impl FleetMetrics {
    /// Creates the metrics on a fresh registry.
    pub fn new() -> Result<Self, ControllerError> {
        let registry = Registry::new();

        let managed_clusters = IntGauge::new("fleet_managed_clusters", "Clusters with a running controller instance")?;
        let reconcile_cycles = IntCounter::new("fleet_reconcile_cycles_total", "Completed reconciliation cycles")?;
        let listing_errors = IntCounter::new("fleet_listing_errors_total", "Failed cluster discovery listings")?;
        let launch_failures = IntCounterVec::new(
            Opts::new("fleet_launch_failures_total", "Failed attempts to start a cluster instance"),
            &["cluster"],
        )?;
        let controller_syncs = IntCounterVec::new(
            Opts::new("fleet_controller_syncs_total", "Resync passes completed by delegated controllers"),
            &["cluster", "controller"],
        )?;
        let controller_objects = IntGaugeVec::new(
            Opts::new("fleet_controller_objects", "Objects managed by a delegated controller at its last resync"),
            &["cluster", "controller"],
        )?;

        registry.register(Box::new(managed_clusters.clone()))?;
        registry.register(Box::new(reconcile_cycles.clone()))?;
        registry.register(Box::new(listing_errors.clone()))?;
        registry.register(Box::new(launch_failures.clone()))?;
        registry.register(Box::new(controller_syncs.clone()))?;
        registry.register(Box::new(controller_objects.clone()))?;

        Ok(Self {
            registry,
            managed_clusters,
            reconcile_cycles,
            listing_errors,
            launch_failures,
            controller_syncs,
            controller_objects,
            written: Arc::default(),
        })
    }

    /// Metrics sink scoped to one cluster's delegated controllers
    pub fn for_cluster(&self, cluster: &str) -> ClusterMetrics {
        ClusterMetrics {
            cluster: cluster.to_string(),
            syncs: self.controller_syncs.clone(),
            objects: self.controller_objects.clone(),
            written: Arc::clone(&self.written),
            stopped: None,
        }
    }

    /// Drops every series labelled with `cluster`.
    ///
    /// Called once the cluster's instance is gone so deleted clusters stop
    /// being exported.
    pub fn forget_cluster(&self, cluster: &str) {
        let controllers = lock(&self.written).remove(cluster).unwrap_or_default();
        for controller in &controllers {
            // A controller may have set its gauge without ever completing a sync
            let _ = self.controller_syncs.remove_label_values(&[cluster, controller.as_str()]);
            let _ = self.controller_objects.remove_label_values(&[cluster, controller.as_str()]);
        }
        let _ = self.launch_failures.remove_label_values(&[cluster]);
    }

    pub(crate) fn set_managed_clusters(&self, count: usize) {
        self.managed_clusters.set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    pub(crate) fn inc_reconcile_cycles(&self) {
        self.reconcile_cycles.inc();
    }

    pub(crate) fn inc_listing_errors(&self) {
        self.listing_errors.inc();
    }

    pub(crate) fn inc_launch_failures(&self, cluster: &str) {
        self.launch_failures.with_label_values(&[cluster]).inc();
    }

    /// Renders all metrics in the Prometheus text exposition format.
    pub fn export(&self) -> Result<String, ControllerError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Per-cluster metrics sink handed to delegated controllers.
#[derive(Clone)]
pub struct ClusterMetrics {
    cluster: String,
    syncs: IntCounterVec,
    objects: IntGaugeVec,
    written: Written,
    stopped: Option<CancellationToken>,
}

impl ClusterMetrics {
    /// Ignores writes once `token` is cancelled, so a controller winding
    /// down cannot recreate series for a forgotten cluster.
    #[must_use]
    pub fn until(mut self, token: CancellationToken) -> Self {
        self.stopped = Some(token);
        self
    }

    /// Counts one completed resync pass
    pub fn record_sync(&self, controller: &str) {
        if self.mark_written(controller) {
            self.syncs.with_label_values(&[self.cluster.as_str(), controller]).inc();
        }
    }

    /// Records how many objects the controller manages right now
    pub fn set_objects(&self, controller: &str, count: usize) {
        if self.mark_written(controller) {
            self.objects
                .with_label_values(&[self.cluster.as_str(), controller])
                .set(i64::try_from(count).unwrap_or(i64::MAX));
        }
    }

    fn mark_written(&self, controller: &str) -> bool {
        if self.stopped.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return false;
        }
        lock(&self.written)
            .entry(self.cluster.clone())
            .or_default()
            .insert(controller.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_contains_fleet_metrics() {
        let metrics = FleetMetrics::new().unwrap();
        metrics.set_managed_clusters(2);
        metrics.inc_reconcile_cycles();
        metrics.inc_listing_errors();
        metrics.inc_launch_failures("alpha");

        let output = metrics.export().unwrap();

        assert!(output.contains("fleet_managed_clusters 2"));
        assert!(output.contains("fleet_reconcile_cycles_total 1"));
        assert!(output.contains("fleet_listing_errors_total 1"));
        assert!(output.contains("fleet_launch_failures_total{cluster=\"alpha\"} 1"));
    }

    #[test]
    fn test_cluster_sink_is_labelled() {
        let metrics = FleetMetrics::new().unwrap();
        let sink = metrics.for_cluster("beta");
        sink.record_sync("service");
        sink.record_sync("service");
        sink.set_objects("node", 3);

        let output = metrics.export().unwrap();

        assert!(output.contains("fleet_controller_syncs_total{cluster=\"beta\",controller=\"service\"} 2"));
        assert!(output.contains("fleet_controller_objects{cluster=\"beta\",controller=\"node\"} 3"));
    }

    #[test]
    fn test_forget_cluster_drops_its_series() {
        let metrics = FleetMetrics::new().unwrap();
        let gone = metrics.for_cluster("gone");
        gone.set_objects("service", 3);
        gone.record_sync("service");
        gone.set_objects("node", 1);
        metrics.inc_launch_failures("gone");
        metrics.for_cluster("kept").record_sync("service");

        metrics.forget_cluster("gone");

        let output = metrics.export().unwrap();
        assert!(!output.contains("cluster=\"gone\""), "{output}");
        assert!(output.contains("fleet_controller_syncs_total{cluster=\"kept\",controller=\"service\"} 1"));
        // Forgetting twice is harmless
        metrics.forget_cluster("gone");
    }

    #[test]
    fn test_sink_ignores_writes_after_stop() {
        let metrics = FleetMetrics::new().unwrap();
        let token = CancellationToken::new();
        let sink = metrics.for_cluster("alpha").until(token.clone());
        sink.set_objects("node", 2);

        token.cancel();
        metrics.forget_cluster("alpha");
        sink.set_objects("node", 5);
        sink.record_sync("node");

        assert!(!metrics.export().unwrap().contains("cluster=\"alpha\""));
    }
}
