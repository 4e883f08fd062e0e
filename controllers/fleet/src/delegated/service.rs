//! Service controller.
//!
//! Tracks Services of type `LoadBalancer`, the nodes eligible to back
//! them and their ready endpoints. kind has no cloud load balancer, so the
//! controller reports what a provider would have to program rather than
//! programming anything.

use super::{ControllerBuilder, ControllerContext, DelegatedController, wait_for_cache};
use crate::error::ControllerError;
use crate::features::STABLE_LOAD_BALANCER_NODE_SET;
use crate::metrics::ClusterMetrics;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Node, Service};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use kube_runtime::reflector::Store;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const NAME: &str = "service";

/// Nodes carrying this label never back a load balancer when
/// `StableLoadBalancerNodeSet` is enabled.
pub const EXCLUDE_FROM_LB_LABEL: &str = "node.kubernetes.io/exclude-from-external-load-balancers";

/// Label tying an EndpointSlice to its Service
const SERVICE_NAME_LABEL: &str = "kubernetes.io/service-name";

/// Builds [`ServiceController`]s.
pub struct ServiceControllerBuilder;

impl ControllerBuilder for ServiceControllerBuilder {
    fn name(&self) -> &'static str {
        NAME
    }

    fn build(&self, ctx: &ControllerContext<'_>) -> Result<Box<dyn DelegatedController>, ControllerError> {
        if ctx.cluster.is_empty() {
            return Err(ControllerError::ControllerInit {
                controller: NAME,
                cluster: String::new(),
                reason: "cluster name is required".to_string(),
            });
        }

        ctx.metrics.set_objects(NAME, 0);
        Ok(Box::new(ServiceController {
            cluster: ctx.cluster.to_string(),
            server: ctx.client.server().to_string(),
            client: ctx.client.kube().clone(),
            services: ctx.informers.services(),
            nodes: ctx.informers.nodes(),
            stable_node_set: ctx.features.enabled(STABLE_LOAD_BALANCER_NODE_SET),
            resync: ctx.resync,
        }))
    }
}

/// Result of one resync pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub load_balancers: usize,
    pub eligible_nodes: usize,
    /// Ready endpoints summed over every load balancer
    pub ready_backends: usize,
    /// Load balancers whose endpoints could not be listed
    pub unresolved: usize,
}

pub struct ServiceController {
    cluster: String,
    server: String,
    client: Client,
    services: Store<Service>,
    nodes: Store<Node>,
    stable_node_set: bool,
    resync: Duration,
}

#[async_trait::async_trait]
impl DelegatedController for ServiceController {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn run(self: Box<Self>, token: CancellationToken, workers: usize, metrics: ClusterMetrics) {
        info!(
            "Starting service controller for cluster {} ({}) with {} workers",
            self.cluster, self.server, workers
        );

        if !wait_for_cache(&self.services, &token, NAME, &self.cluster).await
            || !wait_for_cache(&self.nodes, &token, NAME, &self.cluster).await
        {
            info!("Service controller for cluster {} stopped before caches synced", self.cluster);
            return;
        }

        let mut known = BTreeSet::new();
        let mut ticker = tokio::time::interval(self.resync);
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let summary = tokio::select! {
                () = token.cancelled() => break,
                summary = self.sync(&mut known, workers) => summary,
            };
            for key in &summary.added {
                info!("LoadBalancer service {} appeared in cluster {}", key, self.cluster);
            }
            for key in &summary.removed {
                info!("LoadBalancer service {} disappeared from cluster {}", key, self.cluster);
            }
            debug!(
                "Cluster {}: {} load balancer(s), {} eligible node(s), {} ready backend(s), {} unresolved",
                self.cluster, summary.load_balancers, summary.eligible_nodes, summary.ready_backends, summary.unresolved
            );
            metrics.record_sync(NAME);
            metrics.set_objects(NAME, summary.load_balancers);
        }

        info!("Stopping service controller for cluster {}", self.cluster);
    }
}

impl ServiceController {
    /// One resync pass over the cached Services.
    ///
    /// `known` carries the load balancer keys seen by the previous pass.
    async fn sync(&self, known: &mut BTreeSet<String>, workers: usize) -> SyncSummary {
        let balancers: Vec<Arc<Service>> = self
            .services
            .state()
            .into_iter()
            .filter(|svc| is_load_balancer(svc))
            .collect();
        let eligible_nodes = self
            .nodes
            .state()
            .iter()
            .filter(|node| is_eligible_node(node, self.stable_node_set))
            .count();

        let current: BTreeSet<String> = balancers.iter().map(|svc| service_key(svc)).collect();
        let added: Vec<String> = current.difference(known).cloned().collect();
        let removed: Vec<String> = known.difference(&current).cloned().collect();

        // One endpoint lookup per load balancer, at most `workers` in flight
        let backends: Vec<Option<usize>> = futures::stream::iter(balancers)
            .map(|svc| async move { self.ready_backends(&svc).await })
            .buffer_unordered(workers.max(1))
            .collect()
            .await;

        let load_balancers = current.len();
        *known = current;
        SyncSummary {
            added,
            removed,
            load_balancers,
            eligible_nodes,
            ready_backends: backends.iter().flatten().sum(),
            unresolved: backends.iter().filter(|b| b.is_none()).count(),
        }
    }

    /// Counts the ready endpoints behind one Service; `None` if they could not be listed.
    async fn ready_backends(&self, svc: &Service) -> Option<usize> {
        let namespace = svc.namespace().unwrap_or_default();
        let name = svc.name_any();
        let api: Api<EndpointSlice> = Api::namespaced(self.client.clone(), &namespace);
        let params = ListParams::default().labels(&format!("{}={}", SERVICE_NAME_LABEL, name));

        match api.list(&params).await {
            Ok(slices) => {
                let ready = slices.items.iter().map(ready_endpoints).sum();
                debug!(
                    "Service {}/{} in cluster {} has {} ready backend(s)",
                    namespace, name, self.cluster, ready
                );
                Some(ready)
            }
            Err(e) => {
                warn!(
                    "Failed to list endpoints for service {}/{} in cluster {}: {}",
                    namespace, name, self.cluster, e
                );
                None
            }
        }
    }
}

/// Endpoints of a slice that accept traffic; an unknown condition counts as ready
fn ready_endpoints(slice: &EndpointSlice) -> usize {
    slice
        .endpoints
        .iter()
        .filter(|ep| ep.conditions.as_ref().and_then(|c| c.ready).unwrap_or(true))
        .count()
}

fn service_key(svc: &Service) -> String {
    format!("{}/{}", svc.namespace().unwrap_or_default(), svc.name_any())
}

/// Whether the Service asks for an external load balancer
pub fn is_load_balancer(svc: &Service) -> bool {
    svc.spec.as_ref().and_then(|spec| spec.type_.as_deref()) == Some("LoadBalancer")
}

/// Whether the node's `Ready` condition is `True`
pub fn is_node_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .is_some_and(|conditions| conditions.iter().any(|c| c.type_ == "Ready" && c.status == "True"))
}

/// Whether the node may back a load balancer
pub fn is_eligible_node(node: &Node, stable_node_set: bool) -> bool {
    is_node_ready(node) && !(stable_node_set && node.labels().contains_key(EXCLUDE_FROM_LB_LABEL))
}
