//! Node controller.
//!
//! Watches node readiness and reports transitions.

use super::{ControllerBuilder, ControllerContext, DelegatedController, wait_for_cache};
use super::service::is_node_ready;
use crate::error::ControllerError;
use crate::metrics::ClusterMetrics;
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use kube_runtime::reflector::Store;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const NAME: &str = "node";

/// Builds [`NodeController`]s.
pub struct NodeControllerBuilder;

impl ControllerBuilder for NodeControllerBuilder {
    fn name(&self) -> &'static str {
        NAME
    }

    fn build(&self, ctx: &ControllerContext<'_>) -> Result<Box<dyn DelegatedController>, ControllerError> {
        ctx.metrics.set_objects(NAME, 0);
        Ok(Box::new(NodeController {
            cluster: ctx.cluster.to_string(),
            nodes: ctx.informers.nodes(),
            resync: ctx.resync,
        }))
    }
}

/// A change in a node's readiness between two passes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Joined { node: String, ready: bool },
    Left { node: String },
    BecameReady { node: String },
    BecameNotReady { node: String },
}

pub struct NodeController {
    cluster: String,
    nodes: Store<Node>,
    resync: Duration,
}

#[async_trait::async_trait]
impl DelegatedController for NodeController {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn run(self: Box<Self>, token: CancellationToken, _workers: usize, metrics: ClusterMetrics) {
        info!("Starting node controller for cluster {}", self.cluster);

        if !wait_for_cache(&self.nodes, &token, NAME, &self.cluster).await {
            info!("Node controller for cluster {} stopped before cache synced", self.cluster);
            return;
        }

        let mut previous = BTreeMap::new();
        let mut ticker = tokio::time::interval(self.resync);
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let current = readiness(&self.nodes);
            for transition in transitions(&previous, &current) {
                match transition {
                    Transition::Joined { node, ready } => {
                        info!("Node {} joined cluster {} (ready: {})", node, self.cluster, ready)
                    }
                    Transition::Left { node } => info!("Node {} left cluster {}", node, self.cluster),
                    Transition::BecameReady { node } => info!("Node {} in cluster {} is Ready", node, self.cluster),
                    Transition::BecameNotReady { node } => {
                        warn!("Node {} in cluster {} is no longer Ready", node, self.cluster)
                    }
                }
            }

            metrics.record_sync(NAME);
            metrics.set_objects(NAME, current.values().filter(|ready| **ready).count());
            previous = current;
        }

        info!("Stopping node controller for cluster {}", self.cluster);
    }
}

fn readiness(nodes: &Store<Node>) -> BTreeMap<String, bool> {
    nodes
        .state()
        .iter()
        .map(|node| (node.name_any(), is_node_ready(node)))
        .collect()
}

/// Readiness changes from `previous` to `current`, ordered by node name
pub fn transitions(previous: &BTreeMap<String, bool>, current: &BTreeMap<String, bool>) -> Vec<Transition> {
    let mut changes = Vec::new();

    for (node, ready) in current {
        match previous.get(node) {
            None => changes.push(Transition::Joined {
                node: node.clone(),
                ready: *ready,
            }),
            Some(was) if *was != *ready => changes.push(if *ready {
                Transition::BecameReady { node: node.clone() }
            } else {
                Transition::BecameNotReady { node: node.clone() }
            }),
            Some(_) => {}
        }
    }
    for node in previous.keys().filter(|node| !current.contains_key(*node)) {
        changes.push(Transition::Left { node: node.clone() });
    }

    changes
}
