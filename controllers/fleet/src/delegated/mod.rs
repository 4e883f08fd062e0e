//! Delegated per-cluster controllers.
//!
//! Each discovered cluster runs its own set of controllers against its own
//! apiserver. A [`ControllerBuilder`] constructs one controller for an
//! instance; the resulting [`DelegatedController`] runs until the
//! instance's token is cancelled.

pub mod node;
pub mod service;

use crate::bootstrap::AdminClient;
use crate::error::ControllerError;
use crate::features::FeatureGates;
use crate::informers::SharedInformers;
use crate::metrics::ClusterMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub use node::NodeControllerBuilder;
pub use service::ServiceControllerBuilder;

/// Everything a builder may draw on when constructing a controller.
pub struct ControllerContext<'a> {
    pub cluster: &'a str,
    pub client: &'a AdminClient,
    pub informers: &'a SharedInformers,
    pub metrics: &'a ClusterMetrics,
    pub features: &'a FeatureGates,
    /// How often the controller re-examines its caches
    pub resync: Duration,
}

/// A constructed controller, ready to run.
#[async_trait::async_trait]
pub trait DelegatedController: Send {
    fn name(&self) -> &'static str;

    /// Runs until `token` is cancelled.
    ///
    /// `workers` bounds the number of objects processed concurrently.
    async fn run(self: Box<Self>, token: CancellationToken, workers: usize, metrics: ClusterMetrics);
}

/// Constructs one kind of delegated controller.
pub trait ControllerBuilder: Send + Sync {
    fn name(&self) -> &'static str;

    fn build(&self, ctx: &ControllerContext<'_>) -> Result<Box<dyn DelegatedController>, ControllerError>;
}

/// The controllers every instance runs: service then node
pub fn default_builders() -> Vec<Arc<dyn ControllerBuilder>> {
    vec![Arc::new(ServiceControllerBuilder), Arc::new(NodeControllerBuilder)]
}

/// Waits for a store's initial listing, giving up if `token` fires first.
///
/// Returns `false` when the controller should stop.
pub(crate) async fn wait_for_cache<K>(
    store: &kube_runtime::reflector::Store<K>,
    token: &CancellationToken,
    controller: &str,
    cluster: &str,
) -> bool
where
    K: kube::Resource + Clone + 'static,
    K::DynamicType: Eq + std::hash::Hash + Clone,
{
    tokio::select! {
        () = token.cancelled() => false,
        ready = store.wait_until_ready() => match ready {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("{} controller for cluster {} lost its cache: {}", controller, cluster, e);
                false
            }
        },
    }
}
