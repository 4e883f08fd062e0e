//! Per-cluster shared informers.
//!
//! One reflector per resource kind feeds an in-memory store that every
//! delegated controller of the instance reads from, so a cluster is watched
//! once no matter how many controllers run against it.

use futures::StreamExt;
use k8s_openapi::api::core::v1::{Node, Service};
use kube::{Api, Client, Resource};
use kube_runtime::reflector::{self, Store, store::Writer};
use kube_runtime::{WatchStreamExt, watcher};
use serde::de::DeserializeOwned;
use std::fmt::{self, Debug};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Store writers, held until the informers are started
struct Writers {
    services: Writer<Service>,
    nodes: Writer<Node>,
}

/// Service and Node caches for one cluster.
pub struct SharedInformers {
    client: Client,
    services: Store<Service>,
    nodes: Store<Node>,
    writers: Option<Writers>,
}

impl SharedInformers {
    /// Creates empty stores; nothing is watched until [`start`](Self::start).
    pub fn new(client: Client) -> Self {
        let (services, service_writer) = reflector::store();
        let (nodes, node_writer) = reflector::store();
        Self {
            client,
            services,
            nodes,
            writers: Some(Writers {
                services: service_writer,
                nodes: node_writer,
            }),
        }
    }

    /// Read handle on the cluster's Services
    pub fn services(&self) -> Store<Service> {
        self.services.clone()
    }

    /// Read handle on the cluster's Nodes
    pub fn nodes(&self) -> Store<Node> {
        self.nodes.clone()
    }

    /// Whether the watches have been started
    pub fn is_started(&self) -> bool {
        self.writers.is_none()
    }

    /// Starts watching Services and Nodes until `token` is cancelled.
    ///
    /// Starting twice is a no-op and returns no tasks.
    pub fn start(&mut self, token: &CancellationToken) -> Vec<JoinHandle<()>> {
        let Some(writers) = self.writers.take() else {
            debug!("Informers already started");
            return Vec::new();
        };

        vec![
            spawn_reflector("services", Api::all(self.client.clone()), writers.services, token.clone()),
            spawn_reflector("nodes", Api::all(self.client.clone()), writers.nodes, token.clone()),
        ]
    }
}

impl Debug for SharedInformers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedInformers")
            .field("started", &self.is_started())
            .field("services", &self.services.state().len())
            .field("nodes", &self.nodes.state().len())
            .finish()
    }
}

fn spawn_reflector<K>(
    resource_name: &'static str,
    api: Api<K>,
    writer: Writer<K>,
    token: CancellationToken,
) -> JoinHandle<()>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    tokio::spawn(async move {
        info!("Starting {} informer", resource_name);

        let events = reflector::reflector(writer, watcher(api, watcher::Config::default()).default_backoff()).for_each(
            |event| async move {
                if let Err(e) = event {
                    warn!("{} watch error: {}", resource_name, e);
                }
            },
        );

        tokio::select! {
            () = token.cancelled() => debug!("Stopping {} informer", resource_name),
            () = events => warn!("{} informer stream ended", resource_name),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::offline_client;

    #[tokio::test]
    async fn test_start_twice_is_noop() {
        let client = offline_client("alpha");
        let mut informers = SharedInformers::new(client.kube().clone());
        let token = CancellationToken::new();

        assert!(!informers.is_started());
        let tasks = informers.start(&token);
        assert_eq!(tasks.len(), 2);
        assert!(informers.is_started());
        assert!(informers.start(&token).is_empty());

        token.cancel();
        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_stores_start_empty() {
        let client = offline_client("alpha");
        let informers = SharedInformers::new(client.kube().clone());

        assert!(informers.services().state().is_empty());
        assert!(informers.nodes().state().is_empty());
    }
}
