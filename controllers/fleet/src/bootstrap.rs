//! Administrative client bootstrap.
//!
//! The controller may run on the host (where kind publishes each apiserver
//! on a localhost port) or inside a container on the kind network (where
//! only the control-plane container address works). Both kubeconfig
//! variants are tried, external first, and the first one whose apiserver
//! answers a probe wins.

use crate::backoff::{RetryError, RetryPolicy, retry_until};
use crate::error::ControllerError;
use crate::probe::Probe;
use kind_client::{KindClientTrait, KubeconfigEndpoint};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A Kubernetes client bound to one cluster.
///
/// Owned by exactly one instance; never shared across clusters.
#[derive(Clone)]
pub struct AdminClient {
    cluster: String,
    endpoint: KubeconfigEndpoint,
    server: String,
    client: Client,
}

impl AdminClient {
    /// Wraps an already-built client
    pub fn new(cluster: impl Into<String>, endpoint: KubeconfigEndpoint, server: impl Into<String>, client: Client) -> Self {
        Self {
            cluster: cluster.into(),
            endpoint,
            server: server.into(),
            client,
        }
    }

    /// Cluster this client talks to
    #[cfg(test)]
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Which kubeconfig variant produced the client
    pub fn endpoint(&self) -> KubeconfigEndpoint {
        self.endpoint
    }

    /// Apiserver URL the client targets
    pub fn server(&self) -> &str {
        &self.server
    }

    /// The underlying kube client
    pub fn kube(&self) -> &Client {
        &self.client
    }
}

impl fmt::Debug for AdminClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminClient")
            .field("cluster", &self.cluster)
            .field("endpoint", &self.endpoint)
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}

/// Produces a working [`AdminClient`] for a cluster.
pub struct Bootstrapper<K> {
    kind: Arc<K>,
    probe: Arc<dyn Probe>,
    policy: RetryPolicy,
}

impl<K: KindClientTrait> Bootstrapper<K> {
    /// Creates a bootstrapper using the standard 5-attempt probe policy.
    pub fn new(kind: Arc<K>, probe: Arc<dyn Probe>) -> Self {
        Self {
            kind,
            probe,
            policy: RetryPolicy::probe(),
        }
    }

    /// Overrides the probe retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Builds a client for `cluster`.
    ///
    /// Each endpoint variant is tried in preference order:
    /// 1. Fetch its kubeconfig from kind
    /// 2. Convert it to a client configuration
    /// 3. Probe the apiserver with linear backoff
    /// 4. Build the client
    ///
    /// A failure at any step moves on to the next variant. Returns
    /// [`ControllerError::Cancelled`] as soon as `token` fires while fetching
    /// a kubeconfig or probing, and [`ControllerError::NoWorkingClient`] when
    /// no variant works.
    pub async fn bootstrap(&self, token: &CancellationToken, cluster: &str) -> Result<AdminClient, ControllerError> {
        for endpoint in KubeconfigEndpoint::PREFERENCE {
            let fetched = tokio::select! {
                biased;
                () = token.cancelled() => return Err(ControllerError::Cancelled),
                fetched = self.kind.get_kubeconfig(cluster, endpoint) => fetched,
            };
            let kubeconfig = match fetched {
                Ok(kubeconfig) => kubeconfig,
                Err(e) => {
                    error!("Failed to get {} kubeconfig for cluster {}: {}", endpoint, cluster, e);
                    continue;
                }
            };

            let config = match client_config(cluster, &kubeconfig).await {
                Ok(config) => config,
                Err(e) => {
                    error!("Failed to convert {} kubeconfig for cluster {}: {}", endpoint, cluster, e);
                    continue;
                }
            };

            // Fail fast on an unreachable apiserver instead of waiting for
            // the first client operation to time out
            let server = config.cluster_url.to_string();
            match retry_until(&self.policy, token, |_| self.probe.probe(&server)).await {
                Ok(attempts) => debug!("Apiserver {} for cluster {} answered after {} probe(s)", server, cluster, attempts),
                Err(RetryError::Cancelled) => return Err(ControllerError::Cancelled),
                Err(e) => {
                    error!("Failed to connect to apiserver {} for cluster {} ({} endpoint): {}", server, cluster, endpoint, e);
                    continue;
                }
            }

            match Client::try_from(config) {
                Ok(client) => {
                    info!("Using {} endpoint {} for cluster {}", endpoint, server, cluster);
                    return Ok(AdminClient::new(cluster, endpoint, server, client));
                }
                Err(e) => {
                    error!("Failed to create client for cluster {}: {}", cluster, e);
                }
            }
        }

        Err(ControllerError::NoWorkingClient(cluster.to_string()))
    }
}

/// Parses kubeconfig YAML into a client configuration using its current context.
pub async fn client_config(cluster: &str, kubeconfig: &str) -> Result<Config, ControllerError> {
    let invalid = |reason: String| ControllerError::Kubeconfig {
        cluster: cluster.to_string(),
        reason,
    };

    let kubeconfig: Kubeconfig =
        serde_yaml::from_str(kubeconfig).map_err(|e| invalid(format!("invalid kubeconfig YAML: {}", e)))?;

    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| invalid(format!("failed to build config: {}", e)))
}
