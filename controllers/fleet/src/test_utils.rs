//! Test utilities shared by the controller's unit tests
//!
//! Provides kubeconfig fixtures, a scriptable reachability probe and
//! kube clients that point at nothing.

use crate::bootstrap::AdminClient;
use crate::probe::Probe;
use kind_client::KubeconfigEndpoint;
use kube::{Client, Config};
use std::sync::Mutex;

/// Installs the process-wide rustls provider; safe to call repeatedly
pub fn init_crypto() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Minimal kubeconfig pointing `cluster` at `server`
pub fn test_kubeconfig(cluster: &str, server: &str) -> String {
    format!(
        r#"apiVersion: v1
kind: Config
clusters:
- name: kind-{cluster}
  cluster:
    server: {server}
contexts:
- name: kind-{cluster}
  context:
    cluster: kind-{cluster}
    user: kind-{cluster}
current-context: kind-{cluster}
users:
- name: kind-{cluster}
  user: {{}}
"#
    )
}

/// Admin client targeting `url`; no connection is made until it is used
pub fn client_for(cluster: &str, url: &str) -> AdminClient {
    init_crypto();
    let uri: http::Uri = url.parse().expect("valid test URL");
    let client = Client::try_from(Config::new(uri)).expect("client from static config");
    AdminClient::new(cluster, KubeconfigEndpoint::External, url, client)
}

/// Admin client whose apiserver is never reachable
pub fn offline_client(cluster: &str) -> AdminClient {
    client_for(cluster, "http://127.0.0.1:1")
}

/// Probe that answers for endpoints starting with one of a fixed set of prefixes
#[derive(Default)]
pub struct MockProbe {
    reachable: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl MockProbe {
    pub fn reachable<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            reachable: prefixes.into_iter().map(Into::into).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every endpoint probed so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Probe for MockProbe {
    async fn probe(&self, endpoint: &str) -> bool {
        self.calls.lock().unwrap().push(endpoint.to_string());
        self.reachable.iter().any(|prefix| endpoint.starts_with(prefix.as_str()))
    }
}
