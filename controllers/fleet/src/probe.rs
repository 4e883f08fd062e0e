//! Apiserver reachability probe.
//!
//! Checks that a network path to an apiserver exists before a client is
//! built on top of it, so an unreachable endpoint fails in seconds instead
//! of at the first client call's timeout.

use crate::error::ControllerError;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

/// Per-request timeout for a single probe
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// A single reachability check against an endpoint URL.
#[async_trait::async_trait]
pub trait Probe: Send + Sync {
    /// Returns `true` if anything answered at `endpoint`.
    async fn probe(&self, endpoint: &str) -> bool;
}

/// HTTP(S) reachability probe.
///
/// Certificate verification is disabled: kind apiservers present
/// self-signed certificates and this is not an authentication check.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    /// Creates a probe with the fixed 5 second timeout.
    pub fn new() -> Result<Self, ControllerError> {
        Self::with_timeout(PROBE_TIMEOUT)
    }

    /// Creates a probe that gives up on an endpoint after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self, ControllerError> {
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Probe for HttpProbe {
    /// Any completed HTTP exchange counts, whatever its status: the
    /// apiserver may legitimately answer 401/403/503 while starting up.
    async fn probe(&self, endpoint: &str) -> bool {
        info!("Probing HTTP address {}", endpoint);

        let response = match self.client.get(endpoint).send().await {
            Ok(response) => response,
            Err(e) => {
                info!("Failed to connect to HTTP address {}: {}", endpoint, e);
                return false;
            }
        };

        let status = response.status();
        // Drain the body so the connection is released
        if let Err(e) = response.bytes().await {
            debug!("Error draining response body from {}: {}", endpoint, e);
        }
        debug!("HTTP address {} answered with {}", endpoint, status);
        true
    }
}
