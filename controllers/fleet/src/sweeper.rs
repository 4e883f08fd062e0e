//! Shutdown sweep of leftover containers.
//!
//! Tooling that runs against fleet clusters labels the containers it
//! creates with a well-known key; the controller creates none. On shutdown
//! every such container is force-removed; failures are logged and never
//! stop the sweep.

use kind_client::{DockerClientTrait, FLEET_LABEL_KEY};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Outcome of a sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: usize,
    pub failed: usize,
}

/// Removes labelled containers.
pub struct Sweeper<D> {
    docker: Arc<D>,
    label: String,
}

impl<D: DockerClientTrait> Sweeper<D> {
    /// Sweeps containers carrying the fleet label.
    pub fn new(docker: Arc<D>) -> Self {
        Self::with_label(docker, FLEET_LABEL_KEY)
    }

    pub fn with_label(docker: Arc<D>, label: impl Into<String>) -> Self {
        Self {
            docker,
            label: label.into(),
        }
    }

    /// Force-removes every labelled container, best effort.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let containers = match self.docker.list_containers_by_label(&self.label).await {
            Ok(containers) => containers,
            Err(e) => {
                error!("Failed to list containers labelled {}: {}", self.label, e);
                return report;
            }
        };

        if containers.is_empty() {
            info!("No containers labelled {} to remove", self.label);
            return report;
        }

        for id in &containers {
            match self.docker.delete_container(id).await {
                Ok(()) => {
                    info!("Removed container {}", id);
                    report.deleted += 1;
                }
                Err(e) => {
                    warn!("Failed to remove container {}: {}", id, e);
                    report.failed += 1;
                }
            }
        }

        info!("Swept {} container(s), {} failure(s)", report.deleted, report.failed);
        report
    }
}
