//! Main controller implementation.
//!
//! Wires kind discovery, client bootstrap and the instance launcher into
//! the fleet reconciler, and sweeps leftover containers once the
//! reconciler has stopped.

use crate::bootstrap::Bootstrapper;
use crate::config::FleetConfig;
use crate::delegated::default_builders;
use crate::error::ControllerError;
use crate::instance::InstanceHandle;
use crate::launcher::Launcher;
use crate::metrics::FleetMetrics;
use crate::probe::HttpProbe;
use crate::reconciler::{FleetReconciler, InstanceFactory};
use crate::sweeper::{SweepReport, Sweeper};
use kind_client::{DockerClient, KindClient, KindClientTrait};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Bootstraps an admin client, then launches the cluster's controllers.
pub struct KubeInstanceFactory<K> {
    bootstrapper: Bootstrapper<K>,
    launcher: Launcher,
}

impl<K> KubeInstanceFactory<K> {
    pub fn new(bootstrapper: Bootstrapper<K>, launcher: Launcher) -> Self {
        Self { bootstrapper, launcher }
    }
}

#[async_trait::async_trait]
impl<K: KindClientTrait> InstanceFactory for KubeInstanceFactory<K> {
    async fn create(&self, token: &CancellationToken, cluster: &str) -> Result<InstanceHandle, ControllerError> {
        let client = self.bootstrapper.bootstrap(token, cluster).await?;
        self.launcher.launch(token, cluster, client).await
    }
}

/// The fleet controller process.
pub struct Controller {
    reconciler: FleetReconciler<KindClient, KubeInstanceFactory<KindClient>>,
    sweeper: Sweeper<DockerClient>,
}

impl Controller {
    /// Creates the controller from configuration.
    pub fn new(config: &FleetConfig, metrics: FleetMetrics) -> Result<Self, ControllerError> {
        info!("Initializing Fleet Controller");

        let kind = Arc::new(KindClient::new(config.kind_binary.clone()));
        let probe = Arc::new(HttpProbe::new()?);
        let launcher = Launcher::new(default_builders(), metrics.clone(), config.feature_gates.clone())
            .with_workers(config.service_workers)
            .with_resync(config.controller_resync);
        let factory = KubeInstanceFactory::new(Bootstrapper::new(kind.clone(), probe), launcher);

        let reconciler = FleetReconciler::new(kind, factory, metrics).with_interval(config.reconcile_interval);
        let sweeper = Sweeper::new(Arc::new(DockerClient::new(config.docker_binary.clone())));

        Ok(Self { reconciler, sweeper })
    }

    /// Reconciles until `token` is cancelled, then sweeps leftover containers.
    pub async fn run(mut self, token: CancellationToken) -> SweepReport {
        self.reconciler.run(&token).await;

        info!("Removing leftover fleet containers");
        self.sweeper.sweep().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureGates;
    use crate::test_utils::{MockProbe, init_crypto, test_kubeconfig};
    use kind_client::{KubeconfigEndpoint, MockKindClient};

    #[tokio::test(start_paused = true)]
    async fn test_factory_reports_unreachable_cluster() {
        init_crypto();
        let kind = MockKindClient::new();
        kind.set_kubeconfig("alpha", KubeconfigEndpoint::External, test_kubeconfig("alpha", "http://127.0.0.1:1"));
        let probe = Arc::new(MockProbe::reachable(Vec::<&str>::new()));
        let launcher = Launcher::new(default_builders(), FleetMetrics::new().unwrap(), FeatureGates::default());
        let factory = KubeInstanceFactory::new(Bootstrapper::new(Arc::new(kind), probe.clone()), launcher);

        let err = factory.create(&CancellationToken::new(), "alpha").await.unwrap_err();

        assert!(matches!(err, ControllerError::NoWorkingClient(_)));
        assert_eq!(probe.calls().len(), 5);
    }

    #[tokio::test]
    async fn test_controller_from_default_config() {
        init_crypto();
        let config = FleetConfig::from_lookup(|_| None).unwrap();
        let controller = Controller::new(&config, FleetMetrics::new().unwrap());
        assert!(controller.is_ok());
    }
}
