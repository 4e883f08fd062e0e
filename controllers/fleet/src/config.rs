//! Controller configuration.
//!
//! Everything is read from environment variables so the controller can be
//! configured the same way whether it runs on a workstation or in a pod.

use crate::error::ControllerError;
use crate::features::FeatureGates;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Runtime configuration for the fleet controller
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Pause between reconciliation cycles (`RECONCILE_INTERVAL_SECS`)
    pub reconcile_interval: Duration,
    /// Metrics and probe listener (`METRICS_ADDR`)
    pub metrics_addr: SocketAddr,
    /// `kind` executable (`KIND_BINARY`)
    pub kind_binary: String,
    /// Container CLI used for the shutdown sweep (`DOCKER_BINARY`)
    pub docker_binary: String,
    /// Concurrent units of work for the service controller (`SERVICE_CONTROLLER_WORKERS`)
    pub service_workers: usize,
    /// Resync period of the delegated controllers (`CONTROLLER_RESYNC_SECS`)
    pub controller_resync: Duration,
    /// Feature gates for the delegated controllers (`FEATURE_GATES`)
    pub feature_gates: FeatureGates,
}

impl FleetConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let reconcile_interval = Duration::from_secs(parse_or(&lookup, "RECONCILE_INTERVAL_SECS", 30u64)?);
        if reconcile_interval.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "RECONCILE_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }

        let controller_resync = Duration::from_secs(parse_or(&lookup, "CONTROLLER_RESYNC_SECS", 30u64)?);
        if controller_resync.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "CONTROLLER_RESYNC_SECS must be greater than zero".to_string(),
            ));
        }

        let service_workers = parse_or(&lookup, "SERVICE_CONTROLLER_WORKERS", 5usize)?;
        if service_workers == 0 {
            return Err(ControllerError::InvalidConfig(
                "SERVICE_CONTROLLER_WORKERS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            reconcile_interval,
            metrics_addr: parse_or(&lookup, "METRICS_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            kind_binary: lookup("KIND_BINARY").unwrap_or_else(|| "kind".to_string()),
            docker_binary: lookup("DOCKER_BINARY").unwrap_or_else(|| "docker".to_string()),
            service_workers,
            controller_resync,
            feature_gates: FeatureGates::parse(&lookup("FEATURE_GATES").unwrap_or_default())?,
        })
    }

    /// Logs the effective configuration at startup.
    pub fn log(&self) {
        info!("Configuration:");
        info!("  Reconcile interval: {}s", self.reconcile_interval.as_secs());
        info!("  Metrics address: {}", self.metrics_addr);
        info!("  kind binary: {}", self.kind_binary);
        info!("  Docker binary: {}", self.docker_binary);
        info!("  Service controller workers: {}", self.service_workers);
        info!("  Controller resync: {}s", self.controller_resync.as_secs());
        info!("  Feature gates: {}", self.feature_gates);
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ControllerError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ControllerError::InvalidConfig(format!("{}='{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::STABLE_LOAD_BALANCER_NODE_SET;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<FleetConfig, ControllerError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        FleetConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.reconcile_interval, Duration::from_secs(30));
        assert_eq!(config.metrics_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.kind_binary, "kind");
        assert_eq!(config.docker_binary, "docker");
        assert_eq!(config.service_workers, 5);
        assert_eq!(config.controller_resync, Duration::from_secs(30));
        assert_eq!(config.feature_gates, FeatureGates::default());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("RECONCILE_INTERVAL_SECS", "10"),
            ("METRICS_ADDR", "127.0.0.1:9090"),
            ("KIND_BINARY", "/opt/kind"),
            ("DOCKER_BINARY", "podman"),
            ("SERVICE_CONTROLLER_WORKERS", "2"),
            ("FEATURE_GATES", "StableLoadBalancerNodeSet=true"),
        ])
        .unwrap();
        assert_eq!(config.reconcile_interval, Duration::from_secs(10));
        assert_eq!(config.metrics_addr.port(), 9090);
        assert_eq!(config.kind_binary, "/opt/kind");
        assert_eq!(config.docker_binary, "podman");
        assert_eq!(config.service_workers, 2);
        assert!(config.feature_gates.enabled(STABLE_LOAD_BALANCER_NODE_SET));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config_from(&[("RECONCILE_INTERVAL_SECS", "soon")]),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(config_from(&[("RECONCILE_INTERVAL_SECS", "0")]).is_err());
        assert!(config_from(&[("SERVICE_CONTROLLER_WORKERS", "0")]).is_err());
        assert!(config_from(&[("METRICS_ADDR", "localhost")]).is_err());
        assert!(config_from(&[("FEATURE_GATES", "Broken")]).is_err());
    }
}
