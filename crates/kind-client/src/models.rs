//! Shared types for cluster discovery

use std::fmt;

/// Label key marking containers that belong to the fleet.
///
/// The fleet controller never creates containers itself. The label is set
/// by tooling that runs workloads against fleet clusters, and the shutdown
/// sweep deletes any container still carrying it.
pub const FLEET_LABEL_KEY: &str = "io.x-k8s.kind-fleet.cluster";

/// Which apiserver address a kubeconfig points at.
///
/// kind writes a kubeconfig that targets the host-mapped port (`External`)
/// and can also render one that targets the control-plane container on the
/// kind Docker network (`Internal`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KubeconfigEndpoint {
    /// Host-reachable address (published port on the host)
    External,
    /// Address on the kind container network
    Internal,
}

impl KubeconfigEndpoint {
    /// Preference order used when bootstrapping a client: external first.
    pub const PREFERENCE: [Self; 2] = [Self::External, Self::Internal];

    /// Whether this is the internal (container network) variant
    #[must_use]
    pub fn is_internal(self) -> bool {
        matches!(self, Self::Internal)
    }
}

impl fmt::Display for KubeconfigEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::External => f.write_str("external"),
            Self::Internal => f.write_str("internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preference_order_is_external_first() {
        assert_eq!(
            KubeconfigEndpoint::PREFERENCE,
            [KubeconfigEndpoint::External, KubeconfigEndpoint::Internal]
        );
        assert!(!KubeconfigEndpoint::External.is_internal());
        assert!(KubeconfigEndpoint::Internal.is_internal());
    }

    #[test]
    fn test_display() {
        assert_eq!(KubeconfigEndpoint::External.to_string(), "external");
        assert_eq!(KubeconfigEndpoint::Internal.to_string(), "internal");
    }
}
