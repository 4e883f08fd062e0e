//! Feature gates handed to the delegated controllers.
//!
//! Parsed from the familiar Kubernetes `Name=true,Other=false` syntax.

use crate::error::ControllerError;
use std::collections::BTreeMap;
use std::fmt;

/// Excludes nodes labelled `node.kubernetes.io/exclude-from-external-load-balancers`
/// from the load balancer node set.
pub const STABLE_LOAD_BALANCER_NODE_SET: &str = "StableLoadBalancerNodeSet";

/// Named boolean switches; unset gates are disabled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureGates {
    gates: BTreeMap<String, bool>,
}

impl FeatureGates {
    /// Parses a comma-separated list of `Name=bool` pairs.
    ///
    /// Whitespace around entries is ignored and an empty string yields no gates.
    pub fn parse(spec: &str) -> Result<Self, ControllerError> {
        let mut gates = BTreeMap::new();

        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, value) = entry.split_once('=').ok_or_else(|| {
                ControllerError::InvalidConfig(format!("feature gate '{}' must be Name=true|false", entry))
            })?;
            let name = name.trim();
            if name.is_empty() {
                return Err(ControllerError::InvalidConfig(format!("feature gate '{}' has no name", entry)));
            }
            let enabled = parse_bool(value.trim()).ok_or_else(|| {
                ControllerError::InvalidConfig(format!("feature gate {} has non-boolean value '{}'", name, value.trim()))
            })?;
            gates.insert(name.to_string(), enabled);
        }

        Ok(Self { gates })
    }

    /// Whether `name` is switched on
    pub fn enabled(&self, name: &str) -> bool {
        self.gates.get(name).copied().unwrap_or(false)
    }
}

/// Boolean spellings accepted by Kubernetes `--feature-gates`
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

impl fmt::Display for FeatureGates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, enabled) in &self.gates {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}={}", name, enabled)?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_lookup() {
        let gates = FeatureGates::parse(" StableLoadBalancerNodeSet=true, Other=false ").unwrap();
        assert!(gates.enabled(STABLE_LOAD_BALANCER_NODE_SET));
        assert!(!gates.enabled("Other"));
        assert!(!gates.enabled("Unset"));
        assert_eq!(gates.to_string(), "Other=false,StableLoadBalancerNodeSet=true");
    }

    #[test]
    fn test_kubernetes_boolean_spellings() {
        let gates = FeatureGates::parse("A=True,B=1,C=t,D=F,E=FALSE,F=0").unwrap();
        assert!(gates.enabled("A"));
        assert!(gates.enabled("B"));
        assert!(gates.enabled("C"));
        assert!(!gates.enabled("D"));
        assert!(!gates.enabled("E"));
        assert!(!gates.enabled("F"));
        assert_eq!(gates.to_string(), "A=true,B=true,C=true,D=false,E=false,F=false");

        assert!(FeatureGates::parse("Gate=tRuE").is_err());
    }

    #[test]
    fn test_empty_is_default() {
        assert_eq!(FeatureGates::parse("").unwrap(), FeatureGates::default());
        assert_eq!(FeatureGates::parse(" , ").unwrap(), FeatureGates::default());
    }

    #[test]
    fn test_malformed_entries() {
        assert!(FeatureGates::parse("NoValue").is_err());
        assert!(FeatureGates::parse("=true").is_err());
        assert!(FeatureGates::parse("Gate=yes").is_err());
    }
}
