//! Supporting types for the NginxStaticSite CRD

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

/// Site lifecycle phase
///
/// Closed set. Unknown strings read back from the API server (hand edits,
/// older controller versions) are normalized to `Pending` when deserialized,
/// so free-form values never travel further than the CRD boundary.
#[derive(Clone, Copy, Debug, Default, Serialize, JsonSchema, PartialEq, Eq)]
pub enum SitePhase {
    /// Dependents exist but not enough pods are ready
    #[default]
    Pending,
    /// Dependents are being created
    Creating,
    /// Ready pods meet the desired replica count
    Running,
    /// Site was serving but lost capacity
    Degraded,
    /// Last reconciliation hit a non-transient error
    Failed,
    /// Deletion requested, dependents are being torn down
    Terminating,
}

impl std::fmt::Display for SitePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Creating => write!(f, "Creating"),
            Self::Running => write!(f, "Running"),
            Self::Degraded => write!(f, "Degraded"),
            Self::Failed => write!(f, "Failed"),
            Self::Terminating => write!(f, "Terminating"),
        }
    }
}

impl std::str::FromStr for SitePhase {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Creating" => Ok(Self::Creating),
            "Running" => Ok(Self::Running),
            "Degraded" => Ok(Self::Degraded),
            "Failed" => Ok(Self::Failed),
            "Terminating" => Ok(Self::Terminating),
            other => Err(crate::Error::validation(format!(
                "invalid site phase: {}",
                other
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for SitePhase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_else(|_| {
            warn!(phase = %raw, "unknown site phase in status, treating as Pending");
            SitePhase::Pending
        }))
    }
}
