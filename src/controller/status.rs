//! Site health derived from the workload's pods
//!
//! Phase and ready count are never read back as input. They are recomputed
//! from the observed pods on every pass.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;

use crate::crd::{NginxStaticSiteStatus, SitePhase, SITE_APP_LABEL};

/// Health of a site as observed from its pods
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProjectedHealth {
    /// Running if enough pods are ready, Pending otherwise
    pub phase: SitePhase,
    /// Pods whose Ready condition is True
    pub ready_replicas: i32,
}

impl ProjectedHealth {
    /// True if the site serves at the desired capacity
    pub fn is_ready(&self) -> bool {
        self.phase == SitePhase::Running
    }
}

/// Label selector matching the site's pods
pub fn pod_selector(site_name: &str) -> String {
    format!("{}={}", SITE_APP_LABEL, site_name)
}

/// Check if a pod reports the Ready condition as True
pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| {
            conds
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false)
}

/// Derive phase and ready count from the observed pods
pub fn project_status(pods: &[Pod], desired_replicas: i32) -> ProjectedHealth {
    let ready = pods.iter().filter(|p| is_pod_ready(p)).count();
    let ready_replicas = i32::try_from(ready).unwrap_or(i32::MAX);

    let phase = if ready_replicas >= desired_replicas {
        SitePhase::Running
    } else {
        SitePhase::Pending
    };

    ProjectedHealth {
        phase,
        ready_replicas,
    }
}

/// Status to persist after a successful convergence pass
///
/// Clears any previous failure message. `pending_since` is stamped with
/// `now` when the site stops being ready and kept unchanged while it stays
/// that way, so repeated passes produce an identical status.
pub fn converged_status(
    previous: &NginxStaticSiteStatus,
    health: &ProjectedHealth,
    now: DateTime<Utc>,
) -> NginxStaticSiteStatus {
    let pending_since = if health.is_ready() {
        None
    } else {
        Some(previous.pending_since.unwrap_or(now))
    };

    NginxStaticSiteStatus {
        phase: health.phase,
        ready_replicas: health.ready_replicas,
        message: None,
        pending_since,
    }
}
