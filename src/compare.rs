//! Drift detection between desired and observed dependents
//!
//! Pure functions, no I/O. Each dependent kind compares only the fields the
//! controller owns; everything else on the observed object (defaults filled
//! in by the API server, annotations added by other tools) is left alone.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, PersistentVolumeClaim, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::child::{CONTENT_VOLUME, NGINX_CONTAINER};
use crate::quantity::parse_bytes;
use crate::Error;

/// Requested capacity of a claim, if any
pub fn storage_request(pvc: &PersistentVolumeClaim) -> Option<&Quantity> {
    pvc.spec
        .as_ref()
        .and_then(|s| s.resources.as_ref())
        .and_then(|r| r.requests.as_ref())
        .and_then(|r| r.get("storage"))
}

/// True if the claim must grow to reach `desired_bytes`
///
/// Monotonic: a smaller desired size never reports drift, since claims
/// cannot shrink.
pub fn storage_needs_expansion(
    desired_bytes: u128,
    pvc: &PersistentVolumeClaim,
) -> Result<bool, Error> {
    let Some(current) = storage_request(pvc) else {
        return Ok(true);
    };
    let current_bytes = parse_bytes(&current.0).map_err(|e| {
        Error::internal(format!(
            "claim reports unparsable storage request '{}': {}",
            current.0, e
        ))
    })?;
    Ok(desired_bytes > current_bytes)
}

/// Workload fields the controller converges
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadTarget<'a> {
    /// Desired replica count
    pub replicas: i32,
    /// Full image reference
    pub image: &'a str,
    /// Mount path of the content volume
    pub mount_path: &'a str,
    /// Claim backing the content volume
    pub claim_name: &'a str,
}

/// Which workload fields have drifted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkloadDrift {
    /// Replica count differs
    pub replicas: bool,
    /// Container image differs
    pub image: bool,
    /// Content mount path differs, or the mount or its backing claim is gone
    pub mount_path: bool,
}

impl WorkloadDrift {
    /// True if any field drifted
    pub fn any(&self) -> bool {
        self.replicas || self.image || self.mount_path
    }
}

/// The nginx container of a Deployment's pod template
pub fn nginx_container(deploy: &Deployment) -> Option<&Container> {
    deploy
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|p| p.containers.iter().find(|c| c.name == NGINX_CONTAINER))
}

/// Mount path of the content volume in a container
pub fn content_mount_path(container: &Container) -> Option<&str> {
    container
        .volume_mounts
        .as_ref()
        .and_then(|mounts| mounts.iter().find(|m| m.name == CONTENT_VOLUME))
        .map(|m| m.mount_path.as_str())
}

/// Claim backing the content volume of a Deployment's pod template
pub fn content_claim(deploy: &Deployment) -> Option<&str> {
    deploy
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|p| p.volumes.as_ref())
        .and_then(|volumes| volumes.iter().find(|v| v.name == CONTENT_VOLUME))
        .and_then(|v| v.persistent_volume_claim.as_ref())
        .map(|c| c.claim_name.as_str())
}

/// Compare a Deployment against the desired workload fields
pub fn workload_drift(desired: &WorkloadTarget<'_>, deploy: &Deployment) -> WorkloadDrift {
    // The API server defaults an unset replica count to 1
    let replicas = deploy.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let container = nginx_container(deploy);

    WorkloadDrift {
        replicas: replicas != desired.replicas,
        image: container.and_then(|c| c.image.as_deref()) != Some(desired.image),
        mount_path: container.and_then(content_mount_path) != Some(desired.mount_path)
            || content_claim(deploy) != Some(desired.claim_name),
    }
}

/// True if the Service is exposed as anything other than ClusterIP
pub fn exposure_drifted(svc: &Service) -> bool {
    let type_ = svc.spec.as_ref().and_then(|s| s.type_.as_deref());
    !matches!(type_, None | Some("ClusterIP"))
}

/// Path of the first rule's first HTTP path, if any
pub fn route_path(ing: &Ingress) -> Option<&str> {
    ing.spec
        .as_ref()
        .and_then(|s| s.rules.as_ref())
        .and_then(|rules| rules.first())
        .and_then(|rule| rule.http.as_ref())
        .and_then(|http| http.paths.first())
        .and_then(|p| p.path.as_deref())
}

/// True if the first rule's path differs from `desired_path` or is missing
pub fn route_path_drifted(desired_path: &str, ing: &Ingress) -> bool {
    route_path(ing) != Some(desired_path)
}
