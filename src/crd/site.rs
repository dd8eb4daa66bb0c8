//! NginxStaticSite Custom Resource Definition
//!
//! An NginxStaticSite declares a static website served by nginx out of a
//! persistent volume. The controller realizes it as a PersistentVolumeClaim,
//! a Deployment, a ClusterIP Service and an Ingress, all owned by the site.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::SitePhase;
use crate::Error;

/// Finalizer blocking removal of a site until its dependents are gone
pub const SITE_FINALIZER: &str = "web.sitekeeper.dev/finalizer";

/// Specification for an NginxStaticSite
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "web.sitekeeper.dev",
    version = "v1alpha1",
    kind = "NginxStaticSite",
    plural = "nginxstaticsites",
    shortname = "nss",
    namespaced,
    status = "NginxStaticSiteStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Ready","type":"integer","jsonPath":".status.readyReplicas"}"#,
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.imageVersion"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NginxStaticSiteSpec {
    /// nginx image tag (e.g. "1.25")
    pub image_version: String,

    /// Size of the content volume as a Kubernetes quantity (e.g. "1Gi")
    ///
    /// Growing the size expands the claim. Shrinking is ignored.
    pub storage_size: String,

    /// Desired number of nginx pods
    #[schemars(range(min = 0))]
    pub replicas: i32,

    /// Absolute path the content volume is mounted at inside the container
    pub static_file_path: String,

    /// Node labels the pods must be scheduled onto
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
}

/// Status for an NginxStaticSite
///
/// `phase` and `ready_replicas` are derived from the dependents on every
/// reconciliation and never read back as input.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NginxStaticSiteStatus {
    /// Current lifecycle phase
    #[serde(default)]
    pub phase: SitePhase,

    /// Number of pods reporting Ready
    #[serde(default)]
    pub ready_replicas: i32,

    /// Reason for the last failure, cleared once reconciliation succeeds
    ///
    /// Serialized as `null` when absent so a merge patch removes it.
    #[serde(default)]
    pub message: Option<String>,

    /// When the site last became not-ready; drives requeue backoff
    #[serde(default)]
    pub pending_since: Option<DateTime<Utc>>,
}

impl NginxStaticSiteStatus {
    /// Create a new status with the given phase
    pub fn with_phase(phase: SitePhase) -> Self {
        Self {
            phase,
            ..Default::default()
        }
    }

    /// Set the message and return self for chaining
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }
}

/// Namespaced identity of a site
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SiteKey {
    /// Site namespace
    pub namespace: String,
    /// Site name
    pub name: String,
}

impl SiteKey {
    /// Build a key from namespace and name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for SiteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl NginxStaticSite {
    /// Identity of this site
    pub fn key(&self) -> Result<SiteKey, Error> {
        let namespace = self
            .namespace()
            .ok_or_else(|| Error::internal("NginxStaticSite must be namespaced"))?;
        Ok(SiteKey::new(namespace, self.name_any()))
    }

    /// True once the API server has recorded deletion intent
    pub fn is_deletion_requested(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// True if the given finalizer is present
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers().iter().any(|f| f == finalizer)
    }

    /// Current status, or the default (Pending, nothing ready) if unset
    pub fn current_status(&self) -> NginxStaticSiteStatus {
        self.status.clone().unwrap_or_default()
    }

    /// Label selecting this site's pods
    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(SITE_APP_LABEL.to_string(), self.name_any())])
    }
}

/// Identity label shared by the site's pods, Deployment selector and Service
pub const SITE_APP_LABEL: &str = "app";
