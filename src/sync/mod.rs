//! Per-kind dependent synchronization
//!
//! Each dependent kind has a [`ChildSynchronizer`] that knows how to build the
//! full desired object and how to patch drift on an observed one.
//! [`sync_child`] drives any of them through the same fetch/create/patch
//! cycle.

mod endpoint;
mod route;
mod storage;
mod workload;

use std::collections::BTreeMap;
use std::fmt::Debug;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use tracing::{debug, info};

pub use endpoint::EndpointSync;
pub use route::RouteSync;
pub use storage::StorageSync;
pub use workload::WorkloadSync;

use crate::child::{ChildKind, ChildObject, MANAGED_BY_LABEL, MANAGER_NAME};
use crate::config::ReconcileSettings;
use crate::crd::{NginxStaticSite, SITE_APP_LABEL};
use crate::quantity::parse_bytes;
use crate::store::SiteStore;
use crate::Error;

/// Desired state of all dependents, computed fresh from a site on every pass
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SiteProjection {
    /// Site name
    pub name: String,
    /// Site namespace, shared by every dependent
    pub namespace: String,
    /// Storage size as written by the user
    pub storage_size: String,
    /// Storage size in bytes
    pub storage_bytes: u128,
    /// Desired replica count
    pub replicas: i32,
    /// Full container image reference
    pub image: String,
    /// Mount path of the content volume
    pub mount_path: String,
    /// Pod node selector
    pub node_selector: BTreeMap<String, String>,
    /// Ingress class for the Route
    pub ingress_class: Option<String>,
}

impl SiteProjection {
    /// Validate a site and project its desired dependent state
    ///
    /// Fails with a validation error before any write if the site cannot be
    /// realized (unparsable storage size, negative replicas, relative mount
    /// path, empty image tag).
    pub fn from_site(site: &NginxStaticSite, settings: &ReconcileSettings) -> Result<Self, Error> {
        let key = site.key()?;
        let spec = &site.spec;

        let storage_bytes = parse_bytes(&spec.storage_size).map_err(|e| {
            Error::validation(format!(
                "storageSize '{}' is not a valid quantity: {}",
                spec.storage_size, e
            ))
        })?;
        if spec.replicas < 0 {
            return Err(Error::validation(format!(
                "replicas must be non-negative, got {}",
                spec.replicas
            )));
        }
        if !spec.static_file_path.starts_with('/') {
            return Err(Error::validation(format!(
                "staticFilePath '{}' must be an absolute path",
                spec.static_file_path
            )));
        }
        let tag = spec.image_version.trim();
        if tag.is_empty() {
            return Err(Error::validation("imageVersion must not be empty"));
        }

        Ok(Self {
            name: key.name,
            namespace: key.namespace,
            storage_size: spec.storage_size.trim().to_string(),
            storage_bytes,
            replicas: spec.replicas,
            image: format!("{}:{}", settings.base_image, tag),
            mount_path: spec.static_file_path.clone(),
            node_selector: spec.node_selector.clone(),
            ingress_class: settings.ingress_class.clone(),
        })
    }

    /// Deterministic name of a dependent
    pub fn child_name(&self, kind: ChildKind) -> String {
        kind.object_name(&self.name)
    }

    /// Label selecting the site's pods
    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(SITE_APP_LABEL.to_string(), self.name.clone())])
    }

    /// Labels carried by every dependent
    pub fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.selector_labels();
        labels.insert(MANAGED_BY_LABEL.to_string(), MANAGER_NAME.to_string());
        labels
    }

    /// Path prefix the Route exposes the site under
    pub fn route_path(&self) -> String {
        format!("/{}", self.name)
    }

    /// Metadata for a new dependent (owner reference is attached on create)
    pub fn object_meta(&self, kind: ChildKind) -> ObjectMeta {
        ObjectMeta {
            name: Some(self.child_name(kind)),
            namespace: Some(self.namespace.clone()),
            labels: Some(self.labels()),
            ..Default::default()
        }
    }
}

/// What a synchronization pass did to one dependent
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Dependent was absent and has been created
    Created,
    /// Dependent had drifted and has been patched
    Updated,
    /// Dependent already matched; no write issued
    Unchanged,
}

impl SyncOutcome {
    /// True if a write was issued
    pub fn changed(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Builds and patches one kind of dependent
pub trait ChildSynchronizer: Send + Sync {
    /// Typed Kubernetes object backing this kind
    type Object: Resource<DynamicType = ()>
        + Clone
        + Debug
        + Send
        + Sync
        + Into<ChildObject>
        + TryFrom<ChildObject, Error = Error>;

    /// Which dependent this synchronizer owns
    const KIND: ChildKind;

    /// The complete desired object, without owner reference
    fn desired(&self, projection: &SiteProjection) -> Self::Object;

    /// Patch drifted controller-owned fields in place
    ///
    /// Returns true if anything changed. Everything not owned by the
    /// controller (including `resourceVersion`) is left untouched.
    fn patch_drift(
        &self,
        projection: &SiteProjection,
        observed: &mut Self::Object,
    ) -> Result<bool, Error>;
}

/// Converge one dependent toward its desired state
///
/// Absent dependents are created with a controller owner reference to
/// `site`. Present ones get at most one update carrying only the drifted
/// fields. Store errors are returned unchanged.
pub async fn sync_child<S: ChildSynchronizer>(
    store: &dyn SiteStore,
    synchronizer: &S,
    site: &NginxStaticSite,
    projection: &SiteProjection,
) -> Result<SyncOutcome, Error> {
    let kind = S::KIND;
    let name = projection.child_name(kind);

    match store.get_child(kind, &name, &projection.namespace).await? {
        None => {
            let owner = site.controller_owner_ref(&()).ok_or_else(|| {
                Error::internal(format!("site {} has no uid", site.name_any()))
            })?;
            let mut desired = synchronizer.desired(projection);
            desired.meta_mut().owner_references = Some(vec![owner]);

            info!(kind = %kind, name = %name, "creating dependent");
            store.create_child(&desired.into()).await?;
            Ok(SyncOutcome::Created)
        }
        Some(observed) => {
            let mut observed = S::Object::try_from(observed)?;
            if !synchronizer.patch_drift(projection, &mut observed)? {
                debug!(kind = %kind, name = %name, "dependent up to date");
                return Ok(SyncOutcome::Unchanged);
            }

            info!(kind = %kind, name = %name, "patching drifted dependent");
            store.update_child(&observed.into()).await?;
            Ok(SyncOutcome::Updated)
        }
    }
}
