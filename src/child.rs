//! Dependent resources owned by an NginxStaticSite
//!
//! Every site owns exactly four dependents. Their names are derived from the
//! site name so they can be found again on every reconciliation without
//! storing anything.

use std::fmt;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::Error;

/// Name of the nginx container inside the Workload pod template
pub const NGINX_CONTAINER: &str = "nginx";

/// Pod volume backed by the Storage claim
pub const CONTENT_VOLUME: &str = "static-content";

/// Port nginx listens on and the Endpoint exposes
pub const HTTP_PORT: i32 = 80;

/// Marks dependents as managed by this controller
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`] on every dependent
pub const MANAGER_NAME: &str = "sitekeeper";

/// The four dependent kinds, in dependency order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChildKind {
    /// PersistentVolumeClaim holding the static content
    Storage,
    /// nginx Deployment mounting the claim
    Workload,
    /// ClusterIP Service in front of the pods
    Endpoint,
    /// Ingress routing `/<site>` to the Service
    Route,
}

impl ChildKind {
    /// Creation order. Later kinds reference earlier ones by name.
    pub const CREATION_ORDER: [ChildKind; 4] = [
        ChildKind::Storage,
        ChildKind::Workload,
        ChildKind::Endpoint,
        ChildKind::Route,
    ];

    /// Teardown order (reverse of creation)
    pub const DELETION_ORDER: [ChildKind; 4] = [
        ChildKind::Route,
        ChildKind::Endpoint,
        ChildKind::Workload,
        ChildKind::Storage,
    ];

    /// Name suffix appended to the site name
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Storage => "pvc",
            Self::Workload => "nginx",
            Self::Endpoint => "svc",
            Self::Route => "ing",
        }
    }

    /// Deterministic dependent name for a site
    pub fn object_name(&self, site_name: &str) -> String {
        format!("{}-{}", site_name, self.suffix())
    }

    /// Kubernetes kind of the backing object
    pub fn api_kind(&self) -> &'static str {
        match self {
            Self::Storage => "PersistentVolumeClaim",
            Self::Workload => "Deployment",
            Self::Endpoint => "Service",
            Self::Route => "Ingress",
        }
    }
}

impl fmt::Display for ChildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_kind())
    }
}

/// A dependent object as read from or written to the store
#[derive(Clone, Debug, PartialEq)]
pub enum ChildObject {
    /// Storage dependent
    Storage(PersistentVolumeClaim),
    /// Workload dependent
    Workload(Deployment),
    /// Endpoint dependent
    Endpoint(Service),
    /// Route dependent
    Route(Ingress),
}

impl ChildObject {
    /// Which dependent this is
    pub fn kind(&self) -> ChildKind {
        match self {
            Self::Storage(_) => ChildKind::Storage,
            Self::Workload(_) => ChildKind::Workload,
            Self::Endpoint(_) => ChildKind::Endpoint,
            Self::Route(_) => ChildKind::Route,
        }
    }

    /// Object metadata
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::Storage(o) => &o.metadata,
            Self::Workload(o) => &o.metadata,
            Self::Endpoint(o) => &o.metadata,
            Self::Route(o) => &o.metadata,
        }
    }

    /// Object name, empty if unset
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    /// Object namespace, empty if unset
    pub fn namespace(&self) -> &str {
        self.metadata().namespace.as_deref().unwrap_or_default()
    }
}

macro_rules! child_variant {
    ($variant:ident, $ty:ty) => {
        impl From<$ty> for ChildObject {
            fn from(obj: $ty) -> Self {
                ChildObject::$variant(obj)
            }
        }

        impl TryFrom<ChildObject> for $ty {
            type Error = Error;

            fn try_from(obj: ChildObject) -> Result<Self, Error> {
                match obj {
                    ChildObject::$variant(inner) => Ok(inner),
                    other => Err(Error::internal(format!(
                        "expected {} but store returned {} {}",
                        ChildKind::$variant,
                        other.kind(),
                        other.name()
                    ))),
                }
            }
        }
    };
}

child_variant!(Storage, PersistentVolumeClaim);
child_variant!(Workload, Deployment);
child_variant!(Endpoint, Service);
child_variant!(Route, Ingress);
