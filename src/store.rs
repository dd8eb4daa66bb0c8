//! Store access for sites and their dependents
//!
//! [`SiteStore`] is the only seam between the reconciliation core and the
//! Kubernetes API server. The core never talks to `kube::Client` directly,
//! which keeps it testable with mocks and in-memory fakes.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::child::{ChildKind, ChildObject};
use crate::crd::{NginxStaticSite, NginxStaticSiteStatus, SiteKey};
use crate::Error;

/// Field manager used for every write
pub const FIELD_MANAGER: &str = "sitekeeper-controller";

/// Build the merge patch body for a status write
///
/// Absent optional fields are sent as explicit `null`s, which is the only way
/// a JSON merge patch removes a field the server already holds.
pub fn status_patch(status: &NginxStaticSiteStatus) -> Result<serde_json::Value, Error> {
    let status = serde_json::to_value(status).map_err(|e| Error::serialization(e.to_string()))?;
    Ok(serde_json::json!({ "status": status }))
}

/// Trait abstracting Kubernetes API operations for sites
///
/// Not-found is never an error: reads return `Ok(None)` and deletes of
/// absent objects return `Ok(())`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SiteStore: Send + Sync {
    /// Fetch a site by key
    async fn get_site(&self, key: &SiteKey) -> Result<Option<NginxStaticSite>, Error>;

    /// Add a finalizer to a site if not already present
    async fn add_finalizer(&self, key: &SiteKey, finalizer: &str) -> Result<(), Error>;

    /// Remove a finalizer from a site
    async fn remove_finalizer(&self, key: &SiteKey, finalizer: &str) -> Result<(), Error>;

    /// Replace the status of a site
    async fn patch_status(&self, key: &SiteKey, status: &NginxStaticSiteStatus)
        -> Result<(), Error>;

    /// Fetch a dependent by kind and name
    async fn get_child(
        &self,
        kind: ChildKind,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ChildObject>, Error>;

    /// Create a dependent
    async fn create_child(&self, object: &ChildObject) -> Result<(), Error>;

    /// Replace a dependent, guarded by its `resourceVersion`
    async fn update_child(&self, object: &ChildObject) -> Result<(), Error>;

    /// Delete a dependent; absent counts as deleted
    async fn delete_child(&self, kind: ChildKind, name: &str, namespace: &str)
        -> Result<(), Error>;

    /// List pods in a namespace matching a label selector
    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>, Error>;
}

/// Real Kubernetes client implementation
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Create a new KubeStore wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn sites(&self, namespace: &str) -> Api<NginxStaticSite> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn patch_finalizers(&self, key: &SiteKey, finalizers: Vec<String>) -> Result<(), Error> {
        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers
            }
        });

        self.sites(&key.namespace)
            .patch(
                &key.name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;

        Ok(())
    }
}

async fn get_opt<K>(api: Api<K>, name: &str) -> Result<Option<K>, Error>
where
    K: Clone + DeserializeOwned + Debug,
{
    match api.get(name).await {
        Ok(obj) => Ok(Some(obj)),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn create<K>(client: &Client, object: &K) -> Result<(), Error>
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Serialize
        + Debug,
{
    let ns = object.meta().namespace.as_deref().unwrap_or_default();
    let api: Api<K> = Api::namespaced(client.clone(), ns);
    api.create(&PostParams::default(), object).await?;
    Ok(())
}

async fn replace<K>(client: &Client, object: &K) -> Result<(), Error>
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Serialize
        + Debug,
{
    let meta = object.meta();
    let ns = meta.namespace.as_deref().unwrap_or_default();
    let name = meta
        .name
        .as_deref()
        .ok_or_else(|| Error::internal("dependent has no name"))?;
    let api: Api<K> = Api::namespaced(client.clone(), ns);
    api.replace(name, &PostParams::default(), object).await?;
    Ok(())
}

async fn delete<K>(api: Api<K>, name: &str) -> Result<(), Error>
where
    K: Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &DeleteParams::background()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            debug!(name, "dependent already deleted");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl SiteStore for KubeStore {
    async fn get_site(&self, key: &SiteKey) -> Result<Option<NginxStaticSite>, Error> {
        get_opt(self.sites(&key.namespace), &key.name).await
    }

    async fn add_finalizer(&self, key: &SiteKey, finalizer: &str) -> Result<(), Error> {
        // Get current site to read existing finalizers
        let site = self.sites(&key.namespace).get(&key.name).await?;
        let mut finalizers = site.metadata.finalizers.unwrap_or_default();

        if finalizers.iter().any(|f| f == finalizer) {
            return Ok(());
        }

        finalizers.push(finalizer.to_string());
        self.patch_finalizers(key, finalizers).await
    }

    async fn remove_finalizer(&self, key: &SiteKey, finalizer: &str) -> Result<(), Error> {
        let site = match get_opt(self.sites(&key.namespace), &key.name).await? {
            Some(site) => site,
            None => return Ok(()),
        };
        let finalizers: Vec<String> = site
            .metadata
            .finalizers
            .as_ref()
            .map(|f| f.iter().filter(|s| *s != finalizer).cloned().collect())
            .unwrap_or_default();

        self.patch_finalizers(key, finalizers).await
    }

    async fn patch_status(
        &self,
        key: &SiteKey,
        status: &NginxStaticSiteStatus,
    ) -> Result<(), Error> {
        let body = status_patch(status)?;
        debug!(site = %key, phase = ?status.phase, "patching site status");

        self.sites(&key.namespace)
            .patch_status(
                &key.name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&body),
            )
            .await?;

        Ok(())
    }

    async fn get_child(
        &self,
        kind: ChildKind,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ChildObject>, Error> {
        let client = self.client.clone();
        let found = match kind {
            ChildKind::Storage => {
                get_opt(Api::<PersistentVolumeClaim>::namespaced(client, namespace), name)
                    .await?
                    .map(ChildObject::from)
            }
            ChildKind::Workload => get_opt(Api::<Deployment>::namespaced(client, namespace), name)
                .await?
                .map(ChildObject::from),
            ChildKind::Endpoint => get_opt(Api::<Service>::namespaced(client, namespace), name)
                .await?
                .map(ChildObject::from),
            ChildKind::Route => get_opt(Api::<Ingress>::namespaced(client, namespace), name)
                .await?
                .map(ChildObject::from),
        };
        Ok(found)
    }

    async fn create_child(&self, object: &ChildObject) -> Result<(), Error> {
        match object {
            ChildObject::Storage(o) => create(&self.client, o).await,
            ChildObject::Workload(o) => create(&self.client, o).await,
            ChildObject::Endpoint(o) => create(&self.client, o).await,
            ChildObject::Route(o) => create(&self.client, o).await,
        }
    }

    async fn update_child(&self, object: &ChildObject) -> Result<(), Error> {
        match object {
            ChildObject::Storage(o) => replace(&self.client, o).await,
            ChildObject::Workload(o) => replace(&self.client, o).await,
            ChildObject::Endpoint(o) => replace(&self.client, o).await,
            ChildObject::Route(o) => replace(&self.client, o).await,
        }
    }

    async fn delete_child(
        &self,
        kind: ChildKind,
        name: &str,
        namespace: &str,
    ) -> Result<(), Error> {
        let client = self.client.clone();
        match kind {
            ChildKind::Storage => {
                delete(Api::<PersistentVolumeClaim>::namespaced(client, namespace), name).await
            }
            ChildKind::Workload => {
                delete(Api::<Deployment>::namespaced(client, namespace), name).await
            }
            ChildKind::Endpoint => {
                delete(Api::<Service>::namespaced(client, namespace), name).await
            }
            ChildKind::Route => delete(Api::<Ingress>::namespaced(client, namespace), name).await,
        }
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api
            .list(&ListParams::default().labels(label_selector))
            .await?;
        Ok(pods.items)
    }
}
