//! In-memory store used by the reconciliation tests
//!
//! Mimics the API server for the handful of behaviors the controller relies
//! on: `resourceVersion` guarded replaces, 409 on duplicate creates, 404
//! tolerant deletes, finalizer-gated site removal, and dependents that linger
//! in a terminating state while protected.
//!
//! Status writes go through the same JSON merge patch body the real store
//! sends, so a field is only cleared when the patch carries an explicit null.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{ObjectReference, Pod, PodCondition, PodStatus};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};

use sitekeeper::child::{ChildKind, ChildObject};
use sitekeeper::crd::{
    NginxStaticSite, NginxStaticSiteSpec, NginxStaticSiteStatus, SiteKey, SITE_APP_LABEL,
};
use sitekeeper::events::{EventPublisher, SiteEvent};
use sitekeeper::quantity::parse_bytes;
use sitekeeper::store::{status_patch, SiteStore};
use sitekeeper::Error;

type ChildKey = (ChildKind, String, String);

/// Write counters, so tests can assert what a pass did (or did not) touch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Calls {
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
    pub status_writes: usize,
    pub finalizer_removals: usize,
}

impl Calls {
    /// Creates plus updates
    pub fn dependent_writes(&self) -> usize {
        self.creates + self.updates
    }
}

#[derive(Default)]
struct State {
    sites: HashMap<SiteKey, NginxStaticSite>,
    children: HashMap<ChildKey, ChildObject>,
    pods: Vec<Pod>,
    calls: Calls,
    failing_deletes: HashSet<ChildKind>,
    protected: HashSet<ChildKind>,
    next_version: u64,
    /// Kinds of every dependent deleted, in call order
    delete_log: Vec<ChildKind>,
}

impl State {
    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

/// In-memory [`SiteStore`]
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<State>,
}

fn api_error(code: u16, reason: &str, message: impl Into<String>) -> Error {
    Error::Kube(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: message.into(),
        reason: reason.to_string(),
        code,
    }))
}

fn meta_mut(object: &mut ChildObject) -> &mut ObjectMeta {
    match object {
        ChildObject::Storage(o) => &mut o.metadata,
        ChildObject::Workload(o) => &mut o.metadata,
        ChildObject::Endpoint(o) => &mut o.metadata,
        ChildObject::Route(o) => &mut o.metadata,
    }
}

fn child_key(object: &ChildObject) -> ChildKey {
    (
        object.kind(),
        object.namespace().to_string(),
        object.name().to_string(),
    )
}

fn storage_request_bytes(object: &ChildObject) -> Option<u128> {
    let ChildObject::Storage(pvc) = object else {
        return None;
    };
    let Quantity(size) = pvc
        .spec
        .as_ref()?
        .resources
        .as_ref()?
        .requests
        .as_ref()?
        .get("storage")?;
    parse_bytes(size).ok()
}

/// A site as a user would submit it, already admitted by the API server
pub fn sample_site(namespace: &str, name: &str, spec: NginxStaticSiteSpec) -> NginxStaticSite {
    let mut site = NginxStaticSite::new(name, spec);
    site.metadata.namespace = Some(namespace.to_string());
    site.metadata.uid = Some(format!("uid-{}", name));
    site
}

/// The spec used by most stories: three nginx 1.25 replicas over 1Gi
pub fn sample_spec() -> NginxStaticSiteSpec {
    NginxStaticSiteSpec {
        image_version: "1.25".to_string(),
        storage_size: "1Gi".to_string(),
        replicas: 3,
        static_file_path: "/usr/share/nginx/html".to_string(),
        node_selector: BTreeMap::new(),
    }
}

fn pod(namespace: &str, site: &str, index: usize, ready: bool) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(format!("{}-nginx-{}", site, index)),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                SITE_APP_LABEL.to_string(),
                site.to_string(),
            )])),
            ..Default::default()
        },
        status: Some(PodStatus {
            conditions: Some(vec![PodCondition {
                type_: "Ready".to_string(),
                status: if ready { "True" } else { "False" }.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn selector_matches(pod: &Pod, selector: &str) -> bool {
    let labels = pod.metadata.labels.clone().unwrap_or_default();
    selector.split(',').all(|term| match term.split_once('=') {
        Some((k, v)) => labels.get(k).map(String::as_str) == Some(v),
        None => false,
    })
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("mutex should not be poisoned")
    }

    // =========================================================================
    // Test controls
    // =========================================================================

    /// Admit a site, as `kubectl apply` would
    pub fn put_site(&self, site: NginxStaticSite) -> SiteKey {
        let key = site.key().expect("sample sites are namespaced");
        self.state().sites.insert(key.clone(), site);
        key
    }

    /// Change the spec of a stored site
    pub fn edit_spec(&self, key: &SiteKey, edit: impl FnOnce(&mut NginxStaticSiteSpec)) {
        let mut state = self.state();
        let site = state.sites.get_mut(key).expect("site should exist");
        edit(&mut site.spec);
    }

    /// Mark a site for deletion; it disappears once its finalizers are gone
    pub fn request_deletion(&self, key: &SiteKey, at: DateTime<Utc>) {
        let mut state = self.state();
        let finalizers_empty = {
            let site = state.sites.get_mut(key).expect("site should exist");
            site.metadata.deletion_timestamp = Some(Time(at));
            site.metadata.finalizers.clone().unwrap_or_default().is_empty()
        };
        if finalizers_empty {
            state.sites.remove(key);
        }
    }

    /// Replace the pods backing a site: `ready` ready pods then `not_ready`
    pub fn set_pods(&self, namespace: &str, site: &str, ready: usize, not_ready: usize) {
        let mut state = self.state();
        let selector = format!("{}={}", SITE_APP_LABEL, site);
        state.pods.retain(|p| {
            p.metadata.namespace.as_deref() != Some(namespace) || !selector_matches(p, &selector)
        });
        for i in 0..ready + not_ready {
            state.pods.push(pod(namespace, site, i, i < ready));
        }
    }

    /// Make deletes of this kind fail with a server error
    pub fn fail_deletes_of(&self, kind: ChildKind) {
        self.state().failing_deletes.insert(kind);
    }

    /// Stop failing deletes
    pub fn heal_deletes(&self) {
        self.state().failing_deletes.clear();
    }

    /// Deleting this kind only marks it terminating (like a protected claim)
    pub fn protect(&self, kind: ChildKind) {
        self.state().protected.insert(kind);
    }

    /// Let terminating objects of this kind finally go away
    pub fn release(&self, kind: ChildKind) {
        let mut state = self.state();
        state.protected.remove(&kind);
        state.children.retain(|(k, _, _), obj| {
            *k != kind || obj.metadata().deletion_timestamp.is_none()
        });
    }

    /// Modify a stored dependent behind the controller's back
    pub fn tamper(
        &self,
        kind: ChildKind,
        namespace: &str,
        name: &str,
        f: impl FnOnce(&mut ChildObject),
    ) {
        let mut state = self.state();
        let version = state.bump_version();
        let object = state
            .children
            .get_mut(&(kind, namespace.to_string(), name.to_string()))
            .expect("dependent should exist");
        f(object);
        meta_mut(object).resource_version = Some(version);
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn site(&self, key: &SiteKey) -> Option<NginxStaticSite> {
        self.state().sites.get(key).cloned()
    }

    pub fn status(&self, key: &SiteKey) -> NginxStaticSiteStatus {
        self.site(key)
            .and_then(|s| s.status)
            .expect("site should carry a status")
    }

    pub fn child(&self, kind: ChildKind, namespace: &str, name: &str) -> Option<ChildObject> {
        self.state()
            .children
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn child_count(&self) -> usize {
        self.state().children.len()
    }

    pub fn calls(&self) -> Calls {
        self.state().calls
    }

    pub fn delete_log(&self) -> Vec<ChildKind> {
        self.state().delete_log.clone()
    }
}

#[async_trait]
impl SiteStore for FakeStore {
    async fn get_site(&self, key: &SiteKey) -> Result<Option<NginxStaticSite>, Error> {
        Ok(self.state().sites.get(key).cloned())
    }

    async fn add_finalizer(&self, key: &SiteKey, finalizer: &str) -> Result<(), Error> {
        let mut state = self.state();
        let site = state
            .sites
            .get_mut(key)
            .ok_or_else(|| api_error(404, "NotFound", format!("site {} not found", key)))?;
        let finalizers = site.metadata.finalizers.get_or_insert_with(Vec::new);
        if !finalizers.iter().any(|f| f == finalizer) {
            finalizers.push(finalizer.to_string());
        }
        Ok(())
    }

    async fn remove_finalizer(&self, key: &SiteKey, finalizer: &str) -> Result<(), Error> {
        let mut state = self.state();
        state.calls.finalizer_removals += 1;
        let Some(site) = state.sites.get_mut(key) else {
            return Ok(());
        };
        if let Some(finalizers) = site.metadata.finalizers.as_mut() {
            finalizers.retain(|f| f != finalizer);
        }
        let release = site.metadata.deletion_timestamp.is_some()
            && site.metadata.finalizers.as_ref().map_or(true, Vec::is_empty);
        if release {
            state.sites.remove(key);
        }
        Ok(())
    }

    async fn patch_status(
        &self,
        key: &SiteKey,
        status: &NginxStaticSiteStatus,
    ) -> Result<(), Error> {
        let mut state = self.state();
        state.calls.status_writes += 1;
        let site = state
            .sites
            .get_mut(key)
            .ok_or_else(|| api_error(404, "NotFound", format!("site {} not found", key)))?;

        let patch = status_patch(status)?;
        let mut merged = serde_json::to_value(&site.status)
            .map_err(|e| Error::serialization(e.to_string()))?;
        json_patch::merge(&mut merged, &patch["status"]);
        site.status = serde_json::from_value(merged)
            .map_err(|e| Error::serialization(e.to_string()))?;
        Ok(())
    }

    async fn get_child(
        &self,
        kind: ChildKind,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ChildObject>, Error> {
        Ok(self.child(kind, namespace, name))
    }

    async fn create_child(&self, object: &ChildObject) -> Result<(), Error> {
        let mut state = self.state();
        let key = child_key(object);
        if state.children.contains_key(&key) {
            return Err(api_error(
                409,
                "AlreadyExists",
                format!("{} {} already exists", object.kind(), object.name()),
            ));
        }
        let mut stored = object.clone();
        let version = state.bump_version();
        meta_mut(&mut stored).resource_version = Some(version);
        state.children.insert(key, stored);
        state.calls.creates += 1;
        Ok(())
    }

    async fn update_child(&self, object: &ChildObject) -> Result<(), Error> {
        let mut state = self.state();
        let key = child_key(object);
        let current = state.children.get(&key).ok_or_else(|| {
            api_error(404, "NotFound", format!("{} {} not found", object.kind(), object.name()))
        })?;

        if current.metadata().resource_version != object.metadata().resource_version {
            return Err(api_error(409, "Conflict", "the object has been modified"));
        }
        let sizes = (storage_request_bytes(current), storage_request_bytes(object));
        if let (Some(old), Some(new)) = sizes {
            if new < old {
                return Err(api_error(422, "Invalid", "storage request cannot shrink"));
            }
        }

        let mut stored = object.clone();
        let version = state.bump_version();
        meta_mut(&mut stored).resource_version = Some(version);
        state.children.insert(key, stored);
        state.calls.updates += 1;
        Ok(())
    }

    async fn delete_child(
        &self,
        kind: ChildKind,
        name: &str,
        namespace: &str,
    ) -> Result<(), Error> {
        let mut state = self.state();
        state.calls.deletes += 1;
        state.delete_log.push(kind);
        if state.failing_deletes.contains(&kind) {
            return Err(api_error(500, "InternalError", "etcdserver: request timed out"));
        }

        let key = (kind, namespace.to_string(), name.to_string());
        if state.protected.contains(&kind) {
            if let Some(object) = state.children.get_mut(&key) {
                meta_mut(object).deletion_timestamp = Some(Time(Utc::now()));
            }
        } else {
            state.children.remove(&key);
        }
        Ok(())
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>, Error> {
        Ok(self
            .state()
            .pods
            .iter()
            .filter(|p| p.metadata.namespace.as_deref() == Some(namespace))
            .filter(|p| selector_matches(p, label_selector))
            .cloned()
            .collect())
    }
}

/// Event publisher that remembers the reason of every event
#[derive(Default)]
pub struct RecordingEvents {
    reasons: Mutex<Vec<&'static str>>,
}

impl RecordingEvents {
    pub fn reasons(&self) -> Vec<&'static str> {
        self.reasons
            .lock()
            .expect("mutex should not be poisoned")
            .clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingEvents {
    async fn publish(&self, _site: &ObjectReference, event: SiteEvent) {
        self.reasons
            .lock()
            .expect("mutex should not be poisoned")
            .push(event.reason);
    }
}

/// A fixed point in time, `secs` seconds after the first pass of a story
pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).expect("timestamp in range")
}
