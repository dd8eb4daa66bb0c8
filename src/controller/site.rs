//! NginxStaticSite controller implementation
//!
//! This module implements the reconciliation logic for NginxStaticSite
//! resources. It follows the Kubernetes controller pattern: observe current
//! state, determine desired state, calculate diff, and apply changes.
//!
//! The engine holds no state of its own. Everything it needs is re-read from
//! the store on every pass, so it can be interrupted at any point and simply
//! run again.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kube::runtime::controller::Action;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use super::finalizer::{ensure_marker, finalize, Cleanup};
use super::status::{converged_status, pod_selector, project_status};
use crate::config::ReconcileSettings;
use crate::crd::{NginxStaticSite, NginxStaticSiteStatus, SiteKey, SitePhase, SITE_FINALIZER};
use crate::events::{actions, EventPublisher, KubeEventPublisher, NoopEventPublisher, SiteEvent};
use crate::store::{KubeStore, SiteStore};
use crate::sync::{
    sync_child, ChildSynchronizer, EndpointSync, RouteSync, SiteProjection, StorageSync,
    SyncOutcome, WorkloadSync,
};
use crate::Error;

/// Controller context shared read-only across reconciliations
pub struct Context {
    /// Store handle for sites and dependents
    pub store: Arc<dyn SiteStore>,
    /// Kubernetes Event sink
    pub events: Arc<dyn EventPublisher>,
    /// Immutable reconciliation settings
    pub settings: ReconcileSettings,
}

impl Context {
    /// Create a context backed by a real Kubernetes client
    pub fn new(client: Client, settings: ReconcileSettings) -> Self {
        Self {
            store: Arc::new(KubeStore::new(client.clone())),
            events: Arc::new(KubeEventPublisher::new(client)),
            settings,
        }
    }

    /// Create a context for testing with a custom store, default settings
    /// and no event publishing
    pub fn for_testing(store: Arc<dyn SiteStore>) -> Self {
        Self {
            store,
            events: Arc::new(NoopEventPublisher),
            settings: ReconcileSettings::default(),
        }
    }

    /// Replace the settings
    pub fn with_settings(mut self, settings: ReconcileSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the event publisher
    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = events;
        self
    }
}

/// What the engine wants to happen after a successful pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Continuation {
    /// Nothing left to do until the site or a dependent changes
    Done,
    /// Check again after the given delay
    RequeueAfter(Duration),
}

impl From<Continuation> for Action {
    fn from(next: Continuation) -> Self {
        match next {
            Continuation::Done => Action::await_change(),
            Continuation::RequeueAfter(delay) => Action::requeue(delay),
        }
    }
}

/// Reconcile a single site
///
/// Loads the site by key, then either tears it down (deletion requested) or
/// converges its dependents and records health on status. A missing site is
/// not an error. Failures are recorded on status before being returned.
#[instrument(skip(ctx, key, now), fields(site = %key))]
pub async fn reconcile_site(
    ctx: &Context,
    key: &SiteKey,
    now: DateTime<Utc>,
) -> Result<Continuation, Error> {
    let Some(site) = ctx.store.get_site(key).await? else {
        debug!("site not found, nothing to do");
        return Ok(Continuation::Done);
    };

    if site.is_deletion_requested() {
        return teardown(ctx, &site, key).await;
    }

    match converge(ctx, &site, key, now).await {
        Ok(next) => Ok(next),
        Err(e) => {
            let previous = site.current_status();
            let status = failure_status(&previous, &e);
            record_failure(ctx, &site, key, &previous, &status, actions::RECONCILE, &e).await;
            Err(e)
        }
    }
}

/// kube-runtime entry point
pub async fn reconcile(site: Arc<NginxStaticSite>, ctx: Arc<Context>) -> Result<Action, Error> {
    let key = site.key()?;
    reconcile_site(&ctx, &key, Utc::now()).await.map(Action::from)
}

/// Error policy for the controller
///
/// Transient failures come back quickly; rejections wait longer since they
/// need a spec change to succeed.
pub fn error_policy(site: Arc<NginxStaticSite>, error: &Error, ctx: Arc<Context>) -> Action {
    let retryable = error.is_retryable();
    error!(
        ?error,
        site = %site.name_any(),
        retryable,
        "reconciliation failed"
    );

    if retryable {
        Action::requeue(ctx.settings.error_requeue)
    } else {
        Action::requeue(ctx.settings.rejection_requeue)
    }
}

async fn converge(
    ctx: &Context,
    site: &NginxStaticSite,
    key: &SiteKey,
    now: DateTime<Utc>,
) -> Result<Continuation, Error> {
    let projection = SiteProjection::from_site(site, &ctx.settings)?;
    ensure_marker(ctx.store.as_ref(), site, key).await?;

    // Later dependents reference earlier ones by name
    apply(ctx, site, &StorageSync, &projection).await?;
    apply(ctx, site, &WorkloadSync, &projection).await?;
    apply(ctx, site, &EndpointSync, &projection).await?;
    apply(ctx, site, &RouteSync, &projection).await?;

    let pods = ctx
        .store
        .list_pods(&key.namespace, &pod_selector(&key.name))
        .await?;
    let health = project_status(&pods, projection.replicas);
    let previous = site.current_status();
    let status = converged_status(&previous, &health, now);
    write_status(ctx, key, &previous, &status).await?;

    if health.is_ready() {
        if previous.phase != SitePhase::Running {
            info!(ready = health.ready_replicas, "site is running");
            publish(ctx, site, SiteEvent::site_ready(health.ready_replicas)).await;
        }
        return Ok(Continuation::Done);
    }

    let waited = status
        .pending_since
        .and_then(|since| (now - since).to_std().ok())
        .unwrap_or_default();
    let delay = ctx.settings.backoff.delay(waited);
    info!(
        ready = health.ready_replicas,
        desired = projection.replicas,
        delay_secs = delay.as_secs(),
        "site not ready yet, requeueing"
    );
    Ok(Continuation::RequeueAfter(delay))
}

async fn apply<S: ChildSynchronizer>(
    ctx: &Context,
    site: &NginxStaticSite,
    synchronizer: &S,
    projection: &SiteProjection,
) -> Result<(), Error> {
    let name = projection.child_name(S::KIND);
    match sync_child(ctx.store.as_ref(), synchronizer, site, projection).await? {
        SyncOutcome::Created => publish(ctx, site, SiteEvent::child_created(S::KIND, &name)).await,
        SyncOutcome::Updated => publish(ctx, site, SiteEvent::child_updated(S::KIND, &name)).await,
        SyncOutcome::Unchanged => {}
    }
    Ok(())
}

async fn teardown(
    ctx: &Context,
    site: &NginxStaticSite,
    key: &SiteKey,
) -> Result<Continuation, Error> {
    if !site.has_finalizer(SITE_FINALIZER) {
        debug!("deletion requested and finalizer already released");
        return Ok(Continuation::Done);
    }

    let previous = site.current_status();
    let terminating = NginxStaticSiteStatus {
        phase: SitePhase::Terminating,
        pending_since: None,
        ..previous.clone()
    };
    // A failed status write must not block cleanup
    if let Err(e) = write_status(ctx, key, &previous, &terminating).await {
        warn!(error = %e, "failed to record Terminating status, continuing teardown");
    }

    match finalize(ctx.store.as_ref(), key).await {
        Ok(Cleanup::Complete) => {
            publish(ctx, site, SiteEvent::cleanup_complete()).await;
            Ok(Continuation::Done)
        }
        Ok(Cleanup::Waiting(_)) => {
            let status = NginxStaticSiteStatus {
                message: None,
                ..terminating.clone()
            };
            if let Err(e) = write_status(ctx, key, &terminating, &status).await {
                warn!(error = %e, "failed to update Terminating status");
            }
            Ok(Continuation::RequeueAfter(ctx.settings.deletion_poll_interval))
        }
        Err(e) => {
            let status = NginxStaticSiteStatus {
                message: Some(e.to_string()),
                ..terminating.clone()
            };
            record_failure(ctx, site, key, &terminating, &status, actions::DELETE, &e).await;
            Err(e)
        }
    }
}

/// Status recording a failed convergence pass
///
/// Transient errors keep the previous phase; anything that will fail again
/// without user action marks the site Failed.
fn failure_status(previous: &NginxStaticSiteStatus, error: &Error) -> NginxStaticSiteStatus {
    let mut status = previous.clone();
    status.message = Some(error.to_string());
    if !error.is_retryable() {
        status.phase = SitePhase::Failed;
        status.pending_since = None;
    }
    status
}

/// Write status unless it is identical to what the site already carries
///
/// Rewriting an identical status would only produce a watch event and
/// another pointless reconciliation.
async fn write_status(
    ctx: &Context,
    key: &SiteKey,
    previous: &NginxStaticSiteStatus,
    status: &NginxStaticSiteStatus,
) -> Result<(), Error> {
    if previous == status {
        debug!("status unchanged, skipping update");
        return Ok(());
    }
    debug!(phase = %status.phase, ready = status.ready_replicas, "updating status");
    ctx.store.patch_status(key, status).await
}

async fn record_failure(
    ctx: &Context,
    site: &NginxStaticSite,
    key: &SiteKey,
    previous: &NginxStaticSiteStatus,
    status: &NginxStaticSiteStatus,
    action: &'static str,
    error: &Error,
) {
    if let Err(write_err) = write_status(ctx, key, previous, status).await {
        warn!(
            error = %write_err,
            original_error = %error,
            "failed to record failure on status"
        );
    }
    publish(ctx, site, SiteEvent::reconcile_failed(action, error)).await;
}

async fn publish(ctx: &Context, site: &NginxStaticSite, event: SiteEvent) {
    ctx.events.publish(&site.object_ref(&()), event).await;
}
