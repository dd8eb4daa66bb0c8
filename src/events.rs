//! Kubernetes Events emitted on sites
//!
//! Events show up in `kubectl describe nss <name>` and are fire-and-forget:
//! a failed publish is logged and never fails the reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

use crate::child::ChildKind;

/// Name reported as the Event's reporting component
pub const CONTROLLER_NAME: &str = "sitekeeper-controller";

/// Machine-readable event reasons (REASON column)
pub mod reasons {
    /// A dependent was created
    pub const CHILD_CREATED: &str = "DependentCreated";
    /// A drifted dependent was patched back
    pub const CHILD_UPDATED: &str = "DependentUpdated";
    /// Ready pods reached the desired replica count
    pub const SITE_READY: &str = "SiteReady";
    /// All dependents removed, finalizer released
    pub const CLEANUP_COMPLETE: &str = "CleanupComplete";
    /// Reconciliation failed
    pub const RECONCILE_FAILED: &str = "ReconcileFailed";
}

/// Event actions (ACTION column)
pub mod actions {
    /// Converging dependents
    pub const RECONCILE: &str = "Reconcile";
    /// Tearing dependents down
    pub const DELETE: &str = "Delete";
}

/// A single event about a site
#[derive(Clone, Debug, PartialEq)]
pub struct SiteEvent {
    /// Normal or Warning
    pub type_: EventType,
    /// One of [`reasons`]
    pub reason: &'static str,
    /// One of [`actions`]
    pub action: &'static str,
    /// Human-readable detail
    pub note: String,
}

impl SiteEvent {
    /// A dependent was created
    pub fn child_created(kind: ChildKind, name: &str) -> Self {
        Self::normal(
            reasons::CHILD_CREATED,
            actions::RECONCILE,
            format!("created {} {}", kind, name),
        )
    }

    /// A dependent was patched to remove drift
    pub fn child_updated(kind: ChildKind, name: &str) -> Self {
        Self::normal(
            reasons::CHILD_UPDATED,
            actions::RECONCILE,
            format!("updated {} {}", kind, name),
        )
    }

    /// The site became ready
    pub fn site_ready(ready_replicas: i32) -> Self {
        Self::normal(
            reasons::SITE_READY,
            actions::RECONCILE,
            format!("{} replica(s) ready", ready_replicas),
        )
    }

    /// All dependents are gone
    pub fn cleanup_complete() -> Self {
        Self::normal(
            reasons::CLEANUP_COMPLETE,
            actions::DELETE,
            "all dependents deleted".to_string(),
        )
    }

    /// Reconciliation failed with the given error
    pub fn reconcile_failed(action: &'static str, error: &crate::Error) -> Self {
        Self {
            type_: EventType::Warning,
            reason: reasons::RECONCILE_FAILED,
            action,
            note: error.to_string(),
        }
    }

    fn normal(reason: &'static str, action: &'static str, note: String) -> Self {
        Self {
            type_: EventType::Normal,
            reason,
            action,
            note,
        }
    }
}

/// Trait for publishing site events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish `event` on the object referenced by `site`
    async fn publish(&self, site: &ObjectReference, event: SiteEvent);
}

/// Production implementation wrapping `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a new publisher reporting as [`CONTROLLER_NAME`]
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: CONTROLLER_NAME.to_string(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(&self, site: &ObjectReference, event: SiteEvent) {
        let reason = event.reason;
        let action = event.action;
        let event = Event {
            type_: event.type_,
            reason: reason.to_string(),
            note: Some(event.note),
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, site).await {
            warn!(
                reason,
                action,
                error = %e,
                "Failed to publish Kubernetes event"
            );
        }
    }
}

/// Publisher that drops every event
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(&self, _site: &ObjectReference, _event: SiteEvent) {}
}
