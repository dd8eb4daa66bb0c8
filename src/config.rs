//! Controller configuration
//!
//! [`ReconcileSettings`] is immutable for the lifetime of the process and
//! shared by every reconciliation. [`SettingsArgs`] is the command line
//! (and environment) surface that builds it.

use std::time::Duration;

use clap::Args;

use crate::backoff::{BackoffKind, BackoffPolicy, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY};

/// Default image repository for the nginx container
pub const DEFAULT_BASE_IMAGE: &str = "nginx";

/// Settings consumed by the reconciliation core
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileSettings {
    /// Image repository; the container image is `<base_image>:<imageVersion>`
    pub base_image: String,
    /// Ingress class for the Route, cluster default if unset
    pub ingress_class: Option<String>,
    /// Requeue schedule while a site is not ready
    pub backoff: BackoffPolicy,
    /// Requeue delay while waiting for deleted dependents to disappear
    pub deletion_poll_interval: Duration,
    /// Requeue delay after a transient error
    pub error_requeue: Duration,
    /// Requeue delay after a rejection or internal error
    pub rejection_requeue: Duration,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            base_image: DEFAULT_BASE_IMAGE.to_string(),
            ingress_class: None,
            backoff: BackoffPolicy::default(),
            deletion_poll_interval: Duration::from_secs(2),
            error_requeue: Duration::from_secs(10),
            rejection_requeue: Duration::from_secs(60),
        }
    }
}

/// Reconciliation settings as command line arguments
#[derive(Args, Debug, Clone)]
pub struct SettingsArgs {
    /// Image repository for the nginx container
    #[arg(long, env = "SITEKEEPER_BASE_IMAGE", default_value = DEFAULT_BASE_IMAGE)]
    pub base_image: String,

    /// Ingress class for site routes (cluster default if unset)
    #[arg(long, env = "SITEKEEPER_INGRESS_CLASS")]
    pub ingress_class: Option<String>,

    /// Readiness backoff policy: fixed or exponential
    #[arg(long, env = "SITEKEEPER_BACKOFF", default_value_t = BackoffKind::Exponential)]
    pub backoff: BackoffKind,

    /// First (or, for fixed, every) readiness requeue delay in seconds
    #[arg(
        long,
        env = "SITEKEEPER_BACKOFF_INITIAL_SECS",
        default_value_t = DEFAULT_INITIAL_DELAY.as_secs()
    )]
    pub backoff_initial_secs: u64,

    /// Maximum readiness requeue delay in seconds
    #[arg(
        long,
        env = "SITEKEEPER_BACKOFF_MAX_SECS",
        default_value_t = DEFAULT_MAX_DELAY.as_secs()
    )]
    pub backoff_max_secs: u64,

    /// Poll interval while waiting for deleted dependents to disappear, in seconds
    #[arg(long, env = "SITEKEEPER_DELETION_POLL_SECS", default_value = "2")]
    pub deletion_poll_secs: u64,

    /// Requeue delay after a transient error, in seconds
    #[arg(long, env = "SITEKEEPER_ERROR_REQUEUE_SECS", default_value = "10")]
    pub error_requeue_secs: u64,

    /// Requeue delay after a rejected or failed reconciliation, in seconds
    #[arg(long, env = "SITEKEEPER_REJECTION_REQUEUE_SECS", default_value = "60")]
    pub rejection_requeue_secs: u64,
}

impl From<SettingsArgs> for ReconcileSettings {
    fn from(args: SettingsArgs) -> Self {
        Self {
            base_image: args.base_image,
            ingress_class: args.ingress_class.filter(|c| !c.is_empty()),
            backoff: BackoffPolicy::from_parts(
                args.backoff,
                Duration::from_secs(args.backoff_initial_secs),
                Duration::from_secs(args.backoff_max_secs),
            ),
            deletion_poll_interval: Duration::from_secs(args.deletion_poll_secs),
            error_requeue: Duration::from_secs(args.error_requeue_secs),
            rejection_requeue: Duration::from_secs(args.rejection_requeue_secs),
        }
    }
}
