//! Controller implementation for NginxStaticSite
//!
//! This module contains the reconciliation logic for sites. The controller
//! follows the Kubernetes controller pattern with observe-diff-act loops.

pub mod finalizer;
mod site;
pub mod status;

pub use site::{error_policy, reconcile, reconcile_site, Context, Continuation};
