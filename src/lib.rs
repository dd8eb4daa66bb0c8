//! sitekeeper - CRD-driven Kubernetes operator for static nginx sites
//!
//! An `NginxStaticSite` declares a static website. sitekeeper keeps four
//! dependents converged for every site (a PersistentVolumeClaim, an nginx
//! Deployment, a ClusterIP Service and an Ingress), tears them down when the
//! site is deleted, and reports health on the site's status.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definition (NginxStaticSite)
//! - [`controller`] - Reconciliation engine, finalizer lifecycle, status projection
//! - [`sync`] - Per-kind dependent synchronizers
//! - [`compare`] - Drift detection between desired and observed dependents
//! - [`store`] - Store trait and its Kubernetes implementation
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod backoff;
pub mod child;
pub mod compare;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod events;
pub mod quantity;
pub mod store;
pub mod sync;

pub use error::Error;
