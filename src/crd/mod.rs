//! Custom Resource Definitions for sitekeeper
//!
//! This module contains the NginxStaticSite CRD and its supporting types.

mod site;
mod types;

pub use site::{
    NginxStaticSite, NginxStaticSiteSpec, NginxStaticSiteStatus, SiteKey, SITE_APP_LABEL,
    SITE_FINALIZER,
};
pub use types::SitePhase;
