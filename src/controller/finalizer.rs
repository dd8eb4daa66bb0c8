//! Finalizer lifecycle for sites
//!
//! While a site is live it carries [`SITE_FINALIZER`]. Once deletion is
//! requested the finalizer holds the site until every dependent is gone,
//! then releasing it is the last write the controller makes.

use tracing::{debug, info, warn};

use crate::child::ChildKind;
use crate::crd::{NginxStaticSite, SiteKey, SITE_FINALIZER};
use crate::store::SiteStore;
use crate::Error;

/// Result of a teardown pass that issued all deletes successfully
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Cleanup {
    /// Every dependent is gone and the finalizer was removed
    Complete,
    /// Deletes were accepted but these dependents still exist
    ///
    /// Typically a claim held by `kubernetes.io/pvc-protection` until its
    /// pods are gone. The finalizer stays until the next pass.
    Waiting(Vec<ChildKind>),
}

/// Make sure a live site carries the finalizer
///
/// Returns true if the finalizer had to be added.
pub async fn ensure_marker(
    store: &dyn SiteStore,
    site: &NginxStaticSite,
    key: &SiteKey,
) -> Result<bool, Error> {
    if site.has_finalizer(SITE_FINALIZER) {
        return Ok(false);
    }

    info!(site = %key, "adding finalizer");
    store.add_finalizer(key, SITE_FINALIZER).await?;
    Ok(true)
}

/// Tear down every dependent of a site and release the finalizer
///
/// All four deletes are attempted in reverse dependency order even if one
/// fails; the first failure is returned with the total failure count. The
/// finalizer is only removed once a follow-up read confirms every dependent
/// is absent.
pub async fn finalize(store: &dyn SiteStore, key: &SiteKey) -> Result<Cleanup, Error> {
    let mut first_failure: Option<(ChildKind, String, Error)> = None;
    let mut failed = 0usize;

    for kind in ChildKind::DELETION_ORDER {
        let name = kind.object_name(&key.name);
        match store.delete_child(kind, &name, &key.namespace).await {
            Ok(()) => debug!(site = %key, kind = %kind, name = %name, "dependent deleted"),
            Err(e) => {
                warn!(
                    site = %key,
                    kind = %kind,
                    name = %name,
                    error = %e,
                    "failed to delete dependent"
                );
                failed += 1;
                if first_failure.is_none() {
                    first_failure = Some((kind, name, e));
                }
            }
        }
    }

    if let Some((kind, name, source)) = first_failure {
        return Err(Error::ChildDeletion {
            kind,
            name,
            failed,
            source: Box::new(source),
        });
    }

    let mut remaining = Vec::new();
    for kind in ChildKind::DELETION_ORDER {
        let name = kind.object_name(&key.name);
        if store.get_child(kind, &name, &key.namespace).await?.is_some() {
            remaining.push(kind);
        }
    }
    if !remaining.is_empty() {
        info!(site = %key, remaining = ?remaining, "waiting for dependents to disappear");
        return Ok(Cleanup::Waiting(remaining));
    }

    info!(site = %key, "all dependents deleted, removing finalizer");
    store.remove_finalizer(key, SITE_FINALIZER).await?;
    Ok(Cleanup::Complete)
}
