//! Storage dependent: the PersistentVolumeClaim holding site content

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use super::{ChildSynchronizer, SiteProjection};
use crate::child::ChildKind;
use crate::compare::storage_needs_expansion;
use crate::Error;

/// Synchronizes the site's PersistentVolumeClaim
///
/// Capacity only ever grows. A smaller `storageSize` is ignored rather
/// than sent to the API server, which would reject the shrink.
pub struct StorageSync;

fn storage_requests(size: &str) -> BTreeMap<String, Quantity> {
    BTreeMap::from([("storage".to_string(), Quantity(size.to_string()))])
}

impl ChildSynchronizer for StorageSync {
    type Object = PersistentVolumeClaim;
    const KIND: ChildKind = ChildKind::Storage;

    fn desired(&self, projection: &SiteProjection) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: projection.object_meta(Self::KIND),
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(storage_requests(&projection.storage_size)),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn patch_drift(
        &self,
        projection: &SiteProjection,
        observed: &mut PersistentVolumeClaim,
    ) -> Result<bool, Error> {
        if !storage_needs_expansion(projection.storage_bytes, observed)? {
            return Ok(false);
        }

        let spec = observed.spec.get_or_insert_with(Default::default);
        let resources = spec.resources.get_or_insert_with(Default::default);
        resources
            .requests
            .get_or_insert_with(BTreeMap::new)
            .insert(
                "storage".to_string(),
                Quantity(projection.storage_size.clone()),
            );
        Ok(true)
    }
}
