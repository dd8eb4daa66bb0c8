//! Workload dependent: the nginx Deployment

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use super::{ChildSynchronizer, SiteProjection};
use crate::child::{ChildKind, CONTENT_VOLUME, HTTP_PORT, NGINX_CONTAINER};
use crate::compare::{workload_drift, WorkloadTarget};
use crate::Error;

/// Synchronizes the site's nginx Deployment
///
/// Converges replica count, image and content mount path. Any other change
/// made to the Deployment by hand or by another controller is preserved.
pub struct WorkloadSync;

fn content_volume(projection: &SiteProjection) -> Volume {
    Volume {
        name: CONTENT_VOLUME.to_string(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: projection.child_name(ChildKind::Storage),
            read_only: None,
        }),
        ..Default::default()
    }
}

fn content_mount(projection: &SiteProjection) -> VolumeMount {
    VolumeMount {
        name: CONTENT_VOLUME.to_string(),
        mount_path: projection.mount_path.clone(),
        ..Default::default()
    }
}

fn pod_spec(projection: &SiteProjection) -> PodSpec {
    PodSpec {
        containers: vec![Container {
            name: NGINX_CONTAINER.to_string(),
            image: Some(projection.image.clone()),
            ports: Some(vec![ContainerPort {
                name: Some("http".to_string()),
                container_port: HTTP_PORT,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            volume_mounts: Some(vec![content_mount(projection)]),
            ..Default::default()
        }],
        volumes: Some(vec![content_volume(projection)]),
        node_selector: if projection.node_selector.is_empty() {
            None
        } else {
            Some(projection.node_selector.clone())
        },
        ..Default::default()
    }
}

impl ChildSynchronizer for WorkloadSync {
    type Object = Deployment;
    const KIND: ChildKind = ChildKind::Workload;

    fn desired(&self, projection: &SiteProjection) -> Deployment {
        Deployment {
            metadata: projection.object_meta(Self::KIND),
            spec: Some(DeploymentSpec {
                replicas: Some(projection.replicas),
                selector: LabelSelector {
                    match_labels: Some(projection.selector_labels()),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(projection.labels()),
                        ..Default::default()
                    }),
                    spec: Some(pod_spec(projection)),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn patch_drift(
        &self,
        projection: &SiteProjection,
        observed: &mut Deployment,
    ) -> Result<bool, Error> {
        let claim_name = projection.child_name(ChildKind::Storage);
        let target = WorkloadTarget {
            replicas: projection.replicas,
            image: &projection.image,
            mount_path: &projection.mount_path,
            claim_name: &claim_name,
        };
        let drift = workload_drift(&target, observed);
        if !drift.any() {
            return Ok(false);
        }

        let Some(spec) = observed.spec.as_mut() else {
            observed.spec = self.desired(projection).spec;
            return Ok(true);
        };
        if drift.replicas {
            spec.replicas = Some(projection.replicas);
        }

        let pod = spec.template.spec.get_or_insert_with(Default::default);
        if !pod.containers.iter().any(|c| c.name == NGINX_CONTAINER) {
            // The nginx container is gone entirely; restore the whole pod spec
            *pod = pod_spec(projection);
            return Ok(true);
        }
        let Some(container) = pod.containers.iter_mut().find(|c| c.name == NGINX_CONTAINER) else {
            return Ok(true);
        };

        if drift.image {
            container.image = Some(projection.image.clone());
        }
        if drift.mount_path {
            let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
            match mounts.iter_mut().find(|m| m.name == CONTENT_VOLUME) {
                Some(mount) => mount.mount_path = projection.mount_path.clone(),
                None => mounts.push(content_mount(projection)),
            }

            let volumes = pod.volumes.get_or_insert_with(Vec::new);
            match volumes.iter_mut().find(|v| v.name == CONTENT_VOLUME) {
                Some(volume) => *volume = content_volume(projection),
                None => volumes.push(content_volume(projection)),
            }
        }

        Ok(true)
    }
}
