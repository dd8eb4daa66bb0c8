//! Endpoint dependent: the ClusterIP Service in front of the nginx pods

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::{ChildSynchronizer, SiteProjection};
use crate::child::{ChildKind, HTTP_PORT};
use crate::compare::exposure_drifted;
use crate::Error;

/// Synchronizes the site's Service
pub struct EndpointSync;

impl ChildSynchronizer for EndpointSync {
    type Object = Service;
    const KIND: ChildKind = ChildKind::Endpoint;

    fn desired(&self, projection: &SiteProjection) -> Service {
        Service {
            metadata: projection.object_meta(Self::KIND),
            spec: Some(ServiceSpec {
                type_: Some("ClusterIP".to_string()),
                selector: Some(projection.selector_labels()),
                ports: Some(vec![ServicePort {
                    name: Some("http".to_string()),
                    port: HTTP_PORT,
                    target_port: Some(IntOrString::Int(HTTP_PORT)),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn patch_drift(
        &self,
        _projection: &SiteProjection,
        observed: &mut Service,
    ) -> Result<bool, Error> {
        if !exposure_drifted(observed) {
            return Ok(false);
        }

        // ClusterIP services may not carry node ports or load balancer settings
        let spec = observed.spec.get_or_insert_with(Default::default);
        spec.type_ = Some("ClusterIP".to_string());
        spec.external_traffic_policy = None;
        spec.health_check_node_port = None;
        spec.allocate_load_balancer_node_ports = None;
        spec.load_balancer_class = None;
        spec.load_balancer_ip = None;
        spec.load_balancer_source_ranges = None;
        spec.external_name = None;
        for port in spec.ports.iter_mut().flatten() {
            port.node_port = None;
        }
        Ok(true)
    }
}
