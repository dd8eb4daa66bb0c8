//! Route dependent: the Ingress exposing `/<site>`

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};

use super::{ChildSynchronizer, SiteProjection};
use crate::child::{ChildKind, HTTP_PORT};
use crate::compare::route_path_drifted;
use crate::Error;

const PATH_TYPE: &str = "Prefix";

/// Synchronizes the site's Ingress
pub struct RouteSync;

fn rules(projection: &SiteProjection) -> Vec<IngressRule> {
    vec![IngressRule {
        host: None,
        http: Some(HTTPIngressRuleValue {
            paths: vec![HTTPIngressPath {
                path: Some(projection.route_path()),
                path_type: PATH_TYPE.to_string(),
                backend: IngressBackend {
                    service: Some(IngressServiceBackend {
                        name: projection.child_name(ChildKind::Endpoint),
                        port: Some(ServiceBackendPort {
                            number: Some(HTTP_PORT),
                            name: None,
                        }),
                    }),
                    resource: None,
                },
            }],
        }),
    }]
}

impl ChildSynchronizer for RouteSync {
    type Object = Ingress;
    const KIND: ChildKind = ChildKind::Route;

    fn desired(&self, projection: &SiteProjection) -> Ingress {
        Ingress {
            metadata: projection.object_meta(Self::KIND),
            spec: Some(IngressSpec {
                ingress_class_name: projection.ingress_class.clone(),
                rules: Some(rules(projection)),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn patch_drift(
        &self,
        projection: &SiteProjection,
        observed: &mut Ingress,
    ) -> Result<bool, Error> {
        let desired_path = projection.route_path();
        if !route_path_drifted(&desired_path, observed) {
            return Ok(false);
        }

        let spec = observed.spec.get_or_insert_with(Default::default);
        let first_path = spec
            .rules
            .as_mut()
            .and_then(|rules| rules.first_mut())
            .and_then(|rule| rule.http.as_mut())
            .and_then(|http| http.paths.first_mut());

        match first_path {
            Some(path) => {
                path.path = Some(desired_path);
                path.path_type = PATH_TYPE.to_string();
            }
            None => spec.rules = Some(rules(projection)),
        }
        Ok(true)
    }
}
