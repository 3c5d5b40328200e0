//! Translation of Kubernetes Services and EndpointSlices into store values

use k8s_openapi::api::core::v1::{Service as KubeService, ServicePort};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use proxy_api::{
    Endpoint, EndpointConditions, EndpointInfo, IPSet, PortMapping, PortOverride, Protocol, Service,
    SessionAffinity,
};

/// Label linking an EndpointSlice to its Service
pub const SERVICE_NAME_LABEL: &str = "kubernetes.io/service-name";

/// Kubernetes default for ClientIP affinity timeouts
const DEFAULT_AFFINITY_TIMEOUT_SECONDS: u32 = 10800;

/// Endpoints carried by one EndpointSlice. The slice name is the source.
#[derive(Clone, Debug, PartialEq)]
pub struct SliceEndpoints {
    pub namespace: String,
    pub service: String,
    pub source: String,
    pub endpoints: Vec<EndpointInfo>,
}

/// Convert a Kubernetes Service. Returns None for objects without a
/// namespace, name or spec.
pub fn service_from_kube(svc: &KubeService) -> Option<Service> {
    let namespace = svc.metadata.namespace.clone()?;
    let name = svc.metadata.name.clone()?;
    let spec = svc.spec.as_ref()?;

    let mut service = Service::new(namespace, name);
    if let Some(service_type) = &spec.type_ {
        service.service_type = service_type.clone();
    }

    let cluster_ips = match &spec.cluster_ips {
        Some(ips) => ips.clone(),
        None => spec.cluster_ip.iter().cloned().collect(),
    };
    // Headless services report "None" as their cluster IP
    service.ips.cluster_ips = IPSet::new(
        cluster_ips
            .into_iter()
            .filter(|ip| !ip.is_empty() && ip != "None"),
    );
    service.ips.external_ips = IPSet::new(spec.external_ips.iter().flatten().cloned());

    if let Some(ingress) = svc
        .status
        .as_ref()
        .and_then(|status| status.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
    {
        service.ips.load_balancer_ips = IPSet::new(ingress.iter().filter_map(|i| i.ip.clone()));
    }

    service.ports = spec.ports.iter().flatten().filter_map(port_mapping).collect();

    if spec.session_affinity.as_deref() == Some("ClientIP") {
        let timeout_seconds = spec
            .session_affinity_config
            .as_ref()
            .and_then(|config| config.client_ip.as_ref())
            .and_then(|client_ip| client_ip.timeout_seconds)
            .and_then(|secs| u32::try_from(secs).ok())
            .unwrap_or(DEFAULT_AFFINITY_TIMEOUT_SECONDS);
        service.session_affinity = SessionAffinity::ClientIp { timeout_seconds };
    }

    service.external_traffic_to_local = spec.external_traffic_policy.as_deref() == Some("Local");
    service.labels = svc.metadata.labels.clone().unwrap_or_default();

    Some(service)
}

fn port_mapping(port: &ServicePort) -> Option<PortMapping> {
    let protocol = match port.protocol.as_deref() {
        Some(name) => Protocol::parse(name)?,
        None => Protocol::Tcp,
    };
    let number = u16::try_from(port.port).ok()?;

    let (target_port, target_port_name) = match &port.target_port {
        Some(IntOrString::Int(target)) => (u16::try_from(*target).ok()?, None),
        Some(IntOrString::String(name)) => (0, Some(name.clone())),
        None => (number, None),
    };

    Some(PortMapping {
        name: port.name.clone().unwrap_or_default(),
        protocol,
        port: number,
        node_port: port.node_port.and_then(|p| u16::try_from(p).ok()),
        target_port,
        target_port_name,
    })
}

/// Convert an EndpointSlice. Returns None for slices that are not owned by a
/// Service.
pub fn endpoints_from_slice(slice: &EndpointSlice) -> Option<SliceEndpoints> {
    let namespace = slice.metadata.namespace.clone()?;
    let source = slice.metadata.name.clone()?;
    let service = slice
        .metadata
        .labels
        .as_ref()?
        .get(SERVICE_NAME_LABEL)?
        .clone();

    let port_overrides: Vec<PortOverride> = slice
        .ports
        .iter()
        .flatten()
        .filter_map(|port| {
            Some(PortOverride {
                name: port.name.clone()?,
                port: u16::try_from(port.port?).ok()?,
            })
        })
        .collect();

    let endpoints = slice
        .endpoints
        .iter()
        .filter(|ep| !ep.addresses.is_empty())
        .map(|ep| {
            let conditions = ep.conditions.as_ref();
            EndpointInfo {
                namespace: namespace.clone(),
                source_name: source.clone(),
                service_name: service.clone(),
                endpoint: Endpoint {
                    ips: IPSet::new(ep.addresses.iter().cloned()),
                    hostname: ep.hostname.clone(),
                    port_overrides: port_overrides.clone(),
                },
                conditions: EndpointConditions {
                    // An unset ready condition means unknown, which Kubernetes treats as ready
                    ready: conditions.and_then(|c| c.ready).unwrap_or(true),
                    serving: conditions.and_then(|c| c.serving),
                    terminating: conditions.and_then(|c| c.terminating),
                },
                node_name: ep.node_name.clone(),
                zone: ep.zone.clone(),
            }
        })
        .collect();

    Some(SliceEndpoints {
        namespace,
        service,
        source,
        endpoints,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ClientIPConfig, ServiceSpec, SessionAffinityConfig};
    use k8s_openapi::api::discovery::v1::{
        Endpoint as KubeEndpoint, EndpointConditions as KubeConditions, EndpointPort,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn kube_service(spec: ServiceSpec) -> KubeService {
        KubeService {
            metadata: ObjectMeta {
                namespace: Some("test".to_string()),
                name: Some("session-affinity-service".to_string()),
                labels: Some(BTreeMap::from([("app".to_string(), "web".to_string())])),
                ..Default::default()
            },
            spec: Some(spec),
            status: None,
        }
    }

    #[test]
    fn test_node_port_service_with_client_ip_affinity() {
        let svc = kube_service(ServiceSpec {
            type_: Some("NodePort".to_string()),
            cluster_ip: Some("10.1.2.5".to_string()),
            cluster_ips: Some(vec!["10.1.2.5".to_string()]),
            session_affinity: Some("ClientIP".to_string()),
            session_affinity_config: Some(SessionAffinityConfig {
                client_ip: Some(ClientIPConfig {
                    timeout_seconds: Some(600),
                }),
            }),
            ports: Some(vec![
                ServicePort {
                    name: Some("http".to_string()),
                    node_port: Some(31279),
                    protocol: Some("TCP".to_string()),
                    port: 80,
                    target_port: Some(IntOrString::Int(8083)),
                    ..Default::default()
                },
                ServicePort {
                    name: Some("udp".to_string()),
                    protocol: Some("UDP".to_string()),
                    port: 90,
                    target_port: Some(IntOrString::String("dns".to_string())),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        });

        let service = service_from_kube(&svc).unwrap();
        assert_eq!(service.service_type, "NodePort");
        assert_eq!(service.ips.cluster_ips.v4, vec!["10.1.2.5"]);
        assert_eq!(
            service.session_affinity,
            SessionAffinity::ClientIp { timeout_seconds: 600 }
        );
        assert_eq!(service.labels.get("app").map(String::as_str), Some("web"));

        assert_eq!(service.ports.len(), 2);
        assert_eq!(service.ports[0].node_port, Some(31279));
        assert_eq!(service.ports[0].target_port, 8083);
        assert_eq!(service.ports[1].protocol, Protocol::Udp);
        assert_eq!(service.ports[1].target_port, 0);
        assert_eq!(service.ports[1].target_port_name.as_deref(), Some("dns"));
    }

    #[test]
    fn test_headless_service_and_defaults() {
        let svc = kube_service(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            session_affinity: Some("ClientIP".to_string()),
            external_traffic_policy: Some("Local".to_string()),
            ports: Some(vec![ServicePort {
                port: 53,
                ..Default::default()
            }]),
            ..Default::default()
        });

        let service = service_from_kube(&svc).unwrap();
        assert_eq!(service.service_type, "ClusterIP");
        assert!(service.ips.cluster_ips.is_empty());
        assert!(service.external_traffic_to_local);
        assert_eq!(
            service.session_affinity,
            SessionAffinity::ClientIp {
                timeout_seconds: DEFAULT_AFFINITY_TIMEOUT_SECONDS
            }
        );
        assert_eq!(service.ports[0].protocol, Protocol::Tcp);
        assert_eq!(service.ports[0].target_port, 53);
    }

    #[test]
    fn test_service_without_spec_is_skipped() {
        let mut svc = kube_service(ServiceSpec::default());
        svc.spec = None;
        assert!(service_from_kube(&svc).is_none());
    }

    fn slice(labels: Option<BTreeMap<String, String>>) -> EndpointSlice {
        EndpointSlice {
            address_type: "IPv4".to_string(),
            metadata: ObjectMeta {
                namespace: Some("default".to_string()),
                name: Some("svc0-abcde".to_string()),
                labels,
                ..Default::default()
            },
            ports: Some(vec![EndpointPort {
                name: Some("http".to_string()),
                port: Some(8080),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            endpoints: vec![
                KubeEndpoint {
                    addresses: vec!["10.0.0.1".to_string()],
                    conditions: Some(KubeConditions {
                        ready: Some(false),
                        serving: Some(true),
                        terminating: Some(true),
                    }),
                    node_name: Some("node-a".to_string()),
                    ..Default::default()
                },
                KubeEndpoint {
                    addresses: vec!["10.0.0.2".to_string()],
                    conditions: None,
                    ..Default::default()
                },
                KubeEndpoint {
                    addresses: vec![],
                    ..Default::default()
                },
            ],
        }
    }

    #[test]
    fn test_slice_endpoints() {
        let labels = BTreeMap::from([(SERVICE_NAME_LABEL.to_string(), "svc0".to_string())]);
        let slice = endpoints_from_slice(&slice(Some(labels))).unwrap();

        assert_eq!(slice.namespace, "default");
        assert_eq!(slice.service, "svc0");
        assert_eq!(slice.source, "svc0-abcde");
        assert_eq!(slice.endpoints.len(), 2);

        let first = &slice.endpoints[0];
        assert_eq!(first.source_name, "svc0-abcde");
        assert_eq!(first.endpoint.ips.v4, vec!["10.0.0.1"]);
        assert_eq!(
            first.endpoint.port_overrides,
            vec![PortOverride {
                name: "http".to_string(),
                port: 8080
            }]
        );
        assert!(!first.conditions.ready);
        assert_eq!(first.conditions.terminating, Some(true));
        assert_eq!(first.node_name.as_deref(), Some("node-a"));

        assert!(slice.endpoints[1].conditions.ready);
    }

    #[test]
    fn test_slice_without_service_label_is_skipped() {
        assert!(endpoints_from_slice(&slice(None)).is_none());
        assert!(endpoints_from_slice(&slice(Some(BTreeMap::new()))).is_none());
    }
}
