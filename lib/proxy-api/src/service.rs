use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::IPSet;

/// Identifies a service: namespace first, then name
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceKey {
    pub namespace: String,
    pub name: String,
}

impl ServiceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Service represents a load-balanced set of endpoints reachable through
/// cluster or external IPs
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub namespace: String,
    pub name: String,

    /// ClusterIP, NodePort, LoadBalancer or ExternalName
    #[serde(rename = "type", default = "default_service_type")]
    pub service_type: String,

    #[serde(default)]
    pub ips: ServiceIPs,

    #[serde(default)]
    pub ports: Vec<PortMapping>,

    #[serde(default)]
    pub session_affinity: SessionAffinity,

    /// Only route external traffic to node-local endpoints
    #[serde(default)]
    pub external_traffic_to_local: bool,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Service {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            service_type: default_service_type(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> ServiceKey {
        ServiceKey::new(self.namespace.clone(), self.name.clone())
    }
}

/// Addresses a service is reachable on
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceIPs {
    #[serde(default)]
    pub cluster_ips: IPSet,
    #[serde(default)]
    pub external_ips: IPSet,
    #[serde(default)]
    pub load_balancer_ips: IPSet,
}

/// A service port and where it lands on the endpoints
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub protocol: Protocol,

    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_port: Option<u16>,

    /// Numeric target port; 0 when the target is a named port
    #[serde(default)]
    pub target_port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_port_name: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    Sctp,
}

impl Protocol {
    /// Parse a Kubernetes protocol name, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "TCP" => Some(Protocol::Tcp),
            "UDP" => Some(Protocol::Udp),
            "SCTP" => Some(Protocol::Sctp),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Sctp => "SCTP",
        };
        f.write_str(s)
    }
}

/// Session affinity policy. Carried verbatim; interpreting it is up to consumers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum SessionAffinity {
    #[default]
    None,
    #[serde(rename_all = "camelCase")]
    ClientIp { timeout_seconds: u32 },
}

fn default_service_type() -> String {
    "ClusterIP".to_string()
}
