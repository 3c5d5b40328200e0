//! Endpoint types
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::IPSet;

/// One backend of a service, as reported by a single source
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointInfo {
    pub namespace: String,
    /// Source that owns this endpoint
    pub source_name: String,
    pub service_name: String,
    #[serde(default)]
    pub endpoint: Endpoint,
    #[serde(default)]
    pub conditions: EndpointConditions,
    /// Node hosting the endpoint, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    #[serde(default)]
    pub ips: IPSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Named ports resolved to numbers for this endpoint
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub port_overrides: Vec<PortOverride>,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ips={}", self.ips)?;
        if let Some(hostname) = &self.hostname {
            write!(f, " hostname={}", hostname)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortOverride {
    pub name: String,
    pub port: u16,
}

/// Endpoint readiness as last reported by its source
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConditions {
    #[serde(default)]
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serving: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminating: Option<bool>,
}

impl EndpointConditions {
    pub fn ready(ready: bool) -> Self {
        Self {
            ready,
            ..Default::default()
        }
    }
}
