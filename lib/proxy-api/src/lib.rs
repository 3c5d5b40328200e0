//! Object model shared by the proxy store, its feeders and its consumers
//!
//! This library defines the value types held by the store:
//! - Service: a load-balanced service and its port mappings
//! - EndpointInfo: one backend of a service, as reported by a single source
//! - IPSet: addresses split by family
//!
//! Values are treated as immutable once handed to the store.

pub mod endpoint;
pub mod ip;
pub mod service;

pub use endpoint::{Endpoint, EndpointConditions, EndpointInfo, PortOverride};
pub use ip::IPSet;
pub use service::{PortMapping, Protocol, Service, ServiceIPs, ServiceKey, SessionAffinity};

/// Source identifier meaning "every source"
pub const ALL_SOURCES: &str = "*";
