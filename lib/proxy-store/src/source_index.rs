//! Per-service endpoint partitions keyed by source
//!
//! Each source owns one ordered sequence of endpoints. Writing a source
//! replaces its whole sequence; reading concatenates every visible source in
//! lexicographic source order. Nothing is deduplicated across sources.

use proxy_api::{EndpointInfo, ALL_SOURCES};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Which sources may contribute endpoints to a service
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Visibility {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl Visibility {
    /// Returns None for an empty list; a `*` anywhere widens to all sources.
    pub fn from_sources<S: AsRef<str>>(sources: &[S]) -> Option<Self> {
        if sources.is_empty() {
            return None;
        }
        if sources.iter().any(|s| s.as_ref() == ALL_SOURCES) {
            return Some(Visibility::All);
        }
        Some(Visibility::Only(
            sources.iter().map(|s| s.as_ref().to_string()).collect(),
        ))
    }

    pub fn allows(&self, source: &str) -> bool {
        match self {
            Visibility::All => true,
            Visibility::Only(sources) => sources.contains(source),
        }
    }
}

#[derive(Debug, Default)]
pub struct SourceIndex {
    sources: BTreeMap<String, Vec<Arc<EndpointInfo>>>,
}

impl SourceIndex {
    /// Replace the sequence owned by `source`. An empty sequence removes the
    /// source. Returns the number of endpoints that were replaced.
    pub fn set(&mut self, source: &str, endpoints: Vec<Arc<EndpointInfo>>) -> usize {
        let previous = if endpoints.is_empty() {
            self.sources.remove(source)
        } else {
            self.sources.insert(source.to_string(), endpoints)
        };
        previous.map_or(0, |eps| eps.len())
    }

    /// Remove a source. Returns the number of endpoints it held.
    pub fn remove(&mut self, source: &str) -> usize {
        self.set(source, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    /// Endpoints of every visible source, in source order then stored order
    pub fn iter<'a>(
        &'a self,
        visibility: &'a Visibility,
    ) -> impl Iterator<Item = &'a Arc<EndpointInfo>> + 'a {
        self.sources
            .iter()
            .filter(move |(source, _)| visibility.allows(source))
            .flat_map(|(_, endpoints)| endpoints.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxy_api::{Endpoint, IPSet};

    fn endpoint(source: &str, ip: &str) -> Arc<EndpointInfo> {
        Arc::new(EndpointInfo {
            namespace: "default".to_string(),
            source_name: source.to_string(),
            service_name: "svc".to_string(),
            endpoint: Endpoint {
                ips: IPSet::new([ip]),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    fn ips<'a>(index: &'a SourceIndex, visibility: &'a Visibility) -> Vec<&'a str> {
        index.iter(visibility).map(|ep| ep.endpoint.ips.v4[0].as_str()).collect()
    }

    #[test]
    fn test_visibility_from_sources() {
        assert_eq!(Visibility::from_sources::<&str>(&[]), None);
        assert_eq!(Visibility::from_sources(&["a", "*"]), Some(Visibility::All));

        let only = Visibility::from_sources(&["a"]).unwrap();
        assert!(only.allows("a"));
        assert!(!only.allows("b"));
    }

    #[test]
    fn test_set_replaces_whole_source() {
        let mut index = SourceIndex::default();
        index.set("a", vec![endpoint("a", "10.0.0.1"), endpoint("a", "10.0.0.2")]);
        let replaced = index.set("a", vec![endpoint("a", "10.0.0.3")]);

        assert_eq!(replaced, 2);
        assert_eq!(ips(&index, &Visibility::All), vec!["10.0.0.3"]);
    }

    #[test]
    fn test_concatenates_in_source_order_without_dedup() {
        let mut index = SourceIndex::default();
        index.set("b", vec![endpoint("b", "10.0.0.1")]);
        index.set("a", vec![endpoint("a", "10.0.0.2"), endpoint("a", "10.0.0.1")]);

        assert_eq!(
            ips(&index, &Visibility::All),
            vec!["10.0.0.2", "10.0.0.1", "10.0.0.1"]
        );
        assert_eq!(index.sources().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_set_removes_source() {
        let mut index = SourceIndex::default();
        index.set("a", vec![endpoint("a", "10.0.0.1")]);
        assert_eq!(index.set("a", vec![]), 1);
        assert!(index.is_empty());
        assert_eq!(index.remove("a"), 0);
    }

    #[test]
    fn test_iter_filters_hidden_sources() {
        let mut index = SourceIndex::default();
        index.set("a", vec![endpoint("a", "10.0.0.1")]);
        index.set("b", vec![endpoint("b", "10.0.0.2")]);

        let only_a = Visibility::from_sources(&["a"]).unwrap();
        assert_eq!(ips(&index, &only_a), vec!["10.0.0.1"]);
    }
}
