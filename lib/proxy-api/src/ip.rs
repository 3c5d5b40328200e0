//! IP address sets

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// A set of IP addresses split by family
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IPSet {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub v4: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub v6: Vec<String>,
}

impl IPSet {
    /// Build a set from addresses of either family.
    ///
    /// Anything that does not parse as IPv6 lands in `v4`, so hostnames and
    /// malformed input are kept rather than dropped.
    pub fn new<I, S>(ips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::default();
        for ip in ips {
            set.add(ip);
        }
        set
    }

    /// Add one address to the matching family
    pub fn add(&mut self, ip: impl Into<String>) {
        let ip = ip.into();
        match ip.parse::<IpAddr>() {
            Ok(IpAddr::V6(_)) => self.v6.push(ip),
            _ => self.v4.push(ip),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }

    pub fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    /// All addresses, IPv4 first
    pub fn all(&self) -> impl Iterator<Item = &str> {
        self.v4.iter().chain(self.v6.iter()).map(String::as_str)
    }
}

impl fmt::Display for IPSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ips: Vec<&str> = self.all().collect();
        write!(f, "[{}]", ips.join(", "))
    }
}
