//! Daemon configuration from environment variables

use anyhow::{bail, Context, Result};
use std::net::SocketAddr;
use std::time::Duration;

pub const METRICS_ADDR_ENV: &str = "PROXY_STORE_METRICS_ADDR";
pub const NAMESPACE_ENV: &str = "PROXY_STORE_NAMESPACE";
pub const LOG_FORMAT_ENV: &str = "PROXY_STORE_LOG_FORMAT";
pub const LOG_INTERVAL_ENV: &str = "PROXY_STORE_LOG_INTERVAL_SECS";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug)]
pub struct DaemonConfig {
    /// Address serving /metrics, /healthz and /state
    pub metrics_addr: SocketAddr,
    /// Restrict the feeders to one namespace; all namespaces when unset
    pub namespace: Option<String>,
    pub log_format: LogFormat,
    /// Minimum delay between two state summaries from the logging consumer
    pub log_interval: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            metrics_addr: ([0, 0, 0, 0], 10249).into(),
            namespace: None,
            log_format: LogFormat::Text,
            log_interval: Duration::from_secs(10),
        }
    }
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup(METRICS_ADDR_ENV) {
            config.metrics_addr = addr.parse().with_context(|| {
                format!("{} is not a socket address: {}", METRICS_ADDR_ENV, addr)
            })?;
        }

        config.namespace = lookup(NAMESPACE_ENV).filter(|ns| !ns.is_empty());

        if let Some(format) = lookup(LOG_FORMAT_ENV) {
            config.log_format = match format.to_ascii_lowercase().as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                other => bail!("{} must be text or json, got {}", LOG_FORMAT_ENV, other),
            };
        }

        if let Some(secs) = lookup(LOG_INTERVAL_ENV) {
            let secs: u64 = secs.parse().with_context(|| {
                format!("{} is not a number of seconds: {}", LOG_INTERVAL_ENV, secs)
            })?;
            config.log_interval = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<DaemonConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DaemonConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.metrics_addr, "0.0.0.0:10249".parse::<SocketAddr>().unwrap());
        assert_eq!(config.namespace, None);
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.log_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            (METRICS_ADDR_ENV, "127.0.0.1:9000"),
            (NAMESPACE_ENV, "kube-system"),
            (LOG_FORMAT_ENV, "JSON"),
            (LOG_INTERVAL_ENV, "0"),
        ])
        .unwrap();
        assert_eq!(config.metrics_addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.namespace.as_deref(), Some("kube-system"));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.log_interval, Duration::ZERO);
    }

    #[test]
    fn test_empty_namespace_means_all() {
        let config = config_from(&[(NAMESPACE_ENV, "")]).unwrap();
        assert_eq!(config.namespace, None);
    }

    #[test]
    fn test_invalid_values() {
        assert!(config_from(&[(METRICS_ADDR_ENV, "nope")]).is_err());
        assert!(config_from(&[(LOG_FORMAT_ENV, "yaml")]).is_err());
        assert!(config_from(&[(LOG_INTERVAL_ENV, "-1")]).is_err());
    }
}
