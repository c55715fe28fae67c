//! Configuration for the nginx VTS exporter.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use nginx_vts_common::{LoggingConfig, ScrapeConfig};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Load(#[from] nginx_vts_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// VTS status page settings.
    #[serde(default)]
    pub scrape: ScrapeConfig,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Prometheus HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Address to listen on (default: "0.0.0.0:9913").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,

    /// Metric name namespace (default: "nginx").
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Constant labels added to every exported sample.
    #[serde(default)]
    pub const_labels: BTreeMap<String, String>,
}

fn default_listen() -> String {
    "0.0.0.0:9913".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

fn default_namespace() -> String {
    "nginx".to_string()
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            namespace: default_namespace(),
            const_labels: BTreeMap::new(),
        }
    }
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: ExporterConfig = nginx_vts_common::load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = nginx_vts_common::parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scrape
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        if self
            .prometheus
            .listen
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.prometheus.listen
            )));
        }

        if !self.prometheus.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        // "/" and "/health" are served by their own handlers
        if self.prometheus.path == "/" || self.prometheus.path == "/health" {
            return Err(ConfigError::Validation(format!(
                "Metrics path must not be {}",
                self.prometheus.path
            )));
        }

        // Router path parameters and wildcards
        if self.prometheus.path.contains([':', '*', '{', '}']) {
            return Err(ConfigError::Validation(format!(
                "Metrics path must be a literal path: {}",
                self.prometheus.path
            )));
        }

        if crate::mapping::sanitize_metric_name(&self.prometheus.namespace).is_empty() {
            return Err(ConfigError::Validation(format!(
                "Invalid metric namespace: {:?}",
                self.prometheus.namespace
            )));
        }

        Ok(())
    }
}
