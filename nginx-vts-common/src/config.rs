use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

/// Where and how to fetch the VTS status document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// URI of the VTS JSON status page.
    #[serde(default = "default_uri")]
    pub uri: String,

    /// Transport timeout for one fetch, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Accept invalid TLS certificates from the status endpoint.
    #[serde(default)]
    pub insecure: bool,
}

fn default_uri() -> String {
    "http://localhost/status/format/json".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            timeout_secs: default_timeout_secs(),
            insecure: false,
        }
    }
}

impl ScrapeConfig {
    /// Parse and check the status URI.
    pub fn parsed_uri(&self) -> Result<Url> {
        let url = Url::parse(&self.uri)
            .map_err(|e| Error::Config(format!("Invalid scrape URI '{}': {}", self.uri, e)))?;

        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::Config(format!(
                    "Unsupported scrape URI scheme '{}' (expected http or https)",
                    other
                )));
            }
        }

        if url.host_str().is_none() {
            return Err(Error::Config(format!(
                "Scrape URI '{}' has no host",
                self.uri
            )));
        }

        Ok(url)
    }

    /// Validate the scrape settings.
    pub fn validate(&self) -> Result<()> {
        self.parsed_uri()?;

        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be > 0".to_string()));
        }

        Ok(())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Load a configuration file in JSON5 format.
pub fn load_config<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    let config = json5::from_str(&content).map_err(|e| {
        Error::Config(format!(
            "Failed to parse config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    debug!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

/// Load a configuration from a JSON5 string.
pub fn parse_config<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T> {
    json5::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Deserialize)]
    struct Wrapper {
        #[serde(default)]
        scrape: ScrapeConfig,
        #[serde(default)]
        logging: LoggingConfig,
    }

    #[test]
    fn test_default_config() {
        let config: Wrapper = parse_config("{}").unwrap();

        assert_eq!(config.scrape.uri, "http://localhost/status/format/json");
        assert_eq!(config.scrape.timeout_secs, 10);
        assert!(!config.scrape.insecure);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_parse_scrape_config() {
        let json5 = r#"
        {
            scrape: {
                uri: "https://nginx.internal:8443/vts/format/json",
                timeout_secs: 3,
                insecure: true,
            },
            logging: {
                level: "debug",
                format: "json",
            },
        }
        "#;

        let config: Wrapper = parse_config(json5).unwrap();

        assert_eq!(
            config.scrape.uri,
            "https://nginx.internal:8443/vts/format/json"
        );
        assert_eq!(config.scrape.timeout_secs, 3);
        assert!(config.scrape.insecure);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.scrape.validate().is_ok());
    }

    #[test]
    fn test_scrape_uri_validation() {
        let bad_scheme = ScrapeConfig {
            uri: "ftp://localhost/status".to_string(),
            ..Default::default()
        };
        assert!(
            bad_scheme
                .validate()
                .unwrap_err()
                .to_string()
                .contains("Unsupported scrape URI scheme")
        );

        let garbage = ScrapeConfig {
            uri: "not a uri".to_string(),
            ..Default::default()
        };
        assert!(garbage.validate().is_err());

        let zero_timeout = ScrapeConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        assert!(zero_timeout.validate().is_err());
    }

    #[test]
    fn test_load_config_missing_file() {
        let result: Result<Wrapper> = load_config("/nonexistent/vts-exporter.json5");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{ scrape: {{ uri: 'http://127.0.0.1:8080/status/format/json' }} }}")
            .unwrap();

        let config: Wrapper = load_config(file.path()).unwrap();
        assert_eq!(config.scrape.uri, "http://127.0.0.1:8080/status/format/json");
    }
}
