//! nginx VTS common library
//!
//! Shared types and utilities for the nginx VTS exporter:
//!
//! - [`status`] - Typed model of the VTS status document (`StatusDocument`)
//! - [`config`] - Scrape/logging configuration and JSON5 loading
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod status;

// Re-export commonly used types at the crate root
pub use config::{LogFormat, LoggingConfig, ScrapeConfig, load_config, parse_config};
pub use error::{Error, Result};
pub use status::{
    CacheZone, Connections, Entry, FilterZone, Responses, ServerZone, StatusDocument,
    UpstreamBackend, is_status_class,
};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG` takes precedence over `config.level` when set.
///
/// # Example
///
/// ```ignore
/// use nginx_vts_common::{LoggingConfig, LogFormat, init_tracing};
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Json,
/// };
/// init_tracing(&config)?;
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
