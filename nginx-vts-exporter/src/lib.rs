//! Prometheus exporter for the nginx virtual host traffic status module.
//!
//! Every scrape of the metrics endpoint fetches the VTS JSON status page,
//! walks the document and renders the samples in Prometheus text format.
//! Nothing is cached between scrapes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  nginx VTS page │────>│    Collector    │────>│   HTTP Server   │
//! │ (format/json)   │     │  (walk + emit)  │     │   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! nginx-vts-exporter --scrape-uri http://localhost/status/format/json
//! nginx-vts-exporter --config config.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod collector;
pub mod config;
pub mod descriptors;
pub mod exposition;
pub mod fetcher;
pub mod http;
pub mod mapping;

pub use collector::{Sample, ScrapeStats, SharedCollector, VtsCollector};
pub use config::{ConfigError, ExporterConfig};
pub use descriptors::{Category, Descriptor, DescriptorRegistry};
pub use exposition::render;
pub use fetcher::{CollectionSource, FetchError, HttpFetcher, StaticSource};
pub use http::HttpServer;
