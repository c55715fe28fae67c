//! On-demand collection: fetch the status document, walk it, emit samples.
//!
//! Every call to [`VtsCollector::collect`] fetches its own document, so
//! concurrent scrapes never observe each other's data. The only state shared
//! between scrapes is the pair of scrape counters, which are atomic.

use std::sync::Arc;

use nginx_vts_common::{
    CacheZone, Connections, Entry, FilterZone, ServerZone, StatusDocument, UpstreamBackend,
};
use prometheus_client::metrics::counter::Counter;
use tracing::{debug, warn};

use crate::descriptors::{Category, Descriptor, DescriptorRegistry};
use crate::fetcher::CollectionSource;

/// One value of one descriptor at collection time.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub descriptor: Arc<Descriptor>,
    /// Label values, in the order of `descriptor.labels`.
    pub label_values: Vec<String>,
    pub value: f64,
}

impl Sample {
    pub fn new(descriptor: Arc<Descriptor>, label_values: Vec<String>, value: f64) -> Self {
        Self {
            descriptor,
            label_values,
            value,
        }
    }

    /// Fully-qualified metric name.
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Value of the label called `name`, if the descriptor has one.
    pub fn label(&self, name: &str) -> Option<&str> {
        let index = self.descriptor.labels.iter().position(|l| *l == name)?;
        self.label_values.get(index).map(String::as_str)
    }
}

/// Snapshot of the process-level scrape counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrapeStats {
    /// Collections attempted.
    pub scrapes: u64,
    /// Collections whose fetch failed.
    pub failures: u64,
}

/// Collects VTS metrics from a [`CollectionSource`] on demand.
pub struct VtsCollector<S> {
    source: S,
    registry: DescriptorRegistry,
    scrapes: Counter,
    scrape_failures: Counter,
}

/// Shareable collector handle.
pub type SharedCollector<S> = Arc<VtsCollector<S>>;

impl<S: CollectionSource> VtsCollector<S> {
    /// Create a collector over `source`, emitting descriptors from `registry`.
    pub fn new(source: S, registry: DescriptorRegistry) -> Self {
        Self {
            source,
            registry,
            scrapes: Counter::default(),
            scrape_failures: Counter::default(),
        }
    }

    pub fn registry(&self) -> &DescriptorRegistry {
        &self.registry
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Run one collection.
    ///
    /// Never fails: a fetch error is counted as a failed scrape and yields
    /// only the two scrape counter samples.
    pub async fn collect(&self) -> Vec<Sample> {
        let fetched = self.source.fetch().await;
        self.scrapes.inc();

        let mut samples = match fetched {
            Ok(document) => {
                let samples = walk(&self.registry, &document);
                debug!(
                    samples = samples.len(),
                    malformed = document.malformed_count(),
                    "Collected nginx status"
                );
                samples
            }
            Err(e) => {
                self.scrape_failures.inc();
                warn!(error = %e, "Failed to fetch nginx status");
                Vec::new()
            }
        };

        samples.push(Sample::new(
            self.registry.scrapes().clone(),
            Vec::new(),
            self.scrapes.get() as f64,
        ));
        samples.push(Sample::new(
            self.registry.scrape_failures().clone(),
            Vec::new(),
            self.scrape_failures.get() as f64,
        ));

        samples
    }

    /// Current scrape counter values.
    pub fn stats(&self) -> ScrapeStats {
        ScrapeStats {
            scrapes: self.scrapes.get(),
            failures: self.scrape_failures.get(),
        }
    }
}

/// Translate a status document into samples.
pub fn walk(registry: &DescriptorRegistry, document: &StatusDocument) -> Vec<Sample> {
    let mut sink = SampleSink {
        registry,
        samples: Vec::new(),
    };

    if let Some(host_name) = &document.host_name {
        let version = document.nginx_version.as_deref().unwrap_or_default();
        sink.emit(Category::Server, "info", &[host_name.as_str(), version], 1.0);
    }

    match document.connections.as_ref() {
        Some(Entry::Valid(connections)) => sink.connections(connections),
        Some(Entry::Malformed(_)) => warn!("Skipping malformed connections entry"),
        None => {}
    }

    for (host, entry) in &document.server_zones {
        match entry.valid() {
            Some(zone) => sink.server_zone(host, zone),
            None => warn!(host = %host, "Skipping malformed server zone entry"),
        }
    }

    for (upstream, group) in &document.upstream_zones {
        let Some(backends) = group.valid() else {
            warn!(upstream = %upstream, "Skipping malformed upstream group");
            continue;
        };
        for (index, entry) in backends.iter().enumerate() {
            match entry.valid() {
                Some(backend) => sink.upstream_backend(upstream, backend),
                None => warn!(
                    upstream = %upstream,
                    index,
                    "Skipping malformed upstream backend entry"
                ),
            }
        }
    }

    for (filter, category) in &document.filter_zones {
        let Some(names) = category.valid() else {
            warn!(filter = %filter, "Skipping malformed filter category");
            continue;
        };
        for (filter_name, entry) in names {
            match entry.valid() {
                Some(zone) => sink.filter_zone(filter, filter_name, zone),
                None => warn!(
                    filter = %filter,
                    filter_name = %filter_name,
                    "Skipping malformed filter zone entry"
                ),
            }
        }
    }

    for (zone, entry) in &document.cache_zones {
        match entry.valid() {
            Some(cache) => sink.cache_zone(zone, cache),
            None => warn!(zone = %zone, "Skipping malformed cache zone entry"),
        }
    }

    sink.samples
}

struct SampleSink<'a> {
    registry: &'a DescriptorRegistry,
    samples: Vec<Sample>,
}

impl SampleSink<'_> {
    fn emit(&mut self, category: Category, key: &str, labels: &[&str], value: f64) {
        let Some(descriptor) = self.registry.get(category, key) else {
            debug!(category = %category, key, "No descriptor registered");
            return;
        };
        debug_assert_eq!(descriptor.labels.len(), labels.len(), "{}", descriptor.name);

        self.samples.push(Sample::new(
            descriptor.clone(),
            labels.iter().map(|l| l.to_string()).collect(),
            value,
        ));
    }

    fn connections(&mut self, connections: &Connections) {
        for (state, value) in connections.states() {
            self.emit(Category::Server, "connections", &[state], value as f64);
        }
        self.emit(
            Category::Server,
            "connections_accepted",
            &[],
            connections.accepted as f64,
        );
        self.emit(
            Category::Server,
            "connections_handled",
            &[],
            connections.handled as f64,
        );
        self.emit(
            Category::Server,
            "connections_requests",
            &[],
            connections.requests as f64,
        );
    }

    fn server_zone(&mut self, host: &str, zone: &ServerZone) {
        for (code, count) in zone.responses.status_codes() {
            self.emit(Category::Server, "requests", &[host, code], count as f64);
        }
        self.emit(
            Category::Server,
            "requestCounter",
            &[host],
            zone.request_counter as f64,
        );
        self.emit(Category::Server, "bytes", &[host, "in"], zone.in_bytes as f64);
        self.emit(Category::Server, "bytes", &[host, "out"], zone.out_bytes as f64);
        for (status, count) in zone.responses.cache_statuses() {
            self.emit(Category::Server, "cache", &[host, status], count as f64);
        }
        if let Some(msec) = zone.request_msec {
            self.emit(Category::Server, "requestMsec", &[host], msec);
        }
    }

    fn upstream_backend(&mut self, upstream: &str, backend: &UpstreamBackend) {
        let server = backend.server.as_str();

        for (code, count) in backend.responses.status_codes() {
            self.emit(
                Category::Upstream,
                "requests",
                &[upstream, server, code],
                count as f64,
            );
        }
        self.emit(
            Category::Upstream,
            "requestCounter",
            &[upstream, server],
            backend.request_counter as f64,
        );
        self.emit(
            Category::Upstream,
            "bytes",
            &[upstream, server, "in"],
            backend.in_bytes as f64,
        );
        self.emit(
            Category::Upstream,
            "bytes",
            &[upstream, server, "out"],
            backend.out_bytes as f64,
        );
        if let Some(msec) = backend.response_msec {
            self.emit(Category::Upstream, "responseMsec", &[upstream, server], msec);
        }
        if let Some(msec) = backend.request_msec {
            self.emit(Category::Upstream, "requestMsec", &[upstream, server], msec);
        }
        if let Some(down) = backend.down {
            let value = if down { 1.0 } else { 0.0 };
            self.emit(Category::Upstream, "down", &[upstream, server], value);
        }
    }

    fn filter_zone(&mut self, filter: &str, filter_name: &str, zone: &FilterZone) {
        for (code, count) in zone.responses.status_codes() {
            self.emit(
                Category::Filter,
                "requests",
                &[filter, filter_name, code],
                count as f64,
            );
        }
        self.emit(
            Category::Filter,
            "requestCounter",
            &[filter, filter_name],
            zone.request_counter as f64,
        );
        self.emit(
            Category::Filter,
            "bytes",
            &[filter, filter_name, "in"],
            zone.in_bytes as f64,
        );
        self.emit(
            Category::Filter,
            "bytes",
            &[filter, filter_name, "out"],
            zone.out_bytes as f64,
        );
        if let Some(msec) = zone.response_msec {
            self.emit(Category::Filter, "responseMsec", &[filter, filter_name], msec);
        }
        if let Some(msec) = zone.request_msec {
            self.emit(Category::Filter, "requestMsec", &[filter, filter_name], msec);
        }
    }

    fn cache_zone(&mut self, zone: &str, cache: &CacheZone) {
        for (status, count) in cache.responses.iter() {
            self.emit(Category::Cache, "requests", &[zone, status], count as f64);
        }
        self.emit(Category::Cache, "bytes", &[zone, "in"], cache.in_bytes as f64);
        self.emit(Category::Cache, "bytes", &[zone, "out"], cache.out_bytes as f64);
        if let Some(max) = cache.max_size {
            self.emit(Category::Cache, "size", &[zone, "max"], max as f64);
        }
        if let Some(used) = cache.used_size {
            self.emit(Category::Cache, "size", &[zone, "used"], used as f64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::StaticSource;

    const EXAMPLE: &str = r#"{
        "serverZones": {
            "example.com": {
                "requestCounter": 42,
                "inBytes": 100,
                "outBytes": 200,
                "responses": {"2xx": 40, "4xx": 2}
            }
        }
    }"#;

    fn collector(body: &str) -> VtsCollector<StaticSource> {
        VtsCollector::new(StaticSource::new(body), DescriptorRegistry::new("nginx"))
    }

    fn named<'a>(samples: &'a [Sample], name: &str) -> Vec<&'a Sample> {
        samples.iter().filter(|s| s.name() == name).collect()
    }

    fn value_of(samples: &[Sample], name: &str) -> f64 {
        named(samples, name)
            .first()
            .map(|s| s.value)
            .unwrap_or(f64::NAN)
    }

    #[tokio::test]
    async fn test_server_zone_example() {
        let samples = collector(EXAMPLE).collect().await;

        let requests = named(&samples, "nginx_server_requests");
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].label("host"), Some("example.com"));
        assert_eq!(requests[0].label("code"), Some("2xx"));
        assert_eq!(requests[0].value, 40.0);
        assert_eq!(requests[1].label("code"), Some("4xx"));
        assert_eq!(requests[1].value, 2.0);

        let bytes = named(&samples, "nginx_server_bytes");
        assert_eq!(bytes.len(), 2);
        assert_eq!(bytes[0].label("direction"), Some("in"));
        assert_eq!(bytes[0].value, 100.0);
        assert_eq!(bytes[1].label("direction"), Some("out"));
        assert_eq!(bytes[1].value, 200.0);

        assert_eq!(value_of(&samples, "nginx_server_requestCounter"), 42.0);
        assert!(named(&samples, "nginx_server_cache").is_empty());
        assert!(named(&samples, "nginx_server_requestMsec").is_empty());
        assert!(named(&samples, "nginx_server_info").is_empty());
        assert!(named(&samples, "nginx_server_connections").is_empty());
    }

    #[tokio::test]
    async fn test_cache_statuses_and_msec() {
        let body = r#"{
            "serverZones": {
                "static.example": {
                    "requestCounter": 9, "inBytes": 1, "outBytes": 2,
                    "responses": {"2xx": 9, "hit": 6, "miss": 3},
                    "requestMsec": 1.25
                }
            }
        }"#;
        let samples = collector(body).collect().await;

        let cache = named(&samples, "nginx_server_cache");
        assert_eq!(cache.len(), 2);
        assert_eq!(cache[0].label("status"), Some("hit"));
        assert_eq!(cache[1].label("status"), Some("miss"));
        assert_eq!(value_of(&samples, "nginx_server_requestMsec"), 1.25);
    }

    #[tokio::test]
    async fn test_connections_and_info() {
        let body = r#"{
            "hostName": "web-01",
            "nginxVersion": "1.25.3",
            "connections": {"active": 5, "reading": 1, "writing": 2, "waiting": 2,
                            "accepted": 100, "handled": 99, "requests": 400}
        }"#;
        let samples = collector(body).collect().await;

        let info = named(&samples, "nginx_server_info");
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].label("hostName"), Some("web-01"));
        assert_eq!(info[0].label("nginxVersion"), Some("1.25.3"));

        let connections = named(&samples, "nginx_server_connections");
        let states: Vec<_> = connections
            .iter()
            .map(|s| (s.label("status").unwrap(), s.value))
            .collect();
        assert_eq!(
            states,
            vec![
                ("active", 5.0),
                ("reading", 1.0),
                ("writing", 2.0),
                ("waiting", 2.0)
            ]
        );
        assert_eq!(value_of(&samples, "nginx_server_connections_accepted"), 100.0);
        assert_eq!(value_of(&samples, "nginx_server_connections_handled"), 99.0);
        assert_eq!(value_of(&samples, "nginx_server_connections_requests"), 400.0);
    }

    #[tokio::test]
    async fn test_upstream_filter_cache_samples() {
        let body = r#"{
            "upstreamZones": {
                "api": [
                    {"server": "10.0.0.1:80", "requestCounter": 10, "inBytes": 1, "outBytes": 2,
                     "responses": {"2xx": 9, "5xx": 1}, "responseMsec": 3.5, "requestMsec": 4,
                     "down": true}
                ]
            },
            "filterZones": {
                "country": {
                    "KR": {"requestCounter": 3, "inBytes": 4, "outBytes": 5,
                           "responses": {"2xx": 3}, "requestMsec": 6}
                }
            },
            "cacheZones": {
                "static": {"inBytes": 7, "outBytes": 8, "maxSize": 1024, "usedSize": 512,
                           "responses": {"hit": 2, "miss": 1}}
            }
        }"#;
        let samples = collector(body).collect().await;

        let upstream = named(&samples, "nginx_upstream_requests");
        assert_eq!(upstream.len(), 2);
        assert!(upstream.iter().all(|s| s.label("upstream") == Some("api")));
        assert!(upstream.iter().all(|s| s.label("backend") == Some("10.0.0.1:80")));
        assert_eq!(value_of(&samples, "nginx_upstream_responseMsec"), 3.5);
        assert_eq!(value_of(&samples, "nginx_upstream_requestMsec"), 4.0);
        assert_eq!(value_of(&samples, "nginx_upstream_down"), 1.0);

        let filter = named(&samples, "nginx_filter_requests");
        assert_eq!(filter.len(), 1);
        assert_eq!(filter[0].label("filter"), Some("country"));
        assert_eq!(filter[0].label("filterName"), Some("KR"));
        assert!(named(&samples, "nginx_filter_responseMsec").is_empty());
        assert_eq!(value_of(&samples, "nginx_filter_requestMsec"), 6.0);

        let cache = named(&samples, "nginx_cache_requests");
        assert_eq!(cache.len(), 2);
        assert_eq!(cache[0].label("zone"), Some("static"));
        assert_eq!(named(&samples, "nginx_cache_bytes").len(), 2);
        let sizes: Vec<_> = named(&samples, "nginx_cache_size")
            .iter()
            .map(|s| (s.label("type").unwrap(), s.value))
            .collect();
        assert_eq!(sizes, vec![("max", 1024.0), ("used", 512.0)]);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_isolated() {
        let collector = VtsCollector::new(StaticSource::unavailable(), DescriptorRegistry::default());

        let samples = collector.collect().await;

        assert_eq!(samples.len(), 2, "only the scrape counters: {:?}", samples);
        assert_eq!(value_of(&samples, "nginx_exporter_scrapes_total"), 1.0);
        assert_eq!(value_of(&samples, "nginx_exporter_scrape_failures_total"), 1.0);

        collector.collect().await;
        assert_eq!(
            collector.stats(),
            ScrapeStats {
                scrapes: 2,
                failures: 2
            }
        );
    }

    #[tokio::test]
    async fn test_decode_failure_counts_as_failed_scrape() {
        let collector = collector("{\"serverZones\": 17}");

        let samples = collector.collect().await;

        assert_eq!(samples.len(), 2);
        assert_eq!(collector.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_success_does_not_increment_failures() {
        let collector = collector(EXAMPLE);

        let samples = collector.collect().await;

        assert_eq!(value_of(&samples, "nginx_exporter_scrapes_total"), 1.0);
        assert_eq!(value_of(&samples, "nginx_exporter_scrape_failures_total"), 0.0);
    }

    #[tokio::test]
    async fn test_recovery_after_outage() {
        let collector = collector(EXAMPLE);

        collector.source().set_unavailable();
        let during = collector.collect().await;
        assert!(named(&during, "nginx_server_requests").is_empty());

        collector.source().set_body(EXAMPLE);
        let after = collector.collect().await;
        assert_eq!(named(&after, "nginx_server_requests").len(), 2);
        assert_eq!(value_of(&after, "nginx_exporter_scrape_failures_total"), 1.0);
        assert_eq!(value_of(&after, "nginx_exporter_scrapes_total"), 2.0);
    }

    #[tokio::test]
    async fn test_malformed_upstream_entry_is_skipped() {
        let body = r#"{
            "upstreamZones": {
                "api": [
                    {"server": "10.0.0.1:80", "requestCounter": 10, "inBytes": 1, "outBytes": 2,
                     "responses": {"2xx": 10}},
                    {"server": "10.0.0.2:80", "inBytes": 1, "outBytes": 2,
                     "responses": {"2xx": 5}},
                    {"server": "10.0.0.3:80", "requestCounter": 7, "inBytes": 3, "outBytes": 4,
                     "responses": {"2xx": 6, "4xx": 1}}
                ]
            }
        }"#;
        let collector = collector(body);

        let samples = collector.collect().await;

        let backends: Vec<_> = named(&samples, "nginx_upstream_requestCounter")
            .iter()
            .map(|s| (s.label("backend").unwrap(), s.value))
            .collect();
        assert_eq!(backends, vec![("10.0.0.1:80", 10.0), ("10.0.0.3:80", 7.0)]);
        assert_eq!(named(&samples, "nginx_upstream_requests").len(), 3);
        assert!(
            samples
                .iter()
                .all(|s| s.label("backend") != Some("10.0.0.2:80"))
        );
        assert_eq!(collector.stats().failures, 0);
    }

    #[tokio::test]
    async fn test_malformed_group_keeps_other_zones() {
        let body = r#"{
            "serverZones": {
                "ok.example": {"requestCounter": 4, "inBytes": 1, "outBytes": 2,
                               "responses": {"2xx": 4}}
            },
            "upstreamZones": {
                "api": {"server": "10.0.0.1:80"},
                "web": [
                    {"server": "10.0.0.2:80", "requestCounter": 3, "inBytes": 1, "outBytes": 2}
                ]
            },
            "filterZones": {
                "country": 42,
                "agent": {"curl": {"requestCounter": 1, "inBytes": 2, "outBytes": 3}}
            }
        }"#;
        let collector = collector(body);

        let samples = collector.collect().await;

        assert_eq!(collector.stats().failures, 0);
        assert_eq!(value_of(&samples, "nginx_server_requestCounter"), 4.0);
        let upstreams: Vec<_> = named(&samples, "nginx_upstream_requestCounter")
            .iter()
            .map(|s| s.label("upstream").unwrap())
            .collect();
        assert_eq!(upstreams, vec!["web"]);
        let filters: Vec<_> = named(&samples, "nginx_filter_requestCounter")
            .iter()
            .map(|s| s.label("filter").unwrap())
            .collect();
        assert_eq!(filters, vec!["agent"]);
    }

    #[test]
    fn test_walk_empty_document() {
        let registry = DescriptorRegistry::default();

        assert!(walk(&registry, &StatusDocument::default()).is_empty());
    }

    #[test]
    fn test_walk_uses_namespace() {
        let registry = DescriptorRegistry::new("edge");
        let document = StatusDocument::from_slice(EXAMPLE.as_bytes()).unwrap();

        let samples = walk(&registry, &document);

        assert!(!samples.is_empty());
        assert!(samples.iter().all(|s| s.name().starts_with("edge_server_")));

        let collector = VtsCollector::new(StaticSource::new(EXAMPLE), registry);
        assert_eq!(collector.registry().namespace(), "edge");
    }
}
