//! Static metric descriptors, grouped by VTS category.
//!
//! A descriptor is a metric's identity: fully-qualified name, help text,
//! label schema and type. The table below is the single source of truth;
//! [`DescriptorRegistry::new`] only prefixes names with the configured
//! namespace, so building it twice yields equal registries.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::mapping::{MetricKind, build_metric_name};

/// Metric category, also used as the metric name subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Server,
    Upstream,
    Filter,
    Cache,
    Exporter,
}

impl Category {
    /// Subsystem segment of metric names in this category.
    pub fn subsystem(&self) -> &'static str {
        match self {
            Category::Server => "server",
            Category::Upstream => "upstream",
            Category::Filter => "filter",
            Category::Cache => "cache",
            Category::Exporter => "exporter",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.subsystem())
    }
}

/// Static identity of one metric.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Descriptor {
    /// Fully-qualified metric name.
    pub name: String,
    pub help: &'static str,
    /// Ordered label names; samples carry values in the same order.
    pub labels: &'static [&'static str],
    pub kind: MetricKind,
}

struct DescriptorSpec {
    category: Category,
    key: &'static str,
    help: &'static str,
    labels: &'static [&'static str],
    kind: MetricKind,
}

impl DescriptorSpec {
    const fn new(
        category: Category,
        key: &'static str,
        help: &'static str,
        labels: &'static [&'static str],
        kind: MetricKind,
    ) -> Self {
        Self {
            category,
            key,
            help,
            labels,
            kind,
        }
    }

    fn build(&self, namespace: &str) -> Descriptor {
        Descriptor {
            name: build_metric_name(namespace, self.category.subsystem(), self.key),
            help: self.help,
            labels: self.labels,
            kind: self.kind,
        }
    }
}

use Category::{Cache, Exporter, Filter, Server, Upstream};
use MetricKind::{Counter, Gauge};

#[rustfmt::skip]
const ZONE_DESCRIPTORS: &[DescriptorSpec] = &[
    DescriptorSpec::new(Server, "info", "nginx info", &["hostName", "nginxVersion"], Gauge),
    DescriptorSpec::new(Server, "connections", "nginx connections", &["status"], Gauge),
    DescriptorSpec::new(Server, "connections_accepted", "accepted client connections", &[], Counter),
    DescriptorSpec::new(Server, "connections_handled", "handled client connections", &[], Counter),
    DescriptorSpec::new(Server, "connections_requests", "total client requests", &[], Counter),
    DescriptorSpec::new(Server, "requests", "requests counter", &["host", "code"], Counter),
    DescriptorSpec::new(Server, "requestCounter", "total requests per host", &["host"], Counter),
    DescriptorSpec::new(Server, "bytes", "request/response bytes", &["host", "direction"], Counter),
    DescriptorSpec::new(Server, "cache", "cache counter", &["host", "status"], Counter),
    DescriptorSpec::new(Server, "requestMsec", "average of request processing times in milliseconds", &["host"], Gauge),

    // Samples are emitted per backend, so every upstream metric carries
    // `backend` next to `upstream`. Without it two backends of one group
    // would produce identical label sets.
    DescriptorSpec::new(Upstream, "requests", "requests counter", &["upstream", "backend", "code"], Counter),
    DescriptorSpec::new(Upstream, "requestCounter", "total requests per backend", &["upstream", "backend"], Counter),
    DescriptorSpec::new(Upstream, "bytes", "request/response bytes", &["upstream", "backend", "direction"], Counter),
    DescriptorSpec::new(Upstream, "responseMsec", "average of only upstream/backend response processing times in milliseconds", &["upstream", "backend"], Gauge),
    DescriptorSpec::new(Upstream, "requestMsec", "average of request processing times in milliseconds", &["upstream", "backend"], Gauge),
    DescriptorSpec::new(Upstream, "down", "whether the backend is marked down (1) or not (0)", &["upstream", "backend"], Gauge),

    DescriptorSpec::new(Filter, "requests", "requests counter", &["filter", "filterName", "code"], Counter),
    DescriptorSpec::new(Filter, "requestCounter", "total requests per filter", &["filter", "filterName"], Counter),
    DescriptorSpec::new(Filter, "bytes", "request/response bytes", &["filter", "filterName", "direction"], Counter),
    DescriptorSpec::new(Filter, "responseMsec", "average of only upstream/backend response processing times in milliseconds", &["filter", "filterName"], Gauge),
    DescriptorSpec::new(Filter, "requestMsec", "average of request processing times in milliseconds", &["filter", "filterName"], Gauge),

    DescriptorSpec::new(Cache, "requests", "cache requests counter", &["zone", "status"], Counter),
    DescriptorSpec::new(Cache, "bytes", "cache request/response bytes", &["zone", "direction"], Counter),
    DescriptorSpec::new(Cache, "size", "cache zone size in bytes", &["zone", "type"], Gauge),
];

const SCRAPES: DescriptorSpec = DescriptorSpec::new(
    Exporter,
    "scrapes_total",
    "total scrapes of the nginx status page",
    &[],
    Counter,
);

const SCRAPE_FAILURES: DescriptorSpec = DescriptorSpec::new(
    Exporter,
    "scrape_failures_total",
    "scrapes of the nginx status page that failed",
    &[],
    Counter,
);

/// Immutable table of descriptors, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorRegistry {
    namespace: String,
    categories: BTreeMap<Category, BTreeMap<&'static str, Arc<Descriptor>>>,
    scrapes: Arc<Descriptor>,
    scrape_failures: Arc<Descriptor>,
}

impl DescriptorRegistry {
    /// Build the registry with every metric name prefixed by `namespace`.
    pub fn new(namespace: &str) -> Self {
        let mut categories: BTreeMap<Category, BTreeMap<&'static str, Arc<Descriptor>>> =
            BTreeMap::new();

        for spec in ZONE_DESCRIPTORS {
            let previous = categories
                .entry(spec.category)
                .or_default()
                .insert(spec.key, Arc::new(spec.build(namespace)));
            debug_assert!(
                previous.is_none(),
                "duplicate descriptor {}/{}",
                spec.category,
                spec.key
            );
        }

        Self {
            namespace: namespace.to_string(),
            categories,
            scrapes: Arc::new(SCRAPES.build(namespace)),
            scrape_failures: Arc::new(SCRAPE_FAILURES.build(namespace)),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Look up a descriptor by category and short key.
    pub fn get(&self, category: Category, key: &str) -> Option<&Arc<Descriptor>> {
        self.categories.get(&category)?.get(key)
    }

    /// Descriptors of one category, keyed by short metric key.
    pub fn category(
        &self,
        category: Category,
    ) -> impl Iterator<Item = (&'static str, &Arc<Descriptor>)> {
        self.categories
            .get(&category)
            .into_iter()
            .flat_map(|m| m.iter().map(|(k, d)| (*k, d)))
    }

    /// Every descriptor, zone categories first, then the scrape counters.
    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<Descriptor>> {
        self.categories
            .values()
            .flat_map(BTreeMap::values)
            .chain([&self.scrapes, &self.scrape_failures])
    }

    /// Total scrapes counter.
    pub fn scrapes(&self) -> &Arc<Descriptor> {
        &self.scrapes
    }

    /// Failed scrapes counter.
    pub fn scrape_failures(&self) -> &Arc<Descriptor> {
        &self.scrape_failures
    }
}

impl Default for DescriptorRegistry {
    fn default() -> Self {
        Self::new("nginx")
    }
}
