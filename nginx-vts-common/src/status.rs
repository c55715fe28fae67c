//! Typed model of the nginx VTS module's JSON status document.
//!
//! The shape follows `/status/format/json` as served by
//! `nginx-module-vts`. Only the fields the exporter reports are modeled;
//! everything else in the document is ignored.
//!
//! Every zone entry is wrapped in [`Entry`], so one entry that does not
//! match its schema is kept as [`Entry::Malformed`] instead of failing the
//! whole document.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;

/// Root snapshot of nginx's traffic counters at fetch time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDocument {
    /// Host name of the nginx instance.
    #[serde(default)]
    pub host_name: Option<String>,

    /// nginx version string.
    #[serde(default)]
    pub nginx_version: Option<String>,

    /// Process-wide connection counters.
    #[serde(default)]
    pub connections: Option<Entry<Connections>>,

    /// Server zones keyed by host name.
    #[serde(default)]
    pub server_zones: BTreeMap<String, Entry<ServerZone>>,

    /// Upstream groups keyed by group name, each an ordered list of backends.
    #[serde(default)]
    pub upstream_zones: BTreeMap<String, Entry<Vec<Entry<UpstreamBackend>>>>,

    /// Filter zones keyed by filter category, then filter name.
    #[serde(default)]
    pub filter_zones: BTreeMap<String, Entry<BTreeMap<String, Entry<FilterZone>>>>,

    /// Cache zones keyed by zone name.
    #[serde(default)]
    pub cache_zones: BTreeMap<String, Entry<CacheZone>>,
}

impl StatusDocument {
    /// Decode a status document from a JSON body.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Number of entries that failed to match their schema.
    ///
    /// A malformed upstream group or filter category counts once, however
    /// many backends or filters it would have held.
    pub fn malformed_count(&self) -> usize {
        let connections = self
            .connections
            .as_ref()
            .is_some_and(Entry::is_malformed) as usize;
        let servers = self
            .server_zones
            .values()
            .filter(|e| e.is_malformed())
            .count();
        let upstreams: usize = self
            .upstream_zones
            .values()
            .map(|group| match group {
                Entry::Valid(backends) => backends.iter().filter(|e| e.is_malformed()).count(),
                Entry::Malformed(_) => 1,
            })
            .sum();
        let filters: usize = self
            .filter_zones
            .values()
            .map(|names| match names {
                Entry::Valid(names) => names.values().filter(|e| e.is_malformed()).count(),
                Entry::Malformed(_) => 1,
            })
            .sum();
        let caches = self
            .cache_zones
            .values()
            .filter(|e| e.is_malformed())
            .count();

        connections + servers + upstreams + filters + caches
    }
}

/// A zone entry that is either well-formed or kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Entry<T> {
    Valid(T),
    Malformed(serde_json::Value),
}

impl<T> Entry<T> {
    /// The decoded entry, if it matched its schema.
    pub fn valid(&self) -> Option<&T> {
        match self {
            Entry::Valid(v) => Some(v),
            Entry::Malformed(_) => None,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Entry::Malformed(_))
    }
}

impl<T> From<T> for Entry<T> {
    fn from(value: T) -> Self {
        Entry::Valid(value)
    }
}

/// Connection counters for the whole nginx process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connections {
    pub active: u64,
    pub reading: u64,
    pub writing: u64,
    pub waiting: u64,
    pub accepted: u64,
    pub handled: u64,
    pub requests: u64,
}

impl Connections {
    /// Point-in-time connection states, labeled by state name.
    pub fn states(&self) -> [(&'static str, u64); 4] {
        [
            ("active", self.active),
            ("reading", self.reading),
            ("writing", self.writing),
            ("waiting", self.waiting),
        ]
    }
}

/// Per-status response counts.
///
/// VTS reports HTTP status classes (`1xx`..`5xx`) and cache statuses
/// (`hit`, `miss`, ...) in the same `responses` object. The split is by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Responses(pub BTreeMap<String, u64>);

impl Responses {
    /// Counts keyed by HTTP status class, e.g. `("2xx", 40)`.
    pub fn status_codes(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0
            .iter()
            .filter(|(k, _)| is_status_class(k))
            .map(|(k, v)| (k.as_str(), *v))
    }

    /// Counts keyed by cache status, e.g. `("hit", 12)`.
    pub fn cache_statuses(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0
            .iter()
            .filter(|(k, _)| !is_status_class(k))
            .map(|(k, v)| (k.as_str(), *v))
    }

    /// Every count, in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<K: Into<String>> FromIterator<(K, u64)> for Responses {
    fn from_iter<I: IntoIterator<Item = (K, u64)>>(iter: I) -> Self {
        Responses(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Whether a response key names an HTTP status class (`2xx`, `5xx`, ...).
pub fn is_status_class(key: &str) -> bool {
    let bytes = key.as_bytes();
    bytes.len() == 3 && bytes[0].is_ascii_digit() && &bytes[1..] == b"xx"
}

/// Traffic counters for one server zone (virtual host).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerZone {
    pub request_counter: u64,
    pub in_bytes: u64,
    pub out_bytes: u64,
    #[serde(default)]
    pub responses: Responses,
    /// Average request processing time in milliseconds.
    #[serde(default)]
    pub request_msec: Option<f64>,
}

/// Traffic counters for one backend of an upstream group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamBackend {
    /// Backend address, e.g. `10.0.0.5:8080`.
    pub server: String,
    pub request_counter: u64,
    pub in_bytes: u64,
    pub out_bytes: u64,
    #[serde(default)]
    pub responses: Responses,
    /// Average upstream response time in milliseconds.
    #[serde(default)]
    pub response_msec: Option<f64>,
    /// Average request processing time in milliseconds.
    #[serde(default)]
    pub request_msec: Option<f64>,
    /// Backend marked down in the upstream block.
    #[serde(default)]
    pub down: Option<bool>,
}

/// Traffic counters for one filter (`vhost_traffic_status_filter_by_set_key`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterZone {
    pub request_counter: u64,
    pub in_bytes: u64,
    pub out_bytes: u64,
    #[serde(default)]
    pub responses: Responses,
    #[serde(default)]
    pub request_msec: Option<f64>,
    #[serde(default)]
    pub response_msec: Option<f64>,
}

/// Counters for one proxy cache zone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheZone {
    pub in_bytes: u64,
    pub out_bytes: u64,
    #[serde(default)]
    pub responses: Responses,
    #[serde(default)]
    pub max_size: Option<u64>,
    #[serde(default)]
    pub used_size: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_class_detection() {
        assert!(is_status_class("1xx"));
        assert!(is_status_class("5xx"));
        assert!(!is_status_class("hit"));
        assert!(!is_status_class("xx"));
        assert!(!is_status_class("2xxx"));
        assert!(!is_status_class("axx"));
    }

    #[test]
    fn test_responses_split() {
        let responses: Responses = [("2xx", 40u64), ("4xx", 2), ("hit", 7), ("miss", 1)]
            .into_iter()
            .collect();

        let codes: Vec<_> = responses.status_codes().collect();
        let cache: Vec<_> = responses.cache_statuses().collect();

        assert_eq!(codes, vec![("2xx", 40u64), ("4xx", 2)]);
        assert_eq!(cache, vec![("hit", 7), ("miss", 1)]);
    }

    #[test]
    fn test_empty_document() {
        let doc = StatusDocument::from_slice(b"{}").unwrap();

        assert!(doc.connections.is_none());
        assert!(doc.server_zones.is_empty());
        assert!(doc.upstream_zones.is_empty());
        assert!(doc.filter_zones.is_empty());
        assert!(doc.cache_zones.is_empty());
        assert_eq!(doc.malformed_count(), 0);
    }

    #[test]
    fn test_server_zone_optional_fields() {
        let body = br#"{
            "serverZones": {
                "example.com": {
                    "requestCounter": 42,
                    "inBytes": 100,
                    "outBytes": 200,
                    "responses": {"2xx": 40, "4xx": 2}
                }
            }
        }"#;

        let doc = StatusDocument::from_slice(body).unwrap();
        let zone = doc.server_zones["example.com"].valid().unwrap();

        assert_eq!(zone.request_counter, 42);
        assert_eq!(zone.in_bytes, 100);
        assert_eq!(zone.out_bytes, 200);
        assert_eq!(zone.request_msec, None);
        assert_eq!(zone.responses.cache_statuses().count(), 0);
    }

    #[test]
    fn test_malformed_entry_is_isolated() {
        let body = br#"{
            "upstreamZones": {
                "backend": [
                    {"server": "10.0.0.1:80", "requestCounter": 5, "inBytes": 1, "outBytes": 2},
                    {"server": "10.0.0.2:80", "inBytes": 1, "outBytes": 2},
                    {"server": "10.0.0.3:80", "requestCounter": "many", "inBytes": 1, "outBytes": 2}
                ]
            }
        }"#;

        let doc = StatusDocument::from_slice(body).unwrap();
        let group = doc.upstream_zones["backend"].valid().unwrap();

        assert_eq!(group.len(), 3);
        assert_eq!(group[0].valid().unwrap().server, "10.0.0.1:80");
        assert!(group[1].is_malformed());
        assert!(group[2].is_malformed());
        assert_eq!(doc.malformed_count(), 2);
    }

    #[test]
    fn test_integer_msec_parses_as_float() {
        let body = br#"{
            "filterZones": {
                "country": {
                    "KR": {"requestCounter": 1, "inBytes": 2, "outBytes": 3,
                           "requestMsec": 7, "responseMsec": 1.5}
                }
            }
        }"#;

        let doc = StatusDocument::from_slice(body).unwrap();
        let filter = doc.filter_zones["country"].valid().unwrap()["KR"]
            .valid()
            .unwrap();

        assert_eq!(filter.request_msec, Some(7.0));
        assert_eq!(filter.response_msec, Some(1.5));
    }

    #[test]
    fn test_malformed_group_is_isolated() {
        let body = br#"{
            "serverZones": {
                "ok.example": {"requestCounter": 1, "inBytes": 2, "outBytes": 3}
            },
            "upstreamZones": {
                "api": {"server": "10.0.0.1:80"},
                "web": [{"server": "10.0.0.2:80", "requestCounter": 5, "inBytes": 1, "outBytes": 2}]
            },
            "filterZones": {
                "country": "not-an-object",
                "agent": {"curl": {"requestCounter": 1, "inBytes": 2, "outBytes": 3}}
            }
        }"#;

        let doc = StatusDocument::from_slice(body).unwrap();

        assert!(doc.server_zones["ok.example"].valid().is_some());
        assert!(doc.upstream_zones["api"].is_malformed());
        assert_eq!(doc.upstream_zones["web"].valid().unwrap().len(), 1);
        assert!(doc.filter_zones["country"].is_malformed());
        assert!(doc.filter_zones["agent"].valid().is_some());
        assert_eq!(doc.malformed_count(), 2);
    }

    #[test]
    fn test_top_level_schema_mismatch_fails() {
        assert!(StatusDocument::from_slice(b"not json").is_err());
        assert!(StatusDocument::from_slice(br#"{"serverZones": []}"#).is_err());
    }
}
