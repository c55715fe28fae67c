//! Prometheus text exposition of collected samples.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::collector::Sample;
use crate::mapping::sanitize_label_name;

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render samples in Prometheus exposition format.
///
/// Metric families are sorted by name; samples within a family keep
/// collection order. `const_labels` are appended to every sample unless the
/// descriptor already defines a label with the same name. Keys that sanitize
/// to the same label name keep the first value in key order.
pub fn render(samples: &[Sample], const_labels: &BTreeMap<String, String>) -> String {
    let mut by_name: BTreeMap<&str, Vec<&Sample>> = BTreeMap::new();
    for sample in samples {
        by_name.entry(sample.name()).or_default().push(sample);
    }

    let mut sanitized: Vec<(String, &str)> = Vec::with_capacity(const_labels.len());
    for (key, value) in const_labels {
        let key = sanitize_label_name(key);
        if !sanitized.iter().any(|(k, _)| *k == key) {
            sanitized.push((key, value.as_str()));
        }
    }
    let const_labels = sanitized;

    let mut output = String::with_capacity(samples.len() * 100);

    for (name, family) in by_name {
        let descriptor = &family[0].descriptor;

        writeln!(output, "# HELP {} {}", name, escape_help(descriptor.help)).ok();
        writeln!(output, "# TYPE {} {}", name, descriptor.kind).ok();

        for sample in family {
            let mut labels: Vec<(&str, &str)> = sample
                .descriptor
                .labels
                .iter()
                .copied()
                .zip(sample.label_values.iter().map(String::as_str))
                .collect();

            for (key, value) in &const_labels {
                if !labels.iter().any(|(k, _)| *k == key.as_str()) {
                    labels.push((key.as_str(), *value));
                }
            }

            writeln!(
                output,
                "{}{} {}",
                name,
                format_labels(&labels),
                format_value(sample.value)
            )
            .ok();
        }
    }

    output
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Escape special characters in HELP text.
fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

/// Format labels for Prometheus exposition format.
fn format_labels(labels: &[(&str, &str)]) -> String {
    if labels.is_empty() {
        return String::new();
    }

    let parts: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    format!("{{{}}}", parts.join(","))
}
