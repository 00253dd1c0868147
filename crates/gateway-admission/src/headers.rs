//! Header normalisation and collection (spec.md §4.1 steps 6-7).

use std::collections::HashMap;

/// Normalise an `x-source` header value: strip a leading `http://`/
/// `https://` and a leading `www.`, then drop anything outside
/// `[A-Za-z0-9./-]`.
#[must_use]
pub fn normalize_source(raw: &str) -> String {
    let without_scheme = raw.strip_prefix("https://").or_else(|| raw.strip_prefix("http://")).unwrap_or(raw);
    let without_www = without_scheme.strip_prefix("www.").unwrap_or(without_scheme);
    without_www
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '/' | '-'))
        .collect()
}

/// Collect every `x-llmgateway-*` header into a map keyed by the
/// suffix after the prefix, lowercased (header names arrive
/// case-insensitively).
#[must_use]
pub fn collect_llmgateway_headers<'a>(headers: impl Iterator<Item = (&'a str, &'a str)>) -> HashMap<String, String> {
    const PREFIX: &str = "x-llmgateway-";
    headers
        .filter_map(|(name, value)| {
            let lower = name.to_ascii_lowercase();
            lower.strip_prefix(PREFIX).map(|suffix| (suffix.to_string(), value.to_string()))
        })
        .collect()
}
