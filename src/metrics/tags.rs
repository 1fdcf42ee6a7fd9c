//! Sample tags and `metric{key:value}` selectors.
//!
//! Every sample carries a small [`TagSet`] (group name, request name, status,
//! ...). A [`TagSelector`] picks the subset of a metric's samples whose tags
//! contain all of the selector's pairs; thresholds use selectors to target
//! sub-metrics such as `http_req_duration{group:Projects API}`.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::ThresholdParseError;

/// Ordered key/value tags attached to a sample.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet(BTreeMap<String, String>);

impl TagSet {
    /// Creates an empty tag set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts or replaces a tag.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns the value of a tag, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A conjunction of `key:value` pairs a sample's tags must contain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagSelector {
    pairs: Vec<(String, String)>,
}

impl TagSelector {
    /// Builds a selector from pairs; keys are sorted so equal selectors
    /// compare and print identically regardless of input order.
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut pairs: Vec<_> = pairs.into_iter().collect();
        pairs.sort();
        pairs.dedup();
        Self { pairs }
    }

    /// Returns `true` if every pair of this selector is present in `tags`.
    pub fn matches(&self, tags: &TagSet) -> bool {
        self.pairs
            .iter()
            .all(|(k, v)| tags.get(k) == Some(v.as_str()))
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}

impl fmt::Display for TagSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{k}:{v}")?;
        }
        f.write_str("}")
    }
}

/// A threshold target: a metric name with an optional tag selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricKey {
    pub name: String,
    pub selector: Option<TagSelector>,
}

impl MetricKey {
    /// Parses `name` or `name{key:value,key2:value2}`.
    ///
    /// Whitespace around names, keys, and values is trimmed; values may
    /// contain spaces (`{group:Projects API}`).
    pub fn parse(raw: &str) -> Result<Self, ThresholdParseError> {
        let raw = raw.trim();
        let Some(open) = raw.find('{') else {
            if raw.is_empty() || raw.contains('}') {
                return Err(ThresholdParseError::Selector(raw.to_string()));
            }
            return Ok(Self {
                name: raw.to_string(),
                selector: None,
            });
        };

        let name = raw[..open].trim();
        let body = raw[open + 1..]
            .strip_suffix('}')
            .ok_or_else(|| ThresholdParseError::Selector(raw.to_string()))?;
        if name.is_empty() || body.contains('{') || body.contains('}') {
            return Err(ThresholdParseError::Selector(raw.to_string()));
        }

        let mut pairs = Vec::new();
        for part in body.split(',') {
            let (k, v) = part
                .split_once(':')
                .ok_or_else(|| ThresholdParseError::Selector(raw.to_string()))?;
            let (k, v) = (k.trim(), v.trim());
            if k.is_empty() || v.is_empty() {
                return Err(ThresholdParseError::Selector(raw.to_string()));
            }
            pairs.push((k.to_string(), v.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            selector: Some(TagSelector::new(pairs)),
        })
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(selector) = &self.selector {
            write!(f, "{selector}")?;
        }
        Ok(())
    }
}
