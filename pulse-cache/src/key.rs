//! Canonical cache keys.
//!
//! A key is a logical resource name plus a canonical serialization of the
//! request parameters. Parameters go through `serde_json::Value` with object
//! members sorted and `null` members dropped, so two parameter objects that
//! differ only in member order or in absent-vs-null fields map to the same
//! entry.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Identifies one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    resource: String,
    params: String,
}

impl CacheKey {
    /// Key for a resource that takes no parameters.
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            params: String::new(),
        }
    }

    /// Key for a resource with a parameter set.
    pub fn with_params<P>(resource: impl Into<String>, params: &P) -> Result<Self, serde_json::Error>
    where
        P: Serialize + ?Sized,
    {
        Ok(Self::from_value(resource, serde_json::to_value(params)?))
    }

    /// Key for a resource whose parameters are already a JSON value.
    pub fn from_value(resource: impl Into<String>, value: Value) -> Self {
        let params = match canonicalize(value) {
            Value::Null => String::new(),
            Value::Object(ref map) if map.is_empty() => String::new(),
            other => other.to_string(),
        };
        Self {
            resource: resource.into(),
            params,
        }
    }

    /// Key for a resource addressed by query-string pairs.
    pub fn from_pairs<K, V>(resource: impl Into<String>, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let map: Map<String, Value> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), Value::String(v.into())))
            .collect();
        Self::from_value(resource, Value::Object(map))
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Canonical JSON of the parameters, empty when there are none.
    pub fn params(&self) -> &str {
        &self.params
    }

    /// True when the resource is `prefix` or nested under `prefix/`.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        let prefix = prefix.trim_end_matches('/');
        self.resource == prefix
            || (self.resource.starts_with(prefix)
                && self.resource[prefix.len()..].starts_with('/'))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            f.write_str(&self.resource)
        } else {
            write!(f, "{}?{}", self.resource, self.params)
        }
    }
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            Value::Object(sorted.into_iter().collect::<Map<String, Value>>())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
