//! Cache key definitions.
//!
//! A cache key is the resource name, optionally followed by `?` and the
//! filter parameters as `name=<json>` pairs sorted by name and joined with
//! `&`. Parameters whose value is absent or `null` never reach the key, so
//! two logically equal filter sets always produce the same key.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Resource families the client caches.
///
/// Every resource hook derives its key from one of these names; no name is
/// a `?`-delimited prefix of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Rotation,
    Graveyard,
    Shoes,
    Recommendations,
    SimilarShoes,
    UserStats,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Rotation,
        ResourceKind::Graveyard,
        ResourceKind::Shoes,
        ResourceKind::Recommendations,
        ResourceKind::SimilarShoes,
        ResourceKind::UserStats,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ResourceKind::Rotation => "rotation",
            ResourceKind::Graveyard => "graveyard",
            ResourceKind::Shoes => "shoes",
            ResourceKind::Recommendations => "recommendations",
            ResourceKind::SimilarShoes => "similar-shoes",
            ResourceKind::UserStats => "user-stats",
        }
    }

    pub fn key(self, params: &CacheParams) -> String {
        build_key(self.name(), Some(params))
    }

    /// True when `key` belongs to this resource: it is the bare name or the
    /// name followed by a parameter list.
    pub fn owns_key(self, key: &str) -> bool {
        let name = self.name();
        match key.strip_prefix(name) {
            Some(rest) => rest.is_empty() || rest.starts_with('?'),
            None => false,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Filter parameters contributing to a cache key, kept sorted by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheParams {
    values: BTreeMap<String, Value>,
}

impl CacheParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`CacheParams::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Serialize) -> Self {
        self.insert(name, value);
        self
    }

    /// Adds a parameter. `None`, `null`, and values that fail to serialize
    /// are dropped.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Serialize) {
        match serde_json::to_value(value) {
            Ok(Value::Null) | Err(_) => {}
            Ok(value) => {
                self.values.insert(name.into(), value);
            }
        }
    }

    /// Flattens the top-level fields of a serializable filter struct.
    /// Anything that does not serialize to a JSON object yields no params.
    pub fn from_fields<T: Serialize>(filters: &T) -> Self {
        let mut params = Self::new();
        if let Ok(Value::Object(fields)) = serde_json::to_value(filters) {
            for (name, value) in fields {
                params.insert(name, value);
            }
        }
        params
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    fn encode(&self) -> String {
        self.values
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Build the canonical cache key for a resource and its parameters.
pub fn build_key(resource: &str, params: Option<&CacheParams>) -> String {
    match params {
        Some(params) if !params.is_empty() => format!("{resource}?{}", params.encode()),
        _ => resource.to_string(),
    }
}
