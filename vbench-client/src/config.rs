//! Connection parameters, distance metrics, and collection schemas.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};

/// Distance metric used for nearest-neighbor search.
///
/// Each driver resolves the metric into its backend's native vocabulary
/// when creating the index and when issuing search queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    /// Euclidean (L2) distance.
    L2,
    /// Inner product (dot product).
    InnerProduct,
    /// Cosine similarity.
    #[default]
    Cosine,
}

/// Backend-native index parameters attached to a collection.
///
/// Immutable after creation; the `params` map carries backend-specific
/// algorithm knobs that this core treats as opaque strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// The distance metric the index is built for.
    pub metric: MetricType,
    /// Additional backend-specific index parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl IndexDescriptor {
    /// Create a descriptor for the given metric with no extra parameters.
    pub fn new(metric: MetricType) -> Self {
        Self { metric, params: BTreeMap::new() }
    }

    /// Attach a backend-specific parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Identifies the target collection or table of a benchmark run.
///
/// Created once at setup, mutated only through inserts, dropped only when a
/// run explicitly requests a clean slate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    /// Collection or table name.
    pub name: String,
    /// Declared vector dimensionality; every record's vector must match it.
    pub dimensions: usize,
    /// Index parameters resolved into the backend's vocabulary at setup.
    #[serde(default)]
    pub index: IndexDescriptor,
}

impl CollectionSchema {
    /// Create a schema with the default (cosine) index descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::Config`] if `name` is empty or `dimensions`
    /// is zero.
    pub fn new(name: impl Into<String>, dimensions: usize) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(BenchError::Config("collection name must not be empty".to_string()));
        }
        if dimensions == 0 {
            return Err(BenchError::Config("dimensionality must be greater than zero".to_string()));
        }
        Ok(Self { name, dimensions, index: IndexDescriptor::default() })
    }

    /// Replace the index descriptor.
    pub fn with_index(mut self, index: IndexDescriptor) -> Self {
        self.index = index;
        self
    }
}

/// Backend-specific search-time parameters, passed through to the driver.
pub type SearchFilters = BTreeMap<String, String>;

/// A flat string-keyed map of named connection parameters.
///
/// Backend drivers pull their own keys (host, port, credential, database
/// name, TLS flag) out of this map at configure time; unknown keys are
/// ignored. Values whose key looks like a credential are redacted from
/// `Debug` output.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ConnectionParams {
    params: BTreeMap<String, String>,
}

impl ConnectionParams {
    /// Create an empty parameter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, returning `self` for chaining.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Look up a parameter.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Look up a required parameter.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::Config`] naming the missing key.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| BenchError::Config(format!("missing connection parameter '{key}'")))
    }

    /// Parse a parameter into `T`, falling back to `default` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::Config`] if the value is present but does not
    /// parse.
    pub fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| {
                BenchError::Config(format!(
                    "connection parameter '{key}' has invalid value '{raw}'"
                ))
            }),
        }
    }

    fn is_secret(key: &str) -> bool {
        key.contains("password") || key.contains("secret") || key.contains("token")
            || key.contains("key")
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.params {
            if Self::is_secret(key) {
                map.entry(key, &"***");
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}

impl FromIterator<(String, String)> for ConnectionParams {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self { params: iter.into_iter().collect() }
    }
}
