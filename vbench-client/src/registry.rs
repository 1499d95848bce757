//! Backend registry: maps backend identifiers to client factories.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::client::VectorClient;
use crate::config::{CollectionSchema, ConnectionParams};
use crate::error::{BenchError, Result};

/// A factory producing a configured client for one backend.
pub type ClientFactory =
    dyn Fn(&ConnectionParams, &CollectionSchema) -> Result<Arc<dyn VectorClient>> + Send + Sync;

/// Registry of backend drivers keyed by identifier.
///
/// Built-in drivers register under their feature gates via
/// [`ClientRegistry::with_builtins`]; callers may register additional
/// drivers by identifier.
///
/// # Example
///
/// ```rust,ignore
/// let registry = ClientRegistry::with_builtins();
/// let client = registry.create("inmemory", &params, &schema)?;
/// ```
#[derive(Default)]
pub struct ClientRegistry {
    factories: BTreeMap<String, Box<ClientFactory>>,
}

impl ClientRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every built-in driver compiled into this
    /// crate: `inmemory` always, `tidb` and `qdrant` behind their features.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("inmemory", |params, schema| {
            Ok(Arc::new(crate::inmemory::InMemoryClient::configure(params, schema)?))
        });
        #[cfg(feature = "tidb")]
        registry.register("tidb", |params, schema| {
            Ok(Arc::new(crate::tidb::TidbClient::configure(params, schema)?))
        });
        #[cfg(feature = "qdrant")]
        registry.register("qdrant", |params, schema| {
            Ok(Arc::new(crate::qdrant::QdrantClient::configure(params, schema)?))
        });
        registry
    }

    /// Register a factory under `backend`, replacing any previous one.
    pub fn register(
        &mut self,
        backend: impl Into<String>,
        factory: impl Fn(&ConnectionParams, &CollectionSchema) -> Result<Arc<dyn VectorClient>>
        + Send
        + Sync
        + 'static,
    ) {
        self.factories.insert(backend.into(), Box::new(factory));
    }

    /// Configure a client for `backend`.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::Config`] for an unknown backend identifier;
    /// factory failures propagate unchanged.
    pub fn create(
        &self,
        backend: &str,
        params: &ConnectionParams,
        schema: &CollectionSchema,
    ) -> Result<Arc<dyn VectorClient>> {
        let factory = self.factories.get(backend).ok_or_else(|| {
            BenchError::Config(format!(
                "unknown backend '{backend}' (available: {})",
                self.backends().join(", ")
            ))
        })?;
        factory(params, schema)
    }

    /// Registered backend identifiers, sorted.
    pub fn backends(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollectionSchema;

    #[test]
    fn builtin_inmemory_is_registered() {
        let registry = ClientRegistry::with_builtins();
        assert!(registry.backends().contains(&"inmemory"));

        let schema = CollectionSchema::new("bench", 8).unwrap();
        let client = registry.create("inmemory", &ConnectionParams::new(), &schema).unwrap();
        assert_eq!(client.backend(), "inmemory");
        assert_eq!(client.schema().dimensions, 8);
    }

    #[test]
    fn unknown_backend_is_config_error() {
        let registry = ClientRegistry::with_builtins();
        let schema = CollectionSchema::new("bench", 8).unwrap();
        let err = registry.create("nope", &ConnectionParams::new(), &schema).err().unwrap();
        assert!(matches!(err, BenchError::Config(_)));
    }
}
