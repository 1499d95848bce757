//! Qdrant vector store driver.
//!
//! Provides [`QdrantClient`], which implements [`VectorClient`] using the
//! [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC. Records
//! map to points with numeric ids and no payload; `optimize` polls the
//! collection status until the optimizer reports green.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::{
    CollectionStatus, CountPointsBuilder, CreateCollectionBuilder, Distance, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use tracing::debug;

use crate::client::{ClientSession, RecordBatch, VectorClient};
use crate::config::{CollectionSchema, ConnectionParams, MetricType, SearchFilters};
use crate::error::{BenchError, Result};
use crate::observe::BenchObserver;
use crate::ready::{PollOptions, ReadyState, ReadyStatus, poll_until_ready};

const BACKEND: &str = "qdrant";

fn distance(metric: MetricType) -> Distance {
    match metric {
        MetricType::L2 => Distance::Euclid,
        MetricType::InnerProduct => Distance::Dot,
        MetricType::Cosine => Distance::Cosine,
    }
}

fn connection_err(e: qdrant_client::QdrantError) -> BenchError {
    BenchError::Connection { backend: BACKEND, message: e.to_string() }
}

fn schema_err(e: qdrant_client::QdrantError) -> BenchError {
    BenchError::Schema { backend: BACKEND, message: e.to_string() }
}

/// A [`VectorClient`] backed by [Qdrant](https://qdrant.tech/).
///
/// The gRPC channel connects lazily; `configure` performs no network I/O.
pub struct QdrantClient {
    client: Arc<Qdrant>,
    schema: CollectionSchema,
    poll_interval: Duration,
}

impl QdrantClient {
    /// Validate connection parameters and bind the target schema.
    ///
    /// Recognized parameters: `url` (required, e.g.
    /// `http://localhost:6334`), `api_key` (optional), `poll_interval_ms`
    /// (optimize backoff, default 2000).
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::Config`] on missing or malformed parameters.
    pub fn configure(params: &ConnectionParams, schema: &CollectionSchema) -> Result<Self> {
        let url = params.require("url")?;
        let poll_interval = Duration::from_millis(params.parse_or("poll_interval_ms", 2000u64)?);

        let mut builder = Qdrant::from_url(url);
        if let Some(api_key) = params.get("api_key") {
            builder = builder.api_key(api_key);
        }
        let client =
            builder.build().map_err(|e| BenchError::Config(format!("invalid qdrant url: {e}")))?;

        Ok(Self { client: Arc::new(client), schema: schema.clone(), poll_interval })
    }
}

#[async_trait]
impl VectorClient for QdrantClient {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    async fn setup_schema(&self, drop_existing: bool) -> Result<()> {
        if !drop_existing {
            return Ok(());
        }

        let collections = self.client.list_collections().await.map_err(connection_err)?;
        if collections.collections.iter().any(|c| c.name == self.schema.name) {
            self.client.delete_collection(self.schema.name.as_str()).await.map_err(schema_err)?;
        }

        let vectors = VectorParamsBuilder::new(
            self.schema.dimensions as u64,
            distance(self.schema.index.metric),
        );
        self.client
            .create_collection(
                CreateCollectionBuilder::new(self.schema.name.as_str()).vectors_config(vectors),
            )
            .await
            .map_err(schema_err)?;

        debug!(
            collection = %self.schema.name,
            dimensions = self.schema.dimensions,
            "created qdrant collection"
        );
        Ok(())
    }

    async fn session(&self) -> Result<Box<dyn ClientSession>> {
        Ok(Box::new(QdrantSession {
            client: Arc::clone(&self.client),
            collection: self.schema.name.clone(),
        }))
    }

    async fn optimize(
        &self,
        deadline: Option<Duration>,
        observer: &dyn BenchObserver,
    ) -> Result<()> {
        let client = Arc::clone(&self.client);
        let collection = self.schema.name.clone();
        let probe = move || {
            let client = Arc::clone(&client);
            let collection = collection.clone();
            async move {
                let info =
                    client.collection_info(collection.as_str()).await.map_err(connection_err)?;
                let info = info.result.ok_or_else(|| BenchError::Connection {
                    backend: BACKEND,
                    message: format!("no collection info for '{collection}'"),
                })?;
                if info.status() == CollectionStatus::Green {
                    Ok(ReadyStatus::ready())
                } else {
                    Ok(ReadyStatus { state: ReadyState::IndexBuilding, pending: None })
                }
            }
        };

        let options = PollOptions { interval: self.poll_interval, deadline };
        let report = poll_until_ready(probe, options, observer).await?;
        debug!(collection = %self.schema.name, polls = report.polls, "qdrant collection green");
        Ok(())
    }
}

/// Verify the collection grew by one point per submitted record.
///
/// Qdrant's write API is upsert-only: an already-committed id is silently
/// overwritten rather than rejected, so a retried batch would double-count.
/// A growth shortfall is surfaced as a duplicate-id insert failure instead.
fn committed_growth(before: u64, after: u64, submitted: usize) -> Result<usize> {
    let grown = after.saturating_sub(before) as usize;
    if grown < submitted {
        return Err(BenchError::Insert {
            backend: BACKEND,
            inserted: grown,
            message: format!("{} duplicate ids overwritten", submitted - grown),
        });
    }
    Ok(submitted)
}

struct QdrantSession {
    client: Arc<Qdrant>,
    collection: String,
}

impl QdrantSession {
    async fn point_count(&self) -> std::result::Result<u64, qdrant_client::QdrantError> {
        let response = self
            .client
            .count(CountPointsBuilder::new(self.collection.as_str()).exact(true))
            .await?;
        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }
}

#[async_trait]
impl ClientSession for QdrantSession {
    async fn insert(&mut self, batch: RecordBatch<'_>) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let before = self.point_count().await.map_err(connection_err)?;

        let points: Vec<PointStruct> = batch
            .ids
            .iter()
            .zip(batch.vectors)
            .map(|(id, vector)| PointStruct::new(*id as u64, vector.clone(), Payload::new()))
            .collect();

        // wait(true) so the follow-up count observes this write.
        self.client
            .upsert_points(UpsertPointsBuilder::new(self.collection.as_str(), points).wait(true))
            .await
            .map_err(|e| BenchError::Insert {
                backend: BACKEND,
                inserted: 0,
                message: e.to_string(),
            })?;

        // The write was acknowledged, so count it even if verification fails.
        let after = self.point_count().await.map_err(|e| BenchError::Insert {
            backend: BACKEND,
            inserted: batch.len(),
            message: format!("count after write failed: {e}"),
        })?;
        committed_growth(before, after, batch.len())
    }

    async fn search(
        &mut self,
        query: &[f32],
        k: usize,
        _filters: Option<&SearchFilters>,
    ) -> Result<Vec<i64>> {
        let request =
            SearchPointsBuilder::new(self.collection.as_str(), query.to_vec(), k as u64);
        let response = self
            .client
            .search_points(request)
            .await
            .map_err(|e| BenchError::Search { backend: BACKEND, message: e.to_string() })?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|point| match point.id.and_then(|id| id.point_id_options) {
                Some(PointIdOptions::Num(id)) => Some(id as i64),
                _ => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_resolution_matches_backend_vocabulary() {
        assert_eq!(distance(MetricType::L2), Distance::Euclid);
        assert_eq!(distance(MetricType::InnerProduct), Distance::Dot);
        assert_eq!(distance(MetricType::Cosine), Distance::Cosine);
    }

    #[test]
    fn full_growth_commits_the_whole_batch() {
        assert_eq!(committed_growth(100, 200, 100).unwrap(), 100);
        assert_eq!(committed_growth(0, 1, 1).unwrap(), 1);
    }

    #[test]
    fn growth_shortfall_is_a_duplicate_id_failure() {
        let err = committed_growth(100, 160, 100).unwrap_err();
        match err {
            BenchError::Insert { inserted, message, .. } => {
                assert_eq!(inserted, 60);
                assert!(message.contains("40 duplicate ids"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn configure_requires_url() {
        let schema = CollectionSchema::new("bench", 4).unwrap();
        let err = QdrantClient::configure(&ConnectionParams::new(), &schema).unwrap_err();
        assert!(matches!(err, BenchError::Config(_)));
    }
}
