//! The uniform client contract every backend driver implements.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::{CollectionSchema, SearchFilters};
use crate::error::Result;
use crate::observe::BenchObserver;

/// A contiguous slice of embedding records submitted as one unit of work.
///
/// `ids` and `vectors` are parallel slices of equal length. A batch is
/// created by the insert orchestrator, consumed by exactly one session call,
/// and discarded after the result is reported.
#[derive(Debug, Clone, Copy)]
pub struct RecordBatch<'a> {
    /// Caller-supplied record ids, unique within the target collection.
    pub ids: &'a [i64],
    /// Embedding vectors, each matching the collection's dimensionality.
    pub vectors: &'a [Vec<f32>],
}

impl<'a> RecordBatch<'a> {
    /// Create a batch over parallel id/vector slices.
    pub fn new(ids: &'a [i64], vectors: &'a [Vec<f32>]) -> Self {
        debug_assert_eq!(ids.len(), vectors.len());
        Self { ids, vectors }
    }

    /// Number of records in the batch.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Split into contiguous sub-batches of at most `size` records.
    pub fn chunks(self, size: usize) -> impl Iterator<Item = RecordBatch<'a>> {
        self.ids
            .chunks(size)
            .zip(self.vectors.chunks(size))
            .map(|(ids, vectors)| RecordBatch { ids, vectors })
    }
}

/// A backend driver for one vector-database product.
///
/// Construction (the `configure` step) validates connection parameters and
/// binds the target [`CollectionSchema`] without performing network I/O;
/// all I/O is deferred to [`VectorClient::session`] and the phase
/// operations. Implementations are selected by backend identifier through
/// [`ClientRegistry`](crate::registry::ClientRegistry).
///
/// # Example
///
/// ```rust,ignore
/// use vbench_client::{CollectionSchema, ConnectionParams, InMemoryClient};
///
/// let schema = CollectionSchema::new("bench", 128)?;
/// let client = InMemoryClient::configure(&ConnectionParams::new(), &schema)?;
/// client.setup_schema(true).await?;
/// let mut session = client.session().await?;
/// ```
#[async_trait]
pub trait VectorClient: Send + Sync {
    /// Stable backend identifier, used in error messages and the registry.
    fn backend(&self) -> &'static str;

    /// The collection schema this client was configured with.
    fn schema(&self) -> &CollectionSchema;

    /// Create the target collection and its index.
    ///
    /// With `drop_existing` set, the collection is destroyed and recreated
    /// and the index-creation request is issued. Without it, this is a
    /// no-op that assumes a compatible schema already exists.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::Schema`](crate::BenchError::Schema) if the
    /// backend rejects the dimensionality or index parameters.
    async fn setup_schema(&self, drop_existing: bool) -> Result<()>;

    /// Acquire a live connection for the duration of one benchmark phase.
    ///
    /// The returned session owns its connection; release is guaranteed on
    /// every exit path, including failure, when the session is dropped.
    /// Sessions must not be shared across concurrent insert workers.
    async fn session(&self) -> Result<Box<dyn ClientSession>>;

    /// Optional pre-load hook. Safe to call before insert; no-op by default.
    async fn ready_to_load(&self) -> Result<()> {
        Ok(())
    }

    /// Block until server-side index materialization completes.
    ///
    /// Backends that build indexes asynchronously poll their build status
    /// here, emitting each non-ready observation to `observer`; backends
    /// that index synchronously return immediately.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::Timeout`](crate::BenchError::Timeout) if
    /// `deadline` expires before the backend reports ready. Poll failures
    /// propagate as fatal rather than being retried.
    async fn optimize(&self, deadline: Option<Duration>, observer: &dyn BenchObserver)
    -> Result<()>;
}

/// A live connection scoped to one benchmark phase.
///
/// Insert workers each own one session; search reuses a single session
/// sequentially.
#[async_trait]
pub trait ClientSession: Send {
    /// Insert one sub-batch of records.
    ///
    /// Returns the number of records committed. Duplicate ids are a fatal
    /// insert error, never silent success.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::Insert`](crate::BenchError::Insert) carrying
    /// the count committed before the failure within this call.
    async fn insert(&mut self, batch: RecordBatch<'_>) -> Result<usize>;

    /// Execute one nearest-neighbor query.
    ///
    /// Returns at most `k` record ids in backend order (nearest-first
    /// assumed but not verified by this layer). Exactly one backend call
    /// per logical query; no client-side re-ranking.
    async fn search(
        &mut self,
        query: &[f32],
        k: usize,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<i64>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_cover_batch_exactly() {
        let ids: Vec<i64> = (0..10).collect();
        let vectors: Vec<Vec<f32>> = (0..10).map(|i| vec![i as f32]).collect();
        let batch = RecordBatch::new(&ids, &vectors);

        let chunks: Vec<_> = batch.chunks(4).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.iter().map(RecordBatch::len).sum::<usize>(), 10);
        assert_eq!(chunks[0].ids, &[0, 1, 2, 3]);
        assert_eq!(chunks[2].ids, &[8, 9]);
    }
}
