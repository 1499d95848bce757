//! TiDB Serverless vector store driver.
//!
//! Provides [`TidbClient`], which implements [`VectorClient`] over the
//! MySQL wire protocol using [sqlx](https://docs.rs/sqlx). Vectors live in
//! a `VECTOR(dim)` column whose HNSW index is declared through a column
//! comment; the index is materialized asynchronously on TiFlash replicas,
//! so `optimize` polls replica progress, compacts, and then waits for the
//! pending-unindexed-row count to drain.
//!
//! # Example
//!
//! ```rust,ignore
//! use vbench_client::tidb::TidbClient;
//!
//! let params = ConnectionParams::new()
//!     .set("host", "gateway01.tidbcloud.com")
//!     .set("password", "...")
//!     .set("database", "test");
//! let client = TidbClient::configure(&params, &schema)?;
//! ```

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::Row;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlSslMode};
use sqlx::pool::PoolConnection;
use tracing::{debug, info};

use crate::client::{ClientSession, RecordBatch, VectorClient};
use crate::config::{CollectionSchema, ConnectionParams, MetricType, SearchFilters};
use crate::error::{BenchError, Result};
use crate::observe::BenchObserver;
use crate::ready::{PollOptions, ReadyState, ReadyStatus, poll_until_ready};

const BACKEND: &str = "tidb";

/// TiDB's name for the metric in the HNSW index declaration.
fn distance_name(metric: MetricType) -> &'static str {
    match metric {
        MetricType::L2 => "l2",
        // TiDB Serverless indexes inner product as cosine.
        MetricType::InnerProduct | MetricType::Cosine => "cosine",
    }
}

/// The distance function invoked at search time.
fn distance_func(metric: MetricType) -> &'static str {
    match metric {
        MetricType::L2 => "vec_l2_distance",
        MetricType::InnerProduct | MetricType::Cosine => "vec_cosine_distance",
    }
}

/// Render a vector as the string literal TiDB's VECTOR type accepts.
fn vector_literal(vector: &[f32]) -> String {
    let mut out = String::with_capacity(vector.len() * 8 + 2);
    out.push('[');
    for (i, value) in vector.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{value}");
    }
    out.push(']');
    out
}

fn connection_err(e: sqlx::Error) -> BenchError {
    BenchError::Connection { backend: BACKEND, message: e.to_string() }
}

fn schema_err(e: sqlx::Error) -> BenchError {
    BenchError::Schema { backend: BACKEND, message: e.to_string() }
}

/// A [`VectorClient`] backed by TiDB Serverless.
///
/// The connection pool is created lazily; `configure` performs no network
/// I/O. Each session holds its own pooled connection, released back to the
/// pool on drop.
pub struct TidbClient {
    pool: MySqlPool,
    schema: CollectionSchema,
    table: String,
    database: String,
}

impl TidbClient {
    /// Validate connection parameters and bind the target schema.
    ///
    /// Recognized parameters: `host` (default `127.0.0.1`), `port`
    /// (default 4000), `user` (default `root`), `password` (required),
    /// `database` (default `test`), `ssl` (default `false`), `pool_size`
    /// (default 16).
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::Config`] on missing or malformed parameters.
    pub fn configure(params: &ConnectionParams, schema: &CollectionSchema) -> Result<Self> {
        let host = params.get("host").unwrap_or("127.0.0.1").to_string();
        let port = params.parse_or("port", 4000u16)?;
        let user = params.get("user").unwrap_or("root").to_string();
        let password = params.require("password")?.to_string();
        let database = params.get("database").unwrap_or("test").to_string();
        let ssl = params.parse_or("ssl", false)?;
        let pool_size = params.parse_or("pool_size", 16u32)?;

        let options = MySqlConnectOptions::new()
            .host(&host)
            .port(port)
            .username(&user)
            .password(&password)
            .database(&database)
            .ssl_mode(if ssl { MySqlSslMode::VerifyIdentity } else { MySqlSslMode::Preferred });

        let pool = MySqlPoolOptions::new().max_connections(pool_size).connect_lazy_with(options);

        Ok(Self {
            pool,
            table: sanitize_table_name(&schema.name)?,
            schema: schema.clone(),
            database,
        })
    }
}

/// Restrict the table name to alphanumerics and underscores.
fn sanitize_table_name(name: &str) -> Result<String> {
    let sanitized: String =
        name.chars().map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' }).collect();
    if sanitized.is_empty() {
        return Err(BenchError::Config("collection name is empty after sanitization".to_string()));
    }
    Ok(sanitized)
}

#[async_trait]
impl VectorClient for TidbClient {
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

        let drop_sql = format!("DROP TABLE IF EXISTS {}", self.table);
        sqlx::query(&drop_sql).execute(&self.pool).await.map_err(schema_err)?;

        let create_sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
                id BIGINT PRIMARY KEY, \
                embedding VECTOR({}) COMMENT \"hnsw(distance={})\"\
            )",
            self.table,
            self.schema.dimensions,
            distance_name(self.schema.index.metric),
        );
        sqlx::query(&create_sql).execute(&self.pool).await.map_err(schema_err)?;

        debug!(
            table = %self.table,
            dimensions = self.schema.dimensions,
            metric = distance_name(self.schema.index.metric),
            "created tidb table"
        );
        Ok(())
    }

    async fn session(&self) -> Result<Box<dyn ClientSession>> {
        let conn = self.pool.acquire().await.map_err(connection_err)?;
        Ok(Box::new(TidbSession {
            conn,
            table: self.table.clone(),
            metric_func: distance_func(self.schema.index.metric),
        }))
    }

    async fn optimize(
        &self,
        deadline: Option<Duration>,
        observer: &dyn BenchObserver,
    ) -> Result<()> {
        let started = Instant::now();
        let options = PollOptions::with_deadline(deadline);

        // TiFlash replicas must catch up before the index build can finish.
        let pool = self.pool.clone();
        let database = self.database.clone();
        let table = self.table.clone();
        let replica_probe = move || {
            let pool = pool.clone();
            let database = database.clone();
            let table = table.clone();
            async move {
                let row = sqlx::query(
                    "SELECT PROGRESS FROM information_schema.tiflash_replica \
                     WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?",
                )
                .bind(&database)
                .bind(&table)
                .fetch_optional(&pool)
                .await
                .map_err(connection_err)?;

                let progress = match row {
                    Some(row) => row.try_get::<f64, _>(0).map_err(connection_err)?,
                    None => 0.0,
                };
                if progress >= 1.0 {
                    Ok(ReadyStatus::ready())
                } else {
                    let lag = ((1.0 - progress) * 100.0).ceil() as u64;
                    Ok(ReadyStatus::busy(ReadyState::Replicating, lag))
                }
            }
        };
        poll_until_ready(replica_probe, options, observer).await?;

        info!(table = %self.table, "replica ready, compacting tiflash");
        let compact_sql = format!("ALTER TABLE {} COMPACT", self.table);
        sqlx::query(&compact_sql).execute(&self.pool).await.map_err(connection_err)?;

        // The HNSW index builds in the background; wait for the pending
        // unindexed rows to drain.
        let pool = self.pool.clone();
        let database = self.database.clone();
        let table = self.table.clone();
        let index_probe = move || {
            let pool = pool.clone();
            let database = database.clone();
            let table = table.clone();
            async move {
                let row = sqlx::query(
                    "SELECT MAX(ROWS_STABLE_NOT_INDEXED) FROM information_schema.tiflash_indexes \
                     WHERE TIDB_DATABASE = ? AND TIDB_TABLE = ?",
                )
                .bind(&database)
                .bind(&table)
                .fetch_one(&pool)
                .await
                .map_err(connection_err)?;

                let pending = row.try_get::<Option<i64>, _>(0).map_err(connection_err)?;
                match pending.unwrap_or(0) {
                    rows if rows > 0 => {
                        Ok(ReadyStatus::busy(ReadyState::IndexBuilding, rows as u64))
                    }
                    _ => Ok(ReadyStatus::ready()),
                }
            }
        };
        // A timeout here reports the full optimize wait, not just the wait
        // of this second loop.
        let report =
            poll_until_ready(index_probe, options.remaining_after(started.elapsed()), observer)
                .await
                .map_err(|e| e.timeout_since(started))?;

        let elapsed = started.elapsed();
        info!(table = %self.table, polls = report.polls, ?elapsed, "tidb index ready");
        Ok(())
    }
}

struct TidbSession {
    conn: PoolConnection<sqlx::MySql>,
    table: String,
    metric_func: &'static str,
}

#[async_trait]
impl ClientSession for TidbSession {
    async fn insert(&mut self, batch: RecordBatch<'_>) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        // One multi-row statement per sub-batch; the orchestrator keeps
        // sub-batches small enough for the payload limit.
        let mut sql = format!("INSERT INTO {} (id, embedding) VALUES ", self.table);
        for (i, (id, vector)) in batch.ids.iter().zip(batch.vectors).enumerate() {
            if i > 0 {
                sql.push(',');
            }
            let _ = write!(sql, "({id}, \"{}\")", vector_literal(vector));
        }

        // The statement is a single transaction: a failure (including a
        // duplicate key) commits none of this sub-batch's records.
        sqlx::query(&sql).execute(&mut *self.conn).await.map_err(|e| BenchError::Insert {
            backend: BACKEND,
            inserted: 0,
            message: e.to_string(),
        })?;
        Ok(batch.len())
    }

    async fn search(
        &mut self,
        query: &[f32],
        k: usize,
        _filters: Option<&SearchFilters>,
    ) -> Result<Vec<i64>> {
        let sql = format!(
            "SELECT id FROM {} ORDER BY {}(embedding, \"{}\") LIMIT {}",
            self.table,
            self.metric_func,
            vector_literal(query),
            k,
        );
        let rows = sqlx::query(&sql).fetch_all(&mut *self.conn).await.map_err(|e| {
            BenchError::Search { backend: BACKEND, message: e.to_string() }
        })?;

        rows.iter()
            .map(|row| {
                row.try_get::<i64, _>(0)
                    .map_err(|e| BenchError::Search { backend: BACKEND, message: e.to_string() })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_resolution_matches_backend_vocabulary() {
        assert_eq!(distance_name(MetricType::L2), "l2");
        assert_eq!(distance_name(MetricType::Cosine), "cosine");
        assert_eq!(distance_func(MetricType::L2), "vec_l2_distance");
        assert_eq!(distance_func(MetricType::InnerProduct), "vec_cosine_distance");
    }

    #[test]
    fn vector_literal_is_bracketed_and_comma_separated() {
        assert_eq!(vector_literal(&[1.0, -0.5, 2.25]), "[1,-0.5,2.25]");
        assert_eq!(vector_literal(&[]), "[]");
    }

    #[test]
    fn configure_requires_password() {
        let schema = CollectionSchema::new("bench", 4).unwrap();
        let err = TidbClient::configure(&ConnectionParams::new(), &schema).unwrap_err();
        assert!(matches!(err, BenchError::Config(_)));
    }
}
