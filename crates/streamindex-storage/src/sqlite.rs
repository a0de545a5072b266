//! SQLite storage backend for StreamIndex.
//!
//! Persists the `creators` and `streams` aggregate tables, one immutable
//! table per event kind, the anomaly log and checkpoints to a single SQLite
//! file. Uses `sqlx` with WAL mode for concurrent read performance.
//!
//! Amounts (`uint256`) are stored as decimal TEXT, addresses and hashes as
//! lowercase `0x` hex.
//!
//! # Usage
//! ```rust,no_run
//! use streamindex_storage::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStore::open("./streams.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::str::FromStr;
use tracing::debug;

use streamindex_core::checkpoint::{Checkpoint, CheckpointStore};
use streamindex_core::entity::{AnomalyRecord, Creator, EventRecord, Stream};
use streamindex_core::error::IndexerError;
use streamindex_core::event::EventKind;
use streamindex_core::store::{AggregateStore, Commit, ReadStore};
use streamindex_core::types::{EventId, EventMeta};

fn db_err(e: sqlx::Error) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

fn parse_u256(s: &str) -> Result<U256, IndexerError> {
    U256::from_str(s).map_err(|e| IndexerError::Storage(format!("bad uint256 '{s}': {e}")))
}

fn parse_address(s: &str) -> Result<Address, IndexerError> {
    Address::from_str(s).map_err(|e| IndexerError::Storage(format!("bad address '{s}': {e}")))
}

fn parse_b256(s: &str) -> Result<B256, IndexerError> {
    B256::from_str(s).map_err(|e| IndexerError::Storage(format!("bad hash '{s}': {e}")))
}

fn opt_u256(s: Option<String>) -> Result<Option<U256>, IndexerError> {
    s.as_deref().map(parse_u256).transpose()
}

fn addr_text(a: &Address) -> String {
    format!("{a:#x}")
}

/// SQLite-backed storage for aggregates, records, anomalies and checkpoints.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./streams.db"`) or a full
    /// SQLite URL (`"sqlite:./streams.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(db_err)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Pinned to a single connection, since every `:memory:` connection is
    /// its own database. All data is lost when the pool is dropped.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), IndexerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS creators (
                address             TEXT    PRIMARY KEY,
                total_earned        TEXT    NOT NULL,
                active_stream_count INTEGER NOT NULL,
                total_stream_count  INTEGER NOT NULL,
                unique_viewers      TEXT    NOT NULL,
                total_viewers_count INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS streams (
                stream_id            TEXT    PRIMARY KEY,
                payer                TEXT    NOT NULL,
                receiver             TEXT    NOT NULL,
                rate_per_second      TEXT    NOT NULL,
                rate_per_minute      TEXT    NOT NULL,
                deposit              TEXT    NOT NULL,
                start_time           TEXT    NOT NULL,
                is_active            INTEGER NOT NULL,
                end_time             INTEGER,
                duration             TEXT,
                total_paid           TEXT,
                refunded             TEXT,
                created_at_block     INTEGER NOT NULL,
                created_at_timestamp INTEGER NOT NULL,
                stopped_at_block     INTEGER,
                stopped_at_timestamp INTEGER
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_streams_receiver ON streams (receiver);")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        // One immutable table per event kind.
        for kind in EventKind::ALL {
            let table = kind.table_name();
            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id              TEXT    PRIMARY KEY,
                    block_number    INTEGER NOT NULL,
                    block_timestamp INTEGER NOT NULL,
                    tx_hash         TEXT    NOT NULL,
                    log_index       INTEGER NOT NULL,
                    stream_id       TEXT,
                    creator         TEXT,
                    params_json     TEXT    NOT NULL,
                    event_json      TEXT    NOT NULL
                );"
            ))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        }

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS anomalies (
                seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id        TEXT    NOT NULL,
                block_number    INTEGER NOT NULL,
                block_timestamp INTEGER NOT NULL,
                tx_hash         TEXT    NOT NULL,
                log_index       INTEGER NOT NULL,
                anomaly_json    TEXT    NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                chain_id     TEXT    NOT NULL,
                indexer_id   TEXT    NOT NULL,
                block_number INTEGER NOT NULL,
                updated_at   INTEGER NOT NULL,
                PRIMARY KEY (chain_id, indexer_id)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    /// Total number of immutable records across all event tables.
    pub async fn total_record_count(&self) -> Result<u64, IndexerError> {
        let mut total = 0u64;
        for kind in EventKind::ALL {
            let row = sqlx::query(&format!("SELECT COUNT(*) AS cnt FROM {}", kind.table_name()))
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
            total += row.get::<i64, _>("cnt") as u64;
        }
        Ok(total)
    }
}

fn creator_from_row(r: &SqliteRow) -> Result<Creator, IndexerError> {
    let viewers: Vec<Address> = serde_json::from_str(&r.get::<String, _>("unique_viewers"))?;
    Ok(Creator {
        address: parse_address(&r.get::<String, _>("address"))?,
        total_earned: parse_u256(&r.get::<String, _>("total_earned"))?,
        active_stream_count: r.get::<i64, _>("active_stream_count") as u64,
        total_stream_count: r.get::<i64, _>("total_stream_count") as u64,
        total_viewers_count: r.get::<i64, _>("total_viewers_count") as u64,
        unique_viewers: viewers,
    })
}

fn stream_from_row(r: &SqliteRow) -> Result<Stream, IndexerError> {
    Ok(Stream {
        stream_id: parse_u256(&r.get::<String, _>("stream_id"))?,
        payer: parse_address(&r.get::<String, _>("payer"))?,
        receiver: parse_address(&r.get::<String, _>("receiver"))?,
        rate_per_second: parse_u256(&r.get::<String, _>("rate_per_second"))?,
        rate_per_minute: parse_u256(&r.get::<String, _>("rate_per_minute"))?,
        deposit: parse_u256(&r.get::<String, _>("deposit"))?,
        start_time: parse_u256(&r.get::<String, _>("start_time"))?,
        is_active: r.get::<i64, _>("is_active") != 0,
        end_time: r.get::<Option<i64>, _>("end_time").map(|v| v as u64),
        duration: opt_u256(r.get("duration"))?,
        total_paid: opt_u256(r.get("total_paid"))?,
        refunded: opt_u256(r.get("refunded"))?,
        created_at_block: r.get::<i64, _>("created_at_block") as u64,
        created_at_timestamp: r.get::<i64, _>("created_at_timestamp") as u64,
        stopped_at_block: r.get::<Option<i64>, _>("stopped_at_block").map(|v| v as u64),
        stopped_at_timestamp: r.get::<Option<i64>, _>("stopped_at_timestamp").map(|v| v as u64),
    })
}

fn meta_from_row(r: &SqliteRow) -> Result<EventMeta, IndexerError> {
    Ok(EventMeta {
        block_number: r.get::<i64, _>("block_number") as u64,
        block_timestamp: r.get::<i64, _>("block_timestamp") as u64,
        tx_hash: parse_b256(&r.get::<String, _>("tx_hash"))?,
        log_index: r.get::<i64, _>("log_index") as u32,
    })
}

// ─── Row writers ─────────────────────────────────────────────────────────────
//
// Shared by the single-row methods and by `commit`, which runs them inside
// one transaction.

async fn upsert_creator(conn: &mut SqliteConnection, creator: &Creator) -> Result<(), IndexerError> {
    let viewers = serde_json::to_string(&creator.unique_viewers)?;
    sqlx::query(
        "INSERT OR REPLACE INTO creators
         (address, total_earned, active_stream_count, total_stream_count,
          unique_viewers, total_viewers_count)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(addr_text(&creator.address))
    .bind(creator.total_earned.to_string())
    .bind(creator.active_stream_count as i64)
    .bind(creator.total_stream_count as i64)
    .bind(viewers)
    .bind(creator.total_viewers_count as i64)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;
    Ok(())
}

async fn upsert_stream(conn: &mut SqliteConnection, s: &Stream) -> Result<(), IndexerError> {
    sqlx::query(
        "INSERT OR REPLACE INTO streams
         (stream_id, payer, receiver, rate_per_second, rate_per_minute, deposit,
          start_time, is_active, end_time, duration, total_paid, refunded,
          created_at_block, created_at_timestamp, stopped_at_block, stopped_at_timestamp)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(s.stream_id.to_string())
    .bind(addr_text(&s.payer))
    .bind(addr_text(&s.receiver))
    .bind(s.rate_per_second.to_string())
    .bind(s.rate_per_minute.to_string())
    .bind(s.deposit.to_string())
    .bind(s.start_time.to_string())
    .bind(s.is_active as i64)
    .bind(s.end_time.map(|v| v as i64))
    .bind(s.duration.map(|v| v.to_string()))
    .bind(s.total_paid.map(|v| v.to_string()))
    .bind(s.refunded.map(|v| v.to_string()))
    .bind(s.created_at_block as i64)
    .bind(s.created_at_timestamp as i64)
    .bind(s.stopped_at_block.map(|v| v as i64))
    .bind(s.stopped_at_timestamp.map(|v| v as i64))
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;
    Ok(())
}

async fn upsert_record(conn: &mut SqliteConnection, record: &EventRecord) -> Result<(), IndexerError> {
    let kind = record
        .kind()
        .ok_or_else(|| IndexerError::Storage(format!("record {} has no kind", record.id)))?;
    let params = serde_json::to_string(&record.event.params_json())?;
    let event = serde_json::to_string(&record.event)?;

    sqlx::query(&format!(
        "INSERT OR REPLACE INTO {}
         (id, block_number, block_timestamp, tx_hash, log_index, stream_id, creator,
          params_json, event_json)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        kind.table_name()
    ))
    .bind(record.id.to_string())
    .bind(record.meta.block_number as i64)
    .bind(record.meta.block_timestamp as i64)
    .bind(record.meta.tx_hash.to_string())
    .bind(record.meta.log_index as i64)
    .bind(record.event.stream_id().map(|v| v.to_string()))
    .bind(record.event.creator().map(|a| addr_text(&a)))
    .bind(params)
    .bind(event)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    debug!(id = %record.id, table = kind.table_name(), "record stored");
    Ok(())
}

async fn insert_anomaly(conn: &mut SqliteConnection, anomaly: &AnomalyRecord) -> Result<(), IndexerError> {
    sqlx::query(
        "INSERT INTO anomalies
         (event_id, block_number, block_timestamp, tx_hash, log_index, anomaly_json)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(anomaly.event_id.to_string())
    .bind(anomaly.meta.block_number as i64)
    .bind(anomaly.meta.block_timestamp as i64)
    .bind(anomaly.meta.tx_hash.to_string())
    .bind(anomaly.meta.log_index as i64)
    .bind(serde_json::to_string(&anomaly.anomaly)?)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;
    Ok(())
}

// ─── AggregateStore impl ─────────────────────────────────────────────────────

#[async_trait]
impl AggregateStore for SqliteStore {
    async fn load_creator(&self, address: &Address) -> Result<Option<Creator>, IndexerError> {
        let row = sqlx::query("SELECT * FROM creators WHERE address = ?")
            .bind(addr_text(address))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(creator_from_row).transpose()
    }

    async fn save_creator(&self, creator: &Creator) -> Result<(), IndexerError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        upsert_creator(&mut *conn, creator).await
    }

    async fn load_stream(&self, stream_id: U256) -> Result<Option<Stream>, IndexerError> {
        let row = sqlx::query("SELECT * FROM streams WHERE stream_id = ?")
            .bind(stream_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(stream_from_row).transpose()
    }

    async fn commit(&self, commit: &Commit) -> Result<(), IndexerError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        if let Some(creator) = &commit.creator {
            upsert_creator(&mut *tx, creator).await?;
        }
        if let Some(stream) = &commit.stream {
            upsert_stream(&mut *tx, stream).await?;
        }
        upsert_record(&mut *tx, &commit.record).await?;
        if let Some(anomaly) = &commit.anomaly {
            insert_anomaly(&mut *tx, anomaly).await?;
        }

        // Dropping `tx` on any early return above rolls the whole commit back.
        tx.commit()
            .await
            .map_err(|e| IndexerError::Storage(format!("commit {}: {e}", commit.record.id)))?;
        Ok(())
    }
}

// ─── ReadStore impl ──────────────────────────────────────────────────────────

#[async_trait]
impl ReadStore for SqliteStore {
    async fn streams_by_receiver(&self, creator: &Address) -> Result<Vec<Stream>, IndexerError> {
        let rows = sqlx::query("SELECT * FROM streams WHERE receiver = ?")
            .bind(addr_text(creator))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(stream_from_row).collect()
    }

    async fn records_of_kind(&self, kind: EventKind) -> Result<Vec<EventRecord>, IndexerError> {
        let rows = sqlx::query(&format!(
            "SELECT block_number, block_timestamp, tx_hash, log_index, event_json
             FROM {} ORDER BY block_number, log_index",
            kind.table_name()
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let meta = meta_from_row(&row)?;
            out.push(EventRecord {
                id: meta.id(),
                meta,
                event: serde_json::from_str(&row.get::<String, _>("event_json"))?,
            });
        }
        Ok(out)
    }

    async fn anomalies(&self) -> Result<Vec<AnomalyRecord>, IndexerError> {
        let rows = sqlx::query(
            "SELECT block_number, block_timestamp, tx_hash, log_index, anomaly_json
             FROM anomalies ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let meta = meta_from_row(&row)?;
            out.push(AnomalyRecord {
                event_id: EventId::new(meta.tx_hash, meta.log_index),
                meta,
                anomaly: serde_json::from_str(&row.get::<String, _>("anomaly_json"))?,
            });
        }
        Ok(out)
    }
}

// ─── CheckpointStore impl ────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for SqliteStore {
    async fn load(
        &self,
        chain_id: &str,
        indexer_id: &str,
    ) -> Result<Option<Checkpoint>, IndexerError> {
        let row = sqlx::query(
            "SELECT chain_id, indexer_id, block_number, updated_at
             FROM checkpoints WHERE chain_id = ? AND indexer_id = ?",
        )
        .bind(chain_id)
        .bind(indexer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|r| Checkpoint {
            chain_id: r.get("chain_id"),
            indexer_id: r.get("indexer_id"),
            block_number: r.get::<i64, _>("block_number") as u64,
            updated_at: r.get("updated_at"),
        }))
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT OR REPLACE INTO checkpoints
             (chain_id, indexer_id, block_number, updated_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&checkpoint.chain_id)
        .bind(&checkpoint.indexer_id)
        .bind(checkpoint.block_number as i64)
        .bind(checkpoint.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        debug!(
            chain_id = %checkpoint.chain_id,
            indexer_id = %checkpoint.indexer_id,
            block = checkpoint.block_number,
            "checkpoint saved"
        );
        Ok(())
    }

    async fn delete(&self, chain_id: &str, indexer_id: &str) -> Result<(), IndexerError> {
        sqlx::query("DELETE FROM checkpoints WHERE chain_id = ? AND indexer_id = ?")
            .bind(chain_id)
            .bind(indexer_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
