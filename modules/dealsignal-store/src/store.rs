use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use dealsignal_common::error::{PipelineError, Result};
use dealsignal_common::{
    NewSignal, ProcessingRecord, ProcessingStatus, Signal, SignalType, SuppressionEntry,
};

use crate::migrate;

/// The single shared mutable resource of the pipeline. One writer at a
/// time; readers are concurrent. All multi-step mutations are transactional.
#[derive(Clone)]
pub struct SignalStore {
    pool: SqlitePool,
}

impl SignalStore {
    /// Open (or create) the database file and apply migrations forward.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        migrate::migrate(&pool).await?;
        info!(path = %path.as_ref().display(), "Signal store opened");

        Ok(Self { pool })
    }

    /// Begin a scoped transaction. Commit explicitly; drop rolls back.
    pub async fn begin(&self) -> Result<sqlx::Transaction<'static, sqlx::Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Cheap connectivity probe for health checks.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // --- Signal ingestion ---

    /// Idempotent insert. Returns `(signal_id, is_new)`; a duplicate of
    /// `(canonical_key, signal_type, source_api, detected_at)` returns the
    /// existing row's id with `is_new = false` and writes nothing.
    ///
    /// The signal and its Pending processing record are created in one
    /// transaction; there is never a signal without a record.
    pub async fn save_signal(&self, signal: &NewSignal) -> Result<(i64, bool)> {
        let raw_data = fold_warning_flags(signal);
        let created_at = Utc::now();

        let mut tx = self.pool.begin().await?;

        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO signals
                (signal_type, source_api, canonical_key, company_name, confidence,
                 raw_data, detected_at, created_at, source_url, source_response_hash)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT (canonical_key, signal_type, source_api, detected_at) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(signal.signal_type.to_string())
        .bind(&signal.source_api)
        .bind(&signal.canonical_key)
        .bind(&signal.company_name)
        .bind(signal.confidence)
        .bind(&raw_data)
        .bind(signal.detected_at)
        .bind(created_at)
        .bind(&signal.source_url)
        .bind(&signal.source_response_hash)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(id) = inserted {
            sqlx::query(
                "INSERT INTO processing_records (signal_id, status, metadata) VALUES (?1, 'pending', '{}')",
            )
            .bind(id)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            debug!(signal_id = id, canonical_key = %signal.canonical_key, "Signal saved");
            return Ok((id, true));
        }

        // Duplicate: nothing was written, fetch the existing id.
        drop(tx);
        let existing: i64 = sqlx::query_scalar(
            r#"
            SELECT id FROM signals
            WHERE canonical_key = ?1 AND signal_type = ?2 AND source_api = ?3 AND detected_at = ?4
            "#,
        )
        .bind(&signal.canonical_key)
        .bind(signal.signal_type.to_string())
        .bind(&signal.source_api)
        .bind(signal.detected_at)
        .fetch_one(&self.pool)
        .await?;

        Ok((existing, false))
    }

    /// Whether any signal exists for this canonical key.
    pub async fn is_duplicate(&self, canonical_key: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM signals WHERE canonical_key = ?1)")
                .bind(canonical_key)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    // --- Signal reads ---

    pub async fn get_signal(&self, id: i64) -> Result<Signal> {
        let row = sqlx::query(&format!("{SIGNAL_SELECT} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => signal_from_row(&row),
            None => Err(PipelineError::NotFound(format!("signal {id}"))),
        }
    }

    /// Signals still awaiting a push/reject decision, oldest first.
    pub async fn get_pending_signals(
        &self,
        limit: Option<i64>,
        signal_type: Option<SignalType>,
    ) -> Result<Vec<Signal>> {
        let rows = match signal_type {
            Some(t) => {
                sqlx::query(&format!(
                    r#"{SIGNAL_SELECT}
                    JOIN processing_records p ON p.signal_id = signals.id
                    WHERE p.status = 'pending' AND signals.signal_type = ?1
                    ORDER BY signals.detected_at ASC
                    LIMIT ?2"#
                ))
                .bind(t.to_string())
                .bind(limit.unwrap_or(-1))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    r#"{SIGNAL_SELECT}
                    JOIN processing_records p ON p.signal_id = signals.id
                    WHERE p.status = 'pending'
                    ORDER BY signals.detected_at ASC
                    LIMIT ?1"#
                ))
                .bind(limit.unwrap_or(-1))
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(signal_from_row).collect()
    }

    /// Every signal for one canonical key, by detected_at ascending.
    pub async fn get_signals_for_company(&self, canonical_key: &str) -> Result<Vec<Signal>> {
        let rows = sqlx::query(&format!(
            "{SIGNAL_SELECT} WHERE canonical_key = ?1 ORDER BY detected_at ASC"
        ))
        .bind(canonical_key)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(signal_from_row).collect()
    }

    pub async fn get_processing_record(&self, signal_id: i64) -> Result<ProcessingRecord> {
        let row = sqlx::query(
            r#"
            SELECT signal_id, status, crm_page_id, processed_at, error_message, metadata
            FROM processing_records WHERE signal_id = ?1
            "#,
        )
        .bind(signal_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => processing_from_row(&row),
            None => Err(PipelineError::NotFound(format!(
                "processing record for signal {signal_id}"
            ))),
        }
    }

    // --- Processing transitions ---

    /// Pending -> Pushed. Any other starting state is an invalid transition.
    pub async fn mark_pushed(
        &self,
        signal_id: i64,
        crm_page_id: &str,
        metadata: serde_json::Value,
    ) -> Result<()> {
        self.transition(
            signal_id,
            ProcessingStatus::Pushed,
            Some(crm_page_id),
            None,
            metadata,
        )
        .await
    }

    /// Pending -> Rejected, with the reason recorded.
    pub async fn mark_rejected(
        &self,
        signal_id: i64,
        reason: &str,
        metadata: serde_json::Value,
    ) -> Result<()> {
        self.transition(signal_id, ProcessingStatus::Rejected, None, Some(reason), metadata)
            .await
    }

    async fn transition(
        &self,
        signal_id: i64,
        to: ProcessingStatus,
        crm_page_id: Option<&str>,
        error_message: Option<&str>,
        metadata: serde_json::Value,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE processing_records
            SET status = ?2, crm_page_id = ?3, processed_at = ?4,
                error_message = ?5, metadata = ?6
            WHERE signal_id = ?1 AND status = 'pending'
            "#,
        )
        .bind(signal_id)
        .bind(to.to_string())
        .bind(crm_page_id)
        .bind(Utc::now())
        .bind(error_message)
        .bind(&metadata)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM processing_records WHERE signal_id = ?1")
                .bind(signal_id)
                .fetch_optional(&self.pool)
                .await?;
        match current {
            None => Err(PipelineError::NotFound(format!(
                "processing record for signal {signal_id}"
            ))),
            Some(from) => Err(PipelineError::InvalidTransition {
                signal_id,
                from,
                to: to.to_string(),
            }),
        }
    }

    // --- Suppression cache ---

    /// Upsert a batch atomically. A refreshed key updates in place.
    pub async fn update_suppression_cache(&self, entries: &[SuppressionEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO suppression_cache
                    (canonical_key, crm_page_id, status, company_name, cached_at, expires_at, metadata)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT (canonical_key) DO UPDATE SET
                    crm_page_id = excluded.crm_page_id,
                    status = excluded.status,
                    company_name = excluded.company_name,
                    cached_at = excluded.cached_at,
                    expires_at = excluded.expires_at,
                    metadata = excluded.metadata
                "#,
            )
            .bind(&entry.canonical_key)
            .bind(&entry.crm_page_id)
            .bind(&entry.status)
            .bind(&entry.company_name)
            .bind(entry.cached_at)
            .bind(entry.expires_at)
            .bind(&entry.metadata)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// The entry for this key, if present and not yet expired.
    pub async fn check_suppression(&self, canonical_key: &str) -> Result<Option<SuppressionEntry>> {
        let row = sqlx::query(
            r#"
            SELECT canonical_key, crm_page_id, status, company_name, cached_at, expires_at, metadata
            FROM suppression_cache
            WHERE canonical_key = ?1 AND expires_at > ?2
            "#,
        )
        .bind(canonical_key)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(suppression_from_row).transpose()
    }

    /// Drop expired entries. Returns how many were removed.
    pub async fn clean_expired_cache(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM suppression_cache WHERE expires_at <= ?1")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // --- Stats ---

    pub async fn get_stats(&self) -> Result<StoreStats> {
        let by_type_rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT signal_type, COUNT(*) FROM signals GROUP BY signal_type")
                .fetch_all(&self.pool)
                .await?;
        let by_status_rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM processing_records GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        let total_signals: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM signals")
            .fetch_one(&self.pool)
            .await?;
        let active_suppression: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM suppression_cache WHERE expires_at > ?1",
        )
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        let schema_version = migrate::current_version(&self.pool).await?;

        Ok(StoreStats {
            total_signals,
            signals_by_type: by_type_rows.into_iter().collect(),
            signals_by_status: by_status_rows.into_iter().collect(),
            active_suppression_entries: active_suppression,
            schema_version,
        })
    }
}

// --- Row mapping ---

const SIGNAL_SELECT: &str = r#"
    SELECT signals.id, signals.signal_type, signals.source_api, signals.canonical_key,
           signals.company_name, signals.confidence, signals.raw_data,
           signals.detected_at, signals.created_at, signals.source_url,
           signals.source_response_hash
    FROM signals
"#;

fn signal_from_row(row: &SqliteRow) -> Result<Signal> {
    let type_str: String = row.try_get("signal_type")?;
    let signal_type = SignalType::from_str(&type_str)
        .map_err(|e| PipelineError::Permanent(format!("corrupt signal row: {e}")))?;
    Ok(Signal {
        id: row.try_get("id")?,
        signal_type,
        source_api: row.try_get("source_api")?,
        canonical_key: row.try_get("canonical_key")?,
        company_name: row.try_get("company_name")?,
        confidence: row.try_get("confidence")?,
        raw_data: row.try_get("raw_data")?,
        detected_at: row.try_get("detected_at")?,
        created_at: row.try_get("created_at")?,
        source_url: row.try_get("source_url")?,
        source_response_hash: row.try_get("source_response_hash")?,
    })
}

fn processing_from_row(row: &SqliteRow) -> Result<ProcessingRecord> {
    let status_str: String = row.try_get("status")?;
    let status = ProcessingStatus::from_str(&status_str)
        .map_err(|e| PipelineError::Permanent(format!("corrupt processing row: {e}")))?;
    Ok(ProcessingRecord {
        signal_id: row.try_get("signal_id")?,
        status,
        crm_page_id: row.try_get("crm_page_id")?,
        processed_at: row.try_get("processed_at")?,
        error_message: row.try_get("error_message")?,
        metadata: row.try_get("metadata")?,
    })
}

fn suppression_from_row(row: &SqliteRow) -> Result<SuppressionEntry> {
    Ok(SuppressionEntry {
        canonical_key: row.try_get("canonical_key")?,
        crm_page_id: row.try_get("crm_page_id")?,
        status: row.try_get("status")?,
        company_name: row.try_get("company_name")?,
        cached_at: row.try_get("cached_at")?,
        expires_at: row.try_get("expires_at")?,
        metadata: row.try_get("metadata")?,
    })
}

/// Collector-provided caution flags ride along inside raw_data so the gate
/// can read them back without a schema change.
fn fold_warning_flags(signal: &NewSignal) -> serde_json::Value {
    if signal.warning_flags.is_empty() {
        return signal.raw_data.clone();
    }
    let mut map = match &signal.raw_data {
        serde_json::Value::Object(map) => map.clone(),
        serde_json::Value::Null => serde_json::Map::new(),
        other => {
            let mut map = serde_json::Map::new();
            map.insert("value".to_string(), other.clone());
            map
        }
    };
    map.insert(
        "warning_flags".to_string(),
        serde_json::Value::Array(
            signal
                .warning_flags
                .iter()
                .map(|f| serde_json::Value::String(f.clone()))
                .collect(),
        ),
    );
    serde_json::Value::Object(map)
}

// --- Stats ---

#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreStats {
    pub total_signals: i64,
    pub signals_by_type: BTreeMap<String, i64>,
    pub signals_by_status: BTreeMap<String, i64>,
    pub active_suppression_entries: i64,
    pub schema_version: i64,
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Signal Store ===")?;
        writeln!(f, "Schema version:     {}", self.schema_version)?;
        writeln!(f, "Total signals:      {}", self.total_signals)?;
        writeln!(f, "\nBy type:")?;
        for (signal_type, count) in &self.signals_by_type {
            writeln!(f, "  {signal_type}: {count}")?;
        }
        writeln!(f, "\nBy processing status:")?;
        for (status, count) in &self.signals_by_status {
            writeln!(f, "  {status}: {count}")?;
        }
        writeln!(f, "\nActive suppression: {}", self.active_suppression_entries)?;
        Ok(())
    }
}
