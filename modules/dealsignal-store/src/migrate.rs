use sqlx::SqlitePool;
use tracing::info;

use dealsignal_common::error::Result;

/// Forward-only migrations. Version N applies exactly once; the applied
/// version set is recorded in schema_migrations.
const MIGRATIONS: &[(i64, &str)] = &[
    (
        1,
        r#"
        CREATE TABLE IF NOT EXISTS signals (
            id                   INTEGER PRIMARY KEY AUTOINCREMENT,
            signal_type          TEXT    NOT NULL,
            source_api           TEXT    NOT NULL,
            canonical_key        TEXT    NOT NULL,
            company_name         TEXT,
            confidence           REAL    NOT NULL,
            raw_data             TEXT    NOT NULL DEFAULT '{}',
            detected_at          TEXT    NOT NULL,
            created_at           TEXT    NOT NULL,
            source_url           TEXT,
            source_response_hash TEXT,
            UNIQUE (canonical_key, signal_type, source_api, detected_at)
        );

        CREATE INDEX IF NOT EXISTS idx_signals_canonical_key
            ON signals (canonical_key);

        CREATE TABLE IF NOT EXISTS processing_records (
            signal_id     INTEGER PRIMARY KEY REFERENCES signals(id),
            status        TEXT    NOT NULL DEFAULT 'pending',
            crm_page_id   TEXT,
            processed_at  TEXT,
            error_message TEXT,
            metadata      TEXT    NOT NULL DEFAULT '{}'
        );

        CREATE INDEX IF NOT EXISTS idx_processing_status
            ON processing_records (status);
        "#,
    ),
    (
        2,
        r#"
        CREATE TABLE IF NOT EXISTS suppression_cache (
            canonical_key TEXT PRIMARY KEY,
            crm_page_id   TEXT NOT NULL,
            status        TEXT NOT NULL,
            company_name  TEXT,
            cached_at     TEXT NOT NULL,
            expires_at    TEXT NOT NULL,
            metadata      TEXT NOT NULL DEFAULT '{}'
        );

        CREATE INDEX IF NOT EXISTS idx_suppression_expires
            ON suppression_cache (expires_at);
        "#,
    ),
];

/// Apply pending migrations forward. Safe to call on every open.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT    NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let current: Option<i64> =
        sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
            .fetch_one(pool)
            .await?;
    let current = current.unwrap_or(0);

    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        let mut tx = pool.begin().await?;
        // SQLite runs one statement per execute; split on the blank-line
        // separator-free statements by ';'.
        for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)")
            .bind(version)
            .bind(chrono::Utc::now())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!(version, "Applied schema migration");
    }

    Ok(())
}

/// The highest applied schema version.
pub async fn current_version(pool: &SqlitePool) -> Result<i64> {
    let version: Option<i64> =
        sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
            .fetch_one(pool)
            .await?;
    Ok(version.unwrap_or(0))
}
