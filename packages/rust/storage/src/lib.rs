//! libSQL-backed progress store (offline mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding an append-only log
//! of per-record enrichment outcomes. Replaying the log yields the
//! [`EnrichmentRunState`] a run resumes from.
//!
//! **Access rules:**
//! - Enrichment runs: read-write via [`Storage::open`]
//! - `leadscout summary` and inspection: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use leadscout_shared::{
    EnrichmentOutcome, EnrichmentRunState, LeadScoutError, PersonId, Result, RunEntry,
};
use libsql::{Connection, Database, params};
use tokio::sync::Mutex;

/// File name of the progress database inside an output directory.
pub const PROGRESS_DB_FILE: &str = "progress.db";

fn db_err(e: impl std::fmt::Display) -> LeadScoutError {
    LeadScoutError::Storage(e.to_string())
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    path: PathBuf,
    readonly: bool,
    /// Serializes appends so each insert commits before the next begins.
    write_lock: Mutex<()>,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LeadScoutError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            path: path.to_path_buf(),
            readonly: false,
            write_lock: Mutex::new(()),
        };
        storage.enable_wal().await?;
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LeadScoutError::Storage(format!(
                "no progress store at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        Ok(Self {
            db,
            conn,
            path: path.to_path_buf(),
            readonly: true,
            write_lock: Mutex::new(()),
        })
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn enable_wal(&self) -> Result<()> {
        // journal_mode returns the resulting mode as a row.
        let mut rows = self
            .conn
            .query("PRAGMA journal_mode=WAL", params![])
            .await
            .map_err(db_err)?;
        while rows.next().await.map_err(db_err)?.is_some() {}
        Ok(())
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    LeadScoutError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(LeadScoutError::Storage(
                "progress store is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Progress log
    // -----------------------------------------------------------------------

    /// Durably record a record's outcome. Returns once the insert has committed.
    pub async fn append(
        &self,
        id: &PersonId,
        outcome: &EnrichmentOutcome,
        attempts: u32,
    ) -> Result<RunEntry> {
        self.check_writable()?;

        let outcome_json = serde_json::to_string(outcome).map_err(db_err)?;
        let now = Utc::now();

        let _guard = self.write_lock.lock().await;
        self.conn
            .execute(
                "INSERT INTO progress_log (record_id, status, outcome_json, attempts, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.as_str(),
                    outcome.status.as_str(),
                    outcome_json.as_str(),
                    i64::from(attempts),
                    now.to_rfc3339(),
                ],
            )
            .await
            .map_err(db_err)?;

        tracing::debug!(
            record = %id,
            status = outcome.status.as_str(),
            attempts,
            "progress appended"
        );

        Ok(RunEntry {
            outcome: outcome.clone(),
            attempts,
            last_attempted_at: now,
        })
    }

    /// Replay the log in sequence order. The latest row per record wins.
    pub async fn load(&self) -> Result<EnrichmentRunState> {
        let mut rows = self
            .conn
            .query(
                "SELECT record_id, outcome_json, attempts, recorded_at
                 FROM progress_log ORDER BY seq",
                params![],
            )
            .await
            .map_err(db_err)?;

        let mut state = EnrichmentRunState::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let record_id: String = row.get(0).map_err(db_err)?;
            let outcome_json: String = row.get(1).map_err(db_err)?;
            let attempts: i64 = row.get(2).map_err(db_err)?;
            let recorded_at: String = row.get(3).map_err(db_err)?;

            let outcome: EnrichmentOutcome = serde_json::from_str(&outcome_json)
                .map_err(|e| {
                    LeadScoutError::Storage(format!("corrupt outcome for {record_id}: {e}"))
                })?;
            let last_attempted_at = DateTime::parse_from_rfc3339(&recorded_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| LeadScoutError::Storage(format!("invalid date: {e}")))?;

            state.insert(
                PersonId(record_id),
                RunEntry {
                    outcome,
                    attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
                    last_attempted_at,
                },
            );
        }

        tracing::debug!(records = state.len(), "progress loaded");
        Ok(state)
    }

    /// Force buffered log pages into the main database file.
    pub async fn flush(&self) -> Result<()> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;
        let mut rows = self
            .conn
            .query("PRAGMA wal_checkpoint(TRUNCATE)", params![])
            .await
            .map_err(db_err)?;
        while rows.next().await.map_err(db_err)?.is_some() {}
        Ok(())
    }

    /// Total rows in the log, superseded ones included.
    pub async fn entry_count(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM progress_log", params![])
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => {
                let n: i64 = row.get(0).map_err(db_err)?;
                Ok(n.max(0) as u64)
            }
            None => Ok(0),
        }
    }
}
