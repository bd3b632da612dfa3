//! SQL migration definitions for the progress store.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: append-only progress_log",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per finished record attempt. Rows are never updated or deleted;
-- the highest seq per record_id is the current state.
CREATE TABLE IF NOT EXISTS progress_log (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id    TEXT NOT NULL,
    status       TEXT NOT NULL,
    outcome_json TEXT NOT NULL,
    attempts     INTEGER NOT NULL,
    recorded_at  TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Index progress_log by record",
            sql: r#"
CREATE INDEX IF NOT EXISTS idx_progress_record ON progress_log(record_id, seq);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
