//! Database migrations for the memory record schema.

/// Migration definitions, applied in order.
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Initial memory record schema",
    up: MIGRATION_V1_UP,
}];

/// A single schema migration.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS memory_records (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    summary TEXT NOT NULL,
    content TEXT NOT NULL,
    content_normalized TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',

    embedding BLOB,

    created_at TEXT NOT NULL,
    last_accessed_at TEXT NOT NULL,
    access_count INTEGER NOT NULL DEFAULT 0,

    base_strength REAL NOT NULL DEFAULT 1.0,
    decay_rate REAL NOT NULL DEFAULT 0.1,
    importance REAL NOT NULL DEFAULT 0.5,
    is_pinned INTEGER NOT NULL DEFAULT 0,
    expires_at TEXT,

    is_archived INTEGER NOT NULL DEFAULT 0,
    superseded_by TEXT,
    superseded_ids TEXT NOT NULL DEFAULT '[]',

    valid_from TEXT NOT NULL,
    valid_until TEXT,

    linked_node_ids TEXT NOT NULL DEFAULT '[]'
);

CREATE INDEX IF NOT EXISTS idx_memory_current ON memory_records(is_archived, valid_until);
CREATE INDEX IF NOT EXISTS idx_memory_created_at ON memory_records(created_at);
CREATE INDEX IF NOT EXISTS idx_memory_valid_from ON memory_records(valid_from);
"#;

/// Apply all migrations not yet applied, tracked via `PRAGMA user_version`.
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    let mut applied = current_version;
    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }
        conn.execute_batch(migration.up)?;
        conn.pragma_update(None, "user_version", migration.version)?;
        applied = migration.version;
        tracing::info!(
            version = migration.version,
            description = migration.description,
            "applied migration"
        );
    }
    Ok(applied)
}
