//! SQLite-backed Memory Store.
//!
//! Uses separate reader/writer connections so every method takes `&self`
//! (not `&mut self`), making `Storage` `Send + Sync` and shareable as
//! `Arc<Storage>` across the scheduler's background tasks without an
//! outer `Mutex<Storage>`.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::record::MemoryRecord;
use crate::vector;

/// Snapshot statistics over the current record set (`stats()`).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total: u64,
    pub avg_strength: f64,
    pub weak_count: u64,
    pub db_size_bytes: u64,
    pub oldest_created_at: Option<DateTime<Utc>>,
    pub newest_created_at: Option<DateTime<Utc>>,
}

/// A persistent document store for memory records.
pub struct Storage {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    db_path: PathBuf,
}

impl Storage {
    fn configure_connection(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (or create) the store at `db_path`, or a platform-appropriate
    /// default location when `None`.
    pub fn new(db_path: Option<PathBuf>) -> StoreResult<Self> {
        let path = match db_path {
            Some(p) => p,
            None => {
                let proj_dirs = ProjectDirs::from("dev", "noema", "noema-core").ok_or_else(|| {
                    StoreError::Init("could not determine project directories".to_string())
                })?;
                let data_dir = proj_dirs.data_dir();
                std::fs::create_dir_all(data_dir)?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let perms = std::fs::Permissions::from_mode(0o700);
                    let _ = std::fs::set_permissions(data_dir, perms);
                }
                data_dir.join("noema.db")
            }
        };

        let writer_conn = Connection::open(&path)?;

        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&path, perms);
        }

        Self::configure_connection(&writer_conn)?;
        super::migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            db_path: path,
        })
    }

    /// In-memory store, for tests and benchmarks. Reader and writer share
    /// the same database via SQLite's shared-cache URI (`cache=shared`),
    /// so writes through one connection are visible to the other — unlike
    /// plain `:memory:`, which would give each connection its own
    /// isolated database.
    pub fn open_in_memory() -> StoreResult<Self> {
        use rusqlite::OpenFlags;

        let uri = format!("file:noema-{}?mode=memory&cache=shared", Uuid::new_v4());
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let writer_conn = Connection::open_with_flags(&uri, flags)?;
        Self::configure_connection(&writer_conn)?;
        super::migrations::apply_migrations(&writer_conn)?;
        let reader_conn = Connection::open_with_flags(&uri, flags)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            db_path: PathBuf::from(":memory:"),
        })
    }

    fn lock_writer(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StoreError::Init("writer lock poisoned".to_string()))
    }

    fn lock_reader(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StoreError::Init("reader lock poisoned".to_string()))
    }

    /// Upsert a record.
    pub fn save(&self, record: &MemoryRecord) -> StoreResult<()> {
        let conn = self.lock_writer()?;
        let tags_json = serde_json::to_string(&record.tags).unwrap_or_else(|_| "[]".to_string());
        let superseded_ids_json =
            serde_json::to_string(&record.superseded_ids).unwrap_or_else(|_| "[]".to_string());
        let linked_json = serde_json::to_string(
            &record.linked_node_ids.iter().collect::<Vec<_>>(),
        )
        .unwrap_or_else(|_| "[]".to_string());
        let embedding_bytes = record.embedding.as_deref().map(vector::to_bytes);

        conn.execute(
            "INSERT INTO memory_records (
                id, title, summary, content, content_normalized, tags, embedding,
                created_at, last_accessed_at, access_count,
                base_strength, decay_rate, importance, is_pinned, expires_at,
                is_archived, superseded_by, superseded_ids,
                valid_from, valid_until, linked_node_ids
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7,
                ?8, ?9, ?10,
                ?11, ?12, ?13, ?14, ?15,
                ?16, ?17, ?18,
                ?19, ?20, ?21
            )
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                summary = excluded.summary,
                content = excluded.content,
                content_normalized = excluded.content_normalized,
                tags = excluded.tags,
                embedding = excluded.embedding,
                last_accessed_at = excluded.last_accessed_at,
                access_count = excluded.access_count,
                base_strength = excluded.base_strength,
                decay_rate = excluded.decay_rate,
                importance = excluded.importance,
                is_pinned = excluded.is_pinned,
                expires_at = excluded.expires_at,
                is_archived = excluded.is_archived,
                superseded_by = excluded.superseded_by,
                superseded_ids = excluded.superseded_ids,
                valid_from = excluded.valid_from,
                valid_until = excluded.valid_until,
                linked_node_ids = excluded.linked_node_ids",
            params![
                record.id.to_string(),
                record.title,
                record.summary,
                record.content,
                record.content_normalized,
                tags_json,
                embedding_bytes,
                record.created_at.to_rfc3339(),
                record.last_accessed_at.to_rfc3339(),
                record.access_count as i64,
                record.base_strength,
                record.decay_rate,
                record.importance,
                record.is_pinned as i64,
                record.expires_at.map(|t| t.to_rfc3339()),
                record.is_archived as i64,
                record.superseded_by.map(|id| id.to_string()),
                superseded_ids_json,
                record.valid_from.to_rfc3339(),
                record.valid_until.map(|t| t.to_rfc3339()),
                linked_json,
            ],
        )?;
        Ok(())
    }

    /// Load a record by id. Returns archived records too.
    pub fn get(&self, id: Uuid) -> StoreResult<Option<MemoryRecord>> {
        let conn = self.lock_reader()?;
        let mut stmt = conn.prepare("SELECT * FROM memory_records WHERE id = ?1")?;
        let record = stmt
            .query_row(params![id.to_string()], row_to_record)
            .optional()?;
        record.transpose()
    }

    /// Physically delete a record. Returns whether it existed.
    pub fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let conn = self.lock_writer()?;
        let affected = conn.execute(
            "DELETE FROM memory_records WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Enumerate every record (finite, unordered, snapshot-stable within
    /// this call).
    pub fn enumerate(&self) -> StoreResult<Vec<MemoryRecord>> {
        let conn = self.lock_reader()?;
        let mut stmt = conn.prepare("SELECT * FROM memory_records")?;
        let rows = stmt.query_map([], row_to_record)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row??);
        }
        Ok(records)
    }

    /// Delete every record whose `current_strength(now) < threshold` and
    /// that is not pinned. Returns the count removed.
    pub fn prune_weak(&self, threshold: f64) -> StoreResult<usize> {
        let now = Utc::now();
        let candidates = self.enumerate()?;
        let mut pruned = 0;
        for record in candidates {
            if record.is_pinned {
                continue;
            }
            if record.current_strength_at(now) < threshold && self.delete(record.id)? {
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    /// Aggregate statistics over the current record set.
    pub fn stats(&self) -> StoreResult<StoreStats> {
        let now = Utc::now();
        let records = self.enumerate()?;
        let total = records.len() as u64;
        let avg_strength = if total > 0 {
            records
                .iter()
                .map(|r| r.current_strength_at(now))
                .sum::<f64>()
                / total as f64
        } else {
            0.0
        };
        let weak_count = records
            .iter()
            .filter(|r| !r.is_pinned && r.current_strength_at(now) < 0.1)
            .count() as u64;
        let oldest_created_at = records.iter().map(|r| r.created_at).min();
        let newest_created_at = records.iter().map(|r| r.created_at).max();
        let db_size_bytes = std::fs::metadata(&self.db_path)
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(StoreStats {
            total,
            avg_strength,
            weak_count,
            db_size_bytes,
            oldest_created_at,
            newest_created_at,
        })
    }

    /// Reclaim physical space. Opaque to callers.
    pub fn compact(&self) -> StoreResult<()> {
        let conn = self.lock_writer()?;
        conn.execute_batch("VACUUM;")?;
        Ok(())
    }

    /// Atomic load-modify-store applying `reinforce`.
    pub fn reinforce(&self, id: Uuid) -> StoreResult<MemoryRecord> {
        let mut record = self.get(id)?.ok_or(StoreError::NotFound(id))?;
        record.reinforce();
        self.save(&record)?;
        Ok(record)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoreResult<MemoryRecord>> {
    Ok(try_row_to_record(row))
}

fn try_row_to_record(row: &rusqlite::Row<'_>) -> StoreResult<MemoryRecord> {
    let id_str: String = row.get("id")?;
    let id = Uuid::parse_str(&id_str).map_err(|_| StoreError::Init(format!("bad uuid {id_str}")))?;

    let parse_ts = |s: String| -> StoreResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|source| StoreError::InvalidTimestamp { id, source })
    };
    let parse_opt_ts = |s: Option<String>| -> StoreResult<Option<DateTime<Utc>>> {
        s.map(parse_ts).transpose()
    };

    let tags_json: String = row.get("tags")?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();

    let superseded_ids_json: String = row.get("superseded_ids")?;
    let superseded_ids: Vec<Uuid> = serde_json::from_str::<Vec<String>>(&superseded_ids_json)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|s| Uuid::parse_str(&s).ok())
        .collect();

    let linked_json: String = row.get("linked_node_ids")?;
    let linked_node_ids: HashSet<Uuid> = serde_json::from_str::<Vec<String>>(&linked_json)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|s| Uuid::parse_str(&s).ok())
        .collect();

    let embedding_bytes: Option<Vec<u8>> = row.get("embedding")?;
    let embedding = embedding_bytes.and_then(|b| vector::from_bytes(&b));

    let superseded_by: Option<String> = row.get("superseded_by")?;

    let mut record = MemoryRecord {
        id,
        title: row.get("title")?,
        summary: row.get("summary")?,
        content: row.get("content")?,
        content_normalized: row.get("content_normalized")?,
        tags,
        trigrams: HashSet::new(),
        embedding,
        created_at: parse_ts(row.get("created_at")?)?,
        last_accessed_at: parse_ts(row.get("last_accessed_at")?)?,
        access_count: row.get::<_, i64>("access_count")? as u64,
        base_strength: row.get("base_strength")?,
        decay_rate: row.get("decay_rate")?,
        importance: row.get("importance")?,
        is_pinned: row.get::<_, i64>("is_pinned")? != 0,
        expires_at: parse_opt_ts(row.get("expires_at")?)?,
        is_archived: row.get::<_, i64>("is_archived")? != 0,
        superseded_by: superseded_by
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .map_err(|_| StoreError::Init("bad superseded_by uuid".to_string()))?,
        superseded_ids,
        valid_from: parse_ts(row.get("valid_from")?)?,
        valid_until: parse_opt_ts(row.get("valid_until")?)?,
        linked_node_ids,
    };
    record.trigrams = crate::trigram::trigrams(&record.content_normalized);
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn temp_store() -> (Storage, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        (Storage::new(Some(path)).unwrap(), dir)
    }

    #[test]
    fn save_then_get_roundtrips() {
        let (store, _dir) = temp_store();
        let record = MemoryRecord::default();
        store.save(&record).unwrap();
        let loaded = store.get(record.id).unwrap().unwrap();
        assert_eq!(loaded.id, record.id);
        assert_eq!(loaded.base_strength, record.base_strength);
    }

    #[test]
    fn get_missing_returns_none() {
        let (store, _dir) = temp_store();
        assert!(store.get(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn delete_reports_existence() {
        let (store, _dir) = temp_store();
        let record = MemoryRecord::default();
        store.save(&record).unwrap();
        assert!(store.delete(record.id).unwrap());
        assert!(!store.delete(record.id).unwrap());
    }

    #[test]
    fn save_is_upsert() {
        let (store, _dir) = temp_store();
        let mut record = MemoryRecord::default();
        store.save(&record).unwrap();
        record.title = "updated".to_string();
        store.save(&record).unwrap();
        let loaded = store.get(record.id).unwrap().unwrap();
        assert_eq!(loaded.title, "updated");
        assert_eq!(store.enumerate().unwrap().len(), 1);
    }

    #[test]
    fn prune_weak_removes_below_threshold() {
        let (store, _dir) = temp_store();
        let mut weak = MemoryRecord::default();
        weak.importance = 0.0;
        weak.decay_rate = 1.0;
        weak.last_accessed_at = Utc::now() - chrono::Duration::days(10);
        store.save(&weak).unwrap();

        let strong = MemoryRecord::default();
        store.save(&strong).unwrap();

        let pruned = store.prune_weak(0.1).unwrap();
        assert_eq!(pruned, 1);
        assert!(store.get(weak.id).unwrap().is_none());
        assert!(store.get(strong.id).unwrap().is_some());
    }

    #[test]
    fn pinned_records_survive_prune() {
        let (store, _dir) = temp_store();
        let mut pinned = MemoryRecord::default();
        pinned.is_pinned = true;
        pinned.base_strength = 0.0;
        store.save(&pinned).unwrap();

        store.prune_weak(0.5).unwrap();
        assert!(store.get(pinned.id).unwrap().is_some());
    }

    #[test]
    fn reinforce_persists_mutation() {
        let (store, _dir) = temp_store();
        let record = MemoryRecord::default();
        store.save(&record).unwrap();
        let reinforced = store.reinforce(record.id).unwrap();
        assert_eq!(reinforced.access_count, 1);
        let reloaded = store.get(record.id).unwrap().unwrap();
        assert_eq!(reloaded.access_count, 1);
    }

    #[test]
    fn stats_reports_total_and_avg_strength() {
        let (store, _dir) = temp_store();
        store.save(&MemoryRecord::default()).unwrap();
        store.save(&MemoryRecord::default()).unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.total, 2);
        assert!(stats.avg_strength > 0.0);
    }

    #[test]
    fn embedding_roundtrips_through_storage() {
        let (store, _dir) = temp_store();
        let mut record = MemoryRecord::default();
        record.embedding = Some(vec![0.1, 0.2, 0.3]);
        store.save(&record).unwrap();
        let loaded = store.get(record.id).unwrap().unwrap();
        assert_eq!(loaded.embedding, Some(vec![0.1, 0.2, 0.3]));
    }

    #[test]
    fn linked_node_ids_roundtrip() {
        let (store, _dir) = temp_store();
        let mut a = MemoryRecord::default();
        let b = MemoryRecord::default();
        a.linked_node_ids.insert(b.id);
        store.save(&a).unwrap();
        let loaded = store.get(a.id).unwrap().unwrap();
        assert!(loaded.linked_node_ids.contains(&b.id));
    }
}
