//! SQLite-based timetable cache

use chrono::{DateTime, Local};
use nextup_api::{ScheduleSnapshot, Timetable};
use nextup_util::CacheKey;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{StoreError, StoreResult, TimetableCache};

/// SQLite-backed timetable cache
pub struct SqliteCache {
    conn: Mutex<Connection>,
    key: CacheKey,
}

impl SqliteCache {
    /// Open or create a cache at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_key(path, CacheKey::default())
    }

    /// Open or create a cache storing its snapshot under `key`
    pub fn open_with_key(path: impl AsRef<Path>, key: CacheKey) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let cache = Self {
            conn: Mutex::new(conn),
            key,
        };
        cache.init_schema()?;
        Ok(cache)
    }

    /// Create an in-memory cache (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let cache = Self {
            conn: Mutex::new(conn),
            key: CacheKey::default(),
        };
        cache.init_schema()?;
        Ok(cache)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- One row per cache key, replaced wholesale
            CREATE TABLE IF NOT EXISTS timetable_cache (
                cache_key TEXT PRIMARY KEY,
                written_at TEXT NOT NULL,
                timetable_json TEXT NOT NULL
            );
            "#,
        )?;

        debug!("Cache schema initialized");
        Ok(())
    }
}

impl TimetableCache for SqliteCache {
    fn store(&self, timetable: &Timetable) -> StoreResult<ScheduleSnapshot> {
        let json = serde_json::to_string(timetable)?;
        let snapshot = ScheduleSnapshot::new(timetable.clone(), nextup_util::now());

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO timetable_cache (cache_key, written_at, timetable_json)
            VALUES (?, ?, ?)
            ON CONFLICT(cache_key)
            DO UPDATE SET written_at = excluded.written_at,
                          timetable_json = excluded.timetable_json
            "#,
            params![self.key.as_str(), snapshot.written_at.to_rfc3339(), json],
        )?;

        debug!(
            cache_key = %self.key,
            event_count = timetable.len(),
            "Timetable stored"
        );
        Ok(snapshot)
    }

    fn retrieve(&self) -> StoreResult<Option<ScheduleSnapshot>> {
        let conn = self.conn()?;

        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT written_at, timetable_json FROM timetable_cache WHERE cache_key = ?",
                [self.key.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((written_at, json)) = row else {
            return Ok(None);
        };

        let written_at = DateTime::parse_from_rfc3339(&written_at)
            .map(|dt| dt.with_timezone(&Local))
            .map_err(|e| StoreError::Corrupt(format!("written_at: {}", e)))?;
        let timetable: Timetable = serde_json::from_str(&json)?;

        Ok(Some(ScheduleSnapshot::new(timetable, written_at)))
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Cache lock poisoned");
                false
            }
        }
    }
}
