//! SQLite persistence for welcome-daemon.
//!
//! This is the single-writer registry backing the daemon: an `entries` table
//! holding one row per occupancy entry, and an append-only
//! `activation_events` table that records every activation write.

use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde::Serialize;
use std::path::PathBuf;

use welcome_core::{EntryContext, EntryKey, Registry, RegistryEntry, Result, WelcomeError};

pub struct SqliteRegistry {
    path: PathBuf,
    read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationEventRow {
    pub entry_key: String,
    pub label: String,
    pub active: bool,
    pub recorded_at: String,
}

impl SqliteRegistry {
    pub fn new(path: PathBuf) -> std::result::Result<Self, String> {
        let db = Self {
            path,
            read_only: false,
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Opens an existing database without creating or migrating anything.
    /// Returns `None` when there is no database file yet.
    pub fn open_read_only(path: PathBuf) -> std::result::Result<Option<Self>, String> {
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(Self {
            path,
            read_only: true,
        }))
    }

    pub fn list_events(&self, limit: usize) -> std::result::Result<Vec<ActivationEventRow>, String> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT entry_key, label, active, recorded_at FROM activation_events \
                     ORDER BY id DESC LIMIT ?1",
                )
                .map_err(|err| format!("Failed to prepare events query: {}", err))?;

            let rows = stmt
                .query_map(params![limit as i64], |row| {
                    Ok(ActivationEventRow {
                        entry_key: row.get(0)?,
                        label: row.get(1)?,
                        active: row.get::<_, i64>(2)? != 0,
                        recorded_at: row.get(3)?,
                    })
                })
                .map_err(|err| format!("Failed to read event rows: {}", err))?;

            let mut events = Vec::new();
            for row in rows {
                events.push(row.map_err(|err| format!("Failed to decode event row: {}", err))?);
            }
            Ok(events)
        })
    }

    fn load_entries(&self) -> std::result::Result<Vec<RegistryEntry>, String> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT key, label, active, subject_kind, subject_id, room_id \
                     FROM entries ORDER BY key ASC",
                )
                .map_err(|err| format!("Failed to prepare entries query: {}", err))?;

            let rows = stmt
                .query_map([], entry_from_row)
                .map_err(|err| format!("Failed to read entry rows: {}", err))?;

            let mut entries = Vec::new();
            for row in rows {
                entries.push(row.map_err(|err| format!("Failed to decode entry row: {}", err))?);
            }
            Ok(entries)
        })
    }

    fn load_entry(&self, key: &EntryKey) -> std::result::Result<Option<RegistryEntry>, String> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT key, label, active, subject_kind, subject_id, room_id \
                 FROM entries WHERE key = ?1",
                params![key.as_str()],
                entry_from_row,
            )
            .optional()
            .map_err(|err| format!("Failed to query entry: {}", err))
        })
    }

    fn insert_entry(
        &self,
        key: &EntryKey,
        label: &str,
        context: &EntryContext,
    ) -> std::result::Result<(), String> {
        let now = Utc::now().to_rfc3339();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO entries \
                    (key, label, active, subject_kind, subject_id, room_id, created_at, updated_at) \
                 VALUES (?1, ?2, 0, ?3, ?4, ?5, ?6, ?6)",
                params![
                    key.as_str(),
                    label,
                    context.subject_kind,
                    context.subject_id,
                    context.room_id,
                    now
                ],
            )
            .map_err(|err| format!("Failed to insert entry {}: {}", key, err))?;
            Ok(())
        })
    }

    fn delete_entry(&self, key: &EntryKey) -> std::result::Result<(), String> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM entries WHERE key = ?1", params![key.as_str()])
                .map_err(|err| format!("Failed to delete entry {}: {}", key, err))?;
            Ok(())
        })
    }

    fn update_label(&self, key: &EntryKey, label: &str) -> std::result::Result<(), String> {
        self.with_connection(|conn| {
            // Label writes happen every cycle; only touch updated_at on change.
            conn.execute(
                "UPDATE entries SET label = ?2, updated_at = ?3 WHERE key = ?1 AND label != ?2",
                params![key.as_str(), label, Utc::now().to_rfc3339()],
            )
            .map_err(|err| format!("Failed to update label for {}: {}", key, err))?;
            let exists: bool = conn
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM entries WHERE key = ?1)",
                    params![key.as_str()],
                    |row| row.get(0),
                )
                .map_err(|err| format!("Failed to check entry {}: {}", key, err))?;
            if !exists {
                return Err(format!("No entry {}", key));
            }
            Ok(())
        })
    }

    fn record_activation(&self, key: &EntryKey, active: bool) -> std::result::Result<(), String> {
        let now = Utc::now().to_rfc3339();
        self.with_connection(|conn| {
            let tx = conn
                .transaction()
                .map_err(|err| format!("Failed to begin transaction: {}", err))?;
            let updated = tx
                .execute(
                    "UPDATE entries SET active = ?2, updated_at = ?3 WHERE key = ?1",
                    params![key.as_str(), active as i64, now],
                )
                .map_err(|err| format!("Failed to update activation for {}: {}", key, err))?;
            if updated == 0 {
                return Err(format!("No entry {}", key));
            }
            tx.execute(
                "INSERT INTO activation_events (entry_key, label, active, recorded_at) \
                 SELECT key, label, ?2, ?3 FROM entries WHERE key = ?1",
                params![key.as_str(), active as i64, now],
            )
            .map_err(|err| format!("Failed to record activation event: {}", err))?;
            tx.commit()
                .map_err(|err| format!("Failed to commit activation: {}", err))
        })
    }

    fn init_schema(&self) -> std::result::Result<(), String> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "BEGIN;
                 CREATE TABLE IF NOT EXISTS entries (
                    key TEXT PRIMARY KEY,
                    label TEXT NOT NULL,
                    active INTEGER NOT NULL DEFAULT 0,
                    subject_kind TEXT NOT NULL,
                    subject_id TEXT NOT NULL,
                    room_id TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS activation_events (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    entry_key TEXT NOT NULL,
                    label TEXT NOT NULL,
                    active INTEGER NOT NULL,
                    recorded_at TEXT NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS activation_events_entry_key
                    ON activation_events (entry_key);
                 COMMIT;",
            )
            .map_err(|err| format!("Failed to initialize schema: {}", err))
        })
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> std::result::Result<T, String>,
    ) -> std::result::Result<T, String> {
        let mut conn = self.open()?;
        op(&mut conn)
    }

    fn open(&self) -> std::result::Result<Connection, String> {
        if self.read_only {
            let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
            let conn = Connection::open_with_flags(&self.path, flags)
                .map_err(|err| format!("Failed to open sqlite db read-only: {}", err))?;
            conn.pragma_update(None, "busy_timeout", 5000)
                .map_err(|err| format!("Failed to set busy_timeout: {}", err))?;
            return Ok(conn);
        }

        if let Some(parent) = self.path.parent() {
            fs_err::create_dir_all(parent)
                .map_err(|err| format!("Failed to create registry data dir: {}", err))?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = Connection::open_with_flags(&self.path, flags)
            .map_err(|err| format!("Failed to open sqlite db: {}", err))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|err| format!("Failed to enable WAL: {}", err))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|err| format!("Failed to set synchronous: {}", err))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|err| format!("Failed to set busy_timeout: {}", err))?;

        Ok(conn)
    }
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<RegistryEntry> {
    Ok(RegistryEntry {
        key: EntryKey::from_stored(row.get::<_, String>(0)?),
        label: row.get(1)?,
        active: row.get::<_, i64>(2)? != 0,
        context: EntryContext {
            subject_kind: row.get(3)?,
            subject_id: row.get(4)?,
            room_id: row.get(5)?,
        },
    })
}

impl Registry for SqliteRegistry {
    fn entries(&self) -> Result<Vec<RegistryEntry>> {
        self.load_entries()
            .map_err(|err| WelcomeError::registry("entries", err))
    }

    fn get(&self, key: &EntryKey) -> Result<Option<RegistryEntry>> {
        self.load_entry(key)
            .map_err(|err| WelcomeError::registry("get", err))
    }

    fn create(
        &mut self,
        key: &EntryKey,
        label: &str,
        context: EntryContext,
    ) -> Result<RegistryEntry> {
        self.insert_entry(key, label, &context)
            .map_err(|err| WelcomeError::registry("create", err))?;
        Ok(RegistryEntry {
            key: key.clone(),
            label: label.to_string(),
            active: false,
            context,
        })
    }

    fn remove(&mut self, key: &EntryKey) -> Result<()> {
        self.delete_entry(key)
            .map_err(|err| WelcomeError::registry("remove", err))
    }

    fn set_label(&mut self, key: &EntryKey, label: &str) -> Result<()> {
        self.update_label(key, label)
            .map_err(|err| WelcomeError::registry("set_label", err))
    }

    fn set_activation(&mut self, key: &EntryKey, active: bool) -> Result<()> {
        self.record_activation(key, active)
            .map_err(|err| WelcomeError::registry("set_activation", err))
    }
}
