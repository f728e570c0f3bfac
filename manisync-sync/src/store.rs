//! Local resource store.
//!
//! # Schema
//!
//! ```text
//! manifest(manifest TEXT)                  -- single row, last synced manifest
//! resources(path TEXT PRIMARY KEY,
//!           contentHash TEXT, time TEXT,
//!           content TEXT)                  -- one row per cached resource
//! ```
//!
//! The manifest row is the only thing diffs are computed against. Resource
//! rows and the manifest row are always written in the same transaction, so
//! the two never disagree about which sync last completed.

use std::collections::HashSet;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use manisync_core::{Manifest, ResourceDescriptor};

use crate::error::{io_err, SyncError};

/// A cached resource row, without its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResource {
    pub path: String,
    pub content_hash: String,
    pub timestamp: String,
    /// Content length in bytes; `None` when the row has no content.
    pub size: Option<usize>,
}

/// What a [`ResourceStore::persist`] call changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistOutcome {
    pub written: usize,
    pub pruned: usize,
}

/// Persistence collaborator for the sync coordinator.
///
/// Implementations are blocking; the coordinator calls them off the async
/// scheduler.
pub trait ResourceStore: Send + Sync {
    /// The last synced manifest, or `None` before the first sync.
    fn load_manifest(&self) -> Result<Option<Manifest>, SyncError>;

    /// Upsert `resources` and replace the manifest record with `manifest`,
    /// all-or-nothing. With `prune`, rows whose path `manifest` no longer
    /// declares are deleted in the same transaction.
    fn persist(
        &self,
        resources: &[ResourceDescriptor],
        manifest: &Manifest,
        prune: bool,
    ) -> Result<PersistOutcome, SyncError>;

    /// A cached resource with its content.
    fn load_resource(&self, path: &str) -> Result<Option<ResourceDescriptor>, SyncError>;

    /// All cached rows ordered by path.
    fn list_resources(&self) -> Result<Vec<StoredResource>, SyncError>;
}

// ---------------------------------------------------------------------------
// SQLite implementation
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct SqliteStore {
    pub(crate) conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, SyncError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        let conn = Connection::open(path)?;
        tracing::debug!("opened store at {}", path.display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, SyncError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, SyncError> {
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn resource_count(&self) -> Result<usize, SyncError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM resources", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

fn migrate(conn: &Connection) -> Result<(), SyncError> {
    conn.execute_batch(
        r#"
        PRAGMA synchronous=NORMAL;

        CREATE TABLE IF NOT EXISTS manifest (
          manifest TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS resources (
          path TEXT PRIMARY KEY,
          contentHash TEXT NOT NULL,
          time TEXT NOT NULL,
          content TEXT
        );
        "#,
    )?;
    Ok(())
}

impl ResourceStore for SqliteStore {
    fn load_manifest(&self) -> Result<Option<Manifest>, SyncError> {
        let conn = self.conn.lock();
        let text: Option<String> = conn
            .query_row("SELECT manifest FROM manifest LIMIT 1", [], |row| row.get(0))
            .optional()?;
        match text {
            Some(text) => Ok(Some(Manifest::from_json(&text)?)),
            None => Ok(None),
        }
    }

    fn persist(
        &self,
        resources: &[ResourceDescriptor],
        manifest: &Manifest,
        prune: bool,
    ) -> Result<PersistOutcome, SyncError> {
        let record = manifest.to_json()?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let mut outcome = PersistOutcome::default();
        {
            let mut upsert = tx.prepare(
                r#"
                INSERT INTO resources (path, contentHash, time, content)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(path) DO UPDATE SET
                  contentHash = excluded.contentHash,
                  time = excluded.time,
                  content = excluded.content
                "#,
            )?;
            for resource in resources {
                upsert.execute(params![
                    resource.path,
                    resource.content_hash,
                    resource.timestamp,
                    resource.content,
                ])?;
                outcome.written += 1;
            }
        }

        if prune {
            let declared: HashSet<&str> =
                manifest.resources.iter().map(|r| r.path.as_str()).collect();
            let stored: Vec<String> = {
                let mut stmt = tx.prepare("SELECT path FROM resources")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect::<Result<_, _>>()?
            };
            for path in stored.iter().filter(|p| !declared.contains(p.as_str())) {
                tx.execute("DELETE FROM resources WHERE path = ?1", params![path])?;
                tracing::debug!("pruned: {path}");
                outcome.pruned += 1;
            }
        }

        tx.execute("DELETE FROM manifest", [])?;
        tx.execute("INSERT INTO manifest (manifest) VALUES (?1)", params![record])?;
        tx.commit()?;

        tracing::debug!(
            "persisted {} resource(s), pruned {}",
            outcome.written,
            outcome.pruned
        );
        Ok(outcome)
    }

    fn load_resource(&self, path: &str) -> Result<Option<ResourceDescriptor>, SyncError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT path, contentHash, time, content FROM resources WHERE path = ?1",
                params![path],
                |row| {
                    Ok(ResourceDescriptor {
                        path: row.get(0)?,
                        content_hash: row.get(1)?,
                        timestamp: row.get(2)?,
                        content: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    fn list_resources(&self) -> Result<Vec<StoredResource>, SyncError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT path, contentHash, time, length(CAST(content AS BLOB)) FROM resources ORDER BY path",
        )?;
        let rows = stmt.query_map([], |row| {
            let size: Option<i64> = row.get(3)?;
            Ok(StoredResource {
                path: row.get(0)?,
                content_hash: row.get(1)?,
                timestamp: row.get(2)?,
                size: size.and_then(|s| usize::try_from(s).ok()),
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}
