//! SQLite document collection
//!
//! Embedded persistence for single-device use. Timestamps are stored as UTC
//! microseconds; changes are announced on an in-process broadcast.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

use super::clock::ServerClock;
use super::traits::{ChangeFeed, ChangeKind, CollectionEvent, DocumentCollection, FEED_CAPACITY};
use crate::domain::{Category, DataItem, ItemId, ItemPatch, NewItem};
use crate::error::{CollectionError, CollectionResult};

const SELECT_COLUMNS: &str =
    "SELECT id, title, description, category, created_at, updated_at FROM data_items";

/// SQLite implementation of the data item collection
pub struct SqliteCollection {
    name: String,
    conn: Arc<Mutex<Option<Connection>>>,
    clock: ServerClock,
    changes: broadcast::Sender<CollectionEvent>,
}

impl SqliteCollection {
    /// Open (or create) the database file and run migrations
    pub fn open(path: &Path, name: impl Into<String>) -> CollectionResult<Self> {
        let conn = Connection::open(path).map_err(sql_err)?;
        tracing::info!(path = %path.display(), "opened sqlite collection");
        Self::from_connection(conn, name.into())
    }

    pub fn open_in_memory(name: impl Into<String>) -> CollectionResult<Self> {
        let conn = Connection::open_in_memory().map_err(sql_err)?;
        Self::from_connection(conn, name.into())
    }

    fn from_connection(conn: Connection, name: String) -> CollectionResult<Self> {
        run_migrations(&conn)?;

        // Keep the clock ahead of anything already stored
        let latest: Option<i64> = conn
            .query_row("SELECT MAX(updated_at) FROM data_items", [], |row| row.get(0))
            .map_err(sql_err)?;
        let clock = match latest.and_then(DateTime::from_timestamp_micros) {
            Some(floor) => ServerClock::starting_after(floor),
            None => ServerClock::new(),
        };

        let (changes, _) = broadcast::channel(FEED_CAPACITY);
        Ok(Self {
            name,
            conn: Arc::new(Mutex::new(Some(conn))),
            clock,
            changes,
        })
    }

    /// Close the connection; later calls fail with `Unavailable`
    pub async fn close(&self) {
        let mut guard = self.conn.lock().await;
        if guard.take().is_some() {
            tracing::info!(collection = %self.name, "sqlite collection closed");
        }
        let _ = self
            .changes
            .send(CollectionEvent::Error("collection closed".to_string()));
    }

    fn notify(&self, kind: ChangeKind, id: &ItemId) {
        let _ = self.changes.send(CollectionEvent::Changed { kind, id: id.clone() });
    }
}

#[async_trait]
impl DocumentCollection for SqliteCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert(&self, item: &NewItem) -> CollectionResult<DataItem> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or_else(not_open)?;

        let created = item.clone().into_item(ItemId::generate(), self.clock.now());
        conn.execute(
            "INSERT INTO data_items (id, title, description, category, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                created.id.as_str(),
                created.title,
                created.description,
                created.category.as_str(),
                created.created_at.timestamp_micros(),
                created.updated_at.timestamp_micros(),
            ],
        )
        .map_err(sql_err)?;

        drop(guard);
        self.notify(ChangeKind::Created, &created.id);
        Ok(created)
    }

    async fn find(&self, id: &ItemId) -> CollectionResult<Option<DataItem>> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or_else(not_open)?;
        find_row(conn, id)
    }

    async fn list_ordered(&self) -> CollectionResult<Vec<DataItem>> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or_else(not_open)?;

        let mut stmt = conn
            .prepare(&format!("{SELECT_COLUMNS} ORDER BY created_at DESC, rowid ASC"))
            .map_err(sql_err)?;
        let rows = stmt.query_map([], read_row).map_err(sql_err)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row.map_err(sql_err)?.into_item()?);
        }
        Ok(items)
    }

    async fn update(&self, id: &ItemId, patch: &ItemPatch) -> CollectionResult<()> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or_else(not_open)?;

        let patch = patch.normalized();
        let changed = conn
            .execute(
                "UPDATE data_items SET
                    title = COALESCE(?1, title),
                    description = COALESCE(?2, description),
                    category = COALESCE(?3, category),
                    updated_at = ?4
                 WHERE id = ?5",
                params![
                    patch.title,
                    patch.description,
                    patch.category.map(|c| c.as_str()),
                    self.clock.now().timestamp_micros(),
                    id.as_str(),
                ],
            )
            .map_err(sql_err)?;
        if changed == 0 {
            return Err(CollectionError::NotFound(id.clone()));
        }

        drop(guard);
        self.notify(ChangeKind::Updated, id);
        Ok(())
    }

    async fn delete(&self, id: &ItemId) -> CollectionResult<()> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or_else(not_open)?;

        let changed = conn
            .execute("DELETE FROM data_items WHERE id = ?1", params![id.as_str()])
            .map_err(sql_err)?;
        if changed == 0 {
            return Err(CollectionError::NotFound(id.clone()));
        }

        drop(guard);
        self.notify(ChangeKind::Deleted, id);
        Ok(())
    }

    async fn watch(&self) -> CollectionResult<ChangeFeed> {
        let guard = self.conn.lock().await;
        guard.as_ref().ok_or_else(not_open)?;
        Ok(self.changes.subscribe())
    }
}

/// Create the table and index if they don't exist
fn run_migrations(conn: &Connection) -> CollectionResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS data_items (
            id TEXT PRIMARY KEY NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT 'Personal',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_data_items_created ON data_items(created_at);",
    )
    .map_err(sql_err)
}

fn find_row(conn: &Connection, id: &ItemId) -> CollectionResult<Option<DataItem>> {
    let row = conn
        .query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?1"),
            params![id.as_str()],
            read_row,
        )
        .optional()
        .map_err(sql_err)?;
    row.map(StoredRow::into_item).transpose()
}

/// Raw column values, decoded outside the rusqlite closure
struct StoredRow {
    id: String,
    title: String,
    description: String,
    category: String,
    created_at: i64,
    updated_at: i64,
}

fn read_row(row: &rusqlite::Row) -> rusqlite::Result<StoredRow> {
    Ok(StoredRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

impl StoredRow {
    fn into_item(self) -> CollectionResult<DataItem> {
        Ok(DataItem {
            created_at: micros_to_time(self.created_at, &self.id)?,
            updated_at: micros_to_time(self.updated_at, &self.id)?,
            category: Category::from_stored(&self.category),
            id: ItemId::new(self.id),
            title: self.title,
            description: self.description,
        })
    }
}

fn micros_to_time(micros: i64, id: &str) -> CollectionResult<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| {
            CollectionError::Decode(format!("timestamp {micros} out of range in item {id}"))
        })
}

fn not_open() -> CollectionError {
    CollectionError::Unavailable("Database not initialized".to_string())
}

fn sql_err(err: rusqlite::Error) -> CollectionError {
    match &err {
        rusqlite::Error::SqliteFailure(code, _)
            if code.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            CollectionError::Rejected(err.to_string())
        }
        _ => CollectionError::Unavailable(err.to_string()),
    }
}
