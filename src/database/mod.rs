pub mod repositories;

pub use repositories::{GroupRepository, PhotoRepository};

use rusqlite::types::Type;
use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database query error: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("Could not create database directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// SQLite adapter persisting photos and groups for the engine.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        log::debug!("Opening database at {}", path.display());
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, DatabaseError> {
        let database = Self { conn };
        database.initialize_schema()?;
        Ok(database)
    }

    fn initialize_schema(&self) -> Result<(), DatabaseError> {
        self.conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS photos (
                id TEXT PRIMARY KEY,
                collection_id TEXT NOT NULL,
                file_name TEXT NOT NULL,
                source_path TEXT NOT NULL,
                file_size_bytes INTEGER NOT NULL,
                width INTEGER,
                height INTEGER,
                mime_type TEXT NOT NULL,
                taken_at TEXT,
                imported_at TEXT NOT NULL,
                content_hash TEXT,
                perceptual_fingerprint TEXT,
                status TEXT NOT NULL DEFAULT 'unreviewed',
                file_exists INTEGER NOT NULL DEFAULT 1,
                UNIQUE (collection_id, file_name)
            );

            CREATE INDEX IF NOT EXISTS idx_photos_content_hash ON photos(content_hash);

            CREATE TABLE IF NOT EXISTS photo_groups (
                id TEXT PRIMARY KEY,
                collection_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                confidence REAL NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_photo_groups_collection
                ON photo_groups(collection_id, kind);

            CREATE TABLE IF NOT EXISTS group_members (
                group_id TEXT NOT NULL REFERENCES photo_groups(id) ON DELETE CASCADE,
                photo_id TEXT NOT NULL REFERENCES photos(id),
                rank INTEGER NOT NULL,
                score REAL NOT NULL,
                PRIMARY KEY (group_id, photo_id)
            );",
        )?;
        Ok(())
    }

    pub fn photos(&self) -> PhotoRepository<'_> {
        PhotoRepository::new(&self.conn)
    }

    pub fn groups(&self) -> GroupRepository<'_> {
        GroupRepository::new(&self.conn)
    }
}

/// Wrap a text column that failed to parse into a rusqlite conversion error.
pub(crate) fn conversion_error<E>(column: usize, error: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(error))
}
