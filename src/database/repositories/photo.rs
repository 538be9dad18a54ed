use super::{format_timestamp, parse_timestamp, Repository};
use crate::core::perceptual::Fingerprint;
use crate::core::photo::{Photo, PhotoId, PhotoStatus, StoredPhoto};
use crate::core::sync::{SyncDiff, SyncResult};
use crate::database::{conversion_error, DatabaseError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;

const PHOTO_COLUMNS: &str = "id, collection_id, file_name, source_path, file_size_bytes, \
     width, height, mime_type, taken_at, imported_at, content_hash, \
     perceptual_fingerprint, status, file_exists";

pub struct PhotoRepository<'a> {
    conn: &'a Connection,
}

impl Repository for PhotoRepository<'_> {
    fn conn(&self) -> &Connection {
        self.conn
    }
}

fn photo_from_row(row: &Row<'_>) -> rusqlite::Result<Photo> {
    let id: String = row.get(0)?;
    let source_path: String = row.get(3)?;
    let file_size_bytes: i64 = row.get(4)?;
    let taken_at: Option<String> = row.get(8)?;
    let imported_at: String = row.get(9)?;
    let fingerprint: Option<String> = row.get(11)?;
    let status: String = row.get(12)?;

    Ok(Photo {
        id: PhotoId::parse(&id).map_err(|e| conversion_error(0, e))?,
        collection_id: row.get(1)?,
        file_name: row.get(2)?,
        source_path: PathBuf::from(source_path),
        file_size_bytes: file_size_bytes as u64,
        width: row.get(5)?,
        height: row.get(6)?,
        mime_type: row.get(7)?,
        taken_at: taken_at
            .map(|value| parse_timestamp(8, &value))
            .transpose()?,
        imported_at: parse_timestamp(9, &imported_at)?,
        content_hash: row.get(10)?,
        perceptual_fingerprint: fingerprint
            .map(|value| value.parse::<Fingerprint>().map_err(|e| conversion_error(11, e)))
            .transpose()?,
        status: status.parse::<PhotoStatus>().map_err(|e| conversion_error(12, e))?,
        file_exists: row.get(13)?,
    })
}

impl<'a> PhotoRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Apply a sync diff in one transaction.
    pub fn apply_sync(
        &self,
        collection_id: &str,
        diff: &SyncDiff,
    ) -> Result<SyncResult, DatabaseError> {
        let stored_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM photos WHERE collection_id = ?1",
            params![collection_id],
            |row| row.get(0),
        )?;

        let tx = self.transaction()?;
        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO photos ({PHOTO_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
            ))?;
            for photo in &diff.to_insert {
                insert.execute(params![
                    photo.id.to_string(),
                    collection_id,
                    photo.file_name,
                    photo.source_path.to_string_lossy().to_string(),
                    photo.file_size_bytes as i64,
                    photo.width,
                    photo.height,
                    photo.mime_type,
                    photo.taken_at.as_ref().map(format_timestamp),
                    format_timestamp(&photo.imported_at),
                    photo.content_hash,
                    photo.perceptual_fingerprint.map(|fp| fp.to_hex()),
                    photo.status.as_str(),
                    true,
                ])?;
            }

            let mut mark = tx.prepare("UPDATE photos SET file_exists = ?2 WHERE id = ?1")?;
            for id in &diff.to_remove {
                mark.execute(params![id.to_string(), false])?;
            }
            for id in &diff.to_restore {
                mark.execute(params![id.to_string(), true])?;
            }
        }
        tx.commit()?;

        let result = SyncResult::from_diff(diff, stored_count as usize);
        log::info!(
            "Synced collection {}: {} added, {} removed, {} restored, {} total",
            collection_id,
            result.added,
            result.removed,
            result.restored,
            result.total
        );
        Ok(result)
    }

    pub fn stored_records(&self, collection_id: &str) -> Result<Vec<StoredPhoto>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, file_name, file_exists FROM photos
             WHERE collection_id = ?1 ORDER BY file_name",
        )?;
        let records = stmt
            .query_map(params![collection_id], |row| {
                let id: String = row.get(0)?;
                Ok(StoredPhoto {
                    id: PhotoId::parse(&id).map_err(|e| conversion_error(0, e))?,
                    file_name: row.get(1)?,
                    file_exists: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Every photo of the collection, in source path order.
    pub fn load_photos(&self, collection_id: &str) -> Result<Vec<Photo>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos WHERE collection_id = ?1 ORDER BY source_path"
        ))?;
        let photos = stmt
            .query_map(params![collection_id], photo_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(photos)
    }

    pub fn find(&self, id: &PhotoId) -> Result<Option<Photo>, DatabaseError> {
        let photo = self
            .conn
            .query_row(
                &format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE id = ?1"),
                params![id.to_string()],
                photo_from_row,
            )
            .optional()?;
        Ok(photo)
    }

    /// Record a lazily computed hash. A hash already stored is never
    /// replaced; returns whether a row changed.
    pub fn update_content_hash(&self, id: &PhotoId, hash: &str) -> Result<bool, DatabaseError> {
        let changed = self.conn.execute(
            "UPDATE photos SET content_hash = ?2 WHERE id = ?1 AND content_hash IS NULL",
            params![id.to_string(), hash],
        )?;
        Ok(changed > 0)
    }

    pub fn set_status(&self, id: &PhotoId, status: PhotoStatus) -> Result<(), DatabaseError> {
        let changed = self.conn.execute(
            "UPDATE photos SET status = ?2 WHERE id = ?1",
            params![id.to_string(), status.as_str()],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound(format!("photo {id}")));
        }
        Ok(())
    }

    /// Apply several status changes atomically; nothing changes if any
    /// photo is unknown.
    pub fn set_statuses(&self, updates: &[(PhotoId, PhotoStatus)]) -> Result<(), DatabaseError> {
        let tx = self.transaction()?;
        {
            let mut stmt = tx.prepare("UPDATE photos SET status = ?2 WHERE id = ?1")?;
            for (id, status) in updates {
                if stmt.execute(params![id.to_string(), status.as_str()])? == 0 {
                    return Err(DatabaseError::NotFound(format!("photo {id}")));
                }
            }
        }
        tx.commit()?;
        Ok(())
    }
}
