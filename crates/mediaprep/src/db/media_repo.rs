//! Media repository — descriptors under inspection and their extracted
//! metadata.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{Database, DatabaseError};

/// Immutable reference to a media file: where it lives, what the
/// uploader declared it to be, and where its thumbnail goes.
///
/// Owned by the flow that enqueues the job; the pipeline only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    /// Content hash assigned by the storage layer.
    pub storage_id: String,
    /// Declared MIME type (e.g. "video/webm", "image/png").
    pub mime: String,
    /// On-disk path of the full file.
    pub full_path: String,
    /// Destination path for the generated thumbnail.
    pub thumb_path: String,
}

impl MediaDescriptor {
    /// Guesses a MIME type from the file extension, falling back to
    /// `application/octet-stream` for unknown extensions. Used when the
    /// upload flow has no declared type to offer.
    pub fn detect_mime(path: &str) -> String {
        mime_guess::from_path(path)
            .first()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string())
    }

    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            storage_id: row.get("storage_id")?,
            mime: row.get("mime")?,
            full_path: row.get("full_path")?,
            thumb_path: row.get("thumb_path")?,
        })
    }
}

/// Metadata extracted from a media file by a successful inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaMeta {
    pub width: u32,
    pub height: u32,
    pub is_video: bool,
    /// Duration in seconds; 0 for non-video media.
    pub duration: f64,
    pub has_audio: bool,
    pub byte_size: i64,
}

impl MediaMeta {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            width: row.get("width")?,
            height: row.get("height")?,
            is_video: row.get("is_video")?,
            duration: row.get("duration")?,
            has_audio: row.get("has_audio")?,
            byte_size: row.get("byte_size")?,
        })
    }
}

/// Inserts a media row and returns its store-assigned id.
pub fn insert(db: &Database, descriptor: &MediaDescriptor) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO media (storage_id, mime, full_path, thumb_path)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                descriptor.storage_id,
                descriptor.mime,
                descriptor.full_path,
                descriptor.thumb_path,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Finds the descriptor for a media id.
pub fn find_descriptor(
    db: &Database,
    media_id: i64,
) -> Result<Option<MediaDescriptor>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT storage_id, mime, full_path, thumb_path FROM media WHERE id = ?1",
                params![media_id],
                MediaDescriptor::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Upserts extracted metadata for a media id. Keyed by media id, not job
/// id: a reprocess supersedes the previous row.
pub fn upsert_meta(
    conn: &Connection,
    media_id: i64,
    meta: &MediaMeta,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO media_meta (media_id, width, height, is_video, duration, has_audio, byte_size)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(media_id) DO UPDATE SET
             width = excluded.width,
             height = excluded.height,
             is_video = excluded.is_video,
             duration = excluded.duration,
             has_audio = excluded.has_audio,
             byte_size = excluded.byte_size",
        params![
            media_id,
            meta.width,
            meta.height,
            meta.is_video,
            meta.duration,
            meta.has_audio,
            meta.byte_size,
        ],
    )?;
    Ok(())
}

/// Finds the extracted metadata for a media id.
pub fn find_meta(db: &Database, media_id: i64) -> Result<Option<MediaMeta>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT width, height, is_video, duration, has_audio, byte_size
                 FROM media_meta WHERE media_id = ?1",
                params![media_id],
                MediaMeta::from_row,
            )
            .optional()?;
        Ok(row)
    })
}
