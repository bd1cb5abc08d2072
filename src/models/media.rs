use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;
use crate::patch::{Field, FieldKind, Table};
use crate::store::StoreResult;

/// Metadata for an uploaded file. The bytes live wherever `url` points.
#[derive(Debug, Serialize, Clone)]
pub struct MediaItem {
    pub id: i64,
    pub filename: String,
    pub url: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub alt_text: Option<String>,
    pub uploaded_by: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MediaForm {
    pub filename: Option<String>,
    pub url: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub alt_text: Option<String>,
    #[serde(skip)]
    pub uploaded_by: Option<i64>,
}

pub static MEDIA_TABLE: Table = Table {
    name: "media",
    fields: &[Field::new("alt_text", FieldKind::OptText)],
    timestamped: false,
};

impl MediaItem {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(MediaItem {
            id: row.get("id")?,
            filename: row.get("filename")?,
            url: row.get("url")?,
            mime_type: row.get("mime_type")?,
            size_bytes: row.get("size_bytes")?,
            alt_text: row.get("alt_text")?,
            uploaded_by: row.get("uploaded_by")?,
            created_at: row.get("created_at")?,
        })
    }

    pub fn find_by_id(pool: &DbPool, id: i64) -> StoreResult<Option<Self>> {
        let conn = pool.get()?;
        Ok(conn
            .query_row("SELECT * FROM media WHERE id = ?1", params![id], Self::from_row)
            .optional()?)
    }

    pub fn list(pool: &DbPool, limit: i64, offset: i64) -> StoreResult<Vec<Self>> {
        let conn = pool.get()?;
        let mut stmt =
            conn.prepare("SELECT * FROM media ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2")?;
        let rows = stmt
            .query_map(params![limit, offset], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count(pool: &DbPool) -> StoreResult<i64> {
        let conn = pool.get()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM media", [], |row| row.get(0))?)
    }

    /// `form.filename` must already be resolved.
    pub fn create(pool: &DbPool, form: &MediaForm) -> StoreResult<i64> {
        let conn = pool.get()?;
        conn.execute(
            "INSERT INTO media (filename, url, mime_type, size_bytes, alt_text, uploaded_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                form.filename.as_deref().unwrap_or_default(),
                form.url,
                form.mime_type,
                form.size_bytes,
                form.alt_text,
                form.uploaded_by
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn delete(pool: &DbPool, id: i64) -> StoreResult<bool> {
        let conn = pool.get()?;
        Ok(conn.execute("DELETE FROM media WHERE id = ?1", params![id])? > 0)
    }
}
