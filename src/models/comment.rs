use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db::{DbPool, SqlFilter};
use crate::patch::{Field, FieldKind, Table};
use crate::store::StoreResult;

pub const COMMENT_STATUSES: &[&str] = &["pending", "approved", "spam"];

#[derive(Debug, Serialize, Clone)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author_name: String,
    pub author_email: String,
    pub body: String,
    pub status: String,
    pub created_at: String,
}

/// Public comment submission. New comments always start out `pending`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommentForm {
    #[serde(skip)]
    pub post_id: i64,
    pub author_name: String,
    pub author_email: String,
    pub body: String,
}

#[derive(Debug, Clone, Default)]
pub struct CommentQuery {
    pub post_id: Option<i64>,
    pub status: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

/// Moderation edits.
pub static COMMENT_TABLE: Table = Table {
    name: "comments",
    fields: &[
        Field::new("body", FieldKind::Text),
        Field::new("status", FieldKind::OneOf(COMMENT_STATUSES)),
    ],
    timestamped: false,
};

fn query_filter(query: &CommentQuery) -> SqlFilter {
    let mut filter = SqlFilter::new();
    if let Some(p) = query.post_id {
        filter.eq("post_id", p);
    }
    if let Some(ref s) = query.status {
        filter.eq("status", s.clone());
    }
    filter
}

impl Comment {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Comment {
            id: row.get("id")?,
            post_id: row.get("post_id")?,
            author_name: row.get("author_name")?,
            author_email: row.get("author_email")?,
            body: row.get("body")?,
            status: row.get("status")?,
            created_at: row.get("created_at")?,
        })
    }

    pub fn find_by_id(pool: &DbPool, id: i64) -> StoreResult<Option<Self>> {
        let conn = pool.get()?;
        Ok(conn
            .query_row("SELECT * FROM comments WHERE id = ?1", params![id], Self::from_row)
            .optional()?)
    }

    pub fn list(pool: &DbPool, query: &CommentQuery) -> StoreResult<Vec<Self>> {
        let conn = pool.get()?;
        let mut filter = query_filter(query);
        let page = filter.page_sql(query.limit, query.offset);
        let sql = format!(
            "SELECT * FROM comments{} ORDER BY created_at DESC, id DESC{}",
            filter.where_sql(),
            page
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(filter.params().as_slice(), Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count(pool: &DbPool, query: &CommentQuery) -> StoreResult<i64> {
        let conn = pool.get()?;
        let filter = query_filter(query);
        let sql = format!("SELECT COUNT(*) FROM comments{}", filter.where_sql());
        Ok(conn.query_row(&sql, filter.params().as_slice(), |row| row.get(0))?)
    }

    pub fn create(pool: &DbPool, form: &CommentForm) -> StoreResult<i64> {
        let conn = pool.get()?;
        conn.execute(
            "INSERT INTO comments (post_id, author_name, author_email, body, status)
             VALUES (?1, ?2, ?3, ?4, 'pending')",
            params![form.post_id, form.author_name, form.author_email, form.body],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn delete(pool: &DbPool, id: i64) -> StoreResult<bool> {
        let conn = pool.get()?;
        Ok(conn.execute("DELETE FROM comments WHERE id = ?1", params![id])? > 0)
    }
}
