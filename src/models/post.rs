use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db::{DbPool, SqlFilter};
use crate::models::{ContentQuery, CONTENT_STATUSES};
use crate::patch::{Field, FieldKind, Table};
use crate::store::StoreResult;

#[derive(Debug, Serialize, Clone)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub cover_image: Option<String>,
    pub status: String,
    pub featured: bool,
    pub author_id: Option<i64>,
    pub category_id: Option<i64>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub published_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Create payload. Handlers fill `slug`, `status` and `author_id` before insert.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PostForm {
    pub title: String,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    pub content: String,
    pub cover_image: Option<String>,
    pub status: Option<String>,
    pub featured: bool,
    #[serde(skip)]
    pub author_id: Option<i64>,
    pub category_id: Option<i64>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub published_at: Option<String>,
}

pub static POST_TABLE: Table = Table {
    name: "posts",
    fields: &[
        Field::new("title", FieldKind::Text),
        Field::new("slug", FieldKind::Slug),
        Field::new("excerpt", FieldKind::OptText),
        Field::new("content", FieldKind::LongText),
        Field::new("cover_image", FieldKind::OptText),
        Field::new("status", FieldKind::OneOf(CONTENT_STATUSES)),
        Field::new("featured", FieldKind::Bool),
        Field::new("category_id", FieldKind::OptInt),
        Field::new("meta_title", FieldKind::OptText),
        Field::new("meta_description", FieldKind::OptText),
        Field::new("published_at", FieldKind::Timestamp),
    ],
    timestamped: true,
};

impl Post {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Post {
            id: row.get("id")?,
            title: row.get("title")?,
            slug: row.get("slug")?,
            excerpt: row.get("excerpt")?,
            content: row.get("content")?,
            cover_image: row.get("cover_image")?,
            status: row.get("status")?,
            featured: row.get("featured")?,
            author_id: row.get("author_id")?,
            category_id: row.get("category_id")?,
            meta_title: row.get("meta_title")?,
            meta_description: row.get("meta_description")?,
            published_at: row.get("published_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn find_by_id(pool: &DbPool, id: i64) -> StoreResult<Option<Self>> {
        let conn = pool.get()?;
        Ok(conn
            .query_row("SELECT * FROM posts WHERE id = ?1", params![id], Self::from_row)
            .optional()?)
    }

    pub fn find_by_slug(pool: &DbPool, slug: &str) -> StoreResult<Option<Self>> {
        let conn = pool.get()?;
        Ok(conn
            .query_row("SELECT * FROM posts WHERE slug = ?1", params![slug], Self::from_row)
            .optional()?)
    }

    pub fn list(pool: &DbPool, query: &ContentQuery) -> StoreResult<Vec<Self>> {
        let conn = pool.get()?;
        let mut filter = content_filter(query);
        let page = filter.page_sql(query.limit, query.offset);
        let sql = format!(
            "SELECT * FROM posts{} ORDER BY COALESCE(published_at, created_at) DESC, id DESC{}",
            filter.where_sql(),
            page
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(filter.params().as_slice(), Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count(pool: &DbPool, query: &ContentQuery) -> StoreResult<i64> {
        let conn = pool.get()?;
        let filter = content_filter(query);
        let sql = format!("SELECT COUNT(*) FROM posts{}", filter.where_sql());
        Ok(conn.query_row(&sql, filter.params().as_slice(), |row| row.get(0))?)
    }

    pub fn create(pool: &DbPool, form: &PostForm) -> StoreResult<i64> {
        let conn = pool.get()?;
        conn.execute(
            "INSERT INTO posts (title, slug, excerpt, content, cover_image, status, featured,
                                author_id, category_id, meta_title, meta_description, published_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                form.title,
                form.slug,
                form.excerpt,
                form.content,
                form.cover_image,
                form.status.as_deref().unwrap_or("draft"),
                form.featured,
                form.author_id,
                form.category_id,
                form.meta_title,
                form.meta_description,
                form.published_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn delete(pool: &DbPool, id: i64) -> StoreResult<bool> {
        let conn = pool.get()?;
        Ok(conn.execute("DELETE FROM posts WHERE id = ?1", params![id])? > 0)
    }
}

/// WHERE clause for the content listing filters (posts and projects share columns).
pub(crate) fn content_filter(query: &ContentQuery) -> SqlFilter {
    let mut filter = SqlFilter::new();
    if let Some(ref s) = query.status {
        filter.eq("status", s.clone());
    }
    if let Some(c) = query.category_id {
        filter.eq("category_id", c);
    }
    if let Some(a) = query.author_id {
        filter.eq("author_id", a);
    }
    if let Some(f) = query.featured {
        filter.eq("featured", f);
    }
    filter
}
