use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;
use crate::models::post::content_filter;
use crate::models::{json_text, ContentQuery, CONTENT_STATUSES};
use crate::patch::{Field, FieldKind, Table};
use crate::store::StoreResult;

/// A portfolio item.
#[derive(Debug, Serialize, Clone)]
pub struct Project {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub summary: Option<String>,
    pub content: String,
    pub image: Option<String>,
    /// JSON array text
    #[serde(serialize_with = "json_text")]
    pub tech_stack: String,
    pub live_url: Option<String>,
    pub repo_url: Option<String>,
    pub featured: bool,
    pub status: String,
    pub sort_order: i64,
    pub category_id: Option<i64>,
    pub author_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProjectForm {
    pub title: String,
    pub slug: Option<String>,
    pub summary: Option<String>,
    pub content: String,
    pub image: Option<String>,
    /// Array as sent; stored as JSON text
    pub tech_stack: Option<serde_json::Value>,
    pub live_url: Option<String>,
    pub repo_url: Option<String>,
    pub featured: bool,
    pub status: Option<String>,
    pub sort_order: i64,
    pub category_id: Option<i64>,
    #[serde(skip)]
    pub author_id: Option<i64>,
}

pub static PROJECT_TABLE: Table = Table {
    name: "projects",
    fields: &[
        Field::new("title", FieldKind::Text),
        Field::new("slug", FieldKind::Slug),
        Field::new("summary", FieldKind::OptText),
        Field::new("content", FieldKind::LongText),
        Field::new("image", FieldKind::OptText),
        Field::new("tech_stack", FieldKind::Json),
        Field::new("live_url", FieldKind::Url),
        Field::new("repo_url", FieldKind::Url),
        Field::new("featured", FieldKind::Bool),
        Field::new("status", FieldKind::OneOf(CONTENT_STATUSES)),
        Field::new("sort_order", FieldKind::Int),
        Field::new("category_id", FieldKind::OptInt),
    ],
    timestamped: true,
};

impl ProjectForm {
    /// `tech_stack` as stored.
    pub fn tech_stack_text(&self) -> String {
        match &self.tech_stack {
            Some(v @ serde_json::Value::Array(_)) => v.to_string(),
            _ => "[]".to_string(),
        }
    }
}

impl Project {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Project {
            id: row.get("id")?,
            title: row.get("title")?,
            slug: row.get("slug")?,
            summary: row.get("summary")?,
            content: row.get("content")?,
            image: row.get("image")?,
            tech_stack: row.get("tech_stack")?,
            live_url: row.get("live_url")?,
            repo_url: row.get("repo_url")?,
            featured: row.get("featured")?,
            status: row.get("status")?,
            sort_order: row.get("sort_order")?,
            category_id: row.get("category_id")?,
            author_id: row.get("author_id")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn find_by_id(pool: &DbPool, id: i64) -> StoreResult<Option<Self>> {
        let conn = pool.get()?;
        Ok(conn
            .query_row("SELECT * FROM projects WHERE id = ?1", params![id], Self::from_row)
            .optional()?)
    }

    pub fn find_by_slug(pool: &DbPool, slug: &str) -> StoreResult<Option<Self>> {
        let conn = pool.get()?;
        Ok(conn
            .query_row(
                "SELECT * FROM projects WHERE slug = ?1",
                params![slug],
                Self::from_row,
            )
            .optional()?)
    }

    pub fn list(pool: &DbPool, query: &ContentQuery) -> StoreResult<Vec<Self>> {
        let conn = pool.get()?;
        let mut filter = content_filter(query);
        let page = filter.page_sql(query.limit, query.offset);
        let sql = format!(
            "SELECT * FROM projects{} ORDER BY sort_order ASC, id DESC{}",
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
        let sql = format!("SELECT COUNT(*) FROM projects{}", filter.where_sql());
        Ok(conn.query_row(&sql, filter.params().as_slice(), |row| row.get(0))?)
    }

    pub fn create(pool: &DbPool, form: &ProjectForm) -> StoreResult<i64> {
        let conn = pool.get()?;
        conn.execute(
            "INSERT INTO projects (title, slug, summary, content, image, tech_stack, live_url,
                                   repo_url, featured, status, sort_order, category_id, author_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                form.title,
                form.slug,
                form.summary,
                form.content,
                form.image,
                form.tech_stack_text(),
                form.live_url,
                form.repo_url,
                form.featured,
                form.status.as_deref().unwrap_or("draft"),
                form.sort_order,
                form.category_id,
                form.author_id,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn delete(pool: &DbPool, id: i64) -> StoreResult<bool> {
        let conn = pool.get()?;
        Ok(conn.execute("DELETE FROM projects WHERE id = ?1", params![id])? > 0)
    }
}
