use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db::{DbPool, SqlFilter};
use crate::patch::{Field, FieldKind, Table};
use crate::store::StoreResult;

pub const CATEGORY_KINDS: &[&str] = &["post", "project"];

#[derive(Debug, Serialize, Clone)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    /// "post" or "project"
    pub kind: String,
    pub description: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CategoryForm {
    pub name: String,
    pub slug: Option<String>,
    pub kind: Option<String>,
    pub description: Option<String>,
}

pub static CATEGORY_TABLE: Table = Table {
    name: "categories",
    fields: &[
        Field::new("name", FieldKind::Text),
        Field::new("slug", FieldKind::Slug),
        Field::new("kind", FieldKind::OneOf(CATEGORY_KINDS)),
        Field::new("description", FieldKind::OptText),
    ],
    timestamped: false,
};

impl Category {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Category {
            id: row.get("id")?,
            name: row.get("name")?,
            slug: row.get("slug")?,
            kind: row.get("kind")?,
            description: row.get("description")?,
            created_at: row.get("created_at")?,
        })
    }

    pub fn find_by_id(pool: &DbPool, id: i64) -> StoreResult<Option<Self>> {
        let conn = pool.get()?;
        Ok(conn
            .query_row(
                "SELECT * FROM categories WHERE id = ?1",
                params![id],
                Self::from_row,
            )
            .optional()?)
    }

    pub fn list(pool: &DbPool, kind: Option<&str>) -> StoreResult<Vec<Self>> {
        let conn = pool.get()?;
        let mut filter = SqlFilter::new();
        if let Some(k) = kind {
            filter.eq("kind", k.to_string());
        }
        let sql = format!(
            "SELECT * FROM categories{} ORDER BY name ASC",
            filter.where_sql()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(filter.params().as_slice(), Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn create(pool: &DbPool, form: &CategoryForm) -> StoreResult<i64> {
        let conn = pool.get()?;
        conn.execute(
            "INSERT INTO categories (name, slug, kind, description) VALUES (?1, ?2, ?3, ?4)",
            params![
                form.name,
                form.slug,
                form.kind.as_deref().unwrap_or("post"),
                form.description
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn delete(pool: &DbPool, id: i64) -> StoreResult<bool> {
        let conn = pool.get()?;
        Ok(conn.execute("DELETE FROM categories WHERE id = ?1", params![id])? > 0)
    }

    pub fn usage_count(pool: &DbPool, id: i64) -> StoreResult<i64> {
        let conn = pool.get()?;
        Ok(conn.query_row(
            "SELECT (SELECT COUNT(*) FROM posts WHERE category_id = ?1)
                  + (SELECT COUNT(*) FROM projects WHERE category_id = ?1)",
            params![id],
            |row| row.get(0),
        )?)
    }
}
