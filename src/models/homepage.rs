use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;
use crate::models::json_text;
use crate::patch::{Field, FieldKind, Table};
use crate::store::StoreResult;

/// A block of the home page (hero, about, skills, ...). `content` is free-form JSON.
#[derive(Debug, Serialize, Clone)]
pub struct HomepageSection {
    pub id: i64,
    pub section_key: String,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    #[serde(serialize_with = "json_text")]
    pub content: String,
    pub sort_order: i64,
    pub is_active: bool,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SectionForm {
    pub section_key: String,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub content: Option<serde_json::Value>,
    pub sort_order: i64,
    pub is_active: bool,
}

impl Default for SectionForm {
    fn default() -> Self {
        SectionForm {
            section_key: String::new(),
            title: None,
            subtitle: None,
            content: None,
            sort_order: 0,
            is_active: true,
        }
    }
}

impl SectionForm {
    pub fn content_text(&self) -> String {
        match &self.content {
            Some(v @ (serde_json::Value::Array(_) | serde_json::Value::Object(_))) => v.to_string(),
            _ => "{}".to_string(),
        }
    }
}

pub static SECTION_TABLE: Table = Table {
    name: "homepage_sections",
    fields: &[
        Field::new("section_key", FieldKind::Slug),
        Field::new("title", FieldKind::OptText),
        Field::new("subtitle", FieldKind::OptText),
        Field::new("content", FieldKind::Json),
        Field::new("sort_order", FieldKind::Int),
        Field::new("is_active", FieldKind::Bool),
    ],
    timestamped: true,
};

impl HomepageSection {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(HomepageSection {
            id: row.get("id")?,
            section_key: row.get("section_key")?,
            title: row.get("title")?,
            subtitle: row.get("subtitle")?,
            content: row.get("content")?,
            sort_order: row.get("sort_order")?,
            is_active: row.get("is_active")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn find_by_id(pool: &DbPool, id: i64) -> StoreResult<Option<Self>> {
        let conn = pool.get()?;
        Ok(conn
            .query_row(
                "SELECT * FROM homepage_sections WHERE id = ?1",
                params![id],
                Self::from_row,
            )
            .optional()?)
    }

    pub fn list(pool: &DbPool, active_only: bool) -> StoreResult<Vec<Self>> {
        let conn = pool.get()?;
        let sql = if active_only {
            "SELECT * FROM homepage_sections WHERE is_active = 1 ORDER BY sort_order ASC, id ASC"
        } else {
            "SELECT * FROM homepage_sections ORDER BY sort_order ASC, id ASC"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map([], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn create(pool: &DbPool, form: &SectionForm) -> StoreResult<i64> {
        let conn = pool.get()?;
        conn.execute(
            "INSERT INTO homepage_sections (section_key, title, subtitle, content, sort_order, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                form.section_key,
                form.title,
                form.subtitle,
                form.content_text(),
                form.sort_order,
                form.is_active
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn delete(pool: &DbPool, id: i64) -> StoreResult<bool> {
        let conn = pool.get()?;
        Ok(conn.execute("DELETE FROM homepage_sections WHERE id = ?1", params![id])? > 0)
    }
}
