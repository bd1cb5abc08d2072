use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;
use crate::models::json_text;
use crate::patch::{Field, FieldKind, Table};
use crate::store::StoreResult;

#[derive(Debug, Serialize, Clone)]
pub struct Service {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub price: Option<String>,
    #[serde(serialize_with = "json_text")]
    pub features: String,
    pub sort_order: i64,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceForm {
    pub title: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub price: Option<String>,
    pub features: Option<serde_json::Value>,
    pub sort_order: i64,
    pub is_active: bool,
}

impl Default for ServiceForm {
    fn default() -> Self {
        ServiceForm {
            title: String::new(),
            description: None,
            icon: None,
            price: None,
            features: None,
            sort_order: 0,
            is_active: true,
        }
    }
}

impl ServiceForm {
    pub fn features_text(&self) -> String {
        match &self.features {
            Some(v @ (serde_json::Value::Array(_) | serde_json::Value::Object(_))) => v.to_string(),
            _ => "[]".to_string(),
        }
    }
}

pub static SERVICE_TABLE: Table = Table {
    name: "services",
    fields: &[
        Field::new("title", FieldKind::Text),
        Field::new("description", FieldKind::OptText),
        Field::new("icon", FieldKind::OptText),
        Field::new("price", FieldKind::OptText),
        Field::new("features", FieldKind::Json),
        Field::new("sort_order", FieldKind::Int),
        Field::new("is_active", FieldKind::Bool),
    ],
    timestamped: true,
};

impl Service {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Service {
            id: row.get("id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            icon: row.get("icon")?,
            price: row.get("price")?,
            features: row.get("features")?,
            sort_order: row.get("sort_order")?,
            is_active: row.get("is_active")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn find_by_id(pool: &DbPool, id: i64) -> StoreResult<Option<Self>> {
        let conn = pool.get()?;
        Ok(conn
            .query_row("SELECT * FROM services WHERE id = ?1", params![id], Self::from_row)
            .optional()?)
    }

    pub fn list(pool: &DbPool, active_only: bool) -> StoreResult<Vec<Self>> {
        let conn = pool.get()?;
        let sql = if active_only {
            "SELECT * FROM services WHERE is_active = 1 ORDER BY sort_order ASC, id ASC"
        } else {
            "SELECT * FROM services ORDER BY sort_order ASC, id ASC"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map([], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn create(pool: &DbPool, form: &ServiceForm) -> StoreResult<i64> {
        let conn = pool.get()?;
        conn.execute(
            "INSERT INTO services (title, description, icon, price, features, sort_order, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                form.title,
                form.description,
                form.icon,
                form.price,
                form.features_text(),
                form.sort_order,
                form.is_active
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn delete(pool: &DbPool, id: i64) -> StoreResult<bool> {
        let conn = pool.get()?;
        Ok(conn.execute("DELETE FROM services WHERE id = ?1", params![id])? > 0)
    }
}
