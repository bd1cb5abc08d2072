use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db::{DbPool, SqlFilter};
use crate::patch::{Field, FieldKind, Table};
use crate::store::StoreResult;

pub const CONTACT_STATUSES: &[&str] = &["new", "replied", "archived"];

/// A message left through the public contact form.
#[derive(Debug, Serialize, Clone)]
pub struct ContactSubmission {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
    pub is_read: bool,
    pub status: String,
    pub ip_address: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
    #[serde(skip)]
    pub ip_address: Option<String>,
}

pub static CONTACT_TABLE: Table = Table {
    name: "contact_forms",
    fields: &[
        Field::new("is_read", FieldKind::Bool),
        Field::new("status", FieldKind::OneOf(CONTACT_STATUSES)),
    ],
    timestamped: false,
};

impl ContactSubmission {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(ContactSubmission {
            id: row.get("id")?,
            name: row.get("name")?,
            email: row.get("email")?,
            subject: row.get("subject")?,
            message: row.get("message")?,
            is_read: row.get("is_read")?,
            status: row.get("status")?,
            ip_address: row.get("ip_address")?,
            created_at: row.get("created_at")?,
        })
    }

    pub fn find_by_id(pool: &DbPool, id: i64) -> StoreResult<Option<Self>> {
        let conn = pool.get()?;
        Ok(conn
            .query_row(
                "SELECT * FROM contact_forms WHERE id = ?1",
                params![id],
                Self::from_row,
            )
            .optional()?)
    }

    pub fn list(
        pool: &DbPool,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Self>> {
        let conn = pool.get()?;
        let mut filter = SqlFilter::new();
        if let Some(s) = status {
            filter.eq("status", s.to_string());
        }
        let page = filter.page_sql(limit, offset);
        let sql = format!(
            "SELECT * FROM contact_forms{} ORDER BY created_at DESC, id DESC{}",
            filter.where_sql(),
            page
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(filter.params().as_slice(), Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count(pool: &DbPool, status: Option<&str>) -> StoreResult<i64> {
        let conn = pool.get()?;
        let mut filter = SqlFilter::new();
        if let Some(s) = status {
            filter.eq("status", s.to_string());
        }
        let sql = format!("SELECT COUNT(*) FROM contact_forms{}", filter.where_sql());
        Ok(conn.query_row(&sql, filter.params().as_slice(), |row| row.get(0))?)
    }

    pub fn count_unread(pool: &DbPool) -> StoreResult<i64> {
        let conn = pool.get()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM contact_forms WHERE is_read = 0",
            [],
            |row| row.get(0),
        )?)
    }

    pub fn create(pool: &DbPool, form: &ContactForm) -> StoreResult<i64> {
        let conn = pool.get()?;
        conn.execute(
            "INSERT INTO contact_forms (name, email, subject, message, ip_address)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![form.name, form.email, form.subject, form.message, form.ip_address],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn mark_read(pool: &DbPool, id: i64) -> StoreResult<()> {
        let conn = pool.get()?;
        conn.execute(
            "UPDATE contact_forms SET is_read = 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    pub fn delete(pool: &DbPool, id: i64) -> StoreResult<bool> {
        let conn = pool.get()?;
        Ok(conn.execute("DELETE FROM contact_forms WHERE id = ?1", params![id])? > 0)
    }
}
