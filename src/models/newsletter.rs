use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db::{DbPool, SqlFilter};
use crate::store::StoreResult;

pub const SUBSCRIPTION_STATUSES: &[&str] = &["subscribed", "unsubscribed"];

#[derive(Debug, Serialize, Clone)]
pub struct NewsletterSubscription {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SubscribeForm {
    pub email: String,
    pub name: Option<String>,
}

fn status_filter(status: Option<&str>) -> SqlFilter {
    let mut filter = SqlFilter::new();
    if let Some(s) = status {
        filter.eq("status", s.to_string());
    }
    filter
}

impl NewsletterSubscription {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(NewsletterSubscription {
            id: row.get("id")?,
            email: row.get("email")?,
            name: row.get("name")?,
            status: row.get("status")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn find_by_email(pool: &DbPool, email: &str) -> StoreResult<Option<Self>> {
        let conn = pool.get()?;
        Ok(conn
            .query_row(
                "SELECT * FROM newsletter_subscriptions WHERE email = ?1",
                params![email],
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
        let mut filter = status_filter(status);
        let page = filter.page_sql(limit, offset);
        let sql = format!(
            "SELECT * FROM newsletter_subscriptions{} ORDER BY created_at DESC, id DESC{}",
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
        let filter = status_filter(status);
        let sql = format!(
            "SELECT COUNT(*) FROM newsletter_subscriptions{}",
            filter.where_sql()
        );
        Ok(conn.query_row(&sql, filter.params().as_slice(), |row| row.get(0))?)
    }

    pub fn subscribe(pool: &DbPool, email: &str, name: Option<&str>) -> StoreResult<()> {
        let conn = pool.get()?;
        conn.execute(
            "INSERT INTO newsletter_subscriptions (email, name, status) VALUES (?1, ?2, 'subscribed')
             ON CONFLICT(email) DO UPDATE SET
                status = 'subscribed',
                name = COALESCE(excluded.name, newsletter_subscriptions.name),
                updated_at = CURRENT_TIMESTAMP",
            params![email, name],
        )?;
        Ok(())
    }

    pub fn unsubscribe(pool: &DbPool, email: &str) -> StoreResult<bool> {
        let conn = pool.get()?;
        let changed = conn.execute(
            "UPDATE newsletter_subscriptions SET status = 'unsubscribed', updated_at = CURRENT_TIMESTAMP
             WHERE email = ?1",
            params![email],
        )?;
        Ok(changed > 0)
    }

    pub fn delete(pool: &DbPool, id: i64) -> StoreResult<bool> {
        let conn = pool.get()?;
        Ok(conn.execute(
            "DELETE FROM newsletter_subscriptions WHERE id = ?1",
            params![id],
        )? > 0)
    }
}
