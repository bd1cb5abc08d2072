use rusqlite::params;
use serde::Serialize;

use crate::db::{DbPool, SqlFilter};
use crate::models::days_ago;
use crate::models::json_text_opt;
use crate::models::user::User;
use crate::store::StoreResult;

/// One audit-trail row.
#[derive(Debug, Serialize, Clone)]
pub struct ActivityEntry {
    pub id: i64,
    pub user_id: Option<i64>,
    pub user_name: Option<String>,
    pub action: String,
    pub table_name: Option<String>,
    pub record_id: Option<i64>,
    /// JSON snapshot of the changed values
    #[serde(serialize_with = "json_text_opt")]
    pub changes: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: String,
}

/// Builder for an activity row: `NewActivity::by(&user, "update").on("posts", id)`.
#[derive(Debug, Clone, Default)]
pub struct NewActivity {
    pub user_id: Option<i64>,
    pub user_name: Option<String>,
    pub action: String,
    pub table_name: Option<String>,
    pub record_id: Option<i64>,
    pub changes: Option<serde_json::Value>,
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ActivityQuery {
    pub action: Option<String>,
    pub table_name: Option<String>,
    pub user_id: Option<i64>,
    pub limit: i64,
    pub offset: i64,
}

impl NewActivity {
    pub fn by(user: &User, action: &str) -> Self {
        NewActivity {
            user_id: Some(user.id),
            user_name: Some(user.name.clone()),
            action: action.to_string(),
            ..Default::default()
        }
    }

    pub fn on(mut self, table_name: &str, record_id: i64) -> Self {
        self.table_name = Some(table_name.to_string());
        self.record_id = Some(record_id);
        self
    }

    pub fn changes(mut self, changes: serde_json::Value) -> Self {
        self.changes = Some(changes);
        self
    }

    pub fn from_ip(mut self, ip: &str) -> Self {
        self.ip_address = Some(ip.to_string());
        self
    }

    pub fn changes_text(&self) -> Option<String> {
        self.changes.as_ref().map(|c| c.to_string())
    }
}

fn query_filter(query: &ActivityQuery) -> SqlFilter {
    let mut filter = SqlFilter::new();
    if let Some(ref a) = query.action {
        filter.eq("action", a.clone());
    }
    if let Some(ref t) = query.table_name {
        filter.eq("table_name", t.clone());
    }
    if let Some(u) = query.user_id {
        filter.eq("user_id", u);
    }
    filter
}

impl ActivityEntry {
    pub fn record(pool: &DbPool, entry: &NewActivity) -> StoreResult<i64> {
        let conn = pool.get()?;
        conn.execute(
            "INSERT INTO activity_log (user_id, user_name, action, table_name, record_id, changes, ip_address)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.user_id,
                entry.user_name,
                entry.action,
                entry.table_name,
                entry.record_id,
                entry.changes_text(),
                entry.ip_address
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list(pool: &DbPool, query: &ActivityQuery) -> StoreResult<Vec<Self>> {
        let conn = pool.get()?;
        let mut filter = query_filter(query);
        let page = filter.page_sql(query.limit, query.offset);
        let sql = format!(
            "SELECT * FROM activity_log{} ORDER BY created_at DESC, id DESC{}",
            filter.where_sql(),
            page
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(filter.params().as_slice(), |row| {
                Ok(ActivityEntry {
                    id: row.get("id")?,
                    user_id: row.get("user_id")?,
                    user_name: row.get("user_name")?,
                    action: row.get("action")?,
                    table_name: row.get("table_name")?,
                    record_id: row.get("record_id")?,
                    changes: row.get("changes")?,
                    ip_address: row.get("ip_address")?,
                    created_at: row.get("created_at")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count(pool: &DbPool, query: &ActivityQuery) -> StoreResult<i64> {
        let conn = pool.get()?;
        let filter = query_filter(query);
        let sql = format!("SELECT COUNT(*) FROM activity_log{}", filter.where_sql());
        Ok(conn.query_row(&sql, filter.params().as_slice(), |row| row.get(0))?)
    }

    pub fn cleanup(pool: &DbPool, max_age_days: i64) -> StoreResult<usize> {
        let conn = pool.get()?;
        Ok(conn.execute(
            "DELETE FROM activity_log WHERE created_at < ?1",
            params![days_ago(max_age_days)],
        )?)
    }
}
