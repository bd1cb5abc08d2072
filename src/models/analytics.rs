use chrono::{Duration, NaiveDate, Utc};
use rusqlite::params;
use serde::Serialize;

use crate::db::DbPool;
use crate::models::days_ago;
use crate::store::StoreResult;

#[derive(Debug, Clone)]
pub struct NewPageView {
    pub path: String,
    pub referrer: Option<String>,
    pub ip_hash: String,
    pub user_agent: Option<String>,
}

#[derive(Debug, Serialize, Default, PartialEq)]
pub struct OverviewStats {
    pub total_views: i64,
    pub unique_visitors: i64,
    pub posts_count: i64,
    pub projects_count: i64,
    pub comments_pending: i64,
    pub unread_messages: i64,
    pub subscribers: i64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct CountEntry {
    pub label: String,
    pub count: i64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct DailyCount {
    pub date: String,
    pub count: i64,
}

/// Inclusive date window, stored as timestamp bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct DateRange {
    pub from: String,
    pub to: String,
}

impl DateRange {
    /// Parse `YYYY-MM-DD` bounds; missing bounds default to the last 30 days.
    pub fn parse(from: Option<&str>, to: Option<&str>) -> Result<DateRange, String> {
        let today = Utc::now().date_naive();
        let parse = |raw: &str| {
            NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map_err(|_| format!("invalid date '{}', expected YYYY-MM-DD", raw))
        };
        let to_date = match to {
            Some(raw) => parse(raw)?,
            None => today,
        };
        let from_date = match from {
            Some(raw) => parse(raw)?,
            None => to_date - Duration::days(29),
        };
        if from_date > to_date {
            return Err("'from' must not be after 'to'".to_string());
        }
        Ok(DateRange {
            from: format!("{} 00:00:00", from_date.format("%Y-%m-%d")),
            to: format!("{} 23:59:59", to_date.format("%Y-%m-%d")),
        })
    }
}

pub fn record(pool: &DbPool, view: &NewPageView) -> StoreResult<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO page_views (path, referrer, ip_hash, user_agent) VALUES (?1, ?2, ?3, ?4)",
        params![view.path, view.referrer, view.ip_hash, view.user_agent],
    )?;
    Ok(())
}

pub fn overview(pool: &DbPool, range: &DateRange) -> StoreResult<OverviewStats> {
    let conn = pool.get()?;
    let count = |sql: &str| -> rusqlite::Result<i64> { conn.query_row(sql, [], |row| row.get(0)) };

    let total_views: i64 = conn.query_row(
        "SELECT COUNT(*) FROM page_views WHERE created_at BETWEEN ?1 AND ?2",
        params![range.from, range.to],
        |row| row.get(0),
    )?;
    let unique_visitors: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT ip_hash) FROM page_views WHERE created_at BETWEEN ?1 AND ?2",
        params![range.from, range.to],
        |row| row.get(0),
    )?;

    Ok(OverviewStats {
        total_views,
        unique_visitors,
        posts_count: count("SELECT COUNT(*) FROM posts")?,
        projects_count: count("SELECT COUNT(*) FROM projects")?,
        comments_pending: count("SELECT COUNT(*) FROM comments WHERE status = 'pending'")?,
        unread_messages: count("SELECT COUNT(*) FROM contact_forms WHERE is_read = 0")?,
        subscribers: count(
            "SELECT COUNT(*) FROM newsletter_subscriptions WHERE status = 'subscribed'",
        )?,
    })
}

pub fn top_paths(pool: &DbPool, range: &DateRange, limit: i64) -> StoreResult<Vec<CountEntry>> {
    top_by(pool, "path", range, limit)
}

pub fn top_referrers(pool: &DbPool, range: &DateRange, limit: i64) -> StoreResult<Vec<CountEntry>> {
    top_by(pool, "referrer", range, limit)
}

/// `column` is one of the fixed names above, never user input.
fn top_by(pool: &DbPool, column: &str, range: &DateRange, limit: i64) -> StoreResult<Vec<CountEntry>> {
    let conn = pool.get()?;
    let sql = format!(
        "SELECT {col} AS label, COUNT(*) AS c FROM page_views
         WHERE created_at BETWEEN ?1 AND ?2 AND {col} IS NOT NULL AND {col} != ''
         GROUP BY {col} ORDER BY c DESC, label ASC LIMIT ?3",
        col = column
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![range.from, range.to, limit], |row| {
            Ok(CountEntry {
                label: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn daily(pool: &DbPool, range: &DateRange) -> StoreResult<Vec<DailyCount>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT substr(created_at, 1, 10) AS day, COUNT(*) FROM page_views
         WHERE created_at BETWEEN ?1 AND ?2
         GROUP BY day ORDER BY day ASC",
    )?;
    let rows = stmt
        .query_map(params![range.from, range.to], |row| {
            Ok(DailyCount {
                date: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn prune(pool: &DbPool, max_age_days: i64) -> StoreResult<usize> {
    let conn = pool.get()?;
    Ok(conn.execute(
        "DELETE FROM page_views WHERE created_at < ?1",
        params![days_ago(max_age_days)],
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_range_covers_whole_days() {
        let range = DateRange::parse(Some("2024-01-01"), Some("2024-01-31")).unwrap();
        assert_eq!(range.from, "2024-01-01 00:00:00");
        assert_eq!(range.to, "2024-01-31 23:59:59");
    }

    #[test]
    fn default_range_is_thirty_days() {
        let range = DateRange::parse(None, Some("2024-03-30")).unwrap();
        assert_eq!(range.from, "2024-03-01 00:00:00");
    }

    #[test]
    fn bad_ranges_are_rejected() {
        assert!(DateRange::parse(Some("yesterday"), None).is_err());
        assert!(DateRange::parse(Some("2024-02-01"), Some("2024-01-01")).is_err());
    }
}
