use rusqlite::{params, OptionalExtension};

use crate::db::DbPool;
use crate::models::now_timestamp;
use crate::models::user::User;
use crate::store::StoreResult;

/// A login session row. `id` is the opaque token carried by the session cookie.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: String,
    pub user_id: i64,
    pub expires_at: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

pub fn create(pool: &DbPool, session: &NewSession) -> StoreResult<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO sessions (id, user_id, created_at, expires_at, ip_address, user_agent)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            session.id,
            session.user_id,
            now_timestamp(),
            session.expires_at,
            session.ip_address,
            session.user_agent
        ],
    )?;
    Ok(())
}

/// Resolve token -> user in one query; expired sessions never match.
pub fn get_user(pool: &DbPool, token: &str) -> StoreResult<Option<User>> {
    let conn = pool.get()?;
    let cols = User::SELECT_COLS
        .split(", ")
        .map(|c| format!("u.{}", c))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(conn
        .query_row(
            &format!(
                "SELECT {} FROM sessions s JOIN users u ON u.id = s.user_id
                 WHERE s.id = ?1 AND s.expires_at > ?2",
                cols
            ),
            params![token, now_timestamp()],
            User::from_row,
        )
        .optional()?)
}

pub fn delete(pool: &DbPool, token: &str) -> StoreResult<()> {
    let conn = pool.get()?;
    conn.execute("DELETE FROM sessions WHERE id = ?1", params![token])?;
    Ok(())
}

pub fn delete_for_user(pool: &DbPool, user_id: i64) -> StoreResult<usize> {
    let conn = pool.get()?;
    Ok(conn.execute("DELETE FROM sessions WHERE user_id = ?1", params![user_id])?)
}

pub fn cleanup_expired(pool: &DbPool) -> StoreResult<usize> {
    let conn = pool.get()?;
    Ok(conn.execute(
        "DELETE FROM sessions WHERE expires_at <= ?1",
        params![now_timestamp()],
    )?)
}
