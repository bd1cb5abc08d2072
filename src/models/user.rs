use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use crate::db::{DbPool, SqlFilter};
use crate::patch::{Field, FieldKind, Table};
use crate::security::roles::{Role, ROLE_NAMES};
use crate::store::StoreResult;

#[derive(Debug, Serialize, Clone)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub last_login_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// What a resolved session exposes about its user.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SessionUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
}

/// Columns an admin may change. Passwords go through `user_set_password`.
pub static USER_TABLE: Table = Table {
    name: "users",
    fields: &[
        Field::new("name", FieldKind::Text),
        Field::new("email", FieldKind::Email),
        Field::new("role", FieldKind::OneOf(ROLE_NAMES)),
        Field::new("is_active", FieldKind::Bool),
    ],
    timestamped: true,
};

/// Stored role strings that no longer parse are treated as the lowest role.
pub fn role_from_stored(raw: &str) -> Role {
    raw.parse().unwrap_or_else(|_| {
        log::warn!("unknown stored role '{}', treating as subscriber", raw);
        Role::Subscriber
    })
}

impl User {
    pub fn session(&self) -> SessionUser {
        SessionUser {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub(crate) fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let role: String = row.get(4)?;
        Ok(User {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            role: role_from_stored(&role),
            is_active: row.get(5)?,
            last_login_at: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    pub(crate) const SELECT_COLS: &'static str =
        "id, name, email, password_hash, role, is_active, last_login_at, created_at, updated_at";

    // ── Lookups ──

    pub fn get_by_id(pool: &DbPool, id: i64) -> StoreResult<Option<User>> {
        let conn = pool.get()?;
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", Self::SELECT_COLS),
                params![id],
                Self::from_row,
            )
            .optional()?)
    }

    pub fn get_by_email(pool: &DbPool, email: &str) -> StoreResult<Option<User>> {
        let conn = pool.get()?;
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {} FROM users WHERE email = ?1 COLLATE NOCASE",
                    Self::SELECT_COLS
                ),
                params![email],
                Self::from_row,
            )
            .optional()?)
    }

    pub fn list(pool: &DbPool, role: Option<Role>, limit: i64, offset: i64) -> StoreResult<Vec<User>> {
        let conn = pool.get()?;
        let mut filter = SqlFilter::new();
        if let Some(r) = role {
            filter.eq("role", r.as_str());
        }
        let page = filter.page_sql(limit, offset);
        let sql = format!(
            "SELECT {} FROM users{} ORDER BY id ASC{}",
            Self::SELECT_COLS,
            filter.where_sql(),
            page
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(filter.params().as_slice(), Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count(pool: &DbPool, role: Option<Role>) -> StoreResult<i64> {
        let conn = pool.get()?;
        let mut filter = SqlFilter::new();
        if let Some(r) = role {
            filter.eq("role", r.as_str());
        }
        let sql = format!("SELECT COUNT(*) FROM users{}", filter.where_sql());
        Ok(conn.query_row(&sql, filter.params().as_slice(), |row| row.get(0))?)
    }

    pub fn count_active_admins(pool: &DbPool) -> StoreResult<i64> {
        let conn = pool.get()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM users WHERE role = 'admin' AND is_active = 1",
            [],
            |row| row.get(0),
        )?)
    }

    // ── Mutations ──

    pub fn create(pool: &DbPool, user: &NewUser) -> StoreResult<i64> {
        let conn = pool.get()?;
        conn.execute(
            "INSERT INTO users (name, email, password_hash, role, is_active) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.name,
                user.email,
                user.password_hash,
                user.role.as_str(),
                user.is_active
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn set_password(pool: &DbPool, id: i64, password_hash: &str) -> StoreResult<()> {
        let conn = pool.get()?;
        conn.execute(
            "UPDATE users SET password_hash = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
            params![password_hash, id],
        )?;
        Ok(())
    }

    pub fn touch_last_login(pool: &DbPool, id: i64) -> StoreResult<()> {
        let conn = pool.get()?;
        conn.execute(
            "UPDATE users SET last_login_at = CURRENT_TIMESTAMP WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    pub fn delete(pool: &DbPool, id: i64) -> StoreResult<bool> {
        let conn = pool.get()?;
        Ok(conn.execute("DELETE FROM users WHERE id = ?1", params![id])? > 0)
    }
}
