use chrono::Duration;
use rand::RngCore;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::request::{FromRequest, Outcome, Request};
use rocket::State;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::config::AuthConfig;
use crate::error::{ApiResult, AppError};
use crate::models::session::NewSession;
use crate::models::timestamp_from_now;
use crate::models::user::User;
use crate::security::roles::{Permission, Role};
use crate::store::{Store, StoreResult};

pub const SESSION_COOKIE: &str = "folio_session";

// ── Client IP request guard ──

/// Extracts the real client IP from the request.
/// Checks headers in priority order:
///   1. CF-Connecting-IP (Cloudflare)
///   2. True-Client-IP (Cloudflare Enterprise / Akamai)
///   3. X-Real-IP (nginx proxy_set_header)
///   4. X-Forwarded-For (first IP in the chain)
///   5. Rocket's client_ip() (socket peer address)
pub struct ClientIp(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIp {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(ClientIp(client_ip(request)))
    }
}

pub fn client_ip(request: &Request<'_>) -> String {
    let headers = request.headers();
    for name in ["CF-Connecting-IP", "True-Client-IP", "X-Real-IP"] {
        if let Some(ip) = headers.get_one(name) {
            let ip = ip.trim();
            if !ip.is_empty() {
                return ip.to_string();
            }
        }
    }

    // X-Forwarded-For: client, proxy1, proxy2
    if let Some(forwarded) = headers.get_one("X-Forwarded-For") {
        if let Some(ip) = forwarded.split(',').next() {
            let ip = ip.trim();
            if !ip.is_empty() {
                return ip.to_string();
            }
        }
    }

    request
        .client_ip()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// The request's User-Agent header, if any.
pub struct UserAgent(pub Option<String>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for UserAgent {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let ua = request
            .headers()
            .get_one("User-Agent")
            .map(|s| s.chars().take(512).collect());
        Outcome::Success(UserAgent(ua))
    }
}

// ── Authenticated user guard (any active user with a valid session) ──

/// Guard: any authenticated user with an active account.
pub struct AuthenticatedUser {
    pub user: User,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthenticatedUser {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match resolve_session_user(request).await {
            Some(user) => Outcome::Success(AuthenticatedUser { user }),
            None => Outcome::Forward(Status::Unauthorized),
        }
    }
}

// ── Role-specific guards ──

/// Guard: requires role = admin
pub struct AdminUser {
    pub user: User,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminUser {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        with_role(request, Role::Admin)
            .await
            .map(|user| AdminUser { user })
    }
}

/// Guard: requires role = admin or editor
pub struct EditorUser {
    pub user: User,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for EditorUser {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        with_role(request, Role::Editor)
            .await
            .map(|user| EditorUser { user })
    }
}

/// Guard: requires role = admin, editor, or author
pub struct AuthorUser {
    pub user: User,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthorUser {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        with_role(request, Role::Author)
            .await
            .map(|user| AuthorUser { user })
    }
}

// ── Shared session resolution ──

/// 401 without a live session, 403 when the role ranks below `minimum`.
async fn with_role(request: &Request<'_>, minimum: Role) -> Outcome<User, ()> {
    match resolve_session_user(request).await {
        Some(user) if user.role.at_least(minimum) => Outcome::Success(user),
        Some(_) => Outcome::Forward(Status::Forbidden),
        None => Outcome::Forward(Status::Unauthorized),
    }
}

async fn resolve_session_user(request: &Request<'_>) -> Option<User> {
    let store = request
        .guard::<&State<Arc<dyn Store>>>()
        .await
        .succeeded()?;
    let cookies = request.cookies();
    let token = cookies.get_private(SESSION_COOKIE)?.value().to_string();

    match store.session_get_user(&token) {
        Ok(Some(user)) if user.is_active => Some(user),
        Ok(_) => {
            cookies.remove_private(Cookie::from(SESSION_COOKIE));
            None
        }
        Err(e) => {
            log::error!("session lookup failed: {}", e);
            None
        }
    }
}

// ── Authorization helpers ──

pub fn require(user: &User, permission: Permission) -> ApiResult<()> {
    if user.role.permits(permission) {
        Ok(())
    } else {
        Err(AppError::forbidden("You do not have permission to do that"))
    }
}

/// Authors may only touch content they own; editors and admins may touch any.
pub fn ensure_can_edit(user: &User, owner_id: Option<i64>) -> ApiResult<()> {
    if user.role.permits(Permission::WriteAnyContent) || owner_id == Some(user.id) {
        Ok(())
    } else {
        Err(AppError::forbidden("You can only modify your own content"))
    }
}

/// Setting status to `published` needs the publish permission.
pub fn ensure_can_set_status(user: &User, status: Option<&str>) -> ApiResult<()> {
    match status {
        Some("published") => require(user, Permission::Publish),
        _ => Ok(()),
    }
}

// ── Password utilities ──

pub fn hash_password(password: &str, cost: u32) -> Result<String, String> {
    bcrypt::hash(password, cost).map_err(|e| e.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

// ── Session management ──

/// 32 random bytes, hex encoded.
pub fn new_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn create_session(
    store: &dyn Store,
    config: &AuthConfig,
    user_id: i64,
    ip: Option<&str>,
    ua: Option<&str>,
) -> StoreResult<String> {
    let token = new_session_token();
    store.session_create(&NewSession {
        id: token.clone(),
        user_id,
        expires_at: timestamp_from_now(Duration::days(config.session_days.max(1))),
        ip_address: ip.map(|s| s.to_string()),
        user_agent: ua.map(|s| s.to_string()),
    })?;
    Ok(token)
}

/// Set the session cookie: private, httpOnly, SameSite=Lax, expiring with the session row.
pub fn set_session_cookie(cookies: &CookieJar<'_>, token: &str, config: &AuthConfig) {
    let mut cookie = Cookie::new(SESSION_COOKIE, token.to_string());
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_path("/");
    cookie.set_max_age(rocket::time::Duration::days(config.session_days.max(1)));
    if config.secure_cookie {
        cookie.set_secure(true);
    }
    cookies.add_private(cookie);
}

pub fn session_token(cookies: &CookieJar<'_>) -> Option<String> {
    cookies
        .get_private(SESSION_COOKIE)
        .map(|c| c.value().to_string())
}

pub fn clear_session_cookie(cookies: &CookieJar<'_>) {
    cookies.remove_private(Cookie::from(SESSION_COOKIE));
}

pub fn hash_ip(ip: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, role: Role) -> User {
        User {
            id,
            name: "u".to_string(),
            email: "u@example.com".to_string(),
            password_hash: String::new(),
            role,
            is_active: true,
            last_login_at: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn authors_edit_only_their_own_content() {
        let author = user(7, Role::Author);
        assert!(ensure_can_edit(&author, Some(7)).is_ok());
        assert!(ensure_can_edit(&author, Some(8)).is_err());
        assert!(ensure_can_edit(&author, None).is_err());
        assert!(ensure_can_edit(&user(1, Role::Editor), Some(8)).is_ok());
    }

    #[test]
    fn only_editors_publish() {
        assert!(ensure_can_set_status(&user(1, Role::Author), Some("draft")).is_ok());
        assert!(ensure_can_set_status(&user(1, Role::Author), Some("published")).is_err());
        assert!(ensure_can_set_status(&user(1, Role::Editor), Some("published")).is_ok());
    }

    #[test]
    fn session_tokens_are_random_hex() {
        let a = new_session_token();
        let b = new_session_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn passwords_round_trip_through_bcrypt() {
        let hash = hash_password("correct horse", 4).unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("anything", "not-a-hash"));
    }

    #[test]
    fn ip_hash_is_stable() {
        assert_eq!(hash_ip("127.0.0.1"), hash_ip("127.0.0.1"));
        assert_ne!(hash_ip("127.0.0.1"), hash_ip("127.0.0.2"));
    }
}
