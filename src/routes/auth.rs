use rocket::http::CookieJar;
use rocket::serde::json::Json;
use rocket::State;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::{ok, ok_msg, JsonResponse};
use crate::activity;
use crate::config::Config;
use crate::error::AppError;
use crate::models::activity::NewActivity;
use crate::rate_limit::{RateLimiter, LOGIN_WINDOW};
use crate::security::auth::{self, AuthenticatedUser, ClientIp, UserAgent};
use crate::store::Store;

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[post("/login", data = "<form>")]
pub fn login(
    form: Json<LoginForm>,
    store: &State<Arc<dyn Store>>,
    config: &State<Config>,
    limiter: &State<Arc<RateLimiter>>,
    cookies: &CookieJar<'_>,
    client_ip: ClientIp,
    user_agent: UserAgent,
) -> JsonResponse {
    let email = form.email.trim().to_lowercase();
    if email.is_empty() || form.password.is_empty() {
        return Err(AppError::validation("Email and password are required"));
    }

    let rate_key = format!("login:{}", auth::hash_ip(&client_ip.0));
    if !limiter.check_and_record(&rate_key, config.auth.login_rate_limit.max(1), LOGIN_WINDOW) {
        log::warn!("login rate limit hit for {}", client_ip.0);
        return Err(AppError::RateLimit(
            "Too many login attempts. Please try again later.".to_string(),
        ));
    }

    let user = match store.user_get_by_email(&email)? {
        Some(u) if u.is_active && auth::verify_password(&form.password, &u.password_hash) => u,
        _ => {
            return Err(AppError::Authentication(
                "Invalid email or password".to_string(),
            ))
        }
    };

    let token = auth::create_session(
        store.inner().as_ref(),
        &config.auth,
        user.id,
        Some(&client_ip.0),
        user_agent.0.as_deref(),
    )?;
    auth::set_session_cookie(cookies, &token, &config.auth);
    limiter.reset(&rate_key);
    if let Err(e) = store.user_touch_last_login(user.id) {
        log::warn!("failed to update last_login_at for user {}: {}", user.id, e);
    }
    activity::record(
        store.inner().as_ref(),
        NewActivity::by(&user, "login")
            .on("users", user.id)
            .from_ip(&client_ip.0),
    );
    log::info!("user {} logged in", user.id);

    Ok(ok_msg(user.session(), "Logged in"))
}

#[post("/logout")]
pub fn logout(store: &State<Arc<dyn Store>>, cookies: &CookieJar<'_>) -> JsonResponse {
    if let Some(token) = auth::session_token(cookies) {
        store.session_delete(&token)?;
    }
    auth::clear_session_cookie(cookies);
    Ok(ok_msg(json!(null), "Logged out"))
}

#[get("/session")]
pub fn session(current: AuthenticatedUser) -> JsonResponse {
    Ok(ok(current.user.session()))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![login, logout, session]
}
