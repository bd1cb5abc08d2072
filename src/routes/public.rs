use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{created, ok, ok_msg, required, JsonResponse, Page, StatusResponse};
use crate::config::Config;
use crate::error::{ApiResult, AppError};
use crate::models::category::CATEGORY_TABLE;
use crate::models::comment::{CommentForm, CommentQuery};
use crate::models::contact::ContactForm;
use crate::models::newsletter::SubscribeForm;
use crate::models::ContentQuery;
use crate::patch::is_plausible_email;
use crate::rate_limit::{RateLimiter, HOUR};
use crate::security::auth::{hash_ip, ClientIp};
use crate::store::Store;

const PUBLISHED: &str = "published";
const MAX_NAME_LEN: usize = 100;
const MAX_MESSAGE_LEN: usize = 5000;
const MAX_COMMENTS: i64 = 500;

/// Trimmed, non-empty, at most `max` characters.
fn text_field(name: &str, value: &str, max: usize) -> ApiResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(format!("'{}' is required", name)));
    }
    if value.chars().count() > max {
        return Err(AppError::validation(format!(
            "'{}' must be at most {} characters",
            name, max
        )));
    }
    Ok(value.to_string())
}

fn email_field(value: &str) -> ApiResult<String> {
    let email = value.trim().to_lowercase();
    if !is_plausible_email(&email) {
        return Err(AppError::validation("A valid email address is required"));
    }
    Ok(email)
}

fn rate_limit(limiter: &RateLimiter, bucket: &str, ip: &str, per_hour: u64) -> ApiResult<()> {
    let key = format!("{}:{}", bucket, hash_ip(ip));
    if limiter.check_and_record(&key, per_hour.max(1), HOUR) {
        Ok(())
    } else {
        Err(AppError::RateLimit(
            "Too many submissions. Please try again later.".to_string(),
        ))
    }
}

// ── Content ──

#[get("/homepage")]
pub fn homepage(store: &State<Arc<dyn Store>>) -> JsonResponse {
    Ok(ok(store.section_list(true)?))
}

#[get("/posts?<category>&<page>&<per_page>")]
pub fn list_posts(
    store: &State<Arc<dyn Store>>,
    category: Option<i64>,
    page: Option<i64>,
    per_page: Option<i64>,
) -> JsonResponse {
    let page = Page::new(page, per_page);
    let query = ContentQuery {
        status: Some(PUBLISHED.to_string()),
        category_id: category,
        limit: page.per_page,
        offset: page.offset(),
        ..Default::default()
    };
    let posts = store.post_list(&query)?;
    let total = store.post_count(&query)?;
    Ok(page.respond(posts, total))
}

/// A published post with its approved comments.
#[get("/posts/<slug>")]
pub fn get_post(store: &State<Arc<dyn Store>>, slug: &str) -> JsonResponse {
    let post = store
        .post_find_by_slug(slug)?
        .filter(|p| p.status == PUBLISHED)
        .ok_or_else(|| AppError::not_found("Post"))?;
    let comments = store.comment_list(&CommentQuery {
        post_id: Some(post.id),
        status: Some("approved".to_string()),
        limit: MAX_COMMENTS,
        offset: 0,
    })?;
    Ok(ok(json!({ "post": post, "comments": comments })))
}

/// New comments wait for moderation.
#[post("/posts/<slug>/comments", data = "<form>")]
pub fn create_comment(
    store: &State<Arc<dyn Store>>,
    config: &State<Config>,
    limiter: &State<Arc<RateLimiter>>,
    client_ip: ClientIp,
    slug: &str,
    form: Json<CommentForm>,
) -> StatusResponse {
    let post = store
        .post_find_by_slug(slug)?
        .filter(|p| p.status == PUBLISHED)
        .ok_or_else(|| AppError::not_found("Post"))?;

    let mut form = form.into_inner();
    form.author_name = text_field("author_name", &form.author_name, MAX_NAME_LEN)?;
    form.author_email = email_field(&form.author_email)?;
    form.body = text_field("body", &form.body, MAX_MESSAGE_LEN)?;
    rate_limit(limiter, "comment", &client_ip.0, config.limits.comments_per_hour)?;

    form.post_id = post.id;
    let id = store.comment_create(&form)?;
    log::info!("comment {} received on post {}", id, post.id);
    Ok(created(
        json!({ "id": id, "status": "pending" }),
        "Comment submitted for moderation",
    ))
}

#[get("/projects?<category>&<featured>&<page>&<per_page>")]
pub fn list_projects(
    store: &State<Arc<dyn Store>>,
    category: Option<i64>,
    featured: Option<bool>,
    page: Option<i64>,
    per_page: Option<i64>,
) -> JsonResponse {
    let page = Page::new(page, per_page);
    let query = ContentQuery {
        status: Some(PUBLISHED.to_string()),
        category_id: category,
        featured,
        limit: page.per_page,
        offset: page.offset(),
        ..Default::default()
    };
    let projects = store.project_list(&query)?;
    let total = store.project_count(&query)?;
    Ok(page.respond(projects, total))
}

#[get("/projects/<slug>")]
pub fn get_project(store: &State<Arc<dyn Store>>, slug: &str) -> JsonResponse {
    let project = store
        .project_find_by_slug(slug)?
        .filter(|p| p.status == PUBLISHED)
        .ok_or_else(|| AppError::not_found("Project"))?;
    Ok(ok(project))
}

#[get("/categories?<kind>")]
pub fn list_categories(store: &State<Arc<dyn Store>>, kind: Option<String>) -> JsonResponse {
    let kind = kind
        .map(|k| required(&CATEGORY_TABLE, "kind", &k))
        .transpose()?;
    Ok(ok(store.category_list(kind.as_deref())?))
}

#[get("/services")]
pub fn list_services(store: &State<Arc<dyn Store>>) -> JsonResponse {
    Ok(ok(store.service_list(true)?))
}

// ── Submissions ──

#[post("/contact", data = "<form>")]
pub fn contact(
    store: &State<Arc<dyn Store>>,
    config: &State<Config>,
    limiter: &State<Arc<RateLimiter>>,
    client_ip: ClientIp,
    form: Json<ContactForm>,
) -> StatusResponse {
    let mut form = form.into_inner();
    form.name = text_field("name", &form.name, MAX_NAME_LEN)?;
    form.email = email_field(&form.email)?;
    form.subject = match form.subject.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => Some(text_field("subject", s, 200)?),
        _ => None,
    };
    form.message = text_field("message", &form.message, MAX_MESSAGE_LEN)?;
    rate_limit(limiter, "contact", &client_ip.0, config.limits.contact_per_hour)?;

    form.ip_address = Some(client_ip.0.clone());
    let id = store.contact_create(&form)?;
    log::info!("contact submission {} received", id);
    Ok(created(json!({ "id": id }), "Thanks, your message has been sent"))
}

#[post("/newsletter/subscribe", data = "<form>")]
pub fn subscribe(
    store: &State<Arc<dyn Store>>,
    config: &State<Config>,
    limiter: &State<Arc<RateLimiter>>,
    client_ip: ClientIp,
    form: Json<SubscribeForm>,
) -> JsonResponse {
    let email = email_field(&form.email)?;
    let name = match form.name.as_deref().map(str::trim) {
        Some(n) if !n.is_empty() => Some(text_field("name", n, MAX_NAME_LEN)?),
        _ => None,
    };
    rate_limit(limiter, "subscribe", &client_ip.0, config.limits.subscribe_per_hour)?;

    store.newsletter_subscribe(&email, name.as_deref())?;
    Ok(ok_msg(json!({ "email": email }), "Subscribed"))
}

/// Answers the same way whether or not the address was subscribed.
#[post("/newsletter/unsubscribe", data = "<form>")]
pub fn unsubscribe(store: &State<Arc<dyn Store>>, form: Json<SubscribeForm>) -> JsonResponse {
    let email = email_field(&form.email)?;
    if !store.newsletter_unsubscribe(&email)? {
        log::debug!("unsubscribe for unknown address");
    }
    Ok(ok_msg(json!({ "email": email }), "Unsubscribed"))
}

#[get("/health")]
pub fn health(store: &State<Arc<dyn Store>>) -> (Status, Json<Value>) {
    match store.ping() {
        Ok(()) => (
            Status::Ok,
            ok(json!({ "status": "ok", "backend": store.backend_name() })),
        ),
        Err(e) => {
            log::error!("health check failed: {}", e);
            (
                Status::ServiceUnavailable,
                Json(json!({
                    "success": false,
                    "error": "Database unavailable",
                    "code": "UNAVAILABLE",
                })),
            )
        }
    }
}

pub fn routes() -> Vec<rocket::Route> {
    routes![
        homepage,
        list_posts,
        get_post,
        create_comment,
        list_projects,
        get_project,
        list_categories,
        list_services,
        contact,
        subscribe,
        unsubscribe,
        health
    ]
}
