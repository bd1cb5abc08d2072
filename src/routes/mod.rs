use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::Request;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{ApiResult, AppError};
use crate::patch::Table;
use crate::store::Store;

pub mod admin;
pub mod auth;
pub mod public;

pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 100;
/// Pages past this are clamped; no listing comes near it.
pub const MAX_PAGE: i64 = 1_000_000;

/// JSON body of every successful response.
pub type JsonResponse = ApiResult<Json<Value>>;
/// Same, with an explicit status (201 on create).
pub type StatusResponse = ApiResult<(Status, Json<Value>)>;

// ── Envelope ──

pub fn ok<T: Serialize>(data: T) -> Json<Value> {
    Json(json!({ "success": true, "data": data }))
}

pub fn ok_msg<T: Serialize>(data: T, message: &str) -> Json<Value> {
    Json(json!({ "success": true, "data": data, "message": message }))
}

pub fn created<T: Serialize>(data: T, message: &str) -> (Status, Json<Value>) {
    (Status::Created, ok_msg(data, message))
}

/// `?page=&per_page=` with bounds applied.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: i64,
    pub per_page: i64,
}

impl Page {
    pub fn new(page: Option<i64>, per_page: Option<i64>) -> Self {
        Page {
            page: page.unwrap_or(1).clamp(1, MAX_PAGE),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }

    /// List envelope with a `pagination` block.
    pub fn respond<T: Serialize>(&self, items: Vec<T>, total: i64) -> Json<Value> {
        let total_pages = (total + self.per_page - 1) / self.per_page;
        Json(json!({
            "success": true,
            "data": items,
            "pagination": {
                "page": self.page,
                "per_page": self.per_page,
                "total": total,
                "total_pages": total_pages,
            }
        }))
    }
}

// ── Validation helpers shared by handlers ──

/// Run a required string through `table`'s rules for `name`.
pub(crate) fn required(table: &Table, name: &str, value: &str) -> ApiResult<String> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("'{}' is required", name)));
    }
    table
        .text(name, value)?
        .ok_or_else(|| AppError::validation(format!("'{}' is required", name)))
}

pub(crate) fn optional(table: &Table, name: &str, value: &Option<String>) -> ApiResult<Option<String>> {
    match value {
        Some(v) => Ok(table.text(name, v)?),
        None => Ok(None),
    }
}

/// Explicit slug if given, otherwise one derived from `title`.
pub(crate) fn resolve_slug(table: &Table, explicit: Option<&str>, title: &str) -> ApiResult<String> {
    let source = explicit.filter(|s| !s.trim().is_empty()).unwrap_or(title);
    required(table, "slug", source)
}

/// 409 when `table.column` already holds `value` on another record.
pub(crate) fn ensure_unique(
    store: &dyn Store,
    table: &'static str,
    column: &'static str,
    value: &str,
    exclude_id: Option<i64>,
) -> ApiResult<()> {
    if store.value_taken(table, column, value, exclude_id)? {
        return Err(AppError::conflict(format!("{} '{}' is already taken", column, value)));
    }
    Ok(())
}

/// 400 when `category_id` points at nothing.
pub(crate) fn ensure_category(store: &dyn Store, category_id: Option<i64>) -> ApiResult<()> {
    if let Some(id) = category_id {
        if store.category_find_by_id(id)?.is_none() {
            return Err(AppError::validation(format!("category {} does not exist", id)));
        }
    }
    Ok(())
}

// ── Catchers ──

fn envelope(status: Status, message: &str, code: &str) -> (Status, Json<Value>) {
    (
        status,
        Json(json!({ "success": false, "error": message, "code": code })),
    )
}

#[catch(400)]
pub fn bad_request() -> (Status, Json<Value>) {
    envelope(Status::BadRequest, "Malformed request", "VALIDATION_ERROR")
}

#[catch(401)]
pub fn unauthorized() -> (Status, Json<Value>) {
    envelope(Status::Unauthorized, "Authentication required", "AUTHENTICATION_REQUIRED")
}

#[catch(403)]
pub fn forbidden() -> (Status, Json<Value>) {
    envelope(Status::Forbidden, "Insufficient permissions", "FORBIDDEN")
}

#[catch(404)]
pub fn not_found() -> (Status, Json<Value>) {
    envelope(Status::NotFound, "Not found", "NOT_FOUND")
}

#[catch(422)]
pub fn unprocessable() -> (Status, Json<Value>) {
    envelope(Status::UnprocessableEntity, "Request body has missing or mistyped fields", "VALIDATION_ERROR")
}

#[catch(500)]
pub fn server_error() -> (Status, Json<Value>) {
    envelope(Status::InternalServerError, "Internal server error", "INTERNAL_ERROR")
}

#[catch(default)]
pub fn default_catcher(status: Status, _req: &Request) -> (Status, Json<Value>) {
    envelope(status, status.reason().unwrap_or("Error"), "ERROR")
}

pub fn catchers() -> Vec<rocket::Catcher> {
    catchers![
        bad_request,
        unauthorized,
        forbidden,
        not_found,
        unprocessable,
        server_error,
        default_catcher
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::post::POST_TABLE;

    #[test]
    fn page_bounds() {
        let p = Page::new(Some(0), Some(1000));
        assert_eq!(p.page, 1);
        assert_eq!(p.per_page, MAX_PER_PAGE);
        assert_eq!(Page::new(Some(3), Some(10)).offset(), 20);
        assert_eq!(Page::new(None, None).per_page, DEFAULT_PER_PAGE);
    }

    #[test]
    fn huge_page_numbers_are_clamped() {
        let p = Page::new(Some(i64::MAX), Some(MAX_PER_PAGE));
        assert_eq!(p.page, MAX_PAGE);
        assert_eq!(p.offset(), (MAX_PAGE - 1) * MAX_PER_PAGE);
        assert_eq!(Page::new(Some(i64::MIN), None).page, 1);
    }

    #[test]
    fn slug_falls_back_to_title() {
        assert_eq!(resolve_slug(&POST_TABLE, None, "Hello World!").unwrap(), "hello-world");
        assert_eq!(resolve_slug(&POST_TABLE, Some("  "), "Hi there").unwrap(), "hi-there");
        assert_eq!(resolve_slug(&POST_TABLE, Some("Custom Slug"), "x").unwrap(), "custom-slug");
        assert!(resolve_slug(&POST_TABLE, None, "!!!").is_err());
    }

    #[test]
    fn required_rejects_blank() {
        assert!(required(&POST_TABLE, "title", "   ").is_err());
        assert_eq!(required(&POST_TABLE, "title", " Hi ").unwrap(), "Hi");
    }
}
