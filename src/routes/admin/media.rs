use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::activity;
use crate::error::{ApiResult, AppError};
use crate::models::activity::NewActivity;
use crate::models::media::{MediaForm, MEDIA_TABLE};
use crate::patch::Patch;
use crate::routes::{created, ok_msg, optional, JsonResponse, Page, StatusResponse};
use crate::security::auth::{ensure_can_edit, require, AuthorUser, ClientIp};
use crate::security::roles::Permission;
use crate::store::Store;

/// Site-relative paths or absolute http(s) URLs.
fn check_url(raw: &str) -> ApiResult<String> {
    let raw = raw.trim();
    let valid = if raw.starts_with('/') {
        !raw.starts_with("//") && !raw.contains("..")
    } else {
        matches!(url::Url::parse(raw), Ok(u) if u.scheme() == "http" || u.scheme() == "https")
    };
    if !valid {
        return Err(AppError::validation(
            "'url' must be a site path or an http(s) URL",
        ));
    }
    Ok(raw.to_string())
}

/// Last path segment of `url`, or a generated name when it has none.
fn filename_from(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('/').next().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => uuid::Uuid::new_v4().to_string(),
    }
}

#[get("/media?<page>&<per_page>")]
pub fn list_media(
    author: AuthorUser,
    store: &State<Arc<dyn Store>>,
    page: Option<i64>,
    per_page: Option<i64>,
) -> JsonResponse {
    require(&author.user, Permission::UploadMedia)?;
    let page = Page::new(page, per_page);
    let items = store.media_list(page.per_page, page.offset())?;
    let total = store.media_count()?;
    Ok(page.respond(items, total))
}

/// Register an uploaded file's metadata. The bytes are stored elsewhere.
#[post("/media", data = "<form>")]
pub fn create_media(
    author: AuthorUser,
    store: &State<Arc<dyn Store>>,
    client_ip: ClientIp,
    form: Json<MediaForm>,
) -> StatusResponse {
    let store = store.inner().as_ref();
    let mut form = form.into_inner();
    require(&author.user, Permission::UploadMedia)?;

    form.url = check_url(&form.url)?;
    form.mime_type = form.mime_type.trim().to_lowercase();
    if !form.mime_type.contains('/') {
        return Err(AppError::validation("'mime_type' must look like type/subtype"));
    }
    if form.size_bytes < 0 {
        return Err(AppError::validation("'size_bytes' must not be negative"));
    }
    form.filename = match form.filename.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => Some(name.to_string()),
        _ => Some(filename_from(&form.url)),
    };
    form.alt_text = optional(&MEDIA_TABLE, "alt_text", &form.alt_text)?;
    form.uploaded_by = Some(author.user.id);

    let id = store.media_create(&form)?;
    let item = store
        .media_find_by_id(id)?
        .ok_or_else(|| AppError::not_found("Media item"))?;

    activity::record(
        store,
        NewActivity::by(&author.user, "create")
            .on("media", id)
            .changes(json!({ "filename": item.filename, "url": item.url }))
            .from_ip(&client_ip.0),
    );
    Ok(created(item, "Media registered"))
}

#[patch("/media/<id>", data = "<body>")]
pub fn update_media(
    author: AuthorUser,
    store: &State<Arc<dyn Store>>,
    client_ip: ClientIp,
    id: i64,
    body: Json<Value>,
) -> JsonResponse {
    require(&author.user, Permission::UploadMedia)?;
    let store = store.inner().as_ref();
    let patch = Patch::from_json(&MEDIA_TABLE, &body)?;
    let item = store
        .media_find_by_id(id)?
        .ok_or_else(|| AppError::not_found("Media item"))?;
    ensure_can_edit(&author.user, item.uploaded_by)?;

    if !store.apply_patch(&patch, id)? {
        return Err(AppError::not_found("Media item"));
    }
    let updated = store
        .media_find_by_id(id)?
        .ok_or_else(|| AppError::not_found("Media item"))?;

    activity::record(
        store,
        NewActivity::by(&author.user, "update")
            .on("media", id)
            .changes(patch.snapshot())
            .from_ip(&client_ip.0),
    );
    Ok(ok_msg(updated, "Media updated"))
}

#[delete("/media/<id>")]
pub fn delete_media(
    author: AuthorUser,
    store: &State<Arc<dyn Store>>,
    client_ip: ClientIp,
    id: i64,
) -> JsonResponse {
    let store = store.inner().as_ref();
    require(&author.user, Permission::DeleteMedia)?;
    let item = store
        .media_find_by_id(id)?
        .ok_or_else(|| AppError::not_found("Media item"))?;

    if !store.media_delete(id)? {
        return Err(AppError::not_found("Media item"));
    }
    activity::record(
        store,
        NewActivity::by(&author.user, "delete")
            .on("media", id)
            .changes(json!({ "filename": item.filename, "url": item.url }))
            .from_ip(&client_ip.0),
    );
    Ok(ok_msg(json!({ "id": id }), "Media deleted"))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![list_media, create_media, update_media, delete_media]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_must_be_paths_or_http() {
        assert!(check_url("/uploads/a.png").is_ok());
        assert!(check_url("https://cdn.example.com/a.png").is_ok());
        assert!(check_url("//evil.example.com/a.png").is_err());
        assert!(check_url("/uploads/../secret").is_err());
        assert!(check_url("javascript:alert(1)").is_err());
        assert!(check_url("").is_err());
    }

    #[test]
    fn filename_defaults_to_last_segment() {
        assert_eq!(filename_from("/uploads/2024/cover.jpg?v=2"), "cover.jpg");
        // trailing slash: generated uuid name
        assert_eq!(filename_from("https://cdn.example.com/img/").len(), 36);
    }
}
