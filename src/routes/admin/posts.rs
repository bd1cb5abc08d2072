use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::activity;
use crate::error::AppError;
use crate::models::activity::NewActivity;
use crate::models::post::{PostForm, POST_TABLE};
use crate::models::{now_timestamp, ContentQuery};
use crate::patch::{Patch, PatchValue};
use crate::routes::{
    created, ensure_category, ensure_unique, ok, ok_msg, optional, required, resolve_slug,
    JsonResponse, Page, StatusResponse,
};
use crate::security::auth::{
    ensure_can_edit, ensure_can_set_status, require, AuthorUser, ClientIp,
};
use crate::security::roles::Permission;
use crate::store::Store;

#[get("/posts?<status>&<category>&<page>&<per_page>")]
pub fn list_posts(
    current: AuthorUser,
    store: &State<Arc<dyn Store>>,
    status: Option<String>,
    category: Option<i64>,
    page: Option<i64>,
    per_page: Option<i64>,
) -> JsonResponse {
    require(&current.user, Permission::WriteOwnContent)?;
    let page = Page::new(page, per_page);
    let mut query = ContentQuery {
        status: status.map(|s| required(&POST_TABLE, "status", &s)).transpose()?,
        category_id: category,
        limit: page.per_page,
        offset: page.offset(),
        ..Default::default()
    };
    // authors only see their own drafts and posts
    if !current.user.role.permits(Permission::WriteAnyContent) {
        query.author_id = Some(current.user.id);
    }
    let posts = store.post_list(&query)?;
    let total = store.post_count(&query)?;
    Ok(page.respond(posts, total))
}

#[get("/posts/<id>")]
pub fn get_post(current: AuthorUser, store: &State<Arc<dyn Store>>, id: i64) -> JsonResponse {
    require(&current.user, Permission::WriteOwnContent)?;
    let post = store
        .post_find_by_id(id)?
        .ok_or_else(|| AppError::not_found("Post"))?;
    ensure_can_edit(&current.user, post.author_id)?;
    Ok(ok(post))
}

#[post("/posts", data = "<form>")]
pub fn create_post(
    current: AuthorUser,
    store: &State<Arc<dyn Store>>,
    client_ip: ClientIp,
    form: Json<PostForm>,
) -> StatusResponse {
    require(&current.user, Permission::WriteOwnContent)?;
    let user = &current.user;
    let store = store.inner().as_ref();
    let mut form = form.into_inner();

    form.title = required(&POST_TABLE, "title", &form.title)?;
    let slug = resolve_slug(&POST_TABLE, form.slug.as_deref(), &form.title)?;
    let status = match form.status.as_deref() {
        Some(s) => required(&POST_TABLE, "status", s)?,
        None => "draft".to_string(),
    };
    ensure_can_set_status(user, Some(&status))?;
    form.excerpt = optional(&POST_TABLE, "excerpt", &form.excerpt)?;
    form.cover_image = optional(&POST_TABLE, "cover_image", &form.cover_image)?;
    form.meta_title = optional(&POST_TABLE, "meta_title", &form.meta_title)?;
    form.meta_description = optional(&POST_TABLE, "meta_description", &form.meta_description)?;
    form.published_at = optional(&POST_TABLE, "published_at", &form.published_at)?;
    if status == "published" && form.published_at.is_none() {
        form.published_at = Some(now_timestamp());
    }

    ensure_category(store, form.category_id)?;
    ensure_unique(store, "posts", "slug", &slug, None)?;

    form.slug = Some(slug);
    form.status = Some(status);
    form.author_id = Some(user.id);
    let id = store.post_create(&form)?;
    let post = store
        .post_find_by_id(id)?
        .ok_or_else(|| AppError::not_found("Post"))?;

    activity::record(
        store,
        NewActivity::by(user, "create")
            .on("posts", id)
            .changes(json!({ "title": post.title, "slug": post.slug, "status": post.status }))
            .from_ip(&client_ip.0),
    );
    Ok(created(post, "Post created"))
}

#[patch("/posts/<id>", data = "<body>")]
pub fn update_post(
    current: AuthorUser,
    store: &State<Arc<dyn Store>>,
    client_ip: ClientIp,
    id: i64,
    body: Json<Value>,
) -> JsonResponse {
    require(&current.user, Permission::WriteOwnContent)?;
    let user = &current.user;
    let store = store.inner().as_ref();
    let mut patch = Patch::from_json(&POST_TABLE, &body)?;

    let post = store
        .post_find_by_id(id)?
        .ok_or_else(|| AppError::not_found("Post"))?;
    ensure_can_edit(user, post.author_id)?;
    ensure_can_set_status(user, patch.get_str("status"))?;
    if let Some(slug) = patch.get_str("slug") {
        ensure_unique(store, "posts", "slug", slug, Some(id))?;
    }
    ensure_category(store, patch.get_i64("category_id"))?;
    if patch.get_str("status") == Some("published")
        && post.published_at.is_none()
        && !patch.contains("published_at")
    {
        patch.set("published_at", PatchValue::Text(now_timestamp()))?;
    }

    if !store.apply_patch(&patch, id)? {
        return Err(AppError::not_found("Post"));
    }
    let updated = store
        .post_find_by_id(id)?
        .ok_or_else(|| AppError::not_found("Post"))?;

    activity::record(
        store,
        NewActivity::by(user, "update")
            .on("posts", id)
            .changes(patch.snapshot())
            .from_ip(&client_ip.0),
    );
    Ok(ok_msg(updated, "Post updated"))
}

#[delete("/posts/<id>")]
pub fn delete_post(
    current: AuthorUser,
    store: &State<Arc<dyn Store>>,
    client_ip: ClientIp,
    id: i64,
) -> JsonResponse {
    require(&current.user, Permission::WriteOwnContent)?;
    let user = &current.user;
    let store = store.inner().as_ref();
    let post = store
        .post_find_by_id(id)?
        .ok_or_else(|| AppError::not_found("Post"))?;
    ensure_can_edit(user, post.author_id)?;

    if !store.post_delete(id)? {
        return Err(AppError::not_found("Post"));
    }
    activity::record(
        store,
        NewActivity::by(user, "delete")
            .on("posts", id)
            .changes(json!({ "title": post.title, "slug": post.slug }))
            .from_ip(&client_ip.0),
    );
    Ok(ok_msg(json!({ "id": id }), "Post deleted"))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![list_posts, get_post, create_post, update_post, delete_post]
}
