use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::activity;
use crate::error::AppError;
use crate::models::activity::NewActivity;
use crate::models::project::{ProjectForm, PROJECT_TABLE};
use crate::models::ContentQuery;
use crate::patch::Patch;
use crate::routes::{
    created, ensure_category, ensure_unique, ok, ok_msg, optional, required, resolve_slug,
    JsonResponse, Page, StatusResponse,
};
use crate::security::auth::{
    ensure_can_edit, ensure_can_set_status, require, AuthorUser, ClientIp,
};
use crate::security::roles::Permission;
use crate::store::Store;

#[get("/projects?<status>&<category>&<page>&<per_page>")]
pub fn list_projects(
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
        status: status
            .map(|s| required(&PROJECT_TABLE, "status", &s))
            .transpose()?,
        category_id: category,
        limit: page.per_page,
        offset: page.offset(),
        ..Default::default()
    };
    if !current.user.role.permits(Permission::WriteAnyContent) {
        query.author_id = Some(current.user.id);
    }
    let projects = store.project_list(&query)?;
    let total = store.project_count(&query)?;
    Ok(page.respond(projects, total))
}

#[get("/projects/<id>")]
pub fn get_project(current: AuthorUser, store: &State<Arc<dyn Store>>, id: i64) -> JsonResponse {
    require(&current.user, Permission::WriteOwnContent)?;
    let project = store
        .project_find_by_id(id)?
        .ok_or_else(|| AppError::not_found("Project"))?;
    ensure_can_edit(&current.user, project.author_id)?;
    Ok(ok(project))
}

#[post("/projects", data = "<form>")]
pub fn create_project(
    current: AuthorUser,
    store: &State<Arc<dyn Store>>,
    client_ip: ClientIp,
    form: Json<ProjectForm>,
) -> StatusResponse {
    require(&current.user, Permission::WriteOwnContent)?;
    let user = &current.user;
    let store = store.inner().as_ref();
    let mut form = form.into_inner();

    form.title = required(&PROJECT_TABLE, "title", &form.title)?;
    let slug = resolve_slug(&PROJECT_TABLE, form.slug.as_deref(), &form.title)?;
    let status = match form.status.as_deref() {
        Some(s) => required(&PROJECT_TABLE, "status", s)?,
        None => "draft".to_string(),
    };
    ensure_can_set_status(user, Some(&status))?;
    match form.tech_stack {
        None | Some(Value::Null) | Some(Value::Array(_)) => {}
        Some(_) => return Err(AppError::validation("'tech_stack' must be a JSON array")),
    }
    form.summary = optional(&PROJECT_TABLE, "summary", &form.summary)?;
    form.image = optional(&PROJECT_TABLE, "image", &form.image)?;
    form.live_url = optional(&PROJECT_TABLE, "live_url", &form.live_url)?;
    form.repo_url = optional(&PROJECT_TABLE, "repo_url", &form.repo_url)?;

    ensure_category(store, form.category_id)?;
    ensure_unique(store, "projects", "slug", &slug, None)?;

    form.slug = Some(slug);
    form.status = Some(status);
    form.author_id = Some(user.id);
    let id = store.project_create(&form)?;
    let project = store
        .project_find_by_id(id)?
        .ok_or_else(|| AppError::not_found("Project"))?;

    activity::record(
        store,
        NewActivity::by(user, "create")
            .on("projects", id)
            .changes(json!({ "title": project.title, "slug": project.slug, "status": project.status }))
            .from_ip(&client_ip.0),
    );
    Ok(created(project, "Project created"))
}

#[patch("/projects/<id>", data = "<body>")]
pub fn update_project(
    current: AuthorUser,
    store: &State<Arc<dyn Store>>,
    client_ip: ClientIp,
    id: i64,
    body: Json<Value>,
) -> JsonResponse {
    require(&current.user, Permission::WriteOwnContent)?;
    let user = &current.user;
    let store = store.inner().as_ref();
    let patch = Patch::from_json(&PROJECT_TABLE, &body)?;

    let project = store
        .project_find_by_id(id)?
        .ok_or_else(|| AppError::not_found("Project"))?;
    ensure_can_edit(user, project.author_id)?;
    ensure_can_set_status(user, patch.get_str("status"))?;
    if let Some(slug) = patch.get_str("slug") {
        ensure_unique(store, "projects", "slug", slug, Some(id))?;
    }
    ensure_category(store, patch.get_i64("category_id"))?;

    if !store.apply_patch(&patch, id)? {
        return Err(AppError::not_found("Project"));
    }
    let updated = store
        .project_find_by_id(id)?
        .ok_or_else(|| AppError::not_found("Project"))?;

    activity::record(
        store,
        NewActivity::by(user, "update")
            .on("projects", id)
            .changes(patch.snapshot())
            .from_ip(&client_ip.0),
    );
    Ok(ok_msg(updated, "Project updated"))
}

#[delete("/projects/<id>")]
pub fn delete_project(
    current: AuthorUser,
    store: &State<Arc<dyn Store>>,
    client_ip: ClientIp,
    id: i64,
) -> JsonResponse {
    require(&current.user, Permission::WriteOwnContent)?;
    let user = &current.user;
    let store = store.inner().as_ref();
    let project = store
        .project_find_by_id(id)?
        .ok_or_else(|| AppError::not_found("Project"))?;
    ensure_can_edit(user, project.author_id)?;

    if !store.project_delete(id)? {
        return Err(AppError::not_found("Project"));
    }
    activity::record(
        store,
        NewActivity::by(user, "delete")
            .on("projects", id)
            .changes(json!({ "title": project.title, "slug": project.slug }))
            .from_ip(&client_ip.0),
    );
    Ok(ok_msg(json!({ "id": id }), "Project deleted"))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![list_projects, get_project, create_project, update_project, delete_project]
}
