use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::activity;
use crate::error::AppError;
use crate::models::activity::NewActivity;
use crate::models::category::{CategoryForm, CATEGORY_TABLE};
use crate::patch::Patch;
use crate::routes::{
    created, ensure_unique, ok, ok_msg, optional, required, resolve_slug, JsonResponse,
    StatusResponse,
};
use crate::security::auth::{require, ClientIp, EditorUser};
use crate::security::roles::Permission;
use crate::store::Store;

#[get("/categories?<kind>")]
pub fn list_categories(
    editor: EditorUser,
    store: &State<Arc<dyn Store>>,
    kind: Option<String>,
) -> JsonResponse {
    require(&editor.user, Permission::ManageSite)?;
    let kind = kind
        .map(|k| required(&CATEGORY_TABLE, "kind", &k))
        .transpose()?;
    Ok(ok(store.category_list(kind.as_deref())?))
}

#[post("/categories", data = "<form>")]
pub fn create_category(
    editor: EditorUser,
    store: &State<Arc<dyn Store>>,
    client_ip: ClientIp,
    form: Json<CategoryForm>,
) -> StatusResponse {
    require(&editor.user, Permission::ManageSite)?;
    let store = store.inner().as_ref();
    let mut form = form.into_inner();

    form.name = required(&CATEGORY_TABLE, "name", &form.name)?;
    let slug = resolve_slug(&CATEGORY_TABLE, form.slug.as_deref(), &form.name)?;
    let kind = match form.kind.as_deref() {
        Some(k) => required(&CATEGORY_TABLE, "kind", k)?,
        None => "post".to_string(),
    };
    form.description = optional(&CATEGORY_TABLE, "description", &form.description)?;
    ensure_unique(store, "categories", "slug", &slug, None)?;

    form.slug = Some(slug);
    form.kind = Some(kind);
    let id = store.category_create(&form)?;
    let category = store
        .category_find_by_id(id)?
        .ok_or_else(|| AppError::not_found("Category"))?;

    activity::record(
        store,
        NewActivity::by(&editor.user, "create")
            .on("categories", id)
            .changes(json!({ "name": category.name, "slug": category.slug, "kind": category.kind }))
            .from_ip(&client_ip.0),
    );
    Ok(created(category, "Category created"))
}

#[patch("/categories/<id>", data = "<body>")]
pub fn update_category(
    editor: EditorUser,
    store: &State<Arc<dyn Store>>,
    client_ip: ClientIp,
    id: i64,
    body: Json<Value>,
) -> JsonResponse {
    require(&editor.user, Permission::ManageSite)?;
    let store = store.inner().as_ref();
    let patch = Patch::from_json(&CATEGORY_TABLE, &body)?;
    if store.category_find_by_id(id)?.is_none() {
        return Err(AppError::not_found("Category"));
    }
    if let Some(slug) = patch.get_str("slug") {
        ensure_unique(store, "categories", "slug", slug, Some(id))?;
    }

    if !store.apply_patch(&patch, id)? {
        return Err(AppError::not_found("Category"));
    }
    let updated = store
        .category_find_by_id(id)?
        .ok_or_else(|| AppError::not_found("Category"))?;

    activity::record(
        store,
        NewActivity::by(&editor.user, "update")
            .on("categories", id)
            .changes(patch.snapshot())
            .from_ip(&client_ip.0),
    );
    Ok(ok_msg(updated, "Category updated"))
}

/// Refused while posts or projects still reference the category.
#[delete("/categories/<id>")]
pub fn delete_category(
    editor: EditorUser,
    store: &State<Arc<dyn Store>>,
    client_ip: ClientIp,
    id: i64,
) -> JsonResponse {
    require(&editor.user, Permission::ManageSite)?;
    let store = store.inner().as_ref();
    let category = store
        .category_find_by_id(id)?
        .ok_or_else(|| AppError::not_found("Category"))?;
    let usage = store.category_usage_count(id)?;
    if usage > 0 {
        return Err(AppError::conflict(format!(
            "Category is used by {} item(s); reassign them first",
            usage
        )));
    }

    if !store.category_delete(id)? {
        return Err(AppError::not_found("Category"));
    }
    activity::record(
        store,
        NewActivity::by(&editor.user, "delete")
            .on("categories", id)
            .changes(json!({ "name": category.name, "slug": category.slug }))
            .from_ip(&client_ip.0),
    );
    Ok(ok_msg(json!({ "id": id }), "Category deleted"))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![list_categories, create_category, update_category, delete_category]
}
