use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::activity;
use crate::error::AppError;
use crate::models::activity::NewActivity;
use crate::models::homepage::{SectionForm, SECTION_TABLE};
use crate::patch::Patch;
use crate::routes::{created, ensure_unique, ok, ok_msg, optional, required, JsonResponse, StatusResponse};
use crate::security::auth::{require, ClientIp, EditorUser};
use crate::security::roles::Permission;
use crate::store::Store;

#[get("/sections")]
pub fn list_sections(editor: EditorUser, store: &State<Arc<dyn Store>>) -> JsonResponse {
    require(&editor.user, Permission::ManageSite)?;
    Ok(ok(store.section_list(false)?))
}

#[post("/sections", data = "<form>")]
pub fn create_section(
    editor: EditorUser,
    store: &State<Arc<dyn Store>>,
    client_ip: ClientIp,
    form: Json<SectionForm>,
) -> StatusResponse {
    require(&editor.user, Permission::ManageSite)?;
    let store = store.inner().as_ref();
    let mut form = form.into_inner();
    form.section_key = required(&SECTION_TABLE, "section_key", &form.section_key)?;
    form.title = optional(&SECTION_TABLE, "title", &form.title)?;
    form.subtitle = optional(&SECTION_TABLE, "subtitle", &form.subtitle)?;
    match form.content {
        None | Some(Value::Null) | Some(Value::Object(_)) | Some(Value::Array(_)) => {}
        Some(_) => return Err(AppError::validation("'content' must be a JSON object or array")),
    }
    ensure_unique(store, "homepage_sections", "section_key", &form.section_key, None)?;

    let id = store.section_create(&form)?;
    let section = store
        .section_find_by_id(id)?
        .ok_or_else(|| AppError::not_found("Section"))?;

    activity::record(
        store,
        NewActivity::by(&editor.user, "create")
            .on("homepage_sections", id)
            .changes(json!({ "section_key": section.section_key }))
            .from_ip(&client_ip.0),
    );
    Ok(created(section, "Section created"))
}

#[patch("/sections/<id>", data = "<body>")]
pub fn update_section(
    editor: EditorUser,
    store: &State<Arc<dyn Store>>,
    client_ip: ClientIp,
    id: i64,
    body: Json<Value>,
) -> JsonResponse {
    require(&editor.user, Permission::ManageSite)?;
    let store = store.inner().as_ref();
    let patch = Patch::from_json(&SECTION_TABLE, &body)?;
    if let Some(key) = patch.get_str("section_key") {
        ensure_unique(store, "homepage_sections", "section_key", key, Some(id))?;
    }
    if !store.apply_patch(&patch, id)? {
        return Err(AppError::not_found("Section"));
    }
    let updated = store
        .section_find_by_id(id)?
        .ok_or_else(|| AppError::not_found("Section"))?;

    activity::record(
        store,
        NewActivity::by(&editor.user, "update")
            .on("homepage_sections", id)
            .changes(patch.snapshot())
            .from_ip(&client_ip.0),
    );
    Ok(ok_msg(updated, "Section updated"))
}

#[delete("/sections/<id>")]
pub fn delete_section(
    editor: EditorUser,
    store: &State<Arc<dyn Store>>,
    client_ip: ClientIp,
    id: i64,
) -> JsonResponse {
    require(&editor.user, Permission::ManageSite)?;
    let store = store.inner().as_ref();
    if !store.section_delete(id)? {
        return Err(AppError::not_found("Section"));
    }
    activity::record(
        store,
        NewActivity::by(&editor.user, "delete")
            .on("homepage_sections", id)
            .from_ip(&client_ip.0),
    );
    Ok(ok_msg(json!({ "id": id }), "Section deleted"))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![list_sections, create_section, update_section, delete_section]
}
