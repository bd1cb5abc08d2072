use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::activity;
use crate::error::AppError;
use crate::models::activity::NewActivity;
use crate::models::contact::CONTACT_TABLE;
use crate::patch::Patch;
use crate::routes::{ok, ok_msg, required, JsonResponse, Page};
use crate::security::auth::{require, ClientIp, EditorUser};
use crate::security::roles::Permission;
use crate::store::Store;

#[get("/contacts?<status>&<page>&<per_page>")]
pub fn list_contacts(
    editor: EditorUser,
    store: &State<Arc<dyn Store>>,
    status: Option<String>,
    page: Option<i64>,
    per_page: Option<i64>,
) -> JsonResponse {
    require(&editor.user, Permission::ReadInbox)?;
    let page = Page::new(page, per_page);
    let status = status
        .map(|s| required(&CONTACT_TABLE, "status", &s))
        .transpose()?;
    let items = store.contact_list(status.as_deref(), page.per_page, page.offset())?;
    let total = store.contact_count(status.as_deref())?;
    let unread = store.contact_count_unread()?;
    let mut body = page.respond(items, total);
    body.0["unread"] = json!(unread);
    Ok(body)
}

/// Opening a submission marks it read.
#[get("/contacts/<id>")]
pub fn get_contact(editor: EditorUser, store: &State<Arc<dyn Store>>, id: i64) -> JsonResponse {
    require(&editor.user, Permission::ReadInbox)?;
    let mut contact = store
        .contact_find_by_id(id)?
        .ok_or_else(|| AppError::not_found("Message"))?;
    if !contact.is_read {
        store.contact_mark_read(id)?;
        contact.is_read = true;
    }
    Ok(ok(contact))
}

#[patch("/contacts/<id>", data = "<body>")]
pub fn update_contact(
    editor: EditorUser,
    store: &State<Arc<dyn Store>>,
    client_ip: ClientIp,
    id: i64,
    body: Json<Value>,
) -> JsonResponse {
    require(&editor.user, Permission::ReadInbox)?;
    let store = store.inner().as_ref();
    let patch = Patch::from_json(&CONTACT_TABLE, &body)?;
    if !store.apply_patch(&patch, id)? {
        return Err(AppError::not_found("Message"));
    }
    let updated = store
        .contact_find_by_id(id)?
        .ok_or_else(|| AppError::not_found("Message"))?;

    activity::record(
        store,
        NewActivity::by(&editor.user, "update")
            .on("contact_forms", id)
            .changes(patch.snapshot())
            .from_ip(&client_ip.0),
    );
    Ok(ok_msg(updated, "Message updated"))
}

#[delete("/contacts/<id>")]
pub fn delete_contact(
    editor: EditorUser,
    store: &State<Arc<dyn Store>>,
    client_ip: ClientIp,
    id: i64,
) -> JsonResponse {
    require(&editor.user, Permission::ReadInbox)?;
    let store = store.inner().as_ref();
    if !store.contact_delete(id)? {
        return Err(AppError::not_found("Message"));
    }
    activity::record(
        store,
        NewActivity::by(&editor.user, "delete")
            .on("contact_forms", id)
            .from_ip(&client_ip.0),
    );
    Ok(ok_msg(json!({ "id": id }), "Message deleted"))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![list_contacts, get_contact, update_contact, delete_contact]
}
