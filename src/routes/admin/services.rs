use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::activity;
use crate::error::AppError;
use crate::models::activity::NewActivity;
use crate::models::service::{ServiceForm, SERVICE_TABLE};
use crate::patch::Patch;
use crate::routes::{created, ok, ok_msg, optional, required, JsonResponse, StatusResponse};
use crate::security::auth::{require, ClientIp, EditorUser};
use crate::security::roles::Permission;
use crate::store::Store;

#[get("/services")]
pub fn list_services(editor: EditorUser, store: &State<Arc<dyn Store>>) -> JsonResponse {
    require(&editor.user, Permission::ManageSite)?;
    Ok(ok(store.service_list(false)?))
}

#[post("/services", data = "<form>")]
pub fn create_service(
    editor: EditorUser,
    store: &State<Arc<dyn Store>>,
    client_ip: ClientIp,
    form: Json<ServiceForm>,
) -> StatusResponse {
    require(&editor.user, Permission::ManageSite)?;
    let store = store.inner().as_ref();
    let mut form = form.into_inner();
    form.title = required(&SERVICE_TABLE, "title", &form.title)?;
    form.description = optional(&SERVICE_TABLE, "description", &form.description)?;
    form.icon = optional(&SERVICE_TABLE, "icon", &form.icon)?;
    form.price = optional(&SERVICE_TABLE, "price", &form.price)?;
    match form.features {
        None | Some(Value::Null) | Some(Value::Array(_)) | Some(Value::Object(_)) => {}
        Some(_) => {
            return Err(AppError::validation(
                "'features' must be a JSON array or object",
            ))
        }
    }

    let id = store.service_create(&form)?;
    let service = store
        .service_find_by_id(id)?
        .ok_or_else(|| AppError::not_found("Service"))?;

    activity::record(
        store,
        NewActivity::by(&editor.user, "create")
            .on("services", id)
            .changes(json!({ "title": service.title }))
            .from_ip(&client_ip.0),
    );
    Ok(created(service, "Service created"))
}

#[patch("/services/<id>", data = "<body>")]
pub fn update_service(
    editor: EditorUser,
    store: &State<Arc<dyn Store>>,
    client_ip: ClientIp,
    id: i64,
    body: Json<Value>,
) -> JsonResponse {
    require(&editor.user, Permission::ManageSite)?;
    let store = store.inner().as_ref();
    let patch = Patch::from_json(&SERVICE_TABLE, &body)?;
    if !store.apply_patch(&patch, id)? {
        return Err(AppError::not_found("Service"));
    }
    let updated = store
        .service_find_by_id(id)?
        .ok_or_else(|| AppError::not_found("Service"))?;

    activity::record(
        store,
        NewActivity::by(&editor.user, "update")
            .on("services", id)
            .changes(patch.snapshot())
            .from_ip(&client_ip.0),
    );
    Ok(ok_msg(updated, "Service updated"))
}

#[delete("/services/<id>")]
pub fn delete_service(
    editor: EditorUser,
    store: &State<Arc<dyn Store>>,
    client_ip: ClientIp,
    id: i64,
) -> JsonResponse {
    require(&editor.user, Permission::ManageSite)?;
    let store = store.inner().as_ref();
    if !store.service_delete(id)? {
        return Err(AppError::not_found("Service"));
    }
    activity::record(
        store,
        NewActivity::by(&editor.user, "delete")
            .on("services", id)
            .from_ip(&client_ip.0),
    );
    Ok(ok_msg(json!({ "id": id }), "Service deleted"))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![list_services, create_service, update_service, delete_service]
}
