use rocket::State;
use serde_json::json;
use std::sync::Arc;

use crate::activity;
use crate::error::AppError;
use crate::models::activity::NewActivity;
use crate::models::newsletter::SUBSCRIPTION_STATUSES;
use crate::routes::{ok_msg, JsonResponse, Page};
use crate::security::auth::{require, ClientIp, EditorUser};
use crate::security::roles::Permission;
use crate::store::Store;

#[get("/newsletter?<status>&<page>&<per_page>")]
pub fn list_subscribers(
    editor: EditorUser,
    store: &State<Arc<dyn Store>>,
    status: Option<String>,
    page: Option<i64>,
    per_page: Option<i64>,
) -> JsonResponse {
    require(&editor.user, Permission::ReadInbox)?;
    let page = Page::new(page, per_page);
    let status = match status {
        Some(s) => Some(
            SUBSCRIPTION_STATUSES
                .iter()
                .find(|known| known.eq_ignore_ascii_case(s.trim()))
                .copied()
                .ok_or_else(|| {
                    AppError::validation(format!(
                        "'status' must be one of: {}",
                        SUBSCRIPTION_STATUSES.join(", ")
                    ))
                })?,
        ),
        None => None,
    };
    let items = store.newsletter_list(status, page.per_page, page.offset())?;
    let total = store.newsletter_count(status)?;
    Ok(page.respond(items, total))
}

#[delete("/newsletter/<id>")]
pub fn delete_subscriber(
    editor: EditorUser,
    store: &State<Arc<dyn Store>>,
    client_ip: ClientIp,
    id: i64,
) -> JsonResponse {
    require(&editor.user, Permission::ReadInbox)?;
    let store = store.inner().as_ref();
    if !store.newsletter_delete(id)? {
        return Err(AppError::not_found("Subscriber"));
    }
    activity::record(
        store,
        NewActivity::by(&editor.user, "delete")
            .on("newsletter_subscriptions", id)
            .from_ip(&client_ip.0),
    );
    Ok(ok_msg(json!({ "id": id }), "Subscriber removed"))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![list_subscribers, delete_subscriber]
}
