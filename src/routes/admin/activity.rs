use rocket::State;
use std::sync::Arc;

use crate::models::activity::ActivityQuery;
use crate::routes::{JsonResponse, Page};
use crate::security::auth::{require, AdminUser};
use crate::security::roles::Permission;
use crate::store::Store;

#[get("/activity?<action>&<table>&<user>&<page>&<per_page>")]
pub fn list_activity(
    admin: AdminUser,
    store: &State<Arc<dyn Store>>,
    action: Option<String>,
    table: Option<String>,
    user: Option<i64>,
    page: Option<i64>,
    per_page: Option<i64>,
) -> JsonResponse {
    require(&admin.user, Permission::ViewActivity)?;
    let page = Page::new(page, per_page);
    let clean = |s: Option<String>| s.map(|v| v.trim().to_lowercase()).filter(|v| !v.is_empty());
    let query = ActivityQuery {
        action: clean(action),
        table_name: clean(table),
        user_id: user,
        limit: page.per_page,
        offset: page.offset(),
    };
    let entries = store.activity_list(&query)?;
    let total = store.activity_count(&query)?;
    Ok(page.respond(entries, total))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![list_activity]
}
