use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::activity;
use crate::error::AppError;
use crate::models::activity::NewActivity;
use crate::models::comment::{CommentQuery, COMMENT_TABLE};
use crate::patch::Patch;
use crate::routes::{ok_msg, required, JsonResponse, Page};
use crate::security::auth::{require, ClientIp, EditorUser};
use crate::security::roles::Permission;
use crate::store::Store;

#[get("/comments?<status>&<post>&<page>&<per_page>")]
pub fn list_comments(
    editor: EditorUser,
    store: &State<Arc<dyn Store>>,
    status: Option<String>,
    post: Option<i64>,
    page: Option<i64>,
    per_page: Option<i64>,
) -> JsonResponse {
    require(&editor.user, Permission::ModerateComments)?;
    let page = Page::new(page, per_page);
    let query = CommentQuery {
        post_id: post,
        status: status
            .map(|s| required(&COMMENT_TABLE, "status", &s))
            .transpose()?,
        limit: page.per_page,
        offset: page.offset(),
    };
    let comments = store.comment_list(&query)?;
    let total = store.comment_count(&query)?;
    Ok(page.respond(comments, total))
}

/// Moderate: change `status` (pending/approved/spam) or edit `body`.
#[patch("/comments/<id>", data = "<body>")]
pub fn update_comment(
    editor: EditorUser,
    store: &State<Arc<dyn Store>>,
    client_ip: ClientIp,
    id: i64,
    body: Json<Value>,
) -> JsonResponse {
    require(&editor.user, Permission::ModerateComments)?;
    let store = store.inner().as_ref();
    let patch = Patch::from_json(&COMMENT_TABLE, &body)?;
    if !store.apply_patch(&patch, id)? {
        return Err(AppError::not_found("Comment"));
    }
    let updated = store
        .comment_find_by_id(id)?
        .ok_or_else(|| AppError::not_found("Comment"))?;

    let action = match patch.get_str("status") {
        Some("approved") => "approve",
        Some("spam") => "spam",
        _ => "update",
    };
    activity::record(
        store,
        NewActivity::by(&editor.user, action)
            .on("comments", id)
            .changes(patch.snapshot())
            .from_ip(&client_ip.0),
    );
    Ok(ok_msg(updated, "Comment updated"))
}

#[delete("/comments/<id>")]
pub fn delete_comment(
    editor: EditorUser,
    store: &State<Arc<dyn Store>>,
    client_ip: ClientIp,
    id: i64,
) -> JsonResponse {
    require(&editor.user, Permission::ModerateComments)?;
    let store = store.inner().as_ref();
    if !store.comment_delete(id)? {
        return Err(AppError::not_found("Comment"));
    }
    activity::record(
        store,
        NewActivity::by(&editor.user, "delete")
            .on("comments", id)
            .from_ip(&client_ip.0),
    );
    Ok(ok_msg(json!({ "id": id }), "Comment deleted"))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![list_comments, update_comment, delete_comment]
}
