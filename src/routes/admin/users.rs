use rocket::serde::json::Json;
use rocket::State;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::activity;
use crate::boot::MIN_PASSWORD_LEN;
use crate::config::Config;
use crate::error::{ApiResult, AppError};
use crate::models::activity::NewActivity;
use crate::models::user::{NewUser, User, USER_TABLE};
use crate::patch::{Patch, PatchError};
use crate::routes::{created, ensure_unique, ok, ok_msg, required, JsonResponse, Page, StatusResponse};
use crate::security::auth::{hash_password, require, AdminUser, ClientIp};
use crate::security::roles::{Permission, Role};
use crate::store::Store;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UserCreateForm {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
    pub is_active: Option<bool>,
}

fn parse_role(raw: &str) -> ApiResult<Role> {
    raw.parse::<Role>()
        .map_err(|e| AppError::validation(e.to_string()))
}

fn hash_new_password(password: &str, config: &Config) -> ApiResult<String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    hash_password(password, config.auth.password_cost).map_err(AppError::Storage)
}

/// 409 when `target` is the only active admin.
fn ensure_not_last_admin(store: &dyn Store, target: &User, action: &str) -> ApiResult<()> {
    if target.is_admin() && target.is_active && store.user_count_active_admins()? <= 1 {
        return Err(AppError::conflict(format!(
            "Cannot {} the last active admin",
            action
        )));
    }
    Ok(())
}

#[get("/users?<role>&<page>&<per_page>")]
pub fn list_users(
    admin: AdminUser,
    store: &State<Arc<dyn Store>>,
    role: Option<String>,
    page: Option<i64>,
    per_page: Option<i64>,
) -> JsonResponse {
    require(&admin.user, Permission::ManageUsers)?;
    let page = Page::new(page, per_page);
    let role = role.as_deref().map(parse_role).transpose()?;
    let users = store.user_list(role, page.per_page, page.offset())?;
    let total = store.user_count(role)?;
    Ok(page.respond(users, total))
}

#[get("/users/<id>")]
pub fn get_user(admin: AdminUser, store: &State<Arc<dyn Store>>, id: i64) -> JsonResponse {
    require(&admin.user, Permission::ManageUsers)?;
    let user = store
        .user_get_by_id(id)?
        .ok_or_else(|| AppError::not_found("User"))?;
    Ok(ok(user))
}

#[post("/users", data = "<form>")]
pub fn create_user(
    admin: AdminUser,
    store: &State<Arc<dyn Store>>,
    config: &State<Config>,
    client_ip: ClientIp,
    form: Json<UserCreateForm>,
) -> StatusResponse {
    require(&admin.user, Permission::ManageUsers)?;
    let store = store.inner().as_ref();
    let name = required(&USER_TABLE, "name", &form.name)?;
    let email = required(&USER_TABLE, "email", &form.email)?;
    let role = match form.role.as_deref() {
        Some(r) => parse_role(r)?,
        None => Role::Author,
    };
    let password_hash = hash_new_password(&form.password, config)?;
    ensure_unique(store, "users", "email", &email, None)?;

    let id = store.user_create(&NewUser {
        name,
        email,
        password_hash,
        role,
        is_active: form.is_active.unwrap_or(true),
    })?;
    let user = store
        .user_get_by_id(id)?
        .ok_or_else(|| AppError::not_found("User"))?;

    activity::record(
        store,
        NewActivity::by(&admin.user, "create")
            .on("users", id)
            .changes(json!({ "name": user.name, "email": user.email, "role": user.role }))
            .from_ip(&client_ip.0),
    );
    Ok(created(user, "User created"))
}

/// Allow-listed profile fields plus an optional `password`.
#[patch("/users/<id>", data = "<body>")]
pub fn update_user(
    admin: AdminUser,
    store: &State<Arc<dyn Store>>,
    config: &State<Config>,
    client_ip: ClientIp,
    id: i64,
    body: Json<Value>,
) -> JsonResponse {
    require(&admin.user, Permission::ManageUsers)?;
    let store = store.inner().as_ref();
    let password = match body.get("password") {
        None | Some(Value::Null) => None,
        Some(Value::String(p)) => Some(p.as_str()),
        Some(_) => return Err(AppError::validation("'password' must be a string")),
    };
    let patch = match Patch::from_json(&USER_TABLE, &body) {
        Ok(p) => Some(p),
        Err(PatchError::Empty) if password.is_some() => None,
        Err(e) => return Err(e.into()),
    };

    let target = store
        .user_get_by_id(id)?
        .ok_or_else(|| AppError::not_found("User"))?;
    let password_hash = password
        .map(|p| hash_new_password(p, config))
        .transpose()?;

    let mut changes = json!({});
    if let Some(ref patch) = patch {
        let demoting = patch.get_str("role").map_or(false, |r| r != Role::Admin.as_str());
        let deactivating = patch.get_bool("is_active") == Some(false);
        if demoting || deactivating {
            ensure_not_last_admin(store, &target, if demoting { "demote" } else { "deactivate" })?;
        }
        if let Some(email) = patch.get_str("email") {
            ensure_unique(store, "users", "email", email, Some(id))?;
        }
        if !store.apply_patch(patch, id)? {
            return Err(AppError::not_found("User"));
        }
        if deactivating {
            store.session_delete_for_user(id)?;
        }
        changes = patch.snapshot();
    }

    if let Some(hash) = password_hash {
        store.user_set_password(id, &hash)?;
        // other devices must sign in again; the acting admin keeps this session
        if id != admin.user.id {
            store.session_delete_for_user(id)?;
        }
        changes["password"] = json!("changed");
    }

    let updated = store
        .user_get_by_id(id)?
        .ok_or_else(|| AppError::not_found("User"))?;
    activity::record(
        store,
        NewActivity::by(&admin.user, "update")
            .on("users", id)
            .changes(changes)
            .from_ip(&client_ip.0),
    );
    Ok(ok_msg(updated, "User updated"))
}

#[delete("/users/<id>")]
pub fn delete_user(
    admin: AdminUser,
    store: &State<Arc<dyn Store>>,
    client_ip: ClientIp,
    id: i64,
) -> JsonResponse {
    require(&admin.user, Permission::ManageUsers)?;
    let store = store.inner().as_ref();
    if id == admin.user.id {
        return Err(AppError::validation("You cannot delete your own account"));
    }
    let target = store
        .user_get_by_id(id)?
        .ok_or_else(|| AppError::not_found("User"))?;
    ensure_not_last_admin(store, &target, "delete")?;

    if !store.user_delete(id)? {
        return Err(AppError::not_found("User"));
    }
    activity::record(
        store,
        NewActivity::by(&admin.user, "delete")
            .on("users", id)
            .changes(json!({ "email": target.email, "role": target.role }))
            .from_ip(&client_ip.0),
    );
    Ok(ok_msg(json!({ "id": id }), "User deleted"))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![list_users, get_user, create_user, update_user, delete_user]
}
