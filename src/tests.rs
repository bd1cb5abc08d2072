#![cfg(test)]

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rocket::http::{ContentType, Cookie, Status};
use rocket::local::blocking::{Client, LocalResponse};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::Config;
use crate::db::DbPool;
use crate::models::days_ago;
use crate::models::post::PostForm;
use crate::models::session::NewSession;
use crate::models::user::NewUser;
use crate::security::auth::SESSION_COOKIE;
use crate::security::roles::Role;
use crate::store::sqlite::SqliteStore;
use crate::store::Store;

/// Atomic counter for unique shared-cache DB names so parallel tests don't collide.
static TEST_DB_COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

const PASSWORD: &str = "correct-horse";

struct TestApp {
    client: Client,
    store: Arc<dyn Store>,
    pool: DbPool,
}

/// A full application on a named shared-cache in-memory SQLite database.
/// The pool keeps its connections open, so the database lives as long as the app.
fn app() -> TestApp {
    let id = TEST_DB_COUNTER.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    let uri = format!("file:app_test_{}?mode=memory&cache=shared", id);
    let manager = SqliteConnectionManager::file(uri)
        .with_init(|c| c.execute_batch("PRAGMA foreign_keys=ON;"));
    let pool = Pool::builder()
        .max_size(4)
        .build(manager)
        .expect("Failed to create test pool");
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool.clone()));
    store.run_migrations().expect("Failed to run migrations");

    let mut config = Config::default();
    config.auth.password_cost = 4;
    config.maintenance.enabled = false;

    let client = Client::tracked(crate::build(store.clone(), config)).expect("valid rocket");
    TestApp {
        client,
        store,
        pool,
    }
}

impl TestApp {
    fn user(&self, email: &str, role: Role) -> i64 {
        self.store
            .user_create(&NewUser {
                name: email.split('@').next().unwrap_or("user").to_string(),
                email: email.to_string(),
                password_hash: bcrypt::hash(PASSWORD, 4).unwrap(),
                role,
                is_active: true,
            })
            .unwrap()
    }

    fn login(&self, email: &str) -> LocalResponse<'_> {
        self.post("/api/auth/login", json!({ "email": email, "password": PASSWORD }))
    }

    fn login_as(&self, email: &str, role: Role) -> i64 {
        let id = self.user(email, role);
        assert_eq!(self.login(email).status(), Status::Ok);
        id
    }

    fn post(&self, uri: &str, body: Value) -> LocalResponse<'_> {
        self.client
            .post(uri.to_string())
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
    }

    fn patch(&self, uri: &str, body: Value) -> LocalResponse<'_> {
        self.client
            .patch(uri.to_string())
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
    }

    fn get(&self, uri: &str) -> LocalResponse<'_> {
        self.client.get(uri.to_string()).dispatch()
    }

    fn delete(&self, uri: &str) -> LocalResponse<'_> {
        self.client.delete(uri.to_string()).dispatch()
    }

    fn published_post(&self, slug: &str, author_id: i64) -> i64 {
        self.store
            .post_create(&PostForm {
                title: slug.to_string(),
                slug: Some(slug.to_string()),
                content: "Body".to_string(),
                status: Some("published".to_string()),
                author_id: Some(author_id),
                published_at: Some(crate::models::now_timestamp()),
                ..Default::default()
            })
            .unwrap()
    }
}

fn json_of(response: LocalResponse<'_>) -> Value {
    response.into_json::<Value>().expect("JSON body")
}

// ── Authentication ──

#[test]
fn admin_routes_require_a_session() {
    let app = app();
    for uri in ["/api/admin/posts", "/api/admin/users", "/api/admin/analytics/overview"] {
        let response = app.get(uri);
        assert_eq!(response.status(), Status::Unauthorized, "{}", uri);
        let body = json_of(response);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "AUTHENTICATION_REQUIRED");
    }
}

#[test]
fn login_logout_and_session() {
    let app = app();
    app.user("ada@example.com", Role::Editor);

    let bad = app.post(
        "/api/auth/login",
        json!({ "email": "ada@example.com", "password": "wrong-password" }),
    );
    assert_eq!(bad.status(), Status::Unauthorized);

    // emails match case-insensitively
    let ok = app.post(
        "/api/auth/login",
        json!({ "email": "ADA@example.com", "password": PASSWORD }),
    );
    assert_eq!(ok.status(), Status::Ok);

    let session = json_of(app.get("/api/auth/session"));
    assert_eq!(session["data"]["email"], "ada@example.com");
    assert_eq!(session["data"]["role"], "editor");
    assert!(session["data"].get("password_hash").is_none());

    assert_eq!(app.post("/api/auth/logout", json!({})).status(), Status::Ok);
    assert_eq!(app.get("/api/auth/session").status(), Status::Unauthorized);
}

#[test]
fn admin_responses_are_not_cached() {
    let app = app();
    app.login_as("ada@example.com", Role::Admin);
    let response = app.get("/api/admin/users");
    assert_eq!(response.status(), Status::Ok);
    let cache = response.headers().get_one("Cache-Control").unwrap_or_default();
    assert!(cache.contains("no-store"));
}

#[test]
fn expired_sessions_are_rejected() {
    let app = app();
    let id = app.user("ada@example.com", Role::Admin);
    app.store
        .session_create(&NewSession {
            id: "expired-token".to_string(),
            user_id: id,
            expires_at: days_ago(1),
            ip_address: None,
            user_agent: None,
        })
        .unwrap();

    let response = app
        .client
        .get("/api/admin/users")
        .private_cookie(Cookie::new(SESSION_COOKIE, "expired-token"))
        .dispatch();
    assert_eq!(response.status(), Status::Unauthorized);
}

#[test]
fn deactivated_users_lose_access() {
    let app = app();
    app.user("root@example.com", Role::Admin);
    let editor = app.login_as("ed@example.com", Role::Editor);
    assert_eq!(app.get("/api/admin/comments").status(), Status::Ok);

    assert_eq!(app.login("root@example.com").status(), Status::Ok);
    let response = app.patch(
        &format!("/api/admin/users/{}", editor),
        json!({ "is_active": false }),
    );
    assert_eq!(response.status(), Status::Ok);

    assert_eq!(app.login("ed@example.com").status(), Status::Unauthorized);
}

// ── Authorization ──

#[test]
fn insufficient_roles_get_forbidden() {
    let app = app();
    app.login_as("reader@example.com", Role::Subscriber);
    let response = app.get("/api/admin/posts");
    assert_eq!(response.status(), Status::Forbidden);
    assert_eq!(json_of(response)["code"], "FORBIDDEN");

    app.login_as("writer@example.com", Role::Author);
    assert_eq!(app.get("/api/admin/posts").status(), Status::Ok);
    assert_eq!(app.get("/api/admin/comments").status(), Status::Forbidden);
    assert_eq!(app.get("/api/admin/users").status(), Status::Forbidden);
    assert_eq!(app.get("/api/admin/activity").status(), Status::Forbidden);
}

#[test]
fn authors_only_touch_their_own_drafts() {
    let app = app();
    let other = app.user("other@example.com", Role::Author);
    let theirs = app.published_post("their-post", other);
    app.login_as("writer@example.com", Role::Author);

    // publishing needs an editor
    let publish = app.post(
        "/api/admin/posts",
        json!({ "title": "Mine", "content": "x", "status": "published" }),
    );
    assert_eq!(publish.status(), Status::Forbidden);

    let draft = app.post("/api/admin/posts", json!({ "title": "Mine", "content": "x" }));
    assert_eq!(draft.status(), Status::Created);
    let draft = json_of(draft);
    assert_eq!(draft["data"]["status"], "draft");
    assert_eq!(draft["data"]["slug"], "mine");

    let edit_other = app.patch(
        &format!("/api/admin/posts/{}", theirs),
        json!({ "title": "Hijacked" }),
    );
    assert_eq!(edit_other.status(), Status::Forbidden);
    assert_eq!(
        app.delete(&format!("/api/admin/posts/{}", theirs)).status(),
        Status::Forbidden
    );

    let list = json_of(app.get("/api/admin/posts"));
    assert_eq!(list["pagination"]["total"], 1);
    assert_eq!(list["data"][0]["slug"], "mine");
}

#[test]
fn editors_reach_site_management_but_not_admin_areas() {
    let app = app();
    app.login_as("ed@example.com", Role::Editor);
    for uri in [
        "/api/admin/categories",
        "/api/admin/comments",
        "/api/admin/sections",
        "/api/admin/services",
        "/api/admin/contacts",
        "/api/admin/newsletter",
        "/api/admin/analytics/overview",
        "/api/admin/media",
        "/api/admin/posts",
    ] {
        assert_eq!(app.get(uri).status(), Status::Ok, "{}", uri);
    }
    for uri in ["/api/admin/users", "/api/admin/activity"] {
        assert_eq!(app.get(uri).status(), Status::Forbidden, "{}", uri);
    }
}

// ── Content management ──

#[test]
fn duplicate_slugs_conflict() {
    let app = app();
    app.login_as("ed@example.com", Role::Editor);

    let first = app.post("/api/admin/posts", json!({ "title": "Hello World", "content": "x" }));
    assert_eq!(first.status(), Status::Created);

    let second = app.post("/api/admin/posts", json!({ "title": "Hello World", "content": "y" }));
    assert_eq!(second.status(), Status::Conflict);
    assert_eq!(json_of(second)["code"], "CONFLICT");

    let project = app.post(
        "/api/admin/projects",
        json!({ "title": "Hello World", "content": "x" }),
    );
    assert_eq!(project.status(), Status::Created);
}

#[test]
fn empty_or_unknown_patches_are_rejected() {
    let app = app();
    let editor = app.login_as("ed@example.com", Role::Editor);
    let id = app.published_post("hello", editor);
    let uri = format!("/api/admin/posts/{}", id);

    assert_eq!(app.patch(&uri, json!({})).status(), Status::BadRequest);
    let unknown = app.patch(&uri, json!({ "author_id": 99, "views": 5 }));
    assert_eq!(unknown.status(), Status::BadRequest);
    assert_eq!(json_of(unknown)["code"], "VALIDATION_ERROR");

    let status = app.patch(&uri, json!({ "status": "archived" }));
    assert_eq!(status.status(), Status::Ok);
    assert_eq!(json_of(status)["data"]["status"], "archived");
}

#[test]
fn null_json_fields_are_rejected_before_storage() {
    let app = app();
    app.login_as("ed@example.com", Role::Editor);
    let section = app.post(
        "/api/admin/sections",
        json!({ "section_key": "hero", "content": { "headline": "Hi" } }),
    );
    assert_eq!(section.status(), Status::Created);
    let id = json_of(section)["data"]["id"].as_i64().unwrap();

    let response = app.patch(&format!("/api/admin/sections/{}", id), json!({ "content": null }));
    assert_eq!(response.status(), Status::BadRequest);
    let body = json_of(response);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    let error = body["error"].as_str().unwrap_or_default();
    assert!(error.contains("'content'"), "{}", error);
    assert!(!error.contains("NOT NULL"), "{}", error);

    let service = app.post("/api/admin/services", json!({ "title": "Audit", "features": 3 }));
    assert_eq!(service.status(), Status::BadRequest);
    assert!(json_of(service)["error"]
        .as_str()
        .unwrap_or_default()
        .contains("array or object"));
}

#[test]
fn activity_failures_do_not_change_responses() {
    let app = app();
    app.login_as("ed@example.com", Role::Editor);
    app.pool
        .get()
        .unwrap()
        .execute_batch("DROP TABLE activity_log;")
        .unwrap();

    let response = app.post("/api/admin/posts", json!({ "title": "Still Works", "content": "x" }));
    assert_eq!(response.status(), Status::Created);
    assert_eq!(json_of(response)["data"]["slug"], "still-works");
}

#[test]
fn categories_in_use_cannot_be_deleted() {
    let app = app();
    app.login_as("ed@example.com", Role::Editor);

    let category = json_of(app.post(
        "/api/admin/categories",
        json!({ "name": "Rust", "kind": "post" }),
    ));
    let category_id = category["data"]["id"].as_i64().unwrap();

    let missing = app.post(
        "/api/admin/posts",
        json!({ "title": "Orphan", "content": "x", "category_id": 999 }),
    );
    assert_eq!(missing.status(), Status::BadRequest);

    let post = app.post(
        "/api/admin/posts",
        json!({ "title": "Tagged", "content": "x", "category_id": category_id }),
    );
    assert_eq!(post.status(), Status::Created);

    let uri = format!("/api/admin/categories/{}", category_id);
    assert_eq!(app.delete(&uri).status(), Status::Conflict);
}

// ── Users ──

#[test]
fn roles_are_case_insensitive() {
    let app = app();
    app.login_as("root@example.com", Role::Admin);

    let created = app.post(
        "/api/admin/users",
        json!({
            "name": "Ed",
            "email": "ed@example.com",
            "password": "long-enough",
            "role": "Editor"
        }),
    );
    assert_eq!(created.status(), Status::Created);
    let created = json_of(created);
    assert_eq!(created["data"]["role"], "editor");

    let id = created["data"]["id"].as_i64().unwrap();
    let updated = app.patch(&format!("/api/admin/users/{}", id), json!({ "role": "AUTHOR" }));
    assert_eq!(updated.status(), Status::Ok);
    assert_eq!(json_of(updated)["data"]["role"], "author");

    let bogus = app.patch(&format!("/api/admin/users/{}", id), json!({ "role": "owner" }));
    assert_eq!(bogus.status(), Status::BadRequest);
}

#[test]
fn last_admin_is_protected() {
    let app = app();
    let admin = app.login_as("root@example.com", Role::Admin);
    let uri = format!("/api/admin/users/{}", admin);

    assert_eq!(app.patch(&uri, json!({ "role": "editor" })).status(), Status::Conflict);
    assert_eq!(app.patch(&uri, json!({ "is_active": false })).status(), Status::Conflict);
    assert_eq!(app.delete(&uri).status(), Status::BadRequest);

    // with a second admin the demotion goes through
    app.user("second@example.com", Role::Admin);
    assert_eq!(app.patch(&uri, json!({ "role": "editor" })).status(), Status::Ok);
}

#[test]
fn duplicate_user_emails_conflict() {
    let app = app();
    app.login_as("root@example.com", Role::Admin);
    let body = json!({ "name": "Ed", "email": "ed@example.com", "password": "long-enough" });
    assert_eq!(app.post("/api/admin/users", body.clone()).status(), Status::Created);
    assert_eq!(app.post("/api/admin/users", body).status(), Status::Conflict);

    let short = app.post(
        "/api/admin/users",
        json!({ "name": "Al", "email": "al@example.com", "password": "short" }),
    );
    assert_eq!(short.status(), Status::BadRequest);
}

#[test]
fn mutations_are_logged() {
    let app = app();
    let admin = app.login_as("root@example.com", Role::Admin);
    app.post("/api/admin/posts", json!({ "title": "Logged", "content": "x" }));

    let log = json_of(app.get("/api/admin/activity?action=create&table=posts"));
    assert_eq!(log["pagination"]["total"], 1);
    assert_eq!(log["data"][0]["user_id"], admin);
}

// ── Public site ──

#[test]
fn huge_page_numbers_return_an_empty_page() {
    let app = app();
    let author = app.user("writer@example.com", Role::Author);
    app.published_post("live", author);

    let response = app.get("/api/posts?page=9223372036854775807");
    assert_eq!(response.status(), Status::Ok);
    let body = json_of(response);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(0));
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(app.get("/api/projects?page=-5").status(), Status::Ok);
}

#[test]
fn public_listing_hides_drafts() {
    let app = app();
    let author = app.user("writer@example.com", Role::Author);
    app.published_post("live", author);
    app.store
        .post_create(&PostForm {
            title: "Draft".to_string(),
            slug: Some("draft".to_string()),
            content: "x".to_string(),
            author_id: Some(author),
            ..Default::default()
        })
        .unwrap();

    let list = json_of(app.get("/api/posts"));
    assert_eq!(list["pagination"]["total"], 1);
    assert_eq!(list["data"][0]["slug"], "live");
    assert_eq!(app.get("/api/posts/draft").status(), Status::NotFound);
}

#[test]
fn comments_wait_for_moderation() {
    let app = app();
    let editor = app.user("ed@example.com", Role::Editor);
    app.published_post("hello", editor);

    let created = app.post(
        "/api/posts/hello/comments",
        json!({ "author_name": "Reader", "author_email": "r@example.com", "body": "Nice" }),
    );
    assert_eq!(created.status(), Status::Created);
    let comment_id = json_of(created)["data"]["id"].as_i64().unwrap();

    let post = json_of(app.get("/api/posts/hello"));
    assert_eq!(post["data"]["comments"].as_array().map(Vec::len), Some(0));

    assert_eq!(app.login("ed@example.com").status(), Status::Ok);
    let approved = app.patch(
        &format!("/api/admin/comments/{}", comment_id),
        json!({ "status": "approved" }),
    );
    assert_eq!(approved.status(), Status::Ok);

    let post = json_of(app.get("/api/posts/hello"));
    assert_eq!(post["data"]["comments"][0]["body"], "Nice");

    let invalid = app.post(
        "/api/posts/hello/comments",
        json!({ "author_name": "Reader", "author_email": "nope", "body": "Nice" }),
    );
    assert_eq!(invalid.status(), Status::BadRequest);
}

#[test]
fn contact_messages_reach_the_inbox() {
    let app = app();
    let sent = app.post(
        "/api/contact",
        json!({ "name": "Client", "email": "client@example.com", "message": "Hire you?" }),
    );
    assert_eq!(sent.status(), Status::Created);

    app.login_as("ed@example.com", Role::Editor);
    let inbox = json_of(app.get("/api/admin/contacts"));
    assert_eq!(inbox["unread"], 1);
    let id = inbox["data"][0]["id"].as_i64().unwrap();

    assert_eq!(app.get(&format!("/api/admin/contacts/{}", id)).status(), Status::Ok);
    let inbox = json_of(app.get("/api/admin/contacts"));
    assert_eq!(inbox["unread"], 0);
}

#[test]
fn contact_form_is_rate_limited() {
    let app = app();
    let body = json!({ "name": "Spam", "email": "spam@example.com", "message": "Buy" });
    for _ in 0..5 {
        assert_eq!(app.post("/api/contact", body.clone()).status(), Status::Created);
    }
    let limited = app.post("/api/contact", body);
    assert_eq!(limited.status(), Status::TooManyRequests);
    assert_eq!(json_of(limited)["code"], "RATE_LIMITED");
}

#[test]
fn newsletter_subscribe_is_idempotent() {
    let app = app();
    let body = json!({ "email": "Fan@Example.com" });
    assert_eq!(app.post("/api/newsletter/subscribe", body.clone()).status(), Status::Ok);
    assert_eq!(app.post("/api/newsletter/subscribe", body.clone()).status(), Status::Ok);
    assert_eq!(app.store.newsletter_count(None).unwrap(), 1);

    assert_eq!(app.post("/api/newsletter/unsubscribe", body).status(), Status::Ok);
    assert_eq!(app.store.newsletter_count(Some("unsubscribed")).unwrap(), 1);

    // unknown addresses get the same answer
    let unknown = app.post("/api/newsletter/unsubscribe", json!({ "email": "x@example.com" }));
    assert_eq!(unknown.status(), Status::Ok);
}

#[test]
fn public_views_feed_analytics() {
    let app = app();
    let author = app.user("writer@example.com", Role::Editor);
    app.published_post("tracked", author);

    assert_eq!(app.get("/api/posts/tracked").status(), Status::Ok);
    assert_eq!(app.get("/api/posts/missing").status(), Status::NotFound);
    assert_eq!(app.get("/api/health").status(), Status::Ok);

    assert_eq!(app.login("writer@example.com").status(), Status::Ok);
    let top = json_of(app.get("/api/admin/analytics/top-paths"));
    let paths = top["data"].as_array().cloned().unwrap_or_default();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0]["label"], "/api/posts/tracked");
}

#[test]
fn health_reports_backend() {
    let app = app();
    let response = app.get("/api/health");
    assert_eq!(response.status(), Status::Ok);
    let body = json_of(response);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["backend"], "sqlite");
}

#[test]
fn unknown_routes_use_the_error_envelope() {
    let app = app();
    let response = app.get("/api/nothing-here");
    assert_eq!(response.status(), Status::NotFound);
    let body = json_of(response);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "NOT_FOUND");
}
