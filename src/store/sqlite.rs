use rusqlite::ffi;
use rusqlite::types::{ToSql, ToSqlOutput};
use rusqlite::{params, ErrorCode};

use crate::db::DbPool;
use crate::models::activity::{ActivityEntry, ActivityQuery, NewActivity};
use crate::models::analytics::{self, CountEntry, DailyCount, DateRange, NewPageView, OverviewStats};
use crate::models::category::{Category, CategoryForm};
use crate::models::comment::{Comment, CommentForm, CommentQuery};
use crate::models::contact::{ContactForm, ContactSubmission};
use crate::models::homepage::{HomepageSection, SectionForm};
use crate::models::media::{MediaForm, MediaItem};
use crate::models::newsletter::NewsletterSubscription;
use crate::models::post::{Post, PostForm};
use crate::models::project::{Project, ProjectForm};
use crate::models::service::{Service, ServiceForm};
use crate::models::session::{self, NewSession};
use crate::models::user::{NewUser, User};
use crate::models::ContentQuery;
use crate::patch::{Patch, PatchValue};
use crate::security::roles::Role;

use super::{duplicate_column, Store, StoreError, StoreResult, UNIQUE_COLUMNS};

/// SQLite-backed implementation of the Store trait.
/// Wraps the r2d2 connection pool and delegates to model methods.
pub struct SqliteStore {
    pub pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn new_at(path: &str) -> Result<Self, String> {
        let pool = crate::db::init_pool_at(path).map_err(|e| e.to_string())?;
        Ok(Self { pool })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(ref err, ref msg)
                if err.code == ErrorCode::ConstraintViolation =>
            {
                let msg = msg.clone().unwrap_or_default();
                match err.extended_code {
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        StoreError::Unique(duplicate_column(&msg))
                    }
                    ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                        StoreError::Constraint("referenced record does not exist".to_string())
                    }
                    ffi::SQLITE_CONSTRAINT_NOTNULL => {
                        log::warn!("rejected write: {}", msg);
                        StoreError::Constraint("a required value is missing".to_string())
                    }
                    _ => {
                        log::warn!("rejected write: {}", msg);
                        StoreError::Constraint("value violates a data constraint".to_string())
                    }
                }
            }
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            other => StoreError::Backend(other.to_string()),
        }
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(e: r2d2::Error) -> Self {
        StoreError::Backend(format!("connection pool: {}", e))
    }
}

impl ToSql for PatchValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            PatchValue::Null => Ok(ToSqlOutput::Owned(rusqlite::types::Value::Null)),
            PatchValue::Text(s) => s.to_sql(),
            PatchValue::Int(i) => i.to_sql(),
            PatchValue::Bool(b) => b.to_sql(),
        }
    }
}

impl Store for SqliteStore {
    // ── Lifecycle ───────────────────────────────────────────────────

    fn run_migrations(&self) -> StoreResult<()> {
        crate::db::run_migrations(&self.pool).map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn ping(&self) -> StoreResult<()> {
        let conn = self.pool.get()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    // ── Generic ─────────────────────────────────────────────────────

    fn apply_patch(&self, patch: &Patch, id: i64) -> StoreResult<bool> {
        let stmt = patch.to_update(id);
        let params: Vec<&dyn ToSql> = stmt.params.iter().map(|p| p as &dyn ToSql).collect();
        let conn = self.pool.get()?;
        let changed = conn.execute(&stmt.sql, params.as_slice())?;
        Ok(changed > 0)
    }

    fn value_taken(
        &self,
        table: &'static str,
        column: &'static str,
        value: &str,
        exclude_id: Option<i64>,
    ) -> StoreResult<bool> {
        if !UNIQUE_COLUMNS.contains(&(table, column)) {
            return Err(StoreError::Backend(format!(
                "uniqueness check not supported for {}.{}",
                table, column
            )));
        }
        let conn = self.pool.get()?;
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1 AND id != ?2",
            table, column
        );
        let count: i64 = conn.query_row(&sql, params![value, exclude_id.unwrap_or(0)], |row| {
            row.get(0)
        })?;
        Ok(count > 0)
    }

    // ── Users ───────────────────────────────────────────────────────

    fn user_get_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        User::get_by_id(&self.pool, id)
    }

    fn user_get_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        User::get_by_email(&self.pool, email)
    }

    fn user_list(&self, role: Option<Role>, limit: i64, offset: i64) -> StoreResult<Vec<User>> {
        User::list(&self.pool, role, limit, offset)
    }

    fn user_count(&self, role: Option<Role>) -> StoreResult<i64> {
        User::count(&self.pool, role)
    }

    fn user_count_active_admins(&self) -> StoreResult<i64> {
        User::count_active_admins(&self.pool)
    }

    fn user_create(&self, user: &NewUser) -> StoreResult<i64> {
        User::create(&self.pool, user)
    }

    fn user_set_password(&self, id: i64, password_hash: &str) -> StoreResult<()> {
        User::set_password(&self.pool, id, password_hash)
    }

    fn user_touch_last_login(&self, id: i64) -> StoreResult<()> {
        User::touch_last_login(&self.pool, id)
    }

    fn user_delete(&self, id: i64) -> StoreResult<bool> {
        User::delete(&self.pool, id)
    }

    // ── Sessions ────────────────────────────────────────────────────

    fn session_create(&self, new: &NewSession) -> StoreResult<()> {
        session::create(&self.pool, new)
    }

    fn session_get_user(&self, token: &str) -> StoreResult<Option<User>> {
        session::get_user(&self.pool, token)
    }

    fn session_delete(&self, token: &str) -> StoreResult<()> {
        session::delete(&self.pool, token)
    }

    fn session_delete_for_user(&self, user_id: i64) -> StoreResult<usize> {
        session::delete_for_user(&self.pool, user_id)
    }

    fn session_cleanup_expired(&self) -> StoreResult<usize> {
        session::cleanup_expired(&self.pool)
    }

    // ── Posts ────────────────────────────────────────────────────────

    fn post_find_by_id(&self, id: i64) -> StoreResult<Option<Post>> {
        Post::find_by_id(&self.pool, id)
    }

    fn post_find_by_slug(&self, slug: &str) -> StoreResult<Option<Post>> {
        Post::find_by_slug(&self.pool, slug)
    }

    fn post_list(&self, query: &ContentQuery) -> StoreResult<Vec<Post>> {
        Post::list(&self.pool, query)
    }

    fn post_count(&self, query: &ContentQuery) -> StoreResult<i64> {
        Post::count(&self.pool, query)
    }

    fn post_create(&self, form: &PostForm) -> StoreResult<i64> {
        Post::create(&self.pool, form)
    }

    fn post_delete(&self, id: i64) -> StoreResult<bool> {
        // comments go with it (ON DELETE CASCADE)
        Post::delete(&self.pool, id)
    }

    // ── Projects ────────────────────────────────────────────────────

    fn project_find_by_id(&self, id: i64) -> StoreResult<Option<Project>> {
        Project::find_by_id(&self.pool, id)
    }

    fn project_find_by_slug(&self, slug: &str) -> StoreResult<Option<Project>> {
        Project::find_by_slug(&self.pool, slug)
    }

    fn project_list(&self, query: &ContentQuery) -> StoreResult<Vec<Project>> {
        Project::list(&self.pool, query)
    }

    fn project_count(&self, query: &ContentQuery) -> StoreResult<i64> {
        Project::count(&self.pool, query)
    }

    fn project_create(&self, form: &ProjectForm) -> StoreResult<i64> {
        Project::create(&self.pool, form)
    }

    fn project_delete(&self, id: i64) -> StoreResult<bool> {
        Project::delete(&self.pool, id)
    }

    // ── Categories ──────────────────────────────────────────────────

    fn category_find_by_id(&self, id: i64) -> StoreResult<Option<Category>> {
        Category::find_by_id(&self.pool, id)
    }

    fn category_list(&self, kind: Option<&str>) -> StoreResult<Vec<Category>> {
        Category::list(&self.pool, kind)
    }

    fn category_create(&self, form: &CategoryForm) -> StoreResult<i64> {
        Category::create(&self.pool, form)
    }

    fn category_delete(&self, id: i64) -> StoreResult<bool> {
        Category::delete(&self.pool, id)
    }

    fn category_usage_count(&self, id: i64) -> StoreResult<i64> {
        Category::usage_count(&self.pool, id)
    }

    // ── Comments ────────────────────────────────────────────────────

    fn comment_find_by_id(&self, id: i64) -> StoreResult<Option<Comment>> {
        Comment::find_by_id(&self.pool, id)
    }

    fn comment_list(&self, query: &CommentQuery) -> StoreResult<Vec<Comment>> {
        Comment::list(&self.pool, query)
    }

    fn comment_count(&self, query: &CommentQuery) -> StoreResult<i64> {
        Comment::count(&self.pool, query)
    }

    fn comment_create(&self, form: &CommentForm) -> StoreResult<i64> {
        Comment::create(&self.pool, form)
    }

    fn comment_delete(&self, id: i64) -> StoreResult<bool> {
        Comment::delete(&self.pool, id)
    }

    // ── Services ────────────────────────────────────────────────────

    fn service_find_by_id(&self, id: i64) -> StoreResult<Option<Service>> {
        Service::find_by_id(&self.pool, id)
    }

    fn service_list(&self, active_only: bool) -> StoreResult<Vec<Service>> {
        Service::list(&self.pool, active_only)
    }

    fn service_create(&self, form: &ServiceForm) -> StoreResult<i64> {
        Service::create(&self.pool, form)
    }

    fn service_delete(&self, id: i64) -> StoreResult<bool> {
        Service::delete(&self.pool, id)
    }

    // ── Homepage sections ───────────────────────────────────────────

    fn section_find_by_id(&self, id: i64) -> StoreResult<Option<HomepageSection>> {
        HomepageSection::find_by_id(&self.pool, id)
    }

    fn section_list(&self, active_only: bool) -> StoreResult<Vec<HomepageSection>> {
        HomepageSection::list(&self.pool, active_only)
    }

    fn section_create(&self, form: &SectionForm) -> StoreResult<i64> {
        HomepageSection::create(&self.pool, form)
    }

    fn section_delete(&self, id: i64) -> StoreResult<bool> {
        HomepageSection::delete(&self.pool, id)
    }

    // ── Contact submissions ─────────────────────────────────────────

    fn contact_find_by_id(&self, id: i64) -> StoreResult<Option<ContactSubmission>> {
        ContactSubmission::find_by_id(&self.pool, id)
    }

    fn contact_list(
        &self,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<ContactSubmission>> {
        ContactSubmission::list(&self.pool, status, limit, offset)
    }

    fn contact_count(&self, status: Option<&str>) -> StoreResult<i64> {
        ContactSubmission::count(&self.pool, status)
    }

    fn contact_count_unread(&self) -> StoreResult<i64> {
        ContactSubmission::count_unread(&self.pool)
    }

    fn contact_create(&self, form: &ContactForm) -> StoreResult<i64> {
        ContactSubmission::create(&self.pool, form)
    }

    fn contact_mark_read(&self, id: i64) -> StoreResult<()> {
        ContactSubmission::mark_read(&self.pool, id)
    }

    fn contact_delete(&self, id: i64) -> StoreResult<bool> {
        ContactSubmission::delete(&self.pool, id)
    }

    // ── Newsletter ──────────────────────────────────────────────────

    fn newsletter_find_by_email(&self, email: &str) -> StoreResult<Option<NewsletterSubscription>> {
        NewsletterSubscription::find_by_email(&self.pool, email)
    }

    fn newsletter_list(
        &self,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<NewsletterSubscription>> {
        NewsletterSubscription::list(&self.pool, status, limit, offset)
    }

    fn newsletter_count(&self, status: Option<&str>) -> StoreResult<i64> {
        NewsletterSubscription::count(&self.pool, status)
    }

    fn newsletter_subscribe(&self, email: &str, name: Option<&str>) -> StoreResult<()> {
        NewsletterSubscription::subscribe(&self.pool, email, name)
    }

    fn newsletter_unsubscribe(&self, email: &str) -> StoreResult<bool> {
        NewsletterSubscription::unsubscribe(&self.pool, email)
    }

    fn newsletter_delete(&self, id: i64) -> StoreResult<bool> {
        NewsletterSubscription::delete(&self.pool, id)
    }

    // ── Media ───────────────────────────────────────────────────────

    fn media_find_by_id(&self, id: i64) -> StoreResult<Option<MediaItem>> {
        MediaItem::find_by_id(&self.pool, id)
    }

    fn media_list(&self, limit: i64, offset: i64) -> StoreResult<Vec<MediaItem>> {
        MediaItem::list(&self.pool, limit, offset)
    }

    fn media_count(&self) -> StoreResult<i64> {
        MediaItem::count(&self.pool)
    }

    fn media_create(&self, form: &MediaForm) -> StoreResult<i64> {
        MediaItem::create(&self.pool, form)
    }

    fn media_delete(&self, id: i64) -> StoreResult<bool> {
        MediaItem::delete(&self.pool, id)
    }

    // ── Activity log ────────────────────────────────────────────────

    fn activity_record(&self, entry: &NewActivity) -> StoreResult<i64> {
        ActivityEntry::record(&self.pool, entry)
    }

    fn activity_list(&self, query: &ActivityQuery) -> StoreResult<Vec<ActivityEntry>> {
        ActivityEntry::list(&self.pool, query)
    }

    fn activity_count(&self, query: &ActivityQuery) -> StoreResult<i64> {
        ActivityEntry::count(&self.pool, query)
    }

    fn activity_cleanup(&self, max_age_days: i64) -> StoreResult<usize> {
        ActivityEntry::cleanup(&self.pool, max_age_days)
    }

    // ── Analytics ───────────────────────────────────────────────────

    fn analytics_record(&self, view: &NewPageView) -> StoreResult<()> {
        analytics::record(&self.pool, view)
    }

    fn analytics_overview(&self, range: &DateRange) -> StoreResult<OverviewStats> {
        analytics::overview(&self.pool, range)
    }

    fn analytics_top_paths(&self, range: &DateRange, limit: i64) -> StoreResult<Vec<CountEntry>> {
        analytics::top_paths(&self.pool, range, limit)
    }

    fn analytics_top_referrers(
        &self,
        range: &DateRange,
        limit: i64,
    ) -> StoreResult<Vec<CountEntry>> {
        analytics::top_referrers(&self.pool, range, limit)
    }

    fn analytics_daily(&self, range: &DateRange) -> StoreResult<Vec<DailyCount>> {
        analytics::daily(&self.pool, range)
    }

    fn analytics_prune(&self, max_age_days: i64) -> StoreResult<usize> {
        analytics::prune(&self.pool, max_age_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::newsletter::NewsletterSubscription;
    use crate::models::user::USER_TABLE;
    use crate::models::post::POST_TABLE;
    use r2d2::Pool;
    use r2d2_sqlite::SqliteConnectionManager;
    use serde_json::json;

    static TEST_DB_COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

    fn store() -> SqliteStore {
        let id = TEST_DB_COUNTER.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let uri = format!("file:store_test_{}?mode=memory&cache=shared", id);
        let manager = SqliteConnectionManager::file(uri)
            .with_init(|c| c.execute_batch("PRAGMA foreign_keys=ON;"));
        let pool = Pool::builder().max_size(2).build(manager).unwrap();
        let store = SqliteStore::new(pool);
        store.run_migrations().unwrap();
        store
    }

    fn author(store: &SqliteStore) -> i64 {
        store
            .user_create(&NewUser {
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                password_hash: "x".to_string(),
                role: Role::Author,
                is_active: true,
            })
            .unwrap()
    }

    fn post(store: &SqliteStore, slug: &str, status: &str, author_id: i64) -> i64 {
        store
            .post_create(&PostForm {
                title: slug.to_string(),
                slug: Some(slug.to_string()),
                status: Some(status.to_string()),
                author_id: Some(author_id),
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn duplicate_slug_is_unique_error() {
        let s = store();
        let a = author(&s);
        post(&s, "hello", "draft", a);
        let err = s
            .post_create(&PostForm {
                title: "Again".to_string(),
                slug: Some("hello".to_string()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err, StoreError::Unique("slug".to_string()));
    }

    #[test]
    fn missing_foreign_key_is_constraint_error() {
        let s = store();
        let err = s
            .comment_create(&CommentForm {
                post_id: 999,
                author_name: "x".to_string(),
                author_email: "x@example.com".to_string(),
                body: "hi".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
    }

    #[test]
    fn not_null_violation_hides_driver_text() {
        let s = store();
        let err = s
            .pool
            .get()
            .unwrap()
            .execute(
                "INSERT INTO homepage_sections (section_key, content) VALUES ('hero', NULL)",
                [],
            )
            .map_err(StoreError::from)
            .unwrap_err();
        assert_eq!(err, StoreError::Constraint("a required value is missing".to_string()));
        assert!(!err.to_string().contains("homepage_sections"));
    }

    #[test]
    fn patch_updates_only_listed_columns() {
        let s = store();
        let a = author(&s);
        let id = post(&s, "first", "draft", a);
        let patch = Patch::from_json(
            &POST_TABLE,
            &json!({"title": "Renamed", "featured": true, "author_id": 77}),
        )
        .unwrap();
        assert!(s.apply_patch(&patch, id).unwrap());
        let p = s.post_find_by_id(id).unwrap().unwrap();
        assert_eq!(p.title, "Renamed");
        assert!(p.featured);
        assert_eq!(p.author_id, Some(a));
        assert!(!s.apply_patch(&patch, 12345).unwrap());
    }

    #[test]
    fn patch_can_change_role_and_email() {
        let s = store();
        let a = author(&s);
        let patch =
            Patch::from_json(&USER_TABLE, &json!({"role": "EDITOR", "email": "New@Example.com"}))
                .unwrap();
        s.apply_patch(&patch, a).unwrap();
        let u = s.user_get_by_id(a).unwrap().unwrap();
        assert_eq!(u.role, Role::Editor);
        assert_eq!(u.email, "new@example.com");
    }

    #[test]
    fn value_taken_excludes_own_record() {
        let s = store();
        let a = author(&s);
        let id = post(&s, "taken", "draft", a);
        assert!(s.value_taken("posts", "slug", "taken", None).unwrap());
        assert!(!s.value_taken("posts", "slug", "taken", Some(id)).unwrap());
        assert!(!s.value_taken("posts", "slug", "free", None).unwrap());
        assert!(s.value_taken("posts", "title", "x", None).is_err());
    }

    #[test]
    fn expired_sessions_do_not_resolve() {
        let s = store();
        let a = author(&s);
        s.session_create(&NewSession {
            id: "live".to_string(),
            user_id: a,
            expires_at: crate::models::timestamp_from_now(chrono::Duration::hours(1)),
            ip_address: None,
            user_agent: None,
        })
        .unwrap();
        s.session_create(&NewSession {
            id: "stale".to_string(),
            user_id: a,
            expires_at: crate::models::timestamp_from_now(-chrono::Duration::hours(1)),
            ip_address: None,
            user_agent: None,
        })
        .unwrap();
        assert_eq!(s.session_get_user("live").unwrap().unwrap().id, a);
        assert!(s.session_get_user("stale").unwrap().is_none());
        assert!(s.session_get_user("missing").unwrap().is_none());
        assert_eq!(s.session_cleanup_expired().unwrap(), 1);
    }

    #[test]
    fn content_filters_combine() {
        let s = store();
        let a = author(&s);
        post(&s, "one", "published", a);
        post(&s, "two", "draft", a);
        post(&s, "three", "published", a);
        let q = ContentQuery {
            status: Some("published".to_string()),
            limit: 10,
            ..Default::default()
        };
        assert_eq!(s.post_count(&q).unwrap(), 2);
        assert_eq!(s.post_list(&q).unwrap().len(), 2);
        let paged = ContentQuery {
            limit: 1,
            offset: 1,
            ..q.clone()
        };
        assert_eq!(s.post_list(&paged).unwrap().len(), 1);
    }

    #[test]
    fn deleting_post_removes_its_comments() {
        let s = store();
        let a = author(&s);
        let id = post(&s, "with-comments", "published", a);
        s.comment_create(&CommentForm {
            post_id: id,
            author_name: "Bob".to_string(),
            author_email: "bob@example.com".to_string(),
            body: "Nice".to_string(),
        })
        .unwrap();
        assert!(s.post_delete(id).unwrap());
        let q = CommentQuery {
            limit: 10,
            ..Default::default()
        };
        assert_eq!(s.comment_count(&q).unwrap(), 0);
    }

    #[test]
    fn category_usage_counts_posts_and_projects() {
        let s = store();
        let a = author(&s);
        let cat = s
            .category_create(&CategoryForm {
                name: "Rust".to_string(),
                slug: Some("rust".to_string()),
                kind: Some("post".to_string()),
                description: None,
            })
            .unwrap();
        assert_eq!(s.category_usage_count(cat).unwrap(), 0);
        s.post_create(&PostForm {
            title: "T".to_string(),
            slug: Some("t".to_string()),
            category_id: Some(cat),
            author_id: Some(a),
            ..Default::default()
        })
        .unwrap();
        s.project_create(&ProjectForm {
            title: "P".to_string(),
            slug: Some("p".to_string()),
            category_id: Some(cat),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(s.category_usage_count(cat).unwrap(), 2);
    }

    #[test]
    fn resubscribe_flips_status_back() {
        let s = store();
        s.newsletter_subscribe("reader@example.com", Some("Reader")).unwrap();
        assert!(s.newsletter_unsubscribe("reader@example.com").unwrap());
        s.newsletter_subscribe("reader@example.com", None).unwrap();
        let sub: NewsletterSubscription =
            s.newsletter_find_by_email("reader@example.com").unwrap().unwrap();
        assert_eq!(sub.status, "subscribed");
        assert_eq!(sub.name.as_deref(), Some("Reader"));
        assert_eq!(s.newsletter_count(None).unwrap(), 1);
        assert!(!s.newsletter_unsubscribe("nobody@example.com").unwrap());
    }

    #[test]
    fn activity_filters_and_prunes() {
        let s = store();
        s.activity_record(&NewActivity {
            action: "create".to_string(),
            table_name: Some("posts".to_string()),
            record_id: Some(1),
            changes: Some(json!({"title": "x"})),
            ..Default::default()
        })
        .unwrap();
        s.activity_record(&NewActivity {
            action: "delete".to_string(),
            table_name: Some("posts".to_string()),
            ..Default::default()
        })
        .unwrap();
        let q = ActivityQuery {
            action: Some("create".to_string()),
            limit: 10,
            ..Default::default()
        };
        let rows = s.activity_list(&q).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].changes.as_deref(), Some(r#"{"title":"x"}"#));
        assert_eq!(s.activity_cleanup(30).unwrap(), 0);
    }

    #[test]
    fn analytics_groups_views() {
        let s = store();
        for (path, referrer, ip) in [
            ("/api/posts", Some("example.com"), "a"),
            ("/api/posts", None, "b"),
            ("/api/projects", Some("example.com"), "a"),
        ] {
            s.analytics_record(&NewPageView {
                path: path.to_string(),
                referrer: referrer.map(String::from),
                ip_hash: ip.to_string(),
                user_agent: None,
            })
            .unwrap();
        }
        let range = DateRange::parse(None, None).unwrap();
        let overview = s.analytics_overview(&range).unwrap();
        assert_eq!(overview.total_views, 3);
        assert_eq!(overview.unique_visitors, 2);
        let paths = s.analytics_top_paths(&range, 10).unwrap();
        assert_eq!(paths[0].label, "/api/posts");
        assert_eq!(paths[0].count, 2);
        let refs = s.analytics_top_referrers(&range, 10).unwrap();
        assert_eq!(refs.len(), 1);
        let daily = s.analytics_daily(&range).unwrap();
        assert_eq!(daily.iter().map(|d| d.count).sum::<i64>(), 3);
    }
}
