use thiserror::Error;

use crate::models::activity::{ActivityEntry, ActivityQuery, NewActivity};
use crate::models::analytics::{CountEntry, DailyCount, DateRange, NewPageView, OverviewStats};
use crate::models::category::{Category, CategoryForm};
use crate::models::comment::{Comment, CommentForm, CommentQuery};
use crate::models::contact::{ContactForm, ContactSubmission};
use crate::models::homepage::{HomepageSection, SectionForm};
use crate::models::media::{MediaForm, MediaItem};
use crate::models::newsletter::NewsletterSubscription;
use crate::models::post::{Post, PostForm};
use crate::models::project::{Project, ProjectForm};
use crate::models::service::{Service, ServiceForm};
use crate::models::session::NewSession;
use crate::models::user::{NewUser, User};
use crate::models::ContentQuery;
use crate::patch::Patch;
use crate::security::roles::Role;

pub mod mongo;
pub mod sqlite;

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    /// A unique column already holds the value; carries the column name
    #[error("duplicate value for {0}")]
    Unique(String),
    #[error("constraint violated: {0}")]
    Constraint(String),
    #[error("record not found")]
    NotFound,
    #[error("{0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Tables and columns `Store::value_taken` may be asked about.
pub(crate) const UNIQUE_COLUMNS: &[(&str, &str)] = &[
    ("users", "email"),
    ("posts", "slug"),
    ("projects", "slug"),
    ("categories", "slug"),
    ("homepage_sections", "section_key"),
    ("newsletter_subscriptions", "email"),
];

/// Unified data-access trait. Every database operation goes through here.
/// Implementations: `SqliteStore` (rusqlite behind r2d2) and `MongoStore` (mongodb sync driver).
pub trait Store: Send + Sync {
    // ── Lifecycle ───────────────────────────────────────────────────
    fn run_migrations(&self) -> StoreResult<()>;
    fn backend_name(&self) -> &'static str;
    fn ping(&self) -> StoreResult<()>;

    // ── Generic ─────────────────────────────────────────────────────
    /// Apply an allow-listed partial update. Returns false when no record has `id`.
    fn apply_patch(&self, patch: &Patch, id: i64) -> StoreResult<bool>;
    /// Whether `table.column` already holds `value` on a record other than `exclude_id`.
    fn value_taken(
        &self,
        table: &'static str,
        column: &'static str,
        value: &str,
        exclude_id: Option<i64>,
    ) -> StoreResult<bool>;

    // ── Users ───────────────────────────────────────────────────────
    fn user_get_by_id(&self, id: i64) -> StoreResult<Option<User>>;
    fn user_get_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    fn user_list(&self, role: Option<Role>, limit: i64, offset: i64) -> StoreResult<Vec<User>>;
    fn user_count(&self, role: Option<Role>) -> StoreResult<i64>;
    fn user_count_active_admins(&self) -> StoreResult<i64>;
    fn user_create(&self, user: &NewUser) -> StoreResult<i64>;
    fn user_set_password(&self, id: i64, password_hash: &str) -> StoreResult<()>;
    fn user_touch_last_login(&self, id: i64) -> StoreResult<()>;
    fn user_delete(&self, id: i64) -> StoreResult<bool>;

    // ── Sessions ────────────────────────────────────────────────────
    fn session_create(&self, session: &NewSession) -> StoreResult<()>;
    /// The user behind an unexpired session, if any.
    fn session_get_user(&self, token: &str) -> StoreResult<Option<User>>;
    fn session_delete(&self, token: &str) -> StoreResult<()>;
    fn session_delete_for_user(&self, user_id: i64) -> StoreResult<usize>;
    fn session_cleanup_expired(&self) -> StoreResult<usize>;

    // ── Posts ────────────────────────────────────────────────────────
    fn post_find_by_id(&self, id: i64) -> StoreResult<Option<Post>>;
    fn post_find_by_slug(&self, slug: &str) -> StoreResult<Option<Post>>;
    fn post_list(&self, query: &ContentQuery) -> StoreResult<Vec<Post>>;
    fn post_count(&self, query: &ContentQuery) -> StoreResult<i64>;
    fn post_create(&self, form: &PostForm) -> StoreResult<i64>;
    /// Deletes the post and its comments.
    fn post_delete(&self, id: i64) -> StoreResult<bool>;

    // ── Projects ────────────────────────────────────────────────────
    fn project_find_by_id(&self, id: i64) -> StoreResult<Option<Project>>;
    fn project_find_by_slug(&self, slug: &str) -> StoreResult<Option<Project>>;
    fn project_list(&self, query: &ContentQuery) -> StoreResult<Vec<Project>>;
    fn project_count(&self, query: &ContentQuery) -> StoreResult<i64>;
    fn project_create(&self, form: &ProjectForm) -> StoreResult<i64>;
    fn project_delete(&self, id: i64) -> StoreResult<bool>;

    // ── Categories ──────────────────────────────────────────────────
    fn category_find_by_id(&self, id: i64) -> StoreResult<Option<Category>>;
    fn category_list(&self, kind: Option<&str>) -> StoreResult<Vec<Category>>;
    fn category_create(&self, form: &CategoryForm) -> StoreResult<i64>;
    fn category_delete(&self, id: i64) -> StoreResult<bool>;
    /// Posts and projects referencing the category.
    fn category_usage_count(&self, id: i64) -> StoreResult<i64>;

    // ── Comments ────────────────────────────────────────────────────
    fn comment_find_by_id(&self, id: i64) -> StoreResult<Option<Comment>>;
    fn comment_list(&self, query: &CommentQuery) -> StoreResult<Vec<Comment>>;
    fn comment_count(&self, query: &CommentQuery) -> StoreResult<i64>;
    fn comment_create(&self, form: &CommentForm) -> StoreResult<i64>;
    fn comment_delete(&self, id: i64) -> StoreResult<bool>;

    // ── Services ────────────────────────────────────────────────────
    fn service_find_by_id(&self, id: i64) -> StoreResult<Option<Service>>;
    fn service_list(&self, active_only: bool) -> StoreResult<Vec<Service>>;
    fn service_create(&self, form: &ServiceForm) -> StoreResult<i64>;
    fn service_delete(&self, id: i64) -> StoreResult<bool>;

    // ── Homepage sections ───────────────────────────────────────────
    fn section_find_by_id(&self, id: i64) -> StoreResult<Option<HomepageSection>>;
    fn section_list(&self, active_only: bool) -> StoreResult<Vec<HomepageSection>>;
    fn section_create(&self, form: &SectionForm) -> StoreResult<i64>;
    fn section_delete(&self, id: i64) -> StoreResult<bool>;

    // ── Contact submissions ─────────────────────────────────────────
    fn contact_find_by_id(&self, id: i64) -> StoreResult<Option<ContactSubmission>>;
    fn contact_list(&self, status: Option<&str>, limit: i64, offset: i64)
        -> StoreResult<Vec<ContactSubmission>>;
    fn contact_count(&self, status: Option<&str>) -> StoreResult<i64>;
    fn contact_count_unread(&self) -> StoreResult<i64>;
    fn contact_create(&self, form: &ContactForm) -> StoreResult<i64>;
    fn contact_mark_read(&self, id: i64) -> StoreResult<()>;
    fn contact_delete(&self, id: i64) -> StoreResult<bool>;

    // ── Newsletter ──────────────────────────────────────────────────
    fn newsletter_find_by_email(&self, email: &str) -> StoreResult<Option<NewsletterSubscription>>;
    fn newsletter_list(&self, status: Option<&str>, limit: i64, offset: i64)
        -> StoreResult<Vec<NewsletterSubscription>>;
    fn newsletter_count(&self, status: Option<&str>) -> StoreResult<i64>;
    /// Insert, or flip an existing address back to `subscribed`.
    fn newsletter_subscribe(&self, email: &str, name: Option<&str>) -> StoreResult<()>;
    /// Returns false when the address is unknown.
    fn newsletter_unsubscribe(&self, email: &str) -> StoreResult<bool>;
    fn newsletter_delete(&self, id: i64) -> StoreResult<bool>;

    // ── Media ───────────────────────────────────────────────────────
    fn media_find_by_id(&self, id: i64) -> StoreResult<Option<MediaItem>>;
    fn media_list(&self, limit: i64, offset: i64) -> StoreResult<Vec<MediaItem>>;
    fn media_count(&self) -> StoreResult<i64>;
    fn media_create(&self, form: &MediaForm) -> StoreResult<i64>;
    fn media_delete(&self, id: i64) -> StoreResult<bool>;

    // ── Activity log ────────────────────────────────────────────────
    fn activity_record(&self, entry: &NewActivity) -> StoreResult<i64>;
    fn activity_list(&self, query: &ActivityQuery) -> StoreResult<Vec<ActivityEntry>>;
    fn activity_count(&self, query: &ActivityQuery) -> StoreResult<i64>;
    fn activity_cleanup(&self, max_age_days: i64) -> StoreResult<usize>;

    // ── Analytics ───────────────────────────────────────────────────
    fn analytics_record(&self, view: &NewPageView) -> StoreResult<()>;
    fn analytics_overview(&self, range: &DateRange) -> StoreResult<OverviewStats>;
    fn analytics_top_paths(&self, range: &DateRange, limit: i64) -> StoreResult<Vec<CountEntry>>;
    fn analytics_top_referrers(&self, range: &DateRange, limit: i64)
        -> StoreResult<Vec<CountEntry>>;
    fn analytics_daily(&self, range: &DateRange) -> StoreResult<Vec<DailyCount>>;
    fn analytics_prune(&self, max_age_days: i64) -> StoreResult<usize>;
}

/// Column named in a backend's duplicate-key message.
/// SQLite: `UNIQUE constraint failed: posts.slug`; MongoDB: `... index: slug_1 dup key: ...`.
pub(crate) fn duplicate_column(message: &str) -> String {
    if let Some(rest) = message.split("constraint failed: ").nth(1) {
        let first = rest.split(',').next().unwrap_or(rest).trim();
        return first.rsplit('.').next().unwrap_or(first).to_string();
    }
    if let Some(rest) = message.split("index: ").nth(1) {
        let index = rest.split_whitespace().next().unwrap_or(rest);
        return index.trim_end_matches("_1").to_string();
    }
    "value".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_column_from_sqlite_message() {
        assert_eq!(duplicate_column("UNIQUE constraint failed: posts.slug"), "slug");
        assert_eq!(
            duplicate_column("UNIQUE constraint failed: users.email, users.name"),
            "email"
        );
    }

    #[test]
    fn duplicate_column_from_mongo_message() {
        assert_eq!(
            duplicate_column(
                "E11000 duplicate key error collection: folio.posts index: slug_1 dup key: { slug: \"a\" }"
            ),
            "slug"
        );
        assert_eq!(duplicate_column("something else"), "value");
    }
}
