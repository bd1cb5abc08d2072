use mongodb::bson::{doc, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{
    ClientOptions, FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument,
};
use mongodb::sync::{Client, Collection, Database};
use mongodb::IndexModel;

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
use crate::models::user::{role_from_stored, NewUser, User};
use crate::models::{days_ago, now_timestamp, ContentQuery};
use crate::patch::{Patch, PatchValue};
use crate::security::roles::Role;

use super::{duplicate_column, Store, StoreError, StoreResult, UNIQUE_COLUMNS};

/// MongoDB-backed implementation of the Store trait.
/// Documents carry an integer `id` drawn from the `_counters` collection,
/// so records look the same on both backends.
pub struct MongoStore {
    db: Database,
}

impl From<mongodb::error::Error> for StoreError {
    fn from(e: mongodb::error::Error) -> Self {
        if let ErrorKind::Write(WriteFailure::WriteError(ref we)) = *e.kind {
            if we.code == 11000 {
                return StoreError::Unique(duplicate_column(&we.message));
            }
        }
        StoreError::Backend(e.to_string())
    }
}

impl From<&PatchValue> for Bson {
    fn from(value: &PatchValue) -> Self {
        match value {
            PatchValue::Null => Bson::Null,
            PatchValue::Text(s) => Bson::String(s.clone()),
            PatchValue::Int(i) => Bson::Int64(*i),
            PatchValue::Bool(b) => Bson::Boolean(*b),
        }
    }
}

impl MongoStore {
    /// Create a new MongoStore by connecting to the given URI and database name.
    pub fn new(uri: &str, db_name: &str) -> Result<Self, String> {
        let client_options = ClientOptions::parse(uri).map_err(|e| e.to_string())?;
        let client = Client::with_options(client_options).map_err(|e| e.to_string())?;
        let db = client.database(db_name);
        Ok(Self { db })
    }

    fn coll(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }

    // ── Helper: get next auto-increment ID for a collection ──
    fn next_id(&self, collection_name: &str) -> StoreResult<i64> {
        let counters = self.coll("_counters");
        let opts = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let result = counters.find_one_and_update(
            doc! { "_id": collection_name },
            doc! { "$inc": { "seq": 1_i64 } },
            opts,
        )?;
        match result {
            Some(d) => Ok(bson_i64(d.get("seq")).unwrap_or(0)),
            None => Err(StoreError::Backend("failed to generate id".to_string())),
        }
    }

    fn ensure_index(&self, collection: &str, keys: Document, unique: bool) -> StoreResult<()> {
        let options = IndexOptions::builder().unique(unique).build();
        self.coll(collection).create_index(
            IndexModel::builder().keys(keys).options(options).build(),
            None,
        )?;
        Ok(())
    }

    fn find_one<T>(
        &self,
        collection: &str,
        filter: Document,
        convert: fn(&Document) -> Option<T>,
    ) -> StoreResult<Option<T>> {
        Ok(self
            .coll(collection)
            .find_one(filter, None)?
            .as_ref()
            .and_then(convert))
    }

    fn find_many<T>(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
        convert: fn(&Document) -> Option<T>,
    ) -> StoreResult<Vec<T>> {
        let cursor = self.coll(collection).find(filter, options)?;
        let mut out = Vec::new();
        for d in cursor {
            if let Some(item) = convert(&d?) {
                out.push(item);
            }
        }
        Ok(out)
    }

    fn count(&self, collection: &str, filter: Document) -> StoreResult<i64> {
        Ok(self.coll(collection).count_documents(filter, None)? as i64)
    }

    fn delete_by_id(&self, collection: &str, id: i64) -> StoreResult<bool> {
        let result = self.coll(collection).delete_one(doc! { "id": id }, None)?;
        Ok(result.deleted_count > 0)
    }

    /// Insert `fields` under a fresh integer id and return it.
    fn insert_with_id(&self, collection: &str, mut fields: Document) -> StoreResult<i64> {
        let id = self.next_id(collection)?;
        fields.insert("id", id);
        self.coll(collection).insert_one(fields, None)?;
        Ok(id)
    }

    fn group_counts(&self, pipeline: Vec<Document>) -> StoreResult<Vec<(String, i64)>> {
        let cursor = self.coll("page_views").aggregate(pipeline, None)?;
        let mut out = Vec::new();
        for d in cursor {
            let d = d?;
            let label = d.get_str("_id").unwrap_or_default().to_string();
            out.push((label, bson_i64(d.get("count")).unwrap_or(0)));
        }
        Ok(out)
    }

    fn top_by(&self, field: &str, range: &DateRange, limit: i64) -> StoreResult<Vec<CountEntry>> {
        let pipeline = vec![
            doc! { "$match": {
                "created_at": { "$gte": range.from.as_str(), "$lte": range.to.as_str() },
                field: { "$nin": [Bson::Null, ""] },
            }},
            doc! { "$group": { "_id": format!("${}", field), "count": { "$sum": 1 } } },
            doc! { "$sort": { "count": -1, "_id": 1 } },
            doc! { "$limit": limit },
        ];
        Ok(self
            .group_counts(pipeline)?
            .into_iter()
            .map(|(label, count)| CountEntry { label, count })
            .collect())
    }
}

/// `limit <= 0` means no limit, as with SQLite's `LIMIT -1`.
fn page_options(sort: Document, limit: i64, offset: i64) -> FindOptions {
    FindOptions::builder()
        .sort(sort)
        .skip(offset.max(0) as u64)
        .limit(if limit > 0 { Some(limit) } else { None })
        .build()
}

/// Newest first by `COALESCE(published_at, created_at)`, the same order as SQLite.
fn post_list_pipeline(query: &ContentQuery) -> Vec<Document> {
    let mut pipeline = vec![
        doc! { "$match": content_filter(query) },
        doc! { "$addFields": {
            "_sort_at": { "$ifNull": ["$published_at", "$created_at"] },
        }},
        doc! { "$sort": { "_sort_at": -1, "id": -1 } },
    ];
    if query.offset > 0 {
        pipeline.push(doc! { "$skip": query.offset });
    }
    if query.limit > 0 {
        pipeline.push(doc! { "$limit": query.limit });
    }
    pipeline
}

fn sorted(sort: Document) -> FindOptions {
    FindOptions::builder().sort(sort).build()
}

fn content_filter(query: &ContentQuery) -> Document {
    let mut filter = doc! {};
    if let Some(ref s) = query.status {
        filter.insert("status", s.as_str());
    }
    if let Some(c) = query.category_id {
        filter.insert("category_id", c);
    }
    if let Some(a) = query.author_id {
        filter.insert("author_id", a);
    }
    if let Some(f) = query.featured {
        filter.insert("featured", f);
    }
    filter
}

fn comment_filter(query: &CommentQuery) -> Document {
    let mut filter = doc! {};
    if let Some(p) = query.post_id {
        filter.insert("post_id", p);
    }
    if let Some(ref s) = query.status {
        filter.insert("status", s.as_str());
    }
    filter
}

fn activity_filter(query: &ActivityQuery) -> Document {
    let mut filter = doc! {};
    if let Some(ref a) = query.action {
        filter.insert("action", a.as_str());
    }
    if let Some(ref t) = query.table_name {
        filter.insert("table_name", t.as_str());
    }
    if let Some(u) = query.user_id {
        filter.insert("user_id", u);
    }
    filter
}

fn status_filter(status: Option<&str>) -> Document {
    match status {
        Some(s) => doc! { "status": s },
        None => doc! {},
    }
}

impl Store for MongoStore {
    // ── Lifecycle ───────────────────────────────────────────────────

    fn run_migrations(&self) -> StoreResult<()> {
        for collection in [
            "users",
            "posts",
            "projects",
            "categories",
            "comments",
            "services",
            "homepage_sections",
            "contact_forms",
            "newsletter_subscriptions",
            "media",
            "activity_log",
        ] {
            self.ensure_index(collection, doc! { "id": 1 }, true)?;
        }
        for (table, column) in UNIQUE_COLUMNS {
            self.ensure_index(table, doc! { *column: 1 }, true)?;
        }
        self.ensure_index("sessions", doc! { "id": 1 }, true)?;
        self.ensure_index("sessions", doc! { "expires_at": 1 }, false)?;
        self.ensure_index("posts", doc! { "status": 1 }, false)?;
        self.ensure_index("projects", doc! { "status": 1 }, false)?;
        self.ensure_index("comments", doc! { "post_id": 1 }, false)?;
        self.ensure_index("activity_log", doc! { "created_at": 1 }, false)?;
        self.ensure_index("page_views", doc! { "created_at": 1 }, false)?;
        self.ensure_index("page_views", doc! { "path": 1 }, false)?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "mongodb"
    }

    fn ping(&self) -> StoreResult<()> {
        self.db.run_command(doc! { "ping": 1 }, None)?;
        Ok(())
    }

    // ── Generic ─────────────────────────────────────────────────────

    fn apply_patch(&self, patch: &Patch, id: i64) -> StoreResult<bool> {
        let mut set = Document::new();
        for (name, value) in patch.entries() {
            set.insert(name, Bson::from(value));
        }
        if patch.table().timestamped {
            set.insert("updated_at", now_timestamp());
        }
        let result = self
            .coll(patch.table().name)
            .update_one(doc! { "id": id }, doc! { "$set": set }, None)?;
        Ok(result.matched_count > 0)
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
        let filter = doc! { column: value, "id": { "$ne": exclude_id.unwrap_or(0) } };
        Ok(self.count(table, filter)? > 0)
    }

    // ── Users ───────────────────────────────────────────────────────

    fn user_get_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        self.find_one("users", doc! { "id": id }, doc_to_user)
    }

    fn user_get_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.find_one("users", doc! { "email": email.to_lowercase() }, doc_to_user)
    }

    fn user_list(&self, role: Option<Role>, limit: i64, offset: i64) -> StoreResult<Vec<User>> {
        let filter = match role {
            Some(r) => doc! { "role": r.as_str() },
            None => doc! {},
        };
        self.find_many("users", filter, page_options(doc! { "id": 1 }, limit, offset), doc_to_user)
    }

    fn user_count(&self, role: Option<Role>) -> StoreResult<i64> {
        let filter = match role {
            Some(r) => doc! { "role": r.as_str() },
            None => doc! {},
        };
        self.count("users", filter)
    }

    fn user_count_active_admins(&self) -> StoreResult<i64> {
        self.count("users", doc! { "role": "admin", "is_active": true })
    }

    fn user_create(&self, user: &NewUser) -> StoreResult<i64> {
        let now = now_timestamp();
        self.insert_with_id(
            "users",
            doc! {
                "name": user.name.as_str(),
                "email": user.email.as_str(),
                "password_hash": user.password_hash.as_str(),
                "role": user.role.as_str(),
                "is_active": user.is_active,
                "last_login_at": Bson::Null,
                "created_at": now.as_str(),
                "updated_at": now.as_str(),
            },
        )
    }

    fn user_set_password(&self, id: i64, password_hash: &str) -> StoreResult<()> {
        self.coll("users").update_one(
            doc! { "id": id },
            doc! { "$set": { "password_hash": password_hash, "updated_at": now_timestamp() } },
            None,
        )?;
        Ok(())
    }

    fn user_touch_last_login(&self, id: i64) -> StoreResult<()> {
        self.coll("users").update_one(
            doc! { "id": id },
            doc! { "$set": { "last_login_at": now_timestamp() } },
            None,
        )?;
        Ok(())
    }

    fn user_delete(&self, id: i64) -> StoreResult<bool> {
        self.coll("sessions").delete_many(doc! { "user_id": id }, None)?;
        for collection in ["posts", "projects"] {
            self.coll(collection).update_many(
                doc! { "author_id": id },
                doc! { "$set": { "author_id": Bson::Null } },
                None,
            )?;
        }
        self.coll("media").update_many(
            doc! { "uploaded_by": id },
            doc! { "$set": { "uploaded_by": Bson::Null } },
            None,
        )?;
        self.delete_by_id("users", id)
    }

    // ── Sessions ────────────────────────────────────────────────────

    fn session_create(&self, session: &NewSession) -> StoreResult<()> {
        self.coll("sessions").insert_one(
            doc! {
                "id": session.id.as_str(),
                "user_id": session.user_id,
                "created_at": now_timestamp(),
                "expires_at": session.expires_at.as_str(),
                "ip_address": session.ip_address.as_deref(),
                "user_agent": session.user_agent.as_deref(),
            },
            None,
        )?;
        Ok(())
    }

    fn session_get_user(&self, token: &str) -> StoreResult<Option<User>> {
        let session = self.coll("sessions").find_one(
            doc! { "id": token, "expires_at": { "$gt": now_timestamp() } },
            None,
        )?;
        match session.as_ref().and_then(|s| bson_i64(s.get("user_id"))) {
            Some(user_id) => self.user_get_by_id(user_id),
            None => Ok(None),
        }
    }

    fn session_delete(&self, token: &str) -> StoreResult<()> {
        self.coll("sessions").delete_one(doc! { "id": token }, None)?;
        Ok(())
    }

    fn session_delete_for_user(&self, user_id: i64) -> StoreResult<usize> {
        let result = self
            .coll("sessions")
            .delete_many(doc! { "user_id": user_id }, None)?;
        Ok(result.deleted_count as usize)
    }

    fn session_cleanup_expired(&self) -> StoreResult<usize> {
        let result = self
            .coll("sessions")
            .delete_many(doc! { "expires_at": { "$lte": now_timestamp() } }, None)?;
        Ok(result.deleted_count as usize)
    }

    // ── Posts ────────────────────────────────────────────────────────

    fn post_find_by_id(&self, id: i64) -> StoreResult<Option<Post>> {
        self.find_one("posts", doc! { "id": id }, doc_to_post)
    }

    fn post_find_by_slug(&self, slug: &str) -> StoreResult<Option<Post>> {
        self.find_one("posts", doc! { "slug": slug }, doc_to_post)
    }

    fn post_list(&self, query: &ContentQuery) -> StoreResult<Vec<Post>> {
        let cursor = self.coll("posts").aggregate(post_list_pipeline(query), None)?;
        let mut out = Vec::new();
        for d in cursor {
            if let Some(post) = doc_to_post(&d?) {
                out.push(post);
            }
        }
        Ok(out)
    }

    fn post_count(&self, query: &ContentQuery) -> StoreResult<i64> {
        self.count("posts", content_filter(query))
    }

    fn post_create(&self, form: &PostForm) -> StoreResult<i64> {
        let now = now_timestamp();
        self.insert_with_id(
            "posts",
            doc! {
                "title": form.title.as_str(),
                "slug": form.slug.as_deref(),
                "excerpt": form.excerpt.as_deref(),
                "content": form.content.as_str(),
                "cover_image": form.cover_image.as_deref(),
                "status": form.status.as_deref().unwrap_or("draft"),
                "featured": form.featured,
                "author_id": form.author_id,
                "category_id": form.category_id,
                "meta_title": form.meta_title.as_deref(),
                "meta_description": form.meta_description.as_deref(),
                "published_at": form.published_at.as_deref(),
                "created_at": now.as_str(),
                "updated_at": now.as_str(),
            },
        )
    }

    fn post_delete(&self, id: i64) -> StoreResult<bool> {
        let deleted = self.delete_by_id("posts", id)?;
        if deleted {
            self.coll("comments").delete_many(doc! { "post_id": id }, None)?;
        }
        Ok(deleted)
    }

    // ── Projects ────────────────────────────────────────────────────

    fn project_find_by_id(&self, id: i64) -> StoreResult<Option<Project>> {
        self.find_one("projects", doc! { "id": id }, doc_to_project)
    }

    fn project_find_by_slug(&self, slug: &str) -> StoreResult<Option<Project>> {
        self.find_one("projects", doc! { "slug": slug }, doc_to_project)
    }

    fn project_list(&self, query: &ContentQuery) -> StoreResult<Vec<Project>> {
        self.find_many(
            "projects",
            content_filter(query),
            page_options(doc! { "sort_order": 1, "id": -1 }, query.limit, query.offset),
            doc_to_project,
        )
    }

    fn project_count(&self, query: &ContentQuery) -> StoreResult<i64> {
        self.count("projects", content_filter(query))
    }

    fn project_create(&self, form: &ProjectForm) -> StoreResult<i64> {
        let now = now_timestamp();
        self.insert_with_id(
            "projects",
            doc! {
                "title": form.title.as_str(),
                "slug": form.slug.as_deref(),
                "summary": form.summary.as_deref(),
                "content": form.content.as_str(),
                "image": form.image.as_deref(),
                "tech_stack": form.tech_stack_text(),
                "live_url": form.live_url.as_deref(),
                "repo_url": form.repo_url.as_deref(),
                "featured": form.featured,
                "status": form.status.as_deref().unwrap_or("draft"),
                "sort_order": form.sort_order,
                "category_id": form.category_id,
                "author_id": form.author_id,
                "created_at": now.as_str(),
                "updated_at": now.as_str(),
            },
        )
    }

    fn project_delete(&self, id: i64) -> StoreResult<bool> {
        self.delete_by_id("projects", id)
    }

    // ── Categories ──────────────────────────────────────────────────

    fn category_find_by_id(&self, id: i64) -> StoreResult<Option<Category>> {
        self.find_one("categories", doc! { "id": id }, doc_to_category)
    }

    fn category_list(&self, kind: Option<&str>) -> StoreResult<Vec<Category>> {
        let filter = match kind {
            Some(k) => doc! { "kind": k },
            None => doc! {},
        };
        self.find_many("categories", filter, sorted(doc! { "name": 1 }), doc_to_category)
    }

    fn category_create(&self, form: &CategoryForm) -> StoreResult<i64> {
        self.insert_with_id(
            "categories",
            doc! {
                "name": form.name.as_str(),
                "slug": form.slug.as_deref(),
                "kind": form.kind.as_deref().unwrap_or("post"),
                "description": form.description.as_deref(),
                "created_at": now_timestamp(),
            },
        )
    }

    fn category_delete(&self, id: i64) -> StoreResult<bool> {
        self.delete_by_id("categories", id)
    }

    fn category_usage_count(&self, id: i64) -> StoreResult<i64> {
        Ok(self.count("posts", doc! { "category_id": id })?
            + self.count("projects", doc! { "category_id": id })?)
    }

    // ── Comments ────────────────────────────────────────────────────

    fn comment_find_by_id(&self, id: i64) -> StoreResult<Option<Comment>> {
        self.find_one("comments", doc! { "id": id }, doc_to_comment)
    }

    fn comment_list(&self, query: &CommentQuery) -> StoreResult<Vec<Comment>> {
        self.find_many(
            "comments",
            comment_filter(query),
            page_options(doc! { "created_at": -1, "id": -1 }, query.limit, query.offset),
            doc_to_comment,
        )
    }

    fn comment_count(&self, query: &CommentQuery) -> StoreResult<i64> {
        self.count("comments", comment_filter(query))
    }

    fn comment_create(&self, form: &CommentForm) -> StoreResult<i64> {
        if self.count("posts", doc! { "id": form.post_id })? == 0 {
            return Err(StoreError::Constraint(
                "referenced record does not exist".to_string(),
            ));
        }
        self.insert_with_id(
            "comments",
            doc! {
                "post_id": form.post_id,
                "author_name": form.author_name.as_str(),
                "author_email": form.author_email.as_str(),
                "body": form.body.as_str(),
                "status": "pending",
                "created_at": now_timestamp(),
            },
        )
    }

    fn comment_delete(&self, id: i64) -> StoreResult<bool> {
        self.delete_by_id("comments", id)
    }

    // ── Services ────────────────────────────────────────────────────

    fn service_find_by_id(&self, id: i64) -> StoreResult<Option<Service>> {
        self.find_one("services", doc! { "id": id }, doc_to_service)
    }

    fn service_list(&self, active_only: bool) -> StoreResult<Vec<Service>> {
        let filter = if active_only { doc! { "is_active": true } } else { doc! {} };
        self.find_many(
            "services",
            filter,
            sorted(doc! { "sort_order": 1, "id": 1 }),
            doc_to_service,
        )
    }

    fn service_create(&self, form: &ServiceForm) -> StoreResult<i64> {
        let now = now_timestamp();
        self.insert_with_id(
            "services",
            doc! {
                "title": form.title.as_str(),
                "description": form.description.as_deref(),
                "icon": form.icon.as_deref(),
                "price": form.price.as_deref(),
                "features": form.features_text(),
                "sort_order": form.sort_order,
                "is_active": form.is_active,
                "created_at": now.as_str(),
                "updated_at": now.as_str(),
            },
        )
    }

    fn service_delete(&self, id: i64) -> StoreResult<bool> {
        self.delete_by_id("services", id)
    }

    // ── Homepage sections ───────────────────────────────────────────

    fn section_find_by_id(&self, id: i64) -> StoreResult<Option<HomepageSection>> {
        self.find_one("homepage_sections", doc! { "id": id }, doc_to_section)
    }

    fn section_list(&self, active_only: bool) -> StoreResult<Vec<HomepageSection>> {
        let filter = if active_only { doc! { "is_active": true } } else { doc! {} };
        self.find_many(
            "homepage_sections",
            filter,
            sorted(doc! { "sort_order": 1, "id": 1 }),
            doc_to_section,
        )
    }

    fn section_create(&self, form: &SectionForm) -> StoreResult<i64> {
        self.insert_with_id(
            "homepage_sections",
            doc! {
                "section_key": form.section_key.as_str(),
                "title": form.title.as_deref(),
                "subtitle": form.subtitle.as_deref(),
                "content": form.content_text(),
                "sort_order": form.sort_order,
                "is_active": form.is_active,
                "updated_at": now_timestamp(),
            },
        )
    }

    fn section_delete(&self, id: i64) -> StoreResult<bool> {
        self.delete_by_id("homepage_sections", id)
    }

    // ── Contact submissions ─────────────────────────────────────────

    fn contact_find_by_id(&self, id: i64) -> StoreResult<Option<ContactSubmission>> {
        self.find_one("contact_forms", doc! { "id": id }, doc_to_contact)
    }

    fn contact_list(
        &self,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<ContactSubmission>> {
        self.find_many(
            "contact_forms",
            status_filter(status),
            page_options(doc! { "created_at": -1, "id": -1 }, limit, offset),
            doc_to_contact,
        )
    }

    fn contact_count(&self, status: Option<&str>) -> StoreResult<i64> {
        self.count("contact_forms", status_filter(status))
    }

    fn contact_count_unread(&self) -> StoreResult<i64> {
        self.count("contact_forms", doc! { "is_read": false })
    }

    fn contact_create(&self, form: &ContactForm) -> StoreResult<i64> {
        self.insert_with_id(
            "contact_forms",
            doc! {
                "name": form.name.as_str(),
                "email": form.email.as_str(),
                "subject": form.subject.as_deref(),
                "message": form.message.as_str(),
                "is_read": false,
                "status": "new",
                "ip_address": form.ip_address.as_deref(),
                "created_at": now_timestamp(),
            },
        )
    }

    fn contact_mark_read(&self, id: i64) -> StoreResult<()> {
        self.coll("contact_forms").update_one(
            doc! { "id": id },
            doc! { "$set": { "is_read": true } },
            None,
        )?;
        Ok(())
    }

    fn contact_delete(&self, id: i64) -> StoreResult<bool> {
        self.delete_by_id("contact_forms", id)
    }

    // ── Newsletter ──────────────────────────────────────────────────

    fn newsletter_find_by_email(&self, email: &str) -> StoreResult<Option<NewsletterSubscription>> {
        self.find_one(
            "newsletter_subscriptions",
            doc! { "email": email },
            doc_to_subscription,
        )
    }

    fn newsletter_list(
        &self,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<NewsletterSubscription>> {
        self.find_many(
            "newsletter_subscriptions",
            status_filter(status),
            page_options(doc! { "created_at": -1, "id": -1 }, limit, offset),
            doc_to_subscription,
        )
    }

    fn newsletter_count(&self, status: Option<&str>) -> StoreResult<i64> {
        self.count("newsletter_subscriptions", status_filter(status))
    }

    fn newsletter_subscribe(&self, email: &str, name: Option<&str>) -> StoreResult<()> {
        let now = now_timestamp();
        let mut set = doc! { "status": "subscribed", "updated_at": now.as_str() };
        if let Some(n) = name {
            set.insert("name", n);
        }
        let coll = self.coll("newsletter_subscriptions");
        let result = coll.update_one(doc! { "email": email }, doc! { "$set": set.clone() }, None)?;
        if result.matched_count > 0 {
            return Ok(());
        }
        let inserted = self.insert_with_id(
            "newsletter_subscriptions",
            doc! {
                "email": email,
                "name": name,
                "status": "subscribed",
                "created_at": now.as_str(),
                "updated_at": now.as_str(),
            },
        );
        match inserted {
            Ok(_) => Ok(()),
            // lost a race with a concurrent subscribe for the same address
            Err(StoreError::Unique(_)) => {
                coll.update_one(doc! { "email": email }, doc! { "$set": set }, None)?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn newsletter_unsubscribe(&self, email: &str) -> StoreResult<bool> {
        let result = self.coll("newsletter_subscriptions").update_one(
            doc! { "email": email },
            doc! { "$set": { "status": "unsubscribed", "updated_at": now_timestamp() } },
            None,
        )?;
        Ok(result.matched_count > 0)
    }

    fn newsletter_delete(&self, id: i64) -> StoreResult<bool> {
        self.delete_by_id("newsletter_subscriptions", id)
    }

    // ── Media ───────────────────────────────────────────────────────

    fn media_find_by_id(&self, id: i64) -> StoreResult<Option<MediaItem>> {
        self.find_one("media", doc! { "id": id }, doc_to_media)
    }

    fn media_list(&self, limit: i64, offset: i64) -> StoreResult<Vec<MediaItem>> {
        self.find_many(
            "media",
            doc! {},
            page_options(doc! { "created_at": -1, "id": -1 }, limit, offset),
            doc_to_media,
        )
    }

    fn media_count(&self) -> StoreResult<i64> {
        self.count("media", doc! {})
    }

    fn media_create(&self, form: &MediaForm) -> StoreResult<i64> {
        self.insert_with_id(
            "media",
            doc! {
                "filename": form.filename.as_deref().unwrap_or_default(),
                "url": form.url.as_str(),
                "mime_type": form.mime_type.as_str(),
                "size_bytes": form.size_bytes,
                "alt_text": form.alt_text.as_deref(),
                "uploaded_by": form.uploaded_by,
                "created_at": now_timestamp(),
            },
        )
    }

    fn media_delete(&self, id: i64) -> StoreResult<bool> {
        self.delete_by_id("media", id)
    }

    // ── Activity log ────────────────────────────────────────────────

    fn activity_record(&self, entry: &NewActivity) -> StoreResult<i64> {
        self.insert_with_id(
            "activity_log",
            doc! {
                "user_id": entry.user_id,
                "user_name": entry.user_name.as_deref(),
                "action": entry.action.as_str(),
                "table_name": entry.table_name.as_deref(),
                "record_id": entry.record_id,
                "changes": entry.changes_text(),
                "ip_address": entry.ip_address.as_deref(),
                "created_at": now_timestamp(),
            },
        )
    }

    fn activity_list(&self, query: &ActivityQuery) -> StoreResult<Vec<ActivityEntry>> {
        self.find_many(
            "activity_log",
            activity_filter(query),
            page_options(doc! { "created_at": -1, "id": -1 }, query.limit, query.offset),
            doc_to_activity,
        )
    }

    fn activity_count(&self, query: &ActivityQuery) -> StoreResult<i64> {
        self.count("activity_log", activity_filter(query))
    }

    fn activity_cleanup(&self, max_age_days: i64) -> StoreResult<usize> {
        let result = self.coll("activity_log").delete_many(
            doc! { "created_at": { "$lt": days_ago(max_age_days) } },
            None,
        )?;
        Ok(result.deleted_count as usize)
    }

    // ── Analytics ───────────────────────────────────────────────────

    fn analytics_record(&self, view: &NewPageView) -> StoreResult<()> {
        self.coll("page_views").insert_one(
            doc! {
                "path": view.path.as_str(),
                "referrer": view.referrer.as_deref(),
                "ip_hash": view.ip_hash.as_str(),
                "user_agent": view.user_agent.as_deref(),
                "created_at": now_timestamp(),
            },
            None,
        )?;
        Ok(())
    }

    fn analytics_overview(&self, range: &DateRange) -> StoreResult<OverviewStats> {
        let in_range = doc! { "created_at": { "$gte": range.from.as_str(), "$lte": range.to.as_str() } };
        let unique_visitors = self
            .coll("page_views")
            .distinct("ip_hash", in_range.clone(), None)?
            .len() as i64;
        Ok(OverviewStats {
            total_views: self.count("page_views", in_range)?,
            unique_visitors,
            posts_count: self.count("posts", doc! {})?,
            projects_count: self.count("projects", doc! {})?,
            comments_pending: self.count("comments", doc! { "status": "pending" })?,
            unread_messages: self.count("contact_forms", doc! { "is_read": false })?,
            subscribers: self.count("newsletter_subscriptions", doc! { "status": "subscribed" })?,
        })
    }

    fn analytics_top_paths(&self, range: &DateRange, limit: i64) -> StoreResult<Vec<CountEntry>> {
        self.top_by("path", range, limit)
    }

    fn analytics_top_referrers(
        &self,
        range: &DateRange,
        limit: i64,
    ) -> StoreResult<Vec<CountEntry>> {
        self.top_by("referrer", range, limit)
    }

    fn analytics_daily(&self, range: &DateRange) -> StoreResult<Vec<DailyCount>> {
        let pipeline = vec![
            doc! { "$match": { "created_at": { "$gte": range.from.as_str(), "$lte": range.to.as_str() } } },
            doc! { "$group": {
                "_id": { "$substrCP": ["$created_at", 0, 10] },
                "count": { "$sum": 1 },
            }},
            doc! { "$sort": { "_id": 1 } },
        ];
        Ok(self
            .group_counts(pipeline)?
            .into_iter()
            .map(|(date, count)| DailyCount { date, count })
            .collect())
    }

    fn analytics_prune(&self, max_age_days: i64) -> StoreResult<usize> {
        let result = self.coll("page_views").delete_many(
            doc! { "created_at": { "$lt": days_ago(max_age_days) } },
            None,
        )?;
        Ok(result.deleted_count as usize)
    }
}

// ── Helpers: read BSON fields ────────────────────────────────────────

fn bson_i64(value: Option<&Bson>) -> Option<i64> {
    match value? {
        Bson::Int64(v) => Some(*v),
        Bson::Int32(v) => Some(*v as i64),
        Bson::Double(v) => Some(*v as i64),
        _ => None,
    }
}

fn opt_str(doc: &Document, key: &str) -> Option<String> {
    doc.get_str(key).ok().map(|s| s.to_string())
}

fn str_or(doc: &Document, key: &str, default: &str) -> String {
    doc.get_str(key).unwrap_or(default).to_string()
}

fn opt_i64(doc: &Document, key: &str) -> Option<i64> {
    bson_i64(doc.get(key))
}

fn bool_or(doc: &Document, key: &str, default: bool) -> bool {
    doc.get_bool(key).unwrap_or(default)
}

// ── Helpers: convert BSON documents to records ───────────────────────

fn doc_to_user(doc: &Document) -> Option<User> {
    Some(User {
        id: opt_i64(doc, "id")?,
        name: str_or(doc, "name", ""),
        email: doc.get_str("email").ok()?.to_string(),
        password_hash: doc.get_str("password_hash").ok()?.to_string(),
        role: role_from_stored(doc.get_str("role").unwrap_or("subscriber")),
        is_active: bool_or(doc, "is_active", true),
        last_login_at: opt_str(doc, "last_login_at"),
        created_at: str_or(doc, "created_at", ""),
        updated_at: str_or(doc, "updated_at", ""),
    })
}

fn doc_to_post(doc: &Document) -> Option<Post> {
    Some(Post {
        id: opt_i64(doc, "id")?,
        title: doc.get_str("title").ok()?.to_string(),
        slug: doc.get_str("slug").ok()?.to_string(),
        excerpt: opt_str(doc, "excerpt"),
        content: str_or(doc, "content", ""),
        cover_image: opt_str(doc, "cover_image"),
        status: str_or(doc, "status", "draft"),
        featured: bool_or(doc, "featured", false),
        author_id: opt_i64(doc, "author_id"),
        category_id: opt_i64(doc, "category_id"),
        meta_title: opt_str(doc, "meta_title"),
        meta_description: opt_str(doc, "meta_description"),
        published_at: opt_str(doc, "published_at"),
        created_at: str_or(doc, "created_at", ""),
        updated_at: str_or(doc, "updated_at", ""),
    })
}

fn doc_to_project(doc: &Document) -> Option<Project> {
    Some(Project {
        id: opt_i64(doc, "id")?,
        title: doc.get_str("title").ok()?.to_string(),
        slug: doc.get_str("slug").ok()?.to_string(),
        summary: opt_str(doc, "summary"),
        content: str_or(doc, "content", ""),
        image: opt_str(doc, "image"),
        tech_stack: str_or(doc, "tech_stack", "[]"),
        live_url: opt_str(doc, "live_url"),
        repo_url: opt_str(doc, "repo_url"),
        featured: bool_or(doc, "featured", false),
        status: str_or(doc, "status", "draft"),
        sort_order: opt_i64(doc, "sort_order").unwrap_or(0),
        category_id: opt_i64(doc, "category_id"),
        author_id: opt_i64(doc, "author_id"),
        created_at: str_or(doc, "created_at", ""),
        updated_at: str_or(doc, "updated_at", ""),
    })
}

fn doc_to_category(doc: &Document) -> Option<Category> {
    Some(Category {
        id: opt_i64(doc, "id")?,
        name: doc.get_str("name").ok()?.to_string(),
        slug: doc.get_str("slug").ok()?.to_string(),
        kind: str_or(doc, "kind", "post"),
        description: opt_str(doc, "description"),
        created_at: str_or(doc, "created_at", ""),
    })
}

fn doc_to_comment(doc: &Document) -> Option<Comment> {
    Some(Comment {
        id: opt_i64(doc, "id")?,
        post_id: opt_i64(doc, "post_id")?,
        author_name: str_or(doc, "author_name", ""),
        author_email: str_or(doc, "author_email", ""),
        body: str_or(doc, "body", ""),
        status: str_or(doc, "status", "pending"),
        created_at: str_or(doc, "created_at", ""),
    })
}

fn doc_to_service(doc: &Document) -> Option<Service> {
    Some(Service {
        id: opt_i64(doc, "id")?,
        title: doc.get_str("title").ok()?.to_string(),
        description: opt_str(doc, "description"),
        icon: opt_str(doc, "icon"),
        price: opt_str(doc, "price"),
        features: str_or(doc, "features", "[]"),
        sort_order: opt_i64(doc, "sort_order").unwrap_or(0),
        is_active: bool_or(doc, "is_active", true),
        created_at: str_or(doc, "created_at", ""),
        updated_at: str_or(doc, "updated_at", ""),
    })
}

fn doc_to_section(doc: &Document) -> Option<HomepageSection> {
    Some(HomepageSection {
        id: opt_i64(doc, "id")?,
        section_key: doc.get_str("section_key").ok()?.to_string(),
        title: opt_str(doc, "title"),
        subtitle: opt_str(doc, "subtitle"),
        content: str_or(doc, "content", "{}"),
        sort_order: opt_i64(doc, "sort_order").unwrap_or(0),
        is_active: bool_or(doc, "is_active", true),
        updated_at: str_or(doc, "updated_at", ""),
    })
}

fn doc_to_contact(doc: &Document) -> Option<ContactSubmission> {
    Some(ContactSubmission {
        id: opt_i64(doc, "id")?,
        name: str_or(doc, "name", ""),
        email: str_or(doc, "email", ""),
        subject: opt_str(doc, "subject"),
        message: str_or(doc, "message", ""),
        is_read: bool_or(doc, "is_read", false),
        status: str_or(doc, "status", "new"),
        ip_address: opt_str(doc, "ip_address"),
        created_at: str_or(doc, "created_at", ""),
    })
}

fn doc_to_subscription(doc: &Document) -> Option<NewsletterSubscription> {
    Some(NewsletterSubscription {
        id: opt_i64(doc, "id")?,
        email: doc.get_str("email").ok()?.to_string(),
        name: opt_str(doc, "name"),
        status: str_or(doc, "status", "subscribed"),
        created_at: str_or(doc, "created_at", ""),
        updated_at: str_or(doc, "updated_at", ""),
    })
}

fn doc_to_media(doc: &Document) -> Option<MediaItem> {
    Some(MediaItem {
        id: opt_i64(doc, "id")?,
        filename: str_or(doc, "filename", ""),
        url: doc.get_str("url").ok()?.to_string(),
        mime_type: str_or(doc, "mime_type", "application/octet-stream"),
        size_bytes: opt_i64(doc, "size_bytes").unwrap_or(0),
        alt_text: opt_str(doc, "alt_text"),
        uploaded_by: opt_i64(doc, "uploaded_by"),
        created_at: str_or(doc, "created_at", ""),
    })
}

fn doc_to_activity(doc: &Document) -> Option<ActivityEntry> {
    Some(ActivityEntry {
        id: opt_i64(doc, "id")?,
        user_id: opt_i64(doc, "user_id"),
        user_name: opt_str(doc, "user_name"),
        action: doc.get_str("action").ok()?.to_string(),
        table_name: opt_str(doc, "table_name"),
        record_id: opt_i64(doc, "record_id"),
        changes: opt_str(doc, "changes"),
        ip_address: opt_str(doc, "ip_address"),
        created_at: str_or(doc, "created_at", ""),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_values_map_to_bson() {
        assert_eq!(Bson::from(&PatchValue::Null), Bson::Null);
        assert_eq!(Bson::from(&PatchValue::Int(3)), Bson::Int64(3));
        assert_eq!(Bson::from(&PatchValue::Bool(true)), Bson::Boolean(true));
        assert_eq!(
            Bson::from(&PatchValue::Text("x".into())),
            Bson::String("x".into())
        );
    }

    #[test]
    fn posts_sort_on_published_or_created_time() {
        let query = ContentQuery {
            status: Some("draft".to_string()),
            limit: 20,
            offset: 40,
            ..Default::default()
        };
        let pipeline = post_list_pipeline(&query);
        assert_eq!(pipeline[0], doc! { "$match": { "status": "draft" } });
        assert_eq!(
            pipeline[1],
            doc! { "$addFields": {
                "_sort_at": { "$ifNull": ["$published_at", "$created_at"] },
            }}
        );
        assert_eq!(pipeline[2], doc! { "$sort": { "_sort_at": -1, "id": -1 } });
        assert_eq!(pipeline[3], doc! { "$skip": 40_i64 });
        assert_eq!(pipeline[4], doc! { "$limit": 20_i64 });

        let unlimited = post_list_pipeline(&ContentQuery::default());
        assert_eq!(unlimited.len(), 3);
    }

    #[test]
    fn documents_convert_to_records() {
        let d = doc! {
            "id": 4_i64,
            "title": "Hello",
            "slug": "hello",
            "status": "published",
            "featured": true,
            "author_id": 2_i32,
            "category_id": Bson::Null,
            "created_at": "2024-01-01 00:00:00",
        };
        let post = doc_to_post(&d).unwrap();
        assert_eq!(post.id, 4);
        assert_eq!(post.author_id, Some(2));
        assert_eq!(post.category_id, None);
        assert!(post.featured);
        assert_eq!(post.content, "");
    }

    #[test]
    fn unknown_stored_role_reads_as_subscriber() {
        let d = doc! {
            "id": 1_i64,
            "email": "a@b.co",
            "password_hash": "h",
            "role": "wizard",
        };
        assert_eq!(doc_to_user(&d).unwrap().role, Role::Subscriber);
    }

    #[test]
    fn documents_without_ids_are_skipped() {
        assert!(doc_to_category(&doc! { "name": "x", "slug": "x" }).is_none());
    }
}
