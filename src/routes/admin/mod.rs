//! Back-office JSON API, mounted under `/api/admin`.
//!
//! Every handler follows the same order: guard (authenticate and authorize),
//! parse and validate the body, existence and uniqueness checks, the store
//! call, a best-effort activity row, then the envelope.

use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Header;

pub mod activity;
pub mod analytics;
pub mod categories;
pub mod comments;
pub mod contacts;
pub mod media;
pub mod newsletter;
pub mod posts;
pub mod projects;
pub mod sections;
pub mod services;
pub mod users;

pub const ADMIN_MOUNT: &str = "/api/admin";

/// Admin responses carry private data and must not be cached.
pub struct NoCacheAdmin;

#[rocket::async_trait]
impl Fairing for NoCacheAdmin {
    fn info(&self) -> Info {
        Info {
            name: "No-Cache Admin API",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, req: &'r rocket::Request<'_>, res: &mut rocket::Response<'r>) {
        let path = req.uri().path();
        if path.starts_with(ADMIN_MOUNT) || path.starts_with("/api/auth") {
            res.set_header(Header::new(
                "Cache-Control",
                "no-store, no-cache, must-revalidate, max-age=0",
            ));
            res.set_header(Header::new("Pragma", "no-cache"));
        }
    }
}

pub fn routes() -> Vec<rocket::Route> {
    let mut all = Vec::new();
    all.extend(posts::routes());
    all.extend(projects::routes());
    all.extend(categories::routes());
    all.extend(comments::routes());
    all.extend(users::routes());
    all.extend(sections::routes());
    all.extend(services::routes());
    all.extend(contacts::routes());
    all.extend(newsletter::routes());
    all.extend(media::routes());
    all.extend(analytics::routes());
    all.extend(activity::routes());
    all
}
