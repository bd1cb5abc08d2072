use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::{Method, Status};
use rocket::{Request, Response};
use std::sync::Arc;

use crate::models::analytics::NewPageView;
use crate::security::auth::{client_ip, hash_ip};
use crate::store::Store;

/// Paths under `/api` that are not content views.
const SKIPPED_PREFIXES: &[&str] = &["/api/admin", "/api/auth", "/api/health"];

/// Logs a page view for every successful public content GET.
/// Admin, auth and health endpoints are excluded.
pub struct AnalyticsFairing;

#[rocket::async_trait]
impl Fairing for AnalyticsFairing {
    fn info(&self) -> Info {
        Info {
            name: "Analytics Page View Logger",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        if request.method() != Method::Get || response.status() != Status::Ok {
            return;
        }
        let path = request.uri().path().to_string();
        if !is_tracked(&path) {
            return;
        }

        let store = match request.rocket().state::<Arc<dyn Store>>() {
            Some(s) => s,
            None => return,
        };

        let view = NewPageView {
            path,
            referrer: request.headers().get_one("Referer").map(extract_domain),
            ip_hash: hash_ip(&client_ip(request)),
            user_agent: request
                .headers()
                .get_one("User-Agent")
                .map(|ua| ua.chars().take(512).collect()),
        };
        if let Err(e) = store.analytics_record(&view) {
            log::warn!("page view not recorded for {}: {}", view.path, e);
        }
    }
}

fn is_tracked(path: &str) -> bool {
    path.starts_with("/api/") && !SKIPPED_PREFIXES.iter().any(|p| path.starts_with(p))
}

fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_public_api_paths_are_tracked() {
        assert!(is_tracked("/api/posts"));
        assert!(is_tracked("/api/projects/rust-cms"));
        assert!(!is_tracked("/api/admin/posts"));
        assert!(!is_tracked("/api/auth/session"));
        assert!(!is_tracked("/api/health"));
        assert!(!is_tracked("/favicon.ico"));
    }

    #[test]
    fn referrer_is_reduced_to_host() {
        assert_eq!(extract_domain("https://news.ycombinator.com/item?id=1"), "news.ycombinator.com");
        assert_eq!(extract_domain("not a url"), "not a url");
    }
}
