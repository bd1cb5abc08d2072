use rocket::fairing::{Fairing, Info, Kind};
use rocket::tokio;
use rocket::{Orbit, Rocket};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::rate_limit::{RateLimiter, HOUR};
use crate::store::Store;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

pub struct BackgroundTasks;

#[rocket::async_trait]
impl Fairing for BackgroundTasks {
    fn info(&self) -> Info {
        Info {
            name: "Background Tasks",
            kind: Kind::Liftoff,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let (store, config) = match (rocket.state::<Arc<dyn Store>>(), rocket.state::<Config>()) {
            (Some(store), Some(config)) => (Arc::clone(store), config.maintenance.clone()),
            _ => {
                log::error!("[task] store or config missing from managed state, tasks not started");
                return;
            }
        };
        if !config.enabled {
            log::info!("[task] Background tasks disabled");
            return;
        }

        // Session cleanup task
        let s = Arc::clone(&store);
        let every = Duration::from_secs(config.session_cleanup_minutes.max(1) * 60);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(every).await;
                match s.session_cleanup_expired() {
                    Ok(count) => {
                        if count > 0 {
                            log::info!("[task] Cleaned up {} expired sessions", count);
                        }
                    }
                    Err(e) => log::error!("[task] Session cleanup failed: {}", e),
                }
            }
        });

        // Activity log retention task
        let s = Arc::clone(&store);
        let max_age = config.activity_retention_days;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(DAY).await;
                match s.activity_cleanup(max_age) {
                    Ok(count) => {
                        if count > 0 {
                            log::info!("[task] Cleaned up {} old activity log entries", count);
                        }
                    }
                    Err(e) => log::error!("[task] Activity log cleanup failed: {}", e),
                }
            }
        });

        // Analytics cleanup task
        let s = Arc::clone(&store);
        let max_age = config.analytics_retention_days;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(DAY).await;
                match s.analytics_prune(max_age) {
                    Ok(count) => {
                        if count > 0 {
                            log::info!("[task] Cleaned up {} old analytics records", count);
                        }
                    }
                    Err(e) => log::error!("[task] Analytics cleanup failed: {}", e),
                }
            }
        });

        // Rate limiter housekeeping
        if let Some(limiter) = rocket.state::<Arc<RateLimiter>>() {
            let limiter = Arc::clone(limiter);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(HOUR).await;
                    limiter.cleanup(HOUR);
                }
            });
        }

        log::info!("[task] Background tasks started");
    }
}
