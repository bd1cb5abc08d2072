#[macro_use]
extern crate rocket;

use rocket::{Build, Rocket};
use std::sync::Arc;

mod activity;
mod analytics;
mod boot;
mod config;
mod db;
mod error;
mod models;
mod patch;
mod rate_limit;
mod routes;
mod security;
mod store;
mod tasks;

#[cfg(test)]
mod tests;

use config::Config;
use rate_limit::RateLimiter;
use store::Store;

/// Assemble the application around an opened store.
pub fn build(store: Arc<dyn Store>, config: Config) -> Rocket<Build> {
    rocket::build()
        .manage(store)
        .manage(Arc::new(RateLimiter::new()))
        .manage(config)
        .attach(analytics::AnalyticsFairing)
        .attach(routes::admin::NoCacheAdmin)
        .attach(tasks::BackgroundTasks)
        .mount("/api", routes::public::routes())
        .mount("/api/auth", routes::auth::routes())
        .mount(routes::admin::ADMIN_MOUNT, routes::admin::routes())
        .register("/", routes::catchers())
}

#[launch]
fn rocket() -> _ {
    env_logger::init();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    let store = match boot::open_store(&config) {
        Ok(s) => s,
        Err(e) => {
            log::error!("Boot failed: {}", e);
            std::process::exit(1);
        }
    };

    log::info!("Admin API mounted at: {}", routes::admin::ADMIN_MOUNT);
    build(store, config)
}
