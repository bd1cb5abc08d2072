use log::{error, info, warn};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::config::{Backend, Config};
use crate::models::user::NewUser;
use crate::patch::is_plausible_email;
use crate::security::auth::hash_password;
use crate::security::roles::Role;
use crate::store::mongo::MongoStore;
use crate::store::sqlite::SqliteStore;
use crate::store::Store;

pub const MIN_PASSWORD_LEN: usize = 8;

/// Open the configured backend and bring its schema up to date.
/// Creates the SQLite data directory when missing.
pub fn open_store(config: &Config) -> Result<Arc<dyn Store>, String> {
    info!("Folio boot check starting...");
    let store: Arc<dyn Store> = match config.database.backend {
        Backend::Sqlite => {
            let path = &config.database.path;
            if let Some(dir) = Path::new(path).parent() {
                if !dir.as_os_str().is_empty() && !dir.exists() {
                    fs::create_dir_all(dir)
                        .map_err(|e| format!("failed to create {}: {}", dir.display(), e))?;
                    info!("  Created directory: {}", dir.display());
                }
            }
            info!("  Using SQLite database at {}", path);
            Arc::new(SqliteStore::new_at(path)?)
        }
        Backend::Mongodb => {
            info!(
                "  Using MongoDB database '{}' at {}",
                config.database.name, config.database.uri
            );
            Arc::new(MongoStore::new(&config.database.uri, &config.database.name)?)
        }
    };

    store
        .run_migrations()
        .map_err(|e| format!("migrations failed: {}", e))?;
    ensure_admin(&*store, config)?;
    info!("Boot check passed ({} backend).", store.backend_name());
    Ok(store)
}

/// Seed the first admin account from `[auth] bootstrap_admin_*` when no active admin exists.
pub fn ensure_admin(store: &dyn Store, config: &Config) -> Result<(), String> {
    if store.user_count_active_admins().map_err(|e| e.to_string())? > 0 {
        return Ok(());
    }

    let auth = &config.auth;
    let (email, password) = match (&auth.bootstrap_admin_email, &auth.bootstrap_admin_password) {
        (Some(email), Some(password)) => (email.trim().to_lowercase(), password),
        _ => {
            warn!("  No active admin and no bootstrap_admin_email/password configured");
            return Ok(());
        }
    };
    if !is_plausible_email(&email) {
        error!("  bootstrap_admin_email '{}' is not a valid address", email);
        return Err("invalid bootstrap admin email".to_string());
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        error!("  bootstrap_admin_password is shorter than {} characters", MIN_PASSWORD_LEN);
        return Err("bootstrap admin password too short".to_string());
    }

    if let Some(existing) = store.user_get_by_email(&email).map_err(|e| e.to_string())? {
        warn!(
            "  {} exists as {} but no active admin does; promote it manually",
            existing.email, existing.role
        );
        return Ok(());
    }

    let id = store
        .user_create(&NewUser {
            name: auth.bootstrap_admin_name.clone(),
            email: email.clone(),
            password_hash: hash_password(password, auth.password_cost)?,
            role: Role::Admin,
            is_active: true,
        })
        .map_err(|e| e.to_string())?;
    info!("  Created bootstrap admin {} (id {})", email, id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use r2d2::Pool;
    use r2d2_sqlite::SqliteConnectionManager;

    fn store(name: &str) -> SqliteStore {
        let manager =
            SqliteConnectionManager::file(format!("file:boot_{}?mode=memory&cache=shared", name));
        let pool = Pool::builder().max_size(2).build(manager).unwrap();
        let store = SqliteStore::new(pool);
        store.run_migrations().unwrap();
        store
    }

    fn config(email: Option<&str>, password: Option<&str>) -> Config {
        let mut config = Config::default();
        config.auth.password_cost = 4;
        config.auth.bootstrap_admin_email = email.map(String::from);
        config.auth.bootstrap_admin_password = password.map(String::from);
        config
    }

    #[test]
    fn seeds_admin_once() {
        let store = store("seed");
        let config = config(Some("Root@Example.com"), Some("longenough"));
        ensure_admin(&store, &config).unwrap();
        ensure_admin(&store, &config).unwrap();
        assert_eq!(store.user_count_active_admins().unwrap(), 1);
        let admin = store.user_get_by_email("root@example.com").unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
    }

    #[test]
    fn missing_bootstrap_credentials_are_not_fatal() {
        let store = store("none");
        ensure_admin(&store, &config(None, None)).unwrap();
        assert_eq!(store.user_count(None).unwrap(), 0);
    }

    #[test]
    fn short_bootstrap_password_is_rejected() {
        let store = store("short");
        assert!(ensure_admin(&store, &config(Some("a@b.co"), Some("short"))).is_err());
    }
}
