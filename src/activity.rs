use crate::models::activity::NewActivity;
use crate::store::Store;

/// Write an audit row after a committed mutation.
/// Failures are logged and swallowed: the caller's response never depends on them.
pub fn record(store: &dyn Store, entry: NewActivity) {
    if let Err(e) = store.activity_record(&entry) {
        log::warn!(
            "activity log insert failed ({} on {}#{}): {}",
            entry.action,
            entry.table_name.as_deref().unwrap_or("-"),
            entry.record_id.unwrap_or(0),
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::activity::ActivityQuery;
    use crate::store::sqlite::SqliteStore;
    use r2d2::Pool;
    use r2d2_sqlite::SqliteConnectionManager;
    use serde_json::json;

    fn store(name: &str) -> SqliteStore {
        let manager = SqliteConnectionManager::file(format!(
            "file:activity_{}?mode=memory&cache=shared",
            name
        ));
        let pool = Pool::builder().max_size(2).build(manager).unwrap();
        let store = SqliteStore::new(pool);
        store.run_migrations().unwrap();
        store
    }

    #[test]
    fn records_entry() {
        let store = store("records");
        record(
            &store,
            NewActivity {
                action: "create".to_string(),
                ..Default::default()
            }
            .on("posts", 3)
            .changes(json!({"title": "Hi"}))
            .from_ip("10.0.0.1"),
        );
        let entries = store
            .activity_list(&ActivityQuery {
                limit: 10,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].record_id, Some(3));
        assert_eq!(entries[0].changes.as_deref(), Some(r#"{"title":"Hi"}"#));
    }

    #[test]
    fn failure_is_swallowed() {
        let store = store("failure");
        store
            .pool
            .get()
            .unwrap()
            .execute_batch("DROP TABLE activity_log;")
            .unwrap();
        // must not panic
        record(
            &store,
            NewActivity {
                action: "delete".to_string(),
                ..Default::default()
            },
        );
    }
}
