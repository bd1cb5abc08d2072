use rocket::State;
use std::sync::Arc;

use crate::error::{ApiResult, AppError};
use crate::models::analytics::DateRange;
use crate::routes::{ok, JsonResponse};
use crate::security::auth::{require, EditorUser};
use crate::security::roles::Permission;
use crate::store::Store;

const DEFAULT_TOP: i64 = 10;
const MAX_TOP: i64 = 100;

fn range(from: Option<String>, to: Option<String>) -> ApiResult<DateRange> {
    DateRange::parse(from.as_deref(), to.as_deref()).map_err(AppError::Validation)
}

#[get("/analytics/overview?<from>&<to>")]
pub fn overview(
    editor: EditorUser,
    store: &State<Arc<dyn Store>>,
    from: Option<String>,
    to: Option<String>,
) -> JsonResponse {
    require(&editor.user, Permission::ViewAnalytics)?;
    Ok(ok(store.analytics_overview(&range(from, to)?)?))
}

#[get("/analytics/top-paths?<from>&<to>&<limit>")]
pub fn top_paths(
    editor: EditorUser,
    store: &State<Arc<dyn Store>>,
    from: Option<String>,
    to: Option<String>,
    limit: Option<i64>,
) -> JsonResponse {
    require(&editor.user, Permission::ViewAnalytics)?;
    let limit = limit.unwrap_or(DEFAULT_TOP).clamp(1, MAX_TOP);
    Ok(ok(store.analytics_top_paths(&range(from, to)?, limit)?))
}

#[get("/analytics/top-referrers?<from>&<to>&<limit>")]
pub fn top_referrers(
    editor: EditorUser,
    store: &State<Arc<dyn Store>>,
    from: Option<String>,
    to: Option<String>,
    limit: Option<i64>,
) -> JsonResponse {
    require(&editor.user, Permission::ViewAnalytics)?;
    let limit = limit.unwrap_or(DEFAULT_TOP).clamp(1, MAX_TOP);
    Ok(ok(store.analytics_top_referrers(&range(from, to)?, limit)?))
}

#[get("/analytics/daily?<from>&<to>")]
pub fn daily(
    editor: EditorUser,
    store: &State<Arc<dyn Store>>,
    from: Option<String>,
    to: Option<String>,
) -> JsonResponse {
    require(&editor.user, Permission::ViewAnalytics)?;
    Ok(ok(store.analytics_daily(&range(from, to)?)?))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![overview, top_paths, top_referrers, daily]
}
