use axum::{
    Extension, Router,
    extract::{Path, Query, State},
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
};
use rand::Rng;
use tracing::info;
use uuid::Uuid;

use agora_db::Database;
use agora_db::models::{NewReport, ReportChanges, ReportInsert, ReportQuery, ReportRow};
use agora_types::api::reports::{ReportCreate, ReportFilter, ReportUpdate, ReportedItem};
use agora_types::api::{Claims, DEFAULT_PAGE_SIZE, Page, PageQuery};
use agora_types::models::ReportedItemType;

use crate::convert::{post_summary, profile_response, report_category, report_response};
use crate::error::{ApiError, ApiResult};
use crate::extract::ValidJson;
use crate::middleware::{require_auth, require_staff};
use crate::profiles::load_profile;
use crate::response::{created, ok, ok_with};
use crate::state::AppState;

/// `/api/v1.4`
pub fn routes(state: &AppState) -> Router<AppState> {
    let public = Router::new().route("/reports/categories", get(categories));

    let protected = Router::new()
        .route("/reports/create", post(create))
        .route("/reports/{report_id}", get(detail))
        .route("/reports/{report_id}/item", get(item))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let staff = Router::new()
        .route("/admin/reports", get(admin_list))
        .route("/admin/reports/{report_id}/update", patch(admin_update))
        .route_layer(middleware::from_fn(require_staff))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    public.merge(protected).merge(staff)
}

/// Three-digit draws before the number widens to six digits.
const SHORT_ID_DRAWS: u32 = 8;

/// Id source for one report: `LST-451` for posts, `USR-691` for profiles.
/// Draws that keep colliding move on to `LST-104263`, so a crowded prefix
/// never runs out of ids.
pub fn report_ids(item_type: ReportedItemType) -> impl FnMut() -> String {
    let mut draws = 0u32;
    move || {
        let range = if draws < SHORT_ID_DRAWS { 100..=999 } else { 100_000..=999_999 };
        draws += 1;
        let n: u32 = rand::rng().random_range(range);
        format!("{}-{}", item_type.id_prefix(), n)
    }
}

/// Checks the reported item exists and returns its canonical id.
fn reported_object(db: &Database, item_type: ReportedItemType, item_id: &str) -> ApiResult<String> {
    let missing = || ApiError::bad_request(format!("The reported {} does not exist.", item_type));
    match item_type {
        ReportedItemType::Post => db.post_by_id(item_id)?.map(|p| p.post_id).ok_or_else(missing),
        ReportedItemType::Profile => {
            let profile_id = item_id.parse::<Uuid>().map_err(|_| missing())?;
            db.profile_by_id(profile_id)?
                .map(|p| p.profile_id.to_string())
                .ok_or_else(missing)
        }
    }
}

/// Reporters see their own reports. Staff see all of them.
fn visible_report(db: &Database, report_id: &str, claims: &Claims) -> ApiResult<ReportRow> {
    db.report(report_id)?
        .filter(|r| claims.is_staff || r.reporter.id == claims.sub)
        .ok_or_else(|| ApiError::not_found("Report not found."))
}

pub async fn categories(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let rows = state.blocking(|db| Ok(db.report_categories()?)).await?;
    Ok(ok(rows.iter().map(report_category).collect::<Vec<_>>()))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ValidJson(body): ValidJson<ReportCreate>,
) -> ApiResult<impl IntoResponse> {
    let item_type = body
        .reported_item_type
        .trim()
        .to_lowercase()
        .parse::<ReportedItemType>()
        .map_err(|_| ApiError::bad_request("Invalid item type. Must be 'post' or 'profile'."))?;
    let me = claims.sub;

    let report = state
        .blocking(move |db| {
            let object_id = reported_object(db, item_type, body.reported_item_id.trim())?;
            let category = db
                .report_category_by_name(body.category_name.trim())?
                .ok_or_else(|| ApiError::bad_request("Unknown report category."))?;

            let new = NewReport {
                reporter_id: me,
                category_id: category.report_category_id,
                reason: body.reason.trim().to_string(),
                item_type,
                object_id,
            };
            match db.create_report(&new, report_ids(item_type))? {
                ReportInsert::Created(report_id) => db
                    .report(&report_id)?
                    .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("report {} vanished after insert", report_id))),
                ReportInsert::AlreadyReported(report_id) => Err(ApiError::AlreadyReported { report_id }),
            }
        })
        .await?;

    info!("{} filed report {} on {} {}", claims.email, report.report_id, report.item_type, report.object_id);
    Ok(created(report_response(&report, &state.storage), "Report submitted successfully."))
}

pub async fn detail(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let report = state
        .blocking(move |db| visible_report(db, &report_id, &claims))
        .await?;
    Ok(ok(report_response(&report, &state.storage)))
}

pub async fn item(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let shared = state.clone();
    let item = state
        .blocking(move |db| {
            let report = db
                .report(&report_id)?
                .ok_or_else(|| ApiError::not_found("Report not found."))?;
            if !claims.is_staff && report.reporter.id != claims.sub {
                return Err(ApiError::forbidden("Permission denied."));
            }
            let gone = || ApiError::not_found("The reported item no longer exists.");
            match report.item_type {
                ReportedItemType::Post => {
                    let post = db.post_by_id(&report.object_id)?.ok_or_else(gone)?;
                    Ok(ReportedItem::Post(Box::new(post_summary(&post, &shared.storage))))
                }
                ReportedItemType::Profile => {
                    let profile_id = report.object_id.parse::<Uuid>().map_err(|_| gone())?;
                    let owner = db.profile_by_id(profile_id)?.ok_or_else(gone)?.account.id;
                    let (profile, extras) = load_profile(db, owner, None)?;
                    Ok(ReportedItem::Profile(Box::new(profile_response(&profile, extras, &shared.storage))))
                }
            }
        })
        .await?;
    Ok(ok(item))
}

// -- Staff review --

pub async fn admin_list(
    State(state): State<AppState>,
    Query(filter): Query<ReportFilter>,
    Query(page): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let (limit, offset) = page.window(DEFAULT_PAGE_SIZE);
    let query = ReportQuery {
        status: filter.status,
        priority: filter.priority,
        category: filter.category.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
        item_type: filter.item_type,
    };
    let (rows, total) = state
        .blocking(move |db| Ok(db.list_reports(&query, limit, offset)?))
        .await?;
    let results = rows.iter().map(|r| report_response(r, &state.storage)).collect();
    Ok(ok(Page::new(results, total, page.page(), limit)))
}

pub async fn admin_update(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
    Extension(claims): Extension<Claims>,
    ValidJson(body): ValidJson<ReportUpdate>,
) -> ApiResult<impl IntoResponse> {
    let reviewer = claims.sub;
    let changes = ReportChanges {
        status: body.status,
        action_taken: body.action_taken,
        admin_notes: body.admin_notes.filter(|n| !n.trim().is_empty()),
        priority: body.priority,
    };
    let report = state
        .blocking(move |db| {
            db.update_report(&report_id, &changes, reviewer)?
                .ok_or_else(|| ApiError::not_found("Report not found."))
        })
        .await?;
    info!("{} reviewed report {} ({})", claims.email, report.report_id, report.status);
    Ok(ok_with(report_response(&report, &state.storage), "Report updated successfully."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_the_item_prefix() {
        let mut next = report_ids(ReportedItemType::Post);
        for _ in 0..SHORT_ID_DRAWS {
            let id = next();
            let (prefix, n) = id.split_once('-').unwrap();
            assert_eq!(prefix, "LST");
            let n: u32 = n.parse().unwrap();
            assert!((100..=999).contains(&n));
        }
        let mut profile = report_ids(ReportedItemType::Profile);
        assert!(profile().starts_with("USR-"));
    }

    #[test]
    fn crowded_prefix_widens_the_number() {
        let mut next = report_ids(ReportedItemType::Profile);
        for _ in 0..SHORT_ID_DRAWS {
            next();
        }
        for _ in 0..20 {
            let id = next();
            let n: u32 = id.strip_prefix("USR-").unwrap().parse().unwrap();
            assert!((100_000..=999_999).contains(&n));
        }
    }
}
