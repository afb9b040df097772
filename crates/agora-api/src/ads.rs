use axum::{
    Router,
    extract::{Path, Query, State},
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
};
use chrono::{NaiveDate, Utc};
use tracing::info;
use uuid::Uuid;

use agora_db::models::{AdEventChanges, AdEventQuery, AdOrdering, NewAdEvent};
use agora_types::api::ads::{
    AdCategoryCreate, AdEventCreate, AdEventFilter, AdEventResponse, AdEventUpdate, CategorySearch,
};
use agora_types::api::{DEFAULT_PAGE_SIZE, Page, PageQuery};
use agora_types::models::{AdEventStatus, AdEventType};
use agora_types::text::slug_or_derive;

use crate::convert::{ad_category, ad_event};
use crate::error::{ApiError, ApiResult};
use crate::extract::ValidJson;
use crate::middleware::{require_auth, require_staff};
use crate::response::{Reply, created, ok, ok_with};
use crate::state::AppState;

/// `/api/v1.3`
pub fn routes(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/ads-events", get(list))
        .route("/ads-events/categories", get(categories))
        .route("/ads-events/ads", get(ads))
        .route("/ads-events/events", get(events))
        .route("/ads-events/featured", get(featured))
        .route("/ads-events/upcoming-events", get(upcoming))
        .route("/ads-events/active-ads", get(active_ads))
        .route("/ads-events/category/{category}", get(by_category))
        .route("/ads-events/location/{location}", get(by_location))
        .route("/ads-events/{ad_event_id}", get(detail));

    let staff = Router::new()
        .route("/ads-events/admin/categories", post(create_category))
        .route("/ads-events/admin/items", post(create_item))
        .route("/ads-events/admin/items/{ad_event_id}", patch(update_item))
        .route_layer(middleware::from_fn(require_staff))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    public.merge(staff)
}

/// `created_at`, `start_date`, `end_date` or `title`, descending with a
/// leading `-`. Anything else falls back to newest first.
pub fn parse_ordering(raw: Option<&str>) -> Option<(AdOrdering, bool)> {
    let raw = raw?.trim();
    let (field, desc) = match raw.strip_prefix('-') {
        Some(field) => (field, true),
        None => (raw, false),
    };
    let column = match field {
        "created_at" => AdOrdering::CreatedAt,
        "start_date" => AdOrdering::StartDate,
        "end_date" => AdOrdering::EndDate,
        "title" => AdOrdering::Title,
        _ => return None,
    };
    Some((column, desc))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn base_query(filter: AdEventFilter) -> AdEventQuery {
    AdEventQuery {
        kind: filter.kind,
        category: filter.category,
        location: non_blank(filter.location),
        is_featured: filter.is_featured,
        search: non_blank(filter.search),
        ordering: parse_ordering(filter.ordering.as_deref()),
        ..AdEventQuery::default()
    }
}

async fn page_of(state: &AppState, query: AdEventQuery, page: &PageQuery) -> ApiResult<Reply<Page<AdEventResponse>>> {
    let (limit, offset) = page.window(DEFAULT_PAGE_SIZE);
    let (rows, total) = state
        .blocking(move |db| Ok(db.list_ad_events(&query, limit, offset)?))
        .await?;
    let today = Utc::now().date_naive();
    let results = rows.iter().map(|r| ad_event(r, today, &state.storage)).collect();
    Ok(ok(Page::new(results, total, page.page(), limit)))
}

pub async fn categories(
    State(state): State<AppState>,
    Query(query): Query<CategorySearch>,
) -> ApiResult<impl IntoResponse> {
    let search = non_blank(query.search);
    let rows = state
        .blocking(move |db| Ok(db.ad_categories(search.as_deref())?))
        .await?;
    Ok(ok(rows.iter().map(ad_category).collect::<Vec<_>>()))
}

pub async fn list(
    State(state): State<AppState>,
    Query(filter): Query<AdEventFilter>,
    Query(page): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    page_of(&state, base_query(filter), &page).await
}

pub async fn ads(
    State(state): State<AppState>,
    Query(filter): Query<AdEventFilter>,
    Query(page): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let query = AdEventQuery {
        kind: Some(AdEventType::Advertisement),
        ..base_query(filter)
    };
    page_of(&state, query, &page).await
}

pub async fn events(
    State(state): State<AppState>,
    Query(filter): Query<AdEventFilter>,
    Query(page): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let query = AdEventQuery {
        kind: Some(AdEventType::Event),
        ..base_query(filter)
    };
    page_of(&state, query, &page).await
}

pub async fn featured(
    State(state): State<AppState>,
    Query(filter): Query<AdEventFilter>,
    Query(page): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let query = AdEventQuery {
        is_featured: Some(true),
        ..base_query(filter)
    };
    page_of(&state, query, &page).await
}

pub async fn upcoming(
    State(state): State<AppState>,
    Query(filter): Query<AdEventFilter>,
    Query(page): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let ordering = filter.ordering.clone();
    let query = AdEventQuery {
        kind: Some(AdEventType::Event),
        starts_after: Some(Utc::now().date_naive()),
        // Soonest first unless the caller asked otherwise.
        ordering: parse_ordering(ordering.as_deref()).or(Some((AdOrdering::StartDate, false))),
        ..base_query(filter)
    };
    page_of(&state, query, &page).await
}

pub async fn active_ads(
    State(state): State<AppState>,
    Query(filter): Query<AdEventFilter>,
    Query(page): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let query = AdEventQuery {
        kind: Some(AdEventType::Advertisement),
        running_on: Some(Utc::now().date_naive()),
        ..base_query(filter)
    };
    page_of(&state, query, &page).await
}

pub async fn by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Query(filter): Query<AdEventFilter>,
    Query(page): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let query = AdEventQuery {
        category_slug_or_name: Some(category),
        ..base_query(filter)
    };
    page_of(&state, query, &page).await
}

pub async fn by_location(
    State(state): State<AppState>,
    Path(location): Path<String>,
    Query(filter): Query<AdEventFilter>,
    Query(page): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let query = AdEventQuery {
        location: non_blank(Some(location)),
        ..base_query(filter)
    };
    page_of(&state, query, &page).await
}

pub async fn detail(State(state): State<AppState>, Path(ad_event_id): Path<Uuid>) -> ApiResult<impl IntoResponse> {
    let row = state
        .blocking(move |db| {
            db.ad_event(ad_event_id)?
                .filter(|e| e.status == AdEventStatus::Active)
                .ok_or_else(|| ApiError::not_found("Ad or event not found."))
        })
        .await?;
    Ok(ok(ad_event(&row, Utc::now().date_naive(), &state.storage)))
}

// -- Staff data entry --

pub async fn create_category(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<AdCategoryCreate>,
) -> ApiResult<impl IntoResponse> {
    let name = body.name.trim().to_string();
    let slug = slug_or_derive(body.slug.as_deref(), &name);
    if slug.is_empty() {
        return Err(ApiError::Validation("Name must contain letters or digits.".into()));
    }
    let row = state
        .blocking(move |db| {
            Ok(db.create_ad_category(&name, &slug, body.description.as_deref(), body.order)?)
        })
        .await?;
    info!("Created ad/event category {}", row.slug);
    Ok(created(ad_category(&row), "Category created successfully."))
}

fn check_window(start: Option<NaiveDate>, end: Option<NaiveDate>) -> ApiResult<()> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(ApiError::Validation("End date cannot be before start date.".into()));
        }
    }
    Ok(())
}

pub async fn create_item(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<AdEventCreate>,
) -> ApiResult<impl IntoResponse> {
    check_window(body.start_date, body.end_date)?;
    let ad_event_id = Uuid::new_v4();
    let row = state
        .blocking(move |db| {
            if db.ad_category(body.category_id)?.is_none() {
                return Err(ApiError::Validation("Category does not exist.".into()));
            }
            db.create_ad_event(&NewAdEvent {
                ad_event_id,
                title: body.title.trim().to_string(),
                kind: body.kind,
                category_id: body.category_id,
                description: body.description,
                link: body.link,
                banner_image: body.banner_image,
                location: body.location,
                start_date: body.start_date,
                end_date: body.end_date,
                status: body.status.unwrap_or(AdEventStatus::Active),
                is_featured: body.is_featured,
            })?;
            db.ad_event(ad_event_id)?
                .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("ad/event {} vanished after insert", ad_event_id)))
        })
        .await?;
    info!("Created {} {}", row.kind, ad_event_id);
    Ok(created(ad_event(&row, Utc::now().date_naive(), &state.storage), "Created successfully."))
}

pub async fn update_item(
    State(state): State<AppState>,
    Path(ad_event_id): Path<Uuid>,
    ValidJson(body): ValidJson<AdEventUpdate>,
) -> ApiResult<impl IntoResponse> {
    let row = state
        .blocking(move |db| {
            let current = db
                .ad_event(ad_event_id)?
                .ok_or_else(|| ApiError::not_found("Ad or event not found."))?;
            check_window(
                body.start_date.or(current.start_date),
                body.end_date.or(current.end_date),
            )?;
            db.update_ad_event(
                ad_event_id,
                &AdEventChanges {
                    title: body.title,
                    description: body.description,
                    link: body.link,
                    banner_image: None,
                    location: body.location,
                    start_date: body.start_date,
                    end_date: body.end_date,
                    status: body.status,
                    is_featured: body.is_featured,
                },
            )?;
            db.ad_event(ad_event_id)?
                .ok_or_else(|| ApiError::not_found("Ad or event not found."))
        })
        .await?;
    Ok(ok_with(ad_event(&row, Utc::now().date_naive(), &state.storage), "Updated successfully."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_accepts_known_fields_only() {
        assert_eq!(parse_ordering(Some("-start_date")), Some((AdOrdering::StartDate, true)));
        assert_eq!(parse_ordering(Some("title")), Some((AdOrdering::Title, false)));
        assert_eq!(parse_ordering(Some("-price")), None);
        assert_eq!(parse_ordering(None), None);
    }

    #[test]
    fn window_must_not_end_before_it_starts() {
        let day = |d| NaiveDate::from_ymd_opt(2024, 5, d).unwrap();
        assert!(check_window(Some(day(2)), Some(day(1))).is_err());
        assert!(check_window(Some(day(1)), Some(day(1))).is_ok());
        assert!(check_window(None, Some(day(1))).is_ok());
    }
}
