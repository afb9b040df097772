use axum::{
    Extension, Router,
    extract::{Multipart, Path, Query, State},
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post},
};
use chrono::{Duration, NaiveDate, Utc};
use chrono_tz::{TZ_VARIANTS, Tz};
use tracing::warn;
use uuid::Uuid;

use agora_db::Database;
use agora_types::api::profiles::{
    DaysQuery, FollowResponse, FollowState, ProfileAssets, ProfileStats, ProfileUpdate, RatingRequest,
    RatingResponse, RecentVisitor, SearchQuery, TimezoneChoice, TimezoneInfo, TimezoneUpdate, VisitAnalytics,
    VisitCounts,
};
use agora_types::api::{Claims, DEFAULT_PAGE_SIZE, DailyCount, Page, PageQuery};

use crate::convert::{ProfileExtras, follow_response, profile_response, rating_response, user_summary};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ClientMeta, ValidJson};
use crate::middleware::{MaybeClaims, require_auth};
use crate::response::{Reply, created, created_or_ok, ok, ok_with};
use crate::state::AppState;
use crate::upload::Form;

const SEARCH_LIMIT: u32 = 20;
const RECENT_VISITORS: u32 = 5;

/// `/api/v1`
pub fn routes(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/profile/{acc_id}", get(public_profile))
        .route("/timezone-choices", get(timezone_choices));

    let protected = Router::new()
        .route("/profile", get(own_profile))
        .route("/update/profile", patch(update_profile).put(update_profile))
        .route("/upload-profiles", post(upload_pictures))
        .route("/profile/stats", get(own_stats))
        .route("/profile/stats/{acc_id}", get(stats))
        .route("/follow/{acc_id}", post(follow))
        .route("/unfollow/{acc_id}", delete(unfollow))
        .route("/followers", get(own_followers))
        .route("/followers/{acc_id}", get(followers))
        .route("/following", get(own_following))
        .route("/following/{acc_id}", get(following))
        .route("/create/rating", post(rate))
        .route("/ratings", get(own_ratings))
        .route("/ratings/{acc_id}", get(ratings))
        .route("/search", get(search))
        .route("/update-timezone", post(update_timezone))
        .route("/user-timezone-info", get(timezone_info))
        .route("/profile/visitors", get(visitor_counts))
        .route("/profile/visits", get(visit_analytics))
        .route("/analytics/visits", get(visit_analytics_daily))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    public.merge(protected)
}

pub(crate) fn load_profile(
    db: &Database,
    acc_id: Uuid,
    viewer: Option<Uuid>,
) -> ApiResult<(agora_db::models::ProfileRow, ProfileExtras)> {
    let profile = db
        .profile_by_account(acc_id)?
        .ok_or_else(|| ApiError::not_found("Profile not found."))?;
    let (followers_count, following_count) = db.follow_counts(acc_id)?;
    let average_rating = db.rating_stats(acc_id)?.average;
    let is_following = match viewer {
        Some(viewer) if viewer != acc_id => Some(db.is_following(viewer, acc_id)?),
        _ => None,
    };
    Ok((
        profile,
        ProfileExtras {
            followers_count,
            following_count,
            average_rating,
            is_following,
        },
    ))
}

fn ensure_account(db: &Database, acc_id: Uuid) -> ApiResult<()> {
    db.user_ref(acc_id)?
        .map(|_| ())
        .ok_or_else(|| ApiError::not_found("User not found."))
}

fn valid_timezone(name: &str) -> ApiResult<Tz> {
    name.parse::<Tz>()
        .map_err(|_| ApiError::Validation(format!("Invalid timezone: {}", name)))
}

// -- Profile --

pub async fn own_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    let (profile, extras) = state.blocking(move |db| load_profile(db, me, None)).await?;
    Ok(ok(profile_response(&profile, extras, &state.storage)))
}

pub async fn public_profile(
    State(state): State<AppState>,
    Path(acc_id): Path<Uuid>,
    viewer: MaybeClaims,
    meta: ClientMeta,
) -> ApiResult<impl IntoResponse> {
    let viewer = viewer.user_id();
    let (profile, extras) = state.blocking(move |db| load_profile(db, acc_id, viewer)).await?;

    if viewer != Some(acc_id) {
        let ip = meta.ip.clone();
        let tracked = state
            .blocking(move |db| Ok(db.record_profile_visit(acc_id, viewer, ip.as_deref(), Utc::now())?))
            .await;
        if let Err(e) = tracked {
            warn!("Failed to record profile visit for {}: {}", acc_id, e);
        }
    }

    Ok(ok(profile_response(&profile, extras, &state.storage)))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ValidJson(update): ValidJson<ProfileUpdate>,
) -> ApiResult<impl IntoResponse> {
    if let Some(tz) = &update.timezone {
        valid_timezone(tz)?;
    }
    let me = claims.sub;
    let (profile, extras) = state
        .blocking(move |db| {
            if !db.update_profile(me, &update)? {
                return Err(ApiError::not_found("Profile not found."));
            }
            load_profile(db, me, None)
        })
        .await?;
    Ok(ok_with(
        profile_response(&profile, extras, &state.storage),
        "Profile updated successfully.",
    ))
}

pub async fn upload_pictures(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let form = Form::read(multipart).await?;
    let picture = form.file("profile_picture");
    let background = form.file("background_picture");
    if picture.is_none() && background.is_none() {
        return Err(ApiError::Validation(
            "Upload a profile_picture or a background_picture.".into(),
        ));
    }
    for file in picture.iter().chain(background.iter()) {
        file.require_image()?;
    }

    let me = claims.sub;
    let mut replaced = Vec::new();
    if let Some(file) = picture {
        let name = state.storage.save("profile_pictures", &file.file_name, &file.bytes).await?;
        let stored = name.clone();
        replaced.extend(state.blocking(move |db| Ok(db.set_profile_picture(me, &stored)?)).await?);
    }
    if let Some(file) = background {
        let name = state.storage.save("background_pictures", &file.file_name, &file.bytes).await?;
        let stored = name.clone();
        replaced.extend(state.blocking(move |db| Ok(db.set_background_picture(me, &stored)?)).await?);
    }
    for old in replaced {
        if let Err(e) = state.storage.delete(&old).await {
            warn!("Failed to delete replaced picture {}: {}", old, e);
        }
    }

    let profile = state
        .blocking(move |db| {
            db.profile_by_account(me)?
                .ok_or_else(|| ApiError::not_found("Profile not found."))
        })
        .await?;
    Ok(ok_with(
        ProfileAssets {
            profile_picture: profile.account.profile_picture.as_deref().map(|p| state.storage.url(p)),
            background_picture: profile.background_picture.as_deref().map(|p| state.storage.url(p)),
        },
        "Profile images uploaded successfully.",
    ))
}

// -- Stats --

async fn profile_stats(state: &AppState, acc_id: Uuid) -> ApiResult<ProfileStats> {
    state
        .blocking(move |db| {
            let profile = db
                .profile_by_account(acc_id)?
                .ok_or_else(|| ApiError::not_found("Profile not found."))?;
            let (followers_count, following_count) = db.follow_counts(acc_id)?;
            let ratings = db.rating_stats(acc_id)?;
            Ok(ProfileStats {
                followers_count,
                following_count,
                ratings_count: ratings.count,
                average_rating: crate::convert::round2(ratings.average),
                total_reviews: ratings.reviews,
                verification_status: profile.account.is_verified,
                is_omc: profile.is_omc,
            })
        })
        .await
}

pub async fn own_stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    Ok(ok(profile_stats(&state, claims.sub).await?))
}

pub async fn stats(State(state): State<AppState>, Path(acc_id): Path<Uuid>) -> ApiResult<impl IntoResponse> {
    Ok(ok(profile_stats(&state, acc_id).await?))
}

// -- Follows --

pub async fn follow(
    State(state): State<AppState>,
    Path(acc_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    if me == acc_id {
        return Err(ApiError::bad_request("You cannot follow yourself."));
    }
    let (created_new, followers_count) = state
        .blocking(move |db| {
            ensure_account(db, acc_id)?;
            let created_new = db.follow(me, acc_id)?;
            Ok((created_new, db.follow_counts(acc_id)?.0))
        })
        .await?;

    let message = if created_new {
        "You are now following this user."
    } else {
        "You are already following this user."
    };
    Ok(created_or_ok(
        created_new,
        FollowState {
            is_following: true,
            followers_count,
        },
        message,
    ))
}

pub async fn unfollow(
    State(state): State<AppState>,
    Path(acc_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    let followers_count = state
        .blocking(move |db| {
            ensure_account(db, acc_id)?;
            if !db.unfollow(me, acc_id)? {
                return Err(ApiError::bad_request("You are not following this user."));
            }
            Ok(db.follow_counts(acc_id)?.0)
        })
        .await?;
    Ok(ok_with(
        FollowState {
            is_following: false,
            followers_count,
        },
        "You have unfollowed this user.",
    ))
}

async fn follow_page(
    state: &AppState,
    acc_id: Uuid,
    page: PageQuery,
    followers: bool,
) -> ApiResult<Reply<Page<FollowResponse>>> {
    let (limit, offset) = page.window(DEFAULT_PAGE_SIZE);
    let (rows, total) = state
        .blocking(move |db| {
            ensure_account(db, acc_id)?;
            Ok(if followers {
                db.followers(acc_id, limit, offset)?
            } else {
                db.following(acc_id, limit, offset)?
            })
        })
        .await?;
    let results = rows.iter().map(|r| follow_response(r, &state.storage)).collect();
    Ok(ok(Page::new(results, total, page.page(), limit)))
}

pub async fn own_followers(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(page): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    follow_page(&state, claims.sub, page, true).await
}

pub async fn followers(
    State(state): State<AppState>,
    Path(acc_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    follow_page(&state, acc_id, page, true).await
}

pub async fn own_following(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(page): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    follow_page(&state, claims.sub, page, false).await
}

pub async fn following(
    State(state): State<AppState>,
    Path(acc_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    follow_page(&state, acc_id, page, false).await
}

// -- Ratings --

pub async fn rate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ValidJson(req): ValidJson<RatingRequest>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    if req.rated == me {
        return Err(ApiError::bad_request("You cannot rate yourself."));
    }
    let (rating, created_new) = state
        .blocking(move |db| {
            ensure_account(db, req.rated)?;
            let review = req
                .review_content
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty());
            Ok(db.upsert_rating(me, req.rated, req.rating_count, review)?)
        })
        .await?;

    let body = rating_response(&rating, &state.storage);
    if created_new {
        Ok(created(body, "Rating submitted successfully."))
    } else {
        Ok(ok_with(body, "Rating updated successfully."))
    }
}

async fn rating_page(state: &AppState, acc_id: Uuid, page: PageQuery) -> ApiResult<Reply<Page<RatingResponse>>> {
    let (limit, offset) = page.window(DEFAULT_PAGE_SIZE);
    let (rows, total) = state
        .blocking(move |db| {
            ensure_account(db, acc_id)?;
            Ok(db.ratings_for(acc_id, limit, offset)?)
        })
        .await?;
    let results = rows.iter().map(|r| rating_response(r, &state.storage)).collect();
    Ok(ok(Page::new(results, total, page.page(), limit)))
}

pub async fn own_ratings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(page): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    rating_page(&state, claims.sub, page).await
}

pub async fn ratings(
    State(state): State<AppState>,
    Path(acc_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    rating_page(&state, acc_id, page).await
}

// -- Search --

pub async fn search(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<impl IntoResponse> {
    let q = query.q.as_deref().map(str::trim).unwrap_or_default().to_string();
    if q.is_empty() {
        return Err(ApiError::Validation("Search query is required.".into()));
    }
    if q.chars().count() < 2 {
        return Err(ApiError::Validation(
            "Search query must be at least 2 characters long.".into(),
        ));
    }
    let me = claims.sub;
    let users = state
        .blocking(move |db| Ok(db.search_accounts(&q, me, SEARCH_LIMIT)?))
        .await?;
    let results: Vec<_> = users.iter().map(|u| user_summary(u, &state.storage)).collect();
    Ok(ok(results))
}

// -- Timezones --

pub async fn timezone_choices() -> impl IntoResponse {
    let choices: Vec<TimezoneChoice> = TZ_VARIANTS
        .iter()
        .map(|tz| TimezoneChoice {
            value: tz.name().to_string(),
            label: tz.name().replace('_', " "),
        })
        .collect();
    ok(choices)
}

pub async fn update_timezone(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ValidJson(req): ValidJson<TimezoneUpdate>,
) -> ApiResult<impl IntoResponse> {
    let tz = valid_timezone(req.timezone.trim())?;
    let me = claims.sub;
    let name = tz.name().to_string();
    let stored = name.clone();
    state.blocking(move |db| Ok(db.set_timezone(me, &stored)?)).await?;
    Ok(ok_with(
        serde_json::json!({ "timezone": name }),
        "Timezone updated successfully.",
    ))
}

pub async fn timezone_info(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    let profile = state
        .blocking(move |db| {
            db.profile_by_account(me)?
                .ok_or_else(|| ApiError::not_found("Profile not found."))
        })
        .await?;
    // A stored name that no longer parses reads as UTC.
    let tz: Tz = profile.timezone.parse().unwrap_or(chrono_tz::UTC);
    let now = Utc::now().with_timezone(&tz);
    Ok(ok(TimezoneInfo {
        timezone: profile.timezone,
        current_time: now.format("%Y-%m-%d %H:%M:%S").to_string(),
        utc_offset: now.format("%z").to_string(),
        timezone_name: now.format("%Z").to_string(),
    }))
}

// -- Visits --

pub async fn visitor_counts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    let [day, week, month, all] = state.blocking(move |db| Ok(db.visit_counts(me, Utc::now())?)).await?;
    Ok(ok(VisitCounts {
        last_24_hours: day,
        last_7_days: week,
        last_30_days: month,
        all_time: all,
    }))
}

async fn visits(state: &AppState, owner: Uuid, days: u32, daily: bool) -> ApiResult<VisitAnalytics> {
    let days = days.clamp(1, 365);
    let now = Utc::now();
    let since = now - Duration::days(i64::from(days));
    let (summary, recent, per_day) = state
        .blocking(move |db| {
            let summary = db.visit_summary(owner, since)?;
            let recent = db.recent_visitors(owner, since, RECENT_VISITORS)?;
            let per_day = if daily { Some(db.daily_visits(owner, since)?) } else { None };
            Ok((summary, recent, per_day))
        })
        .await?;

    Ok(VisitAnalytics {
        period_days: days,
        total_visits: summary.total,
        unique_visitors: summary.unique_accounts + summary.unique_ips,
        authenticated_visits: summary.authenticated,
        anonymous_visits: summary.anonymous,
        recent_visitors: recent
            .iter()
            .map(|(user, visited_at)| RecentVisitor {
                visitor: user_summary(user, &state.storage),
                visited_at: *visited_at,
            })
            .collect(),
        daily_visits: per_day.map(|map| {
            fill_days(since.date_naive(), now.date_naive(), |day| {
                map.get(&day).copied().unwrap_or(0)
            })
        }),
    })
}

/// One entry per calendar day in `[from, to]`.
pub fn fill_days(from: NaiveDate, to: NaiveDate, count: impl Fn(NaiveDate) -> u64) -> Vec<DailyCount> {
    from.iter_days()
        .take_while(|day| *day <= to)
        .map(|date| DailyCount { date, count: count(date) })
        .collect()
}

pub async fn visit_analytics(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<DaysQuery>,
) -> ApiResult<impl IntoResponse> {
    Ok(ok(visits(&state, claims.sub, query.days.unwrap_or(30), false).await?))
}

pub async fn visit_analytics_daily(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<DaysQuery>,
) -> ApiResult<impl IntoResponse> {
    Ok(ok(visits(&state, claims.sub, query.days.unwrap_or(30), true).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn days_are_zero_filled() {
        let from = NaiveDate::from_ymd_opt(2024, 2, 27).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let days = fill_days(from, to, |d| if d == to { 4 } else { 0 });
        assert_eq!(days.len(), 4);
        assert_eq!(days[2].date, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(days[3].count, 4);
    }

    #[test]
    fn timezones_parse() {
        assert!(valid_timezone("Africa/Lagos").is_ok());
        assert!(valid_timezone("Mars/Olympus").is_err());
    }
}
