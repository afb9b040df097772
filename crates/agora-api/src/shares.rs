//! Sharing and the owner-only engagement analytics of a post.

use axum::{
    Extension, Router,
    extract::{Path, Query, State},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use tracing::info;

use agora_db::models::NewShare;
use agora_db::queries::short_id;
use agora_types::api::posts::{
    AnalyticsQuery, DailyEngagement, EngagementTotals, MethodCount, PeriodActivity, PostAnalytics,
    PostShares, ShareAnalytics, ShareRecorded, ShareRequest, ShareUrlQuery, ShareUrls, TopCommenter,
};
use agora_types::api::{Claims, DateRange};
use agora_types::models::ShareMethod;

use crate::convert::{round2, share_response, user_summary};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ClientMeta, ValidJson};
use crate::middleware::{MaybeClaims, require_auth};
use crate::posts::{active_post, owned_post};
use crate::profiles::fill_days;
use crate::response::{created, ok};
use crate::state::AppState;

const ACCOUNT_SHARES_PER_HOUR: u64 = 50;
const ANONYMOUS_SHARES_PER_HOUR: u64 = 10;
const RECENT_SHARES: u32 = 50;
const TOP_COMMENTERS: u32 = 5;
const ANALYTICS_DAYS: i64 = 30;
const SHARE_ANALYTICS_DAYS: i64 = 7;
const MAX_ANALYTICS_DAYS: i64 = 366;

pub fn routes(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/posts/{post_id}/share", post(share))
        .route("/posts/{post_id}/share-urls", get(share_urls))
        .route("/posts/{post_id}/shares", get(shares));

    let protected = Router::new()
        .route("/posts/{post_id}/analytics", get(analytics))
        .route("/posts/{post_id}/share-analytics", get(share_analytics))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    public.merge(protected)
}

// -- Share links --

pub fn post_url(frontend: &str, post_id: &str) -> String {
    format!("{}/posts/{}/", frontend.trim_end_matches('/'), post_id)
}

/// The link a client opens to share `post_url` through `method`.
pub fn share_url(method: ShareMethod, post_url: &str, message: &str) -> String {
    let url = urlencoding::encode(post_url);
    let msg = urlencoding::encode(message);
    match method {
        ShareMethod::WhatsApp => format!("https://wa.me/?text={}%20{}", msg, url),
        ShareMethod::Facebook => format!("https://www.facebook.com/sharer/sharer.php?u={}", url),
        ShareMethod::ShareX => format!("https://x.com/intent/tweet?text={}&url={}", msg, url),
        ShareMethod::LinkedIn => format!("https://www.linkedin.com/sharing/share-offsite/?url={}", url),
        ShareMethod::Telegram => format!("https://t.me/share/url?url={}&text={}", url, msg),
        ShareMethod::CopyLink | ShareMethod::DirectLink => post_url.to_string(),
    }
}

fn share_message(message: Option<String>, title: &str) -> String {
    message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("Check out this post: {}", title))
}

pub async fn share(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    viewer: MaybeClaims,
    meta: ClientMeta,
    ValidJson(body): ValidJson<ShareRequest>,
) -> ApiResult<impl IntoResponse> {
    let viewer = viewer.user_id();
    let method = body.share_method;
    let id = post_id.clone();
    let (share_id, title, shares_count) = state
        .blocking(move |db| {
            let post = active_post(db, &id)?;

            // Accounts are limited per account, anonymous visitors per IP.
            let since = Utc::now() - Duration::hours(1);
            let (recent, limit) = match viewer {
                Some(user) => (db.shares_since(Some(user), None, since)?, ACCOUNT_SHARES_PER_HOUR),
                None => (db.shares_since(None, meta.ip.as_deref(), since)?, ANONYMOUS_SHARES_PER_HOUR),
            };
            if recent >= limit {
                return Err(ApiError::TooManyRequests(
                    "Share limit reached. Please try again later.".into(),
                ));
            }

            let share_id = short_id();
            let shares_count = db.record_share(&NewShare {
                share_id: share_id.clone(),
                post_id: id,
                user_id: viewer,
                method,
                ip_address: meta.ip,
                user_agent: meta.user_agent,
            })?;
            Ok((share_id, post.title, shares_count))
        })
        .await?;

    info!("Post {} shared via {} ({})", post_id, method, share_id);
    let link = post_url(&state.config.frontend_url, &post_id);
    Ok(created(
        ShareRecorded {
            share_url: share_url(method, &link, &share_message(body.message, &title)),
            share_id,
            share_method: method,
            shares_count,
        },
        "Post shared successfully.",
    ))
}

pub async fn share_urls(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Query(query): Query<ShareUrlQuery>,
) -> ApiResult<impl IntoResponse> {
    let id = post_id.clone();
    let post = state.blocking(move |db| active_post(db, &id)).await?;

    let link = post_url(&state.config.frontend_url, &post_id);
    let message = share_message(query.message, &post.title);
    let urls = ShareMethod::ALL
        .iter()
        .map(|method| (*method, share_url(*method, &link, &message)))
        .collect();
    Ok(ok(ShareUrls { post_url: link, urls }))
}

fn method_counts(rows: &[(ShareMethod, u64)]) -> Vec<MethodCount> {
    rows.iter()
        .map(|(method, count)| MethodCount {
            method: *method,
            display_name: method.display_name().to_string(),
            count: *count,
        })
        .collect()
}

pub async fn shares(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    viewer: MaybeClaims,
) -> ApiResult<impl IntoResponse> {
    let viewer = viewer.user_id();
    let (shares_count, owner_view) = state
        .blocking(move |db| {
            let post = active_post(db, &post_id)?;
            let shares_count = db.shares_count(&post_id)?;
            let owner_view = if viewer == Some(post.author.id) {
                Some((db.shares_by_method(&post_id, None)?, db.recent_shares(&post_id, RECENT_SHARES)?))
            } else {
                None
            };
            Ok((shares_count, owner_view))
        })
        .await?;

    let (by_method, recent_shares) = match owner_view {
        Some((methods, recent)) => (
            Some(method_counts(&methods)),
            Some(recent.iter().map(|r| share_response(r, &state.storage)).collect()),
        ),
        None => (None, None),
    };
    Ok(ok(PostShares {
        shares_count,
        by_method,
        recent_shares,
    }))
}

// -- Analytics --

/// Inclusive day range from the query, `default_days` back from today when
/// a bound is missing.
pub fn analytics_range(query: &AnalyticsQuery, today: NaiveDate, default_days: i64) -> ApiResult<(NaiveDate, NaiveDate)> {
    let parse = |value: &Option<String>| -> ApiResult<Option<NaiveDate>> {
        value
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .map(|v| NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d"))
            .transpose()
            .map_err(|_| ApiError::bad_request("Invalid date format. Use YYYY-MM-DD."))
    };
    let end = parse(&query.end_date)?.unwrap_or(today);
    let start = parse(&query.start_date)?.unwrap_or(end - Duration::days(default_days));
    if start > end {
        return Err(ApiError::bad_request("start_date must not be after end_date."));
    }
    if (end - start).num_days() >= MAX_ANALYTICS_DAYS {
        return Err(ApiError::bad_request(format!(
            "Date range cannot exceed {} days.",
            MAX_ANALYTICS_DAYS
        )));
    }
    Ok((start, end))
}

/// `[start 00:00, day after end 00:00)` in UTC.
fn bounds(start: NaiveDate, end: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let from = start.and_time(NaiveTime::MIN).and_utc();
    let to = end.succ_opt().unwrap_or(NaiveDate::MAX).and_time(NaiveTime::MIN).and_utc();
    (from, to)
}

/// `part / whole * 100`, two places, 0 for an empty whole.
pub fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2(part as f64 / whole as f64 * 100.0)
}

pub async fn analytics(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<AnalyticsQuery>,
) -> ApiResult<impl IntoResponse> {
    let (start, end) = analytics_range(&query, Utc::now().date_naive(), ANALYTICS_DAYS)?;
    let (from, to) = bounds(start, end);
    let me = claims.sub;
    let id = post_id.clone();
    let (post, comments, shares, period, commenters, daily) = state
        .blocking(move |db| {
            let post = owned_post(db, &id, me)?;
            let (_, comments) = db.comment_counts(&id)?;
            let shares = db.shares_count(&id)?;
            let period = db.post_activity_between(&id, from, to)?;
            let commenters = db.top_commenters(&id, from, to, TOP_COMMENTERS)?;
            let daily = db.daily_post_activity(&id, from, to)?;
            Ok((post, comments, shares, period, commenters, daily))
        })
        .await?;

    let (likes, views, period_comments) = period;
    let daily_trend = start
        .iter_days()
        .take_while(|day| *day <= end)
        .map(|date| DailyEngagement {
            date,
            views: daily.views.get(&date).copied().unwrap_or(0),
            likes: daily.likes.get(&date).copied().unwrap_or(0),
            comments: daily.comments.get(&date).copied().unwrap_or(0),
        })
        .collect();

    Ok(ok(PostAnalytics {
        post_id,
        period: DateRange { start_date: start, end_date: end },
        totals: EngagementTotals {
            likes: post.likes_count,
            views: post.views_count,
            comments,
            shares,
        },
        period_activity: PeriodActivity {
            likes,
            views,
            comments: period_comments,
        },
        top_commenters: commenters
            .iter()
            .map(|(user, comment_count)| TopCommenter {
                user: user_summary(user, &state.storage),
                comment_count: *comment_count,
            })
            .collect(),
        engagement_rate: percent(post.likes_count + comments, post.views_count),
        daily_trend,
    }))
}

pub async fn share_analytics(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<AnalyticsQuery>,
) -> ApiResult<impl IntoResponse> {
    let (start, end) = analytics_range(&query, Utc::now().date_naive(), SHARE_ANALYTICS_DAYS)?;
    let (from, to) = bounds(start, end);
    let me = claims.sub;
    let id = post_id.clone();
    let (post, total_shares, by_method, daily) = state
        .blocking(move |db| {
            let post = owned_post(db, &id, me)?;
            let total = db.shares_count(&id)?;
            let by_method = db.shares_by_method(&id, Some((from, to)))?;
            let daily = db.daily_shares(&id, from, to)?;
            Ok((post, total, by_method, daily))
        })
        .await?;

    let period_shares: u64 = by_method.iter().map(|(_, n)| n).sum();
    let social_shares: u64 = by_method.iter().filter(|(m, _)| m.is_social()).map(|(_, n)| n).sum();
    let by_method = method_counts(&by_method);

    Ok(ok(ShareAnalytics {
        post_id,
        period: DateRange { start_date: start, end_date: end },
        total_shares,
        period_shares,
        top_platforms: by_method.iter().take(3).cloned().collect(),
        by_method,
        daily_trend: fill_days(start, end, |day| daily.get(&day).copied().unwrap_or(0)),
        social_shares,
        link_shares: period_shares - social_shares,
        shares_per_view: percent(total_shares, post.views_count),
        shares_per_like: percent(total_shares, post.likes_count),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_links_are_encoded_per_platform() {
        let url = post_url("http://localhost:3000/", "AB12CD34");
        assert_eq!(url, "http://localhost:3000/posts/AB12CD34/");

        let msg = "Check out this post: Bike";
        assert_eq!(
            share_url(ShareMethod::Facebook, &url, msg),
            "https://www.facebook.com/sharer/sharer.php?u=http%3A%2F%2Flocalhost%3A3000%2Fposts%2FAB12CD34%2F"
        );
        assert!(share_url(ShareMethod::WhatsApp, &url, msg).starts_with("https://wa.me/?text=Check%20out%20this%20post%3A%20Bike%20http"));
        assert_eq!(share_url(ShareMethod::CopyLink, &url, msg), url);
        assert_eq!(share_url(ShareMethod::DirectLink, &url, msg), url);
    }

    #[test]
    fn default_share_message_uses_title() {
        assert_eq!(share_message(None, "Bike"), "Check out this post: Bike");
        assert_eq!(share_message(Some("  ".into()), "Bike"), "Check out this post: Bike");
        assert_eq!(share_message(Some("look".into()), "Bike"), "look");
    }

    #[test]
    fn analytics_range_defaults_and_rejects_bad_dates() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let empty = AnalyticsQuery { start_date: None, end_date: None };
        assert_eq!(
            analytics_range(&empty, today, 30).unwrap(),
            (NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(), today)
        );

        let bad = AnalyticsQuery { start_date: Some("31/03/2024".into()), end_date: None };
        assert!(matches!(analytics_range(&bad, today, 30), Err(ApiError::BadRequest(_))));

        let reversed = AnalyticsQuery {
            start_date: Some("2024-03-10".into()),
            end_date: Some("2024-03-01".into()),
        };
        assert!(analytics_range(&reversed, today, 30).is_err());
    }

    #[test]
    fn analytics_range_is_capped_at_a_year() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let leap_year = AnalyticsQuery {
            start_date: Some("2024-01-01".into()),
            end_date: Some("2024-12-31".into()),
        };
        let (start, end) = analytics_range(&leap_year, today, 30).unwrap();
        assert_eq!(fill_days(start, end, |_| 0).len(), 366);

        let everything = AnalyticsQuery {
            start_date: Some("0001-01-01".into()),
            end_date: Some("9999-12-31".into()),
        };
        assert!(matches!(analytics_range(&everything, today, 30), Err(ApiError::BadRequest(_))));

        let one_over = AnalyticsQuery {
            start_date: Some("2023-01-01".into()),
            end_date: Some("2024-01-02".into()),
        };
        assert!(analytics_range(&one_over, today, 30).is_err());
    }

    #[test]
    fn percent_rounds_and_handles_zero() {
        assert_eq!(percent(1, 3), 33.33);
        assert_eq!(percent(5, 0), 0.0);
        assert_eq!(percent(3, 4), 75.0);
    }

    #[test]
    fn bounds_cover_whole_days() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let (from, to) = bounds(day, day);
        assert_eq!(to - from, Duration::days(1));
    }
}
