use axum::{
    Json, Router,
    extract::{Path, Query, State},
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
};
use chrono::{Duration, Utc};
use tracing::info;
use uuid::Uuid;

use agora_db::models::{ArticleOrdering, ArticleQuery, ArticleRow, NewArticle};
use agora_types::api::news::{
    ArticleCreate, ArticleFilter, ArticleStatusUpdate, ArticleSummary, NEWS_PAGE_SIZE, NewsCategoryCreate, NewsSearch,
    NewsSourceCreate,
};
use agora_types::api::{Page, PageQuery, SearchResults};
use agora_types::models::{ArticlePriority, ArticleStatus};
use agora_types::text::slug_or_derive;

use crate::convert::{article_detail, article_summary, news_category, news_source};
use crate::error::{ApiError, ApiResult};
use crate::extract::ValidJson;
use crate::middleware::{require_auth, require_staff};
use crate::response::{created, ok, ok_with};
use crate::state::AppState;

const RELATED_LIMIT: u32 = 5;
const BREAKING_LIMIT: u32 = 5;
const TRENDING_LIMIT: u32 = 10;
const TRENDING_DAYS: i64 = 7;
const SEARCH_LIMIT: u32 = 20;

/// `/api/v1.2`
pub fn routes(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/industry-news", get(list))
        .route("/industry-news/featured", get(featured))
        .route("/industry-news/breaking", get(breaking))
        .route("/industry-news/trending", get(trending))
        .route("/industry-news/categories", get(categories))
        .route("/industry-news/search", get(search))
        .route("/industry-news/{article_id}", get(detail))
        .route("/industry-news/{article_id}/related", get(related));

    let staff = Router::new()
        .route("/industry-news/admin/categories", post(create_category))
        .route("/industry-news/admin/sources", post(create_source))
        .route("/industry-news/admin/articles", post(create_article))
        .route("/industry-news/admin/articles/{article_id}/status", patch(set_status))
        .route_layer(middleware::from_fn(require_staff))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    public.merge(staff)
}

/// `published_at`, `views_count` or `likes_count`, with an optional `-`.
pub fn parse_ordering(raw: Option<&str>) -> Option<(ArticleOrdering, bool)> {
    let raw = raw?.trim();
    let (field, desc) = match raw.strip_prefix('-') {
        Some(field) => (field, true),
        None => (raw, false),
    };
    let column = match field {
        "published_at" => ArticleOrdering::PublishedAt,
        "views_count" => ArticleOrdering::Views,
        "likes_count" => ArticleOrdering::Likes,
        _ => return None,
    };
    Some((column, desc))
}

fn summaries(rows: &[ArticleRow], state: &AppState) -> Vec<ArticleSummary> {
    let now = Utc::now();
    rows.iter().map(|r| article_summary(r, now, &state.storage)).collect()
}

pub async fn list(
    State(state): State<AppState>,
    Query(filter): Query<ArticleFilter>,
    Query(page): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let (limit, offset) = page.window(NEWS_PAGE_SIZE);
    let blank = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    let query = ArticleQuery {
        category_slug: blank(filter.category),
        country: blank(filter.country),
        priority: filter.priority,
        published_since: filter
            .days_ago
            .map(|days| Utc::now() - Duration::days(i64::from(days))),
        search: blank(filter.search),
        ordering: parse_ordering(filter.ordering.as_deref()),
    };
    let (rows, total) = state
        .blocking(move |db| Ok(db.list_articles(&query, limit, offset)?))
        .await?;
    Ok(ok(Page::new(summaries(&rows, &state), total, page.page(), limit)))
}

pub async fn detail(State(state): State<AppState>, Path(article_id): Path<Uuid>) -> ApiResult<impl IntoResponse> {
    let row = state
        .blocking(move |db| {
            db.read_published_article(article_id)?
                .ok_or_else(|| ApiError::not_found("Article not found."))
        })
        .await?;
    Ok(ok(article_detail(&row, Utc::now(), &state.storage)))
}

pub async fn related(State(state): State<AppState>, Path(article_id): Path<Uuid>) -> ApiResult<impl IntoResponse> {
    let rows = state
        .blocking(move |db| Ok(db.related_articles(article_id, RELATED_LIMIT)?))
        .await?;
    Ok(ok(summaries(&rows, &state)))
}

pub async fn featured(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let rows = state.blocking(|db| Ok(db.featured_articles()?)).await?;
    Ok(ok(summaries(&rows, &state)))
}

pub async fn breaking(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let rows = state.blocking(|db| Ok(db.breaking_articles(BREAKING_LIMIT)?)).await?;
    Ok(ok(summaries(&rows, &state)))
}

pub async fn trending(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let since = Utc::now() - Duration::days(TRENDING_DAYS);
    let rows = state
        .blocking(move |db| Ok(db.trending_articles(since, TRENDING_LIMIT)?))
        .await?;
    Ok(ok(summaries(&rows, &state)))
}

pub async fn categories(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let rows = state.blocking(|db| Ok(db.news_categories()?)).await?;
    Ok(ok(rows.iter().map(news_category).collect::<Vec<_>>()))
}

pub async fn search(State(state): State<AppState>, Query(query): Query<NewsSearch>) -> ApiResult<impl IntoResponse> {
    let q = query.q.map(|q| q.trim().to_string()).unwrap_or_default();
    if q.is_empty() {
        return Ok(ok(SearchResults { results: Vec::new() }));
    }
    let rows = state
        .blocking(move |db| Ok(db.search_articles(&q, SEARCH_LIMIT)?))
        .await?;
    Ok(ok(SearchResults {
        results: summaries(&rows, &state),
    }))
}

// -- Staff data entry --

pub async fn create_category(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<NewsCategoryCreate>,
) -> ApiResult<impl IntoResponse> {
    let name = body.name.trim().to_string();
    let slug = slug_or_derive(body.slug.as_deref(), &name);
    if slug.is_empty() {
        return Err(ApiError::Validation("Name must contain letters or digits.".into()));
    }
    let row = state
        .blocking(move |db| Ok(db.create_news_category(&name, &slug, body.description.as_deref())?))
        .await?;
    info!("Created news category {}", row.slug);
    Ok(created(news_category(&row), "Category created successfully."))
}

pub async fn create_source(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<NewsSourceCreate>,
) -> ApiResult<impl IntoResponse> {
    let row = state
        .blocking(move |db| {
            Ok(db.create_news_source(
                body.name.trim(),
                body.website.as_deref(),
                body.logo.as_deref(),
                body.description.as_deref(),
                body.is_verified,
            )?)
        })
        .await?;
    Ok(created(news_source(&row, &state.storage), "Source created successfully."))
}

pub async fn create_article(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<ArticleCreate>,
) -> ApiResult<impl IntoResponse> {
    let title = body.title.trim().to_string();
    let slug = slug_or_derive(body.slug.as_deref(), &title);
    if slug.is_empty() {
        return Err(ApiError::Validation("Title must contain letters or digits.".into()));
    }
    let row = state
        .blocking(move |db| {
            if let Some(category) = body.category_id {
                if !db.news_category_exists(category)? {
                    return Err(ApiError::Validation("Category does not exist.".into()));
                }
            }
            if let Some(source) = body.source_id {
                if !db.news_source_exists(source)? {
                    return Err(ApiError::Validation("Source does not exist.".into()));
                }
            }
            Ok(db.create_article(&NewArticle {
                article_id: Uuid::new_v4(),
                title,
                slug,
                summary: body.summary,
                content: body.content,
                featured_image: body.featured_image,
                featured_image_caption: body.featured_image_caption,
                video_url: body.video_url,
                category_id: body.category_id,
                source_id: body.source_id,
                status: body.status.unwrap_or(ArticleStatus::Draft),
                priority: body.priority.unwrap_or(ArticlePriority::Medium),
                meta_description: body.meta_description,
                meta_keywords: body.meta_keywords,
                country: body.country,
                region: body.region,
                original_url: body.original_url,
                external_id: body.external_id,
            })?)
        })
        .await?;
    info!("Created article {} ({})", row.slug, row.status);
    Ok(created(article_detail(&row, Utc::now(), &state.storage), "Article created successfully."))
}

pub async fn set_status(
    State(state): State<AppState>,
    Path(article_id): Path<Uuid>,
    Json(body): Json<ArticleStatusUpdate>,
) -> ApiResult<impl IntoResponse> {
    let row = state
        .blocking(move |db| {
            db.set_article_status(article_id, body.status)?
                .ok_or_else(|| ApiError::not_found("Article not found."))
        })
        .await?;
    Ok(ok_with(article_detail(&row, Utc::now(), &state.storage), "Article status updated."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_fields() {
        assert_eq!(parse_ordering(Some("-views_count")), Some((ArticleOrdering::Views, true)));
        assert_eq!(parse_ordering(Some("published_at")), Some((ArticleOrdering::PublishedAt, false)));
        assert_eq!(parse_ordering(Some("title")), None);
    }
}
