use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{ArticlePriority, ArticleStatus};

pub const NEWS_PAGE_SIZE: u32 = 12;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsCategoryResponse {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub articles_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsSourceResponse {
    pub source_id: Uuid,
    pub name: String,
    pub website: Option<String>,
    pub logo: Option<String>,
    pub description: Option<String>,
    pub is_verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRef {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleSummary {
    pub article_id: Uuid,
    pub title: String,
    pub slug: String,
    pub summary: Option<String>,
    pub featured_image: Option<String>,
    pub category: Option<CategoryRef>,
    pub source: Option<NewsSourceResponse>,
    pub status: ArticleStatus,
    pub priority: ArticlePriority,
    pub published_at: Option<DateTime<Utc>>,
    pub views_count: u64,
    pub likes_count: u64,
    pub shares_count: u64,
    pub country: Option<String>,
    pub region: Option<String>,
    pub reading_time: u32,
    pub is_breaking: bool,
    pub time_ago: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleDetail {
    #[serde(flatten)]
    pub article: ArticleSummary,
    pub content: String,
    pub featured_image_caption: Option<String>,
    pub video_url: Option<String>,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
    pub original_url: Option<String>,
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ArticleFilter {
    /// Category slug.
    pub category: Option<String>,
    pub country: Option<String>,
    pub priority: Option<ArticlePriority>,
    pub days_ago: Option<u32>,
    pub search: Option<String>,
    pub ordering: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewsSearch {
    pub q: Option<String>,
}

// -- Staff data entry --

#[derive(Debug, Deserialize, Validate)]
pub struct NewsCategoryCreate {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters."))]
    pub name: String,
    #[validate(length(max = 100, message = "Slug cannot exceed 100 characters."))]
    pub slug: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NewsSourceCreate {
    #[validate(length(min = 1, max = 200, message = "Name must be between 1 and 200 characters."))]
    pub name: String,
    #[validate(url(message = "Enter a valid URL."))]
    pub website: Option<String>,
    pub logo: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub is_verified: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ArticleCreate {
    #[validate(length(min = 1, max = 300, message = "Title must be between 1 and 300 characters."))]
    pub title: String,
    #[validate(length(max = 300, message = "Slug cannot exceed 300 characters."))]
    pub slug: Option<String>,
    #[validate(length(max = 500, message = "Summary cannot exceed 500 characters."))]
    pub summary: Option<String>,
    #[validate(length(min = 1, max = 3500, message = "Content must be between 1 and 3500 characters."))]
    pub content: String,
    pub featured_image: Option<String>,
    #[validate(length(max = 200, message = "Caption cannot exceed 200 characters."))]
    pub featured_image_caption: Option<String>,
    #[validate(url(message = "Enter a valid URL."))]
    pub video_url: Option<String>,
    pub category_id: Option<i64>,
    pub source_id: Option<Uuid>,
    pub status: Option<ArticleStatus>,
    pub priority: Option<ArticlePriority>,
    #[validate(length(max = 160, message = "Meta description cannot exceed 160 characters."))]
    pub meta_description: Option<String>,
    #[validate(length(max = 255, message = "Meta keywords cannot exceed 255 characters."))]
    pub meta_keywords: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    #[validate(url(message = "Enter a valid URL."))]
    pub original_url: Option<String>,
    pub external_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ArticleStatusUpdate {
    pub status: ArticleStatus,
}
