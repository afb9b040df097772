use std::borrow::Cow;
use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::{DailyCount, DateRange, UserSummary};
use crate::models::ShareMethod;

pub const MAX_POST_IMAGES: usize = 5;
pub const LATEST_LISTING_SIZE: u32 = 8;

// -- Categories --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostCategoryResponse {
    pub category_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub is_active: bool,
}

// -- Posts --

#[derive(Debug, Deserialize)]
pub struct PostFilter {
    /// Category slug.
    pub category: Option<String>,
    pub location: Option<String>,
    pub search: Option<String>,
}

/// Text fields of a post as submitted in a multipart form.
#[derive(Debug, Default, Clone, Validate)]
pub struct PostFields {
    #[validate(length(min = 1, max = 255, message = "Title must be between 1 and 255 characters."))]
    pub title: Option<String>,
    pub category: Option<Uuid>,
    #[validate(length(max = 255, message = "Location cannot exceed 255 characters."))]
    pub location: Option<String>,
    #[validate(length(max = 50, message = "Price cannot exceed 50 characters."))]
    pub price: Option<String>,
    #[validate(length(max = 400, message = "Description cannot exceed 400 characters."))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostImageResponse {
    pub id: i64,
    pub image: String,
    pub is_primary: bool,
    pub order: i64,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostSummary {
    pub post_id: String,
    pub title: String,
    pub category: Option<PostCategoryResponse>,
    pub location: Option<String>,
    pub price: Option<String>,
    pub description: Option<String>,
    pub is_active: bool,
    pub primary_image: String,
    pub author: UserSummary,
    pub likes_count: u64,
    pub comments_count: u64,
    pub views_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: PostSummary,
    pub images: Vec<PostImageResponse>,
    pub shares_count: u64,
    pub is_liked: bool,
    pub comments: Vec<CommentResponse>,
}

/// Returned after an edit, with the full image list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostWithImages {
    #[serde(flatten)]
    pub post: PostSummary,
    pub images: Vec<PostImageResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostStats {
    pub post_id: String,
    pub likes_count: u64,
    pub views_count: u64,
    pub comments_count: u64,
    pub total_comments_count: u64,
    pub shares_count: u64,
    pub is_liked: bool,
}

// -- Likes & views --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikeToggle {
    pub is_liked: bool,
    pub likes_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikeResponse {
    pub like_id: String,
    pub user: UserSummary,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewRecorded {
    pub recorded: bool,
    pub views_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewResponse {
    pub visit_id: String,
    pub user: Option<UserSummary>,
    pub ip_address: Option<String>,
    pub viewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostViews {
    pub views_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_views: Option<Vec<ViewResponse>>,
}

// -- Comments --

fn comment_content(content: &str) -> Result<(), ValidationError> {
    let len = content.trim().chars().count();
    if len < 3 {
        return Err(ValidationError::new("too_short")
            .with_message(Cow::Borrowed("Comment must be at least 3 characters long.")));
    }
    if len > 500 {
        return Err(ValidationError::new("too_long")
            .with_message(Cow::Borrowed("Comment cannot exceed 500 characters.")));
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
pub struct CommentCreate {
    #[validate(custom(function = "comment_content"))]
    pub content: String,
    pub parent: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CommentUpdate {
    #[validate(custom(function = "comment_content"))]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentResponse {
    pub comment_id: String,
    pub post_id: String,
    pub user: UserSummary,
    pub parent: Option<String>,
    pub content: String,
    pub is_active: bool,
    pub likes_count: u64,
    pub is_liked: bool,
    pub replies: Vec<CommentResponse>,
    pub time_ago: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Analytics --

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementTotals {
    pub likes: u64,
    pub views: u64,
    pub comments: u64,
    pub shares: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodActivity {
    pub likes: u64,
    pub views: u64,
    pub comments: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopCommenter {
    pub user: UserSummary,
    pub comment_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyEngagement {
    pub date: NaiveDate,
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostAnalytics {
    pub post_id: String,
    pub period: DateRange,
    pub totals: EngagementTotals,
    pub period_activity: PeriodActivity,
    pub top_commenters: Vec<TopCommenter>,
    pub engagement_rate: f64,
    pub daily_trend: Vec<DailyEngagement>,
}

// -- Shares --

#[derive(Debug, Deserialize, Validate)]
pub struct ShareRequest {
    pub share_method: ShareMethod,
    #[validate(length(max = 500, message = "Message cannot exceed 500 characters."))]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ShareUrlQuery {
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareRecorded {
    pub share_id: String,
    pub share_method: ShareMethod,
    pub share_url: String,
    pub shares_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareUrls {
    pub post_url: String,
    pub urls: BTreeMap<ShareMethod, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareResponse {
    pub share_id: String,
    pub user: Option<UserSummary>,
    pub share_method: ShareMethod,
    pub ip_address: Option<String>,
    pub shared_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodCount {
    pub method: ShareMethod,
    pub display_name: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostShares {
    pub shares_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_method: Option<Vec<MethodCount>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_shares: Option<Vec<ShareResponse>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareAnalytics {
    pub post_id: String,
    pub period: DateRange,
    pub total_shares: u64,
    pub period_shares: u64,
    pub by_method: Vec<MethodCount>,
    pub daily_trend: Vec<DailyCount>,
    pub top_platforms: Vec<MethodCount>,
    pub social_shares: u64,
    pub link_shares: u64,
    pub shares_per_view: f64,
    pub shares_per_like: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_length_is_checked_after_trim() {
        let short = CommentCreate { content: "  hi   ".into(), parent: None };
        let err = short.validate().unwrap_err();
        let field = &err.field_errors()["content"][0];
        assert_eq!(field.message.as_deref(), Some("Comment must be at least 3 characters long."));

        let ok = CommentCreate { content: "  nice listing  ".into(), parent: None };
        assert!(ok.validate().is_ok());

        let long = CommentUpdate { content: "x".repeat(501) };
        assert!(long.validate().is_err());
    }
}
