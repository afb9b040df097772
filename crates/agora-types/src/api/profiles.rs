use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{DailyCount, UserSummary};
use crate::models::RatingStatus;

// -- Profile --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub profile_id: Uuid,
    pub acc_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub display_name: String,
    pub is_verified: bool,
    pub company_name: Option<String>,
    pub profile_picture: Option<String>,
    pub background_picture: Option<String>,
    pub about_bio: Option<String>,
    pub location: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub interest: Vec<String>,
    pub language_preference: String,
    pub timezone: String,
    pub is_omc: bool,
    pub badge: Option<String>,
    pub verification_documents: Vec<String>,
    pub followers_count: u64,
    pub following_count: u64,
    pub average_rating: f64,
    /// Only present when the viewer is signed in and is not the owner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_following: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ProfileUpdate {
    #[validate(length(max = 255, message = "Company name cannot exceed 255 characters."))]
    pub company_name: Option<String>,
    #[validate(length(max = 1000, message = "Bio cannot exceed 1000 characters."))]
    pub about_bio: Option<String>,
    #[validate(length(max = 255, message = "Location cannot exceed 255 characters."))]
    pub location: Option<String>,
    #[validate(length(max = 100, message = "Country cannot exceed 100 characters."))]
    pub country: Option<String>,
    #[validate(length(max = 100, message = "City cannot exceed 100 characters."))]
    pub city: Option<String>,
    #[validate(length(max = 20, message = "At most 20 interests are allowed."))]
    pub interest: Option<Vec<String>>,
    #[validate(length(min = 2, max = 10, message = "Language preference must be a language code."))]
    pub language_preference: Option<String>,
    pub timezone: Option<String>,
    pub is_omc: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileAssets {
    pub profile_picture: Option<String>,
    pub background_picture: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileStats {
    pub followers_count: u64,
    pub following_count: u64,
    pub ratings_count: u64,
    pub average_rating: f64,
    pub total_reviews: u64,
    pub verification_status: bool,
    pub is_omc: bool,
}

// -- Follows --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowResponse {
    pub follow_id: Uuid,
    pub follower: UserSummary,
    pub following: UserSummary,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowState {
    pub is_following: bool,
    pub followers_count: u64,
}

// -- Ratings --

#[derive(Debug, Deserialize, Validate)]
pub struct RatingRequest {
    pub rated: Uuid,
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5."))]
    pub rating_count: u8,
    #[validate(length(max = 1000, message = "Review cannot exceed 1000 characters."))]
    pub review_content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingResponse {
    pub rating_id: Uuid,
    pub rater: UserSummary,
    pub rated: UserSummary,
    pub rating_count: u8,
    pub review_content: Option<String>,
    pub status: RatingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Search & timezones --

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimezoneChoice {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TimezoneUpdate {
    #[validate(length(min = 1, message = "Timezone is required."))]
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimezoneInfo {
    pub timezone: String,
    pub current_time: String,
    pub utc_offset: String,
    pub timezone_name: String,
}

// -- Visits --

#[derive(Debug, Deserialize)]
pub struct DaysQuery {
    pub days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitCounts {
    pub last_24_hours: u64,
    pub last_7_days: u64,
    pub last_30_days: u64,
    pub all_time: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentVisitor {
    pub visitor: UserSummary,
    pub visited_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitAnalytics {
    pub period_days: u32,
    pub total_visits: u64,
    pub unique_visitors: u64,
    pub authenticated_visits: u64,
    pub anonymous_visits: u64,
    pub recent_visitors: Vec<RecentVisitor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_visits: Option<Vec<DailyCount>>,
}
