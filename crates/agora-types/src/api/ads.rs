use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{AdEventStatus, AdEventType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdCategoryResponse {
    pub category_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdEventResponse {
    pub ad_event_id: Uuid,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: AdEventType,
    pub category: AdCategoryResponse,
    pub description: Option<String>,
    pub link: Option<String>,
    pub banner_image: Option<String>,
    pub location: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: AdEventStatus,
    pub is_featured: bool,
    pub is_active: bool,
    pub is_upcoming: bool,
    pub is_expired: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdEventFilter {
    #[serde(rename = "type")]
    pub kind: Option<AdEventType>,
    pub category: Option<Uuid>,
    pub location: Option<String>,
    pub is_featured: Option<bool>,
    pub search: Option<String>,
    pub ordering: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CategorySearch {
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AdCategoryCreate {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters."))]
    pub name: String,
    #[validate(length(max = 100, message = "Slug cannot exceed 100 characters."))]
    pub slug: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub order: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AdEventCreate {
    #[validate(length(min = 1, max = 255, message = "Title must be between 1 and 255 characters."))]
    pub title: String,
    #[serde(rename = "type")]
    pub kind: AdEventType,
    pub category_id: Uuid,
    pub description: Option<String>,
    #[validate(url(message = "Enter a valid URL."))]
    pub link: Option<String>,
    pub banner_image: Option<String>,
    #[validate(length(max = 255, message = "Location cannot exceed 255 characters."))]
    pub location: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<AdEventStatus>,
    #[serde(default)]
    pub is_featured: bool,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct AdEventUpdate {
    #[validate(length(min = 1, max = 255, message = "Title must be between 1 and 255 characters."))]
    pub title: Option<String>,
    pub description: Option<String>,
    #[validate(url(message = "Enter a valid URL."))]
    pub link: Option<String>,
    #[validate(length(max = 255, message = "Location cannot exceed 255 characters."))]
    pub location: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<AdEventStatus>,
    pub is_featured: Option<bool>,
}
