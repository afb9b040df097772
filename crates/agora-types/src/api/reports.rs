use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::UserSummary;
use super::posts::PostSummary;
use super::profiles::ProfileResponse;
use crate::models::{ReportAction, ReportStatus, ReportedItemType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportCategoryResponse {
    pub report_category_id: Uuid,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReportCreate {
    #[validate(length(min = 1, message = "Category is required."))]
    pub category_name: String,
    #[validate(length(min = 1, max = 500, message = "Reason must be between 1 and 500 characters."))]
    pub reason: String,
    #[validate(length(min = 1, message = "Item type is required."))]
    pub reported_item_type: String,
    #[validate(length(min = 1, message = "Item id is required."))]
    pub reported_item_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportResponse {
    pub report_id: String,
    pub reporter: UserSummary,
    pub category: ReportCategoryResponse,
    pub reason: String,
    pub reported_item_type: ReportedItemType,
    pub reported_item_id: String,
    pub status: ReportStatus,
    pub priority: u8,
    pub reviewed_by: Option<UserSummary>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub action_taken: ReportAction,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
    pub priority: Option<u8>,
    /// Category name.
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub item_type: Option<ReportedItemType>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ReportUpdate {
    pub status: Option<ReportStatus>,
    pub action_taken: Option<ReportAction>,
    #[validate(length(max = 2000, message = "Notes cannot exceed 2000 characters."))]
    pub admin_notes: Option<String>,
    #[validate(range(min = 1, max = 3, message = "Priority must be 1, 2 or 3."))]
    pub priority: Option<u8>,
}

/// The content a report points at, resolved for reviewers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "item", rename_all = "lowercase")]
pub enum ReportedItem {
    Post(Box<PostSummary>),
    Profile(Box<ProfileResponse>),
}
