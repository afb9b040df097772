//! Request and response bodies of the REST surface.

pub mod accounts;
pub mod ads;
pub mod chat;
pub mod news;
pub mod posts;
pub mod profiles;
pub mod reports;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use accounts::Claims;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

pub const DEFAULT_MESSAGE: &str = "Request processed successfully.";

// -- Envelopes --

/// Body of every successful response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub message: String,
    pub requires_verification: bool,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self::with_message(data, DEFAULT_MESSAGE)
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data,
            message: message.into(),
            requires_verification: false,
        }
    }
}

/// Body of every failed response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    pub requires_verification: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_report_id: Option<String>,
}

// -- Pagination --

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl PageQuery {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn page_size(&self, default: u32) -> u32 {
        self.page_size.unwrap_or(default).clamp(1, MAX_PAGE_SIZE)
    }

    /// (limit, offset) for a query with the given default page size.
    pub fn window(&self, default: u32) -> (u32, u32) {
        let size = self.page_size(default);
        (size, (self.page() - 1) * size)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: u64,
    pub next: Option<u32>,
    pub previous: Option<u32>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(results: Vec<T>, count: u64, page: u32, page_size: u32) -> Self {
        let shown = u64::from(page) * u64::from(page_size);
        Self {
            count,
            next: (shown < count).then_some(page + 1),
            previous: (page > 1).then_some(page - 1),
            results,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults<T> {
    pub results: Vec<T>,
}

// -- Shared shapes --

/// Compact public view of an account, embedded wherever a user is referenced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub acc_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub display_name: String,
    pub profile_picture: Option<String>,
    pub badge: Option<String>,
    pub is_verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_links() {
        let page = Page::new(vec![1, 2], 45, 1, 20);
        assert_eq!(page.next, Some(2));
        assert_eq!(page.previous, None);

        let last = Page::new(vec![5], 45, 3, 20);
        assert_eq!(last.next, None);
        assert_eq!(last.previous, Some(2));
    }

    #[test]
    fn window_clamps_size() {
        let q = PageQuery { page: Some(3), page_size: Some(500) };
        assert_eq!(q.window(20), (MAX_PAGE_SIZE, 2 * MAX_PAGE_SIZE));

        let q = PageQuery { page: Some(0), page_size: None };
        assert_eq!(q.window(12), (12, 0));
    }

    #[test]
    fn error_body_omits_empty_report_id() {
        let body = ErrorBody {
            success: false,
            message: "nope".into(),
            requires_verification: false,
            existing_report_id: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("existing_report_id").is_none());
    }
}
