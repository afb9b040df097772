use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use agora_types::models::{
    AdEventStatus, AdEventType, ArticlePriority, ArticleStatus, MessageType, PresenceStatus,
    RatingStatus, ReactionKind, ReportAction, ReportStatus, ReportedItemType, ShareMethod,
};

// -- Accounts --

#[derive(Debug, Clone)]
pub struct AccountRow {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub is_staff: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub is_staff: bool,
}

/// The account fields needed to show who did something.
#[derive(Debug, Clone)]
pub struct UserRef {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub is_verified: bool,
    pub company_name: Option<String>,
    pub profile_picture: Option<String>,
    pub badge: Option<String>,
}

impl UserRef {
    /// Company name, then full name, then email.
    pub fn display_name(&self) -> String {
        self.company_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or_else(|| Some(self.full_name.trim()).filter(|s| !s.is_empty()))
            .unwrap_or(&self.email)
            .to_string()
    }
}

// -- Profiles --

#[derive(Debug, Clone)]
pub struct ProfileRow {
    pub profile_id: Uuid,
    pub account: UserRef,
    pub background_picture: Option<String>,
    pub about_bio: Option<String>,
    pub location: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub interest: Vec<String>,
    pub language_preference: String,
    pub timezone: String,
    pub is_omc: bool,
    pub verification_documents: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FollowRow {
    pub follow_id: Uuid,
    pub follower: UserRef,
    pub following: UserRef,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RatingRow {
    pub rating_id: Uuid,
    pub rater: UserRef,
    pub rated: UserRef,
    pub rating_count: u8,
    pub review_content: Option<String>,
    pub status: RatingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct RatingStats {
    pub count: u64,
    pub average: f64,
    pub reviews: u64,
}

#[derive(Debug, Clone, Default)]
pub struct VisitSummary {
    pub total: u64,
    pub authenticated: u64,
    pub anonymous: u64,
    pub unique_accounts: u64,
    pub unique_ips: u64,
}

// -- Posts --

#[derive(Debug, Clone)]
pub struct PostCategoryRow {
    pub category_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub post_id: String,
    pub user_id: Uuid,
    pub title: String,
    pub category_id: Option<Uuid>,
    pub location: Option<String>,
    pub price: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PostChanges {
    pub title: Option<String>,
    pub category_id: Option<Uuid>,
    pub location: Option<String>,
    pub price: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PostRow {
    pub post_id: String,
    pub author: UserRef,
    pub title: String,
    pub category: Option<PostCategoryRow>,
    pub location: Option<String>,
    pub price: Option<String>,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub primary_image: Option<String>,
    pub likes_count: u64,
    pub comments_count: u64,
    pub views_count: u64,
}

#[derive(Debug, Clone, Default)]
pub struct PostQuery {
    pub category_slug: Option<String>,
    pub location: Option<String>,
    pub search: Option<String>,
    pub author: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct PostImageRow {
    pub id: i64,
    pub post_id: String,
    pub image: String,
    pub is_primary: bool,
    pub order: i64,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LikeRow {
    pub like_id: String,
    pub user: UserRef,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ViewRow {
    pub visit_id: String,
    pub user: Option<UserRef>,
    pub ip_address: Option<String>,
    pub viewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub comment_id: String,
    pub post_id: String,
    pub user_id: Uuid,
    pub parent_id: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct CommentRow {
    pub comment_id: String,
    pub post_id: String,
    pub user: UserRef,
    pub parent_id: Option<String>,
    pub content: String,
    pub is_active: bool,
    pub likes_count: u64,
    pub is_liked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewShare {
    pub share_id: String,
    pub post_id: String,
    pub user_id: Option<Uuid>,
    pub method: ShareMethod,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Per-day counts of each kind of engagement.
#[derive(Debug, Clone, Default)]
pub struct DailyActivity {
    pub views: BTreeMap<NaiveDate, u64>,
    pub likes: BTreeMap<NaiveDate, u64>,
    pub comments: BTreeMap<NaiveDate, u64>,
}

#[derive(Debug, Clone)]
pub struct ShareRow {
    pub share_id: String,
    pub user: Option<UserRef>,
    pub method: ShareMethod,
    pub ip_address: Option<String>,
    pub shared_at: DateTime<Utc>,
}

// -- Chat --

#[derive(Debug, Clone)]
pub struct NewConversation {
    pub conversation_id: Uuid,
    pub name: Option<String>,
    pub is_group: bool,
    pub created_by: Uuid,
    pub encryption_key: String,
    pub participants: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct ConversationRow {
    pub conversation_id: Uuid,
    pub name: Option<String>,
    pub is_group: bool,
    pub created_by: Option<Uuid>,
    pub encryption_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ParticipantRow {
    pub user: UserRef,
    pub status: PresenceStatus,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub path: String,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    pub is_compressed: bool,
    pub original_file_size: u64,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    /// Sealed text, never plaintext.
    pub content: Option<String>,
    pub message_type: MessageType,
    pub attachment: Option<Attachment>,
    pub reply_to: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub sender: UserRef,
    pub content: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub message_type: MessageType,
    pub attachment: Option<Attachment>,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub reply_to: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct ReactionRow {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub reaction: ReactionKind,
}

#[derive(Debug, Clone)]
pub struct ReadRow {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UserStatusRow {
    pub user_id: Uuid,
    pub status: PresenceStatus,
    pub last_seen: DateTime<Utc>,
    pub typing_in: Option<Uuid>,
    pub typing_started_at: Option<DateTime<Utc>>,
}

// -- Ads & events --

#[derive(Debug, Clone)]
pub struct AdCategoryRow {
    pub category_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub order: i64,
}

#[derive(Debug, Clone)]
pub struct NewAdEvent {
    pub ad_event_id: Uuid,
    pub title: String,
    pub kind: AdEventType,
    pub category_id: Uuid,
    pub description: Option<String>,
    pub link: Option<String>,
    pub banner_image: Option<String>,
    pub location: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: AdEventStatus,
    pub is_featured: bool,
}

#[derive(Debug, Clone)]
pub struct AdEventRow {
    pub ad_event_id: Uuid,
    pub title: String,
    pub kind: AdEventType,
    pub category: AdCategoryRow,
    pub description: Option<String>,
    pub link: Option<String>,
    pub banner_image: Option<String>,
    pub location: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: AdEventStatus,
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AdEventRow {
    /// Live on `today`: active status, active category, inside the date window.
    pub fn is_active_on(&self, today: NaiveDate) -> bool {
        self.status == AdEventStatus::Active
            && self.category.is_active
            && self.start_date.is_none_or(|start| start <= today)
            && self.end_date.is_none_or(|end| end >= today)
    }

    pub fn is_upcoming_on(&self, today: NaiveDate) -> bool {
        self.kind == AdEventType::Event && self.start_date.is_some_and(|start| start > today)
    }

    pub fn is_expired_on(&self, today: NaiveDate) -> bool {
        self.end_date.is_some_and(|end| end < today)
    }
}

/// Partial update of an ad or event. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct AdEventChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub banner_image: Option<String>,
    pub location: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<AdEventStatus>,
    pub is_featured: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdOrdering {
    CreatedAt,
    StartDate,
    EndDate,
    Title,
}

#[derive(Debug, Clone, Default)]
pub struct AdEventQuery {
    pub kind: Option<AdEventType>,
    pub category: Option<Uuid>,
    /// Matches either the category slug or, case-insensitively, its name.
    pub category_slug_or_name: Option<String>,
    pub location: Option<String>,
    pub is_featured: Option<bool>,
    pub search: Option<String>,
    /// Only items starting strictly after this date.
    pub starts_after: Option<NaiveDate>,
    /// Only items whose window contains this date.
    pub running_on: Option<NaiveDate>,
    /// (column, descending); newest first when absent.
    pub ordering: Option<(AdOrdering, bool)>,
}

// -- News --

#[derive(Debug, Clone)]
pub struct NewsCategoryRow {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub articles_count: u64,
}

#[derive(Debug, Clone)]
pub struct NewsSourceRow {
    pub source_id: Uuid,
    pub name: String,
    pub website: Option<String>,
    pub logo: Option<String>,
    pub description: Option<String>,
    pub is_verified: bool,
}

#[derive(Debug, Clone)]
pub struct NewArticle {
    pub article_id: Uuid,
    pub title: String,
    pub slug: String,
    pub summary: Option<String>,
    pub content: String,
    pub featured_image: Option<String>,
    pub featured_image_caption: Option<String>,
    pub video_url: Option<String>,
    pub category_id: Option<i64>,
    pub source_id: Option<Uuid>,
    pub status: ArticleStatus,
    pub priority: ArticlePriority,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub original_url: Option<String>,
    pub external_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ArticleRow {
    pub article_id: Uuid,
    pub title: String,
    pub slug: String,
    pub summary: Option<String>,
    pub content: String,
    pub featured_image: Option<String>,
    pub featured_image_caption: Option<String>,
    pub video_url: Option<String>,
    pub category: Option<NewsCategoryRow>,
    pub source: Option<NewsSourceRow>,
    pub status: ArticleStatus,
    pub priority: ArticlePriority,
    pub published_at: Option<DateTime<Utc>>,
    pub views_count: u64,
    pub likes_count: u64,
    pub shares_count: u64,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub original_url: Option<String>,
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ArticleRow {
    /// Minutes at 200 words per minute, never below one.
    pub fn reading_time(&self) -> u32 {
        let words = self.content.split_whitespace().count() as u32;
        (words / 200).max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleOrdering {
    PublishedAt,
    Views,
    Likes,
}

#[derive(Debug, Clone, Default)]
pub struct ArticleQuery {
    pub category_slug: Option<String>,
    pub country: Option<String>,
    pub priority: Option<ArticlePriority>,
    pub published_since: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub ordering: Option<(ArticleOrdering, bool)>,
}

// -- Reports --

#[derive(Debug, Clone)]
pub struct ReportCategoryRow {
    pub report_category_id: Uuid,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewReport {
    pub reporter_id: Uuid,
    pub category_id: Uuid,
    pub reason: String,
    pub item_type: ReportedItemType,
    pub object_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportInsert {
    Created(String),
    AlreadyReported(String),
}

#[derive(Debug, Clone)]
pub struct ReportRow {
    pub report_id: String,
    pub reporter: UserRef,
    pub category: ReportCategoryRow,
    pub reason: String,
    pub item_type: ReportedItemType,
    pub object_id: String,
    pub status: ReportStatus,
    pub priority: u8,
    pub reviewed_by: Option<UserRef>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub action_taken: ReportAction,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ReportQuery {
    pub status: Option<ReportStatus>,
    pub priority: Option<u8>,
    pub category: Option<String>,
    pub item_type: Option<ReportedItemType>,
}

#[derive(Debug, Clone, Default)]
pub struct ReportChanges {
    pub status: Option<ReportStatus>,
    pub action_taken: Option<ReportAction>,
    pub admin_notes: Option<String>,
    pub priority: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(company: Option<&str>, full_name: &str) -> UserRef {
        UserRef {
            id: Uuid::new_v4(),
            email: "ops@example.com".into(),
            full_name: full_name.into(),
            is_verified: false,
            company_name: company.map(Into::into),
            profile_picture: None,
            badge: None,
        }
    }

    #[test]
    fn display_name_fallbacks() {
        assert_eq!(user(Some("Acme Oil"), "Jo Bloggs").display_name(), "Acme Oil");
        assert_eq!(user(Some("  "), "Jo Bloggs").display_name(), "Jo Bloggs");
        assert_eq!(user(None, "").display_name(), "ops@example.com");
    }
}
