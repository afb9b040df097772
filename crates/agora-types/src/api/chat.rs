use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::UserSummary;
use crate::models::{MessageType, PresenceStatus, ReactionAction, ReactionKind};

// -- Conversations --

#[derive(Debug, Deserialize, Validate)]
pub struct ConversationCreate {
    #[validate(length(min = 1, message = "At least one participant is required."))]
    pub participant_ids: Vec<Uuid>,
    #[validate(length(max = 255, message = "Name cannot exceed 255 characters."))]
    pub name: Option<String>,
    #[serde(default)]
    pub is_group: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ConversationRename {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters."))]
    pub name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ParticipantsRequest {
    #[validate(length(min = 1, message = "At least one participant is required."))]
    pub participant_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantResponse {
    pub user: UserSummary,
    pub status: PresenceStatus,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub conversation_id: Uuid,
    pub name: Option<String>,
    pub is_group: bool,
    pub created_by: Option<Uuid>,
    pub participants: Vec<ParticipantResponse>,
    pub last_message: Option<MessageResponse>,
    pub unread_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Messages --

#[derive(Debug, Default, Deserialize, Validate)]
pub struct MessageCreate {
    #[validate(length(max = 5000, message = "Message cannot exceed 5000 characters."))]
    pub content: Option<String>,
    pub message_type: Option<MessageType>,
    pub reply_to: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MessageEdit {
    #[validate(length(min = 1, max = 5000, message = "Message must be between 1 and 5000 characters."))]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentInfo {
    pub url: String,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub mime_type: Option<String>,
    pub is_compressed: bool,
    pub original_file_size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyPreview {
    pub message_id: Uuid,
    pub sender_name: String,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionSummary {
    pub reaction: ReactionKind,
    pub emoji: String,
    pub count: usize,
    pub user_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub sender: UserSummary,
    pub content: Option<String>,
    pub message_type: MessageType,
    pub attachment: Option<AttachmentInfo>,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub reply_to: Option<ReplyPreview>,
    pub reactions: Vec<ReactionSummary>,
    pub read_by: Vec<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub time_ago: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub message_id: Option<Uuid>,
    pub read_at: DateTime<Utc>,
}

// -- Presence & reactions --

#[derive(Debug, Deserialize)]
pub struct TypingRequest {
    #[serde(default)]
    pub is_typing: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReactionRequest {
    pub reaction: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionToggled {
    pub message_id: Uuid,
    pub reaction: ReactionKind,
    pub action: ReactionAction,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: PresenceStatus,
    pub last_seen: DateTime<Utc>,
}
