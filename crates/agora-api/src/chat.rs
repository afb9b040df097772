//! Private and group conversations. Message text is sealed with the
//! conversation key before it is stored; every change is pushed to the
//! conversation's gateway group.

use std::collections::HashMap;

use axum::{
    Extension, Json, Router,
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::header,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use agora_crypto::{generate_conversation_key, key_to_base64, open_or_raw, seal};
use agora_db::Database;
use agora_db::models::{
    Attachment, ConversationRow, MessageRow, NewConversation, NewMessage, ParticipantRow,
    ReactionRow, ReadRow,
};
use agora_gateway::presence::announce_status;
use agora_media::{FileKind, check_size, is_message_attachment, process_upload};
use agora_types::api::chat::{
    AttachmentInfo, ConversationCreate, ConversationRename, ConversationResponse, MessageCreate,
    MessageEdit, MessageResponse, ParticipantResponse, ParticipantsRequest, ReactionRequest,
    ReactionSummary, ReactionToggled, ReadReceipt, ReplyPreview, StatusRequest, StatusResponse,
    TypingRequest,
};
use agora_types::api::{Claims, Page, PageQuery};
use agora_types::events::GatewayEvent;
use agora_types::models::{MessageType, PresenceStatus, ReactionAction, ReactionKind};
use agora_types::time::time_ago;
use validator::Validate;

use crate::convert::user_summary;
use crate::error::{ApiError, ApiResult};
use crate::extract::ValidJson;
use crate::middleware::require_auth;
use crate::response::{created, created_or_ok, ok, ok_with};
use crate::state::AppState;
use crate::upload::Form;

const MESSAGE_PAGE_SIZE: u32 = 50;

/// `/api/v1.1`, every route authenticated.
pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/conversations", get(list_conversations).post(create_conversation))
        .route(
            "/conversations/{conversation_id}",
            get(conversation_detail).patch(rename).delete(hide_conversation),
        )
        .route("/conversations/with-user/{acc_id}", get(with_user))
        .route("/conversations/{conversation_id}/delete", delete(hide_conversation))
        .route("/conversations/{conversation_id}/restore", post(restore_conversation))
        .route("/conversations/{conversation_id}/messages", get(list_messages).post(send_message))
        .route("/conversations/{conversation_id}/mark-read", post(mark_read))
        .route("/conversations/{conversation_id}/typing", post(typing))
        .route("/conversations/{conversation_id}/group/delete", delete(delete_group))
        .route("/conversations/{conversation_id}/participants", get(participants))
        .route("/conversations/{conversation_id}/participants/add", post(add_participants))
        .route("/conversations/{conversation_id}/participants/remove", post(remove_participants))
        .route("/conversations/{conversation_id}/update-name", post(rename))
        .route("/messages/{message_id}", get(message_detail).patch(edit_message))
        .route("/messages/{message_id}/delete", delete(hide_message))
        .route("/messages/{message_id}/restore", post(restore_message))
        .route("/messages/{message_id}/react", post(react))
        .route("/status", post(set_status))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
}

// -- Lookups --

/// The conversation, when `user` takes part in it. Others get a 404.
fn member_conversation(db: &Database, conversation_id: Uuid, user: Uuid) -> ApiResult<ConversationRow> {
    match db.conversation(conversation_id)? {
        Some(c) if db.is_participant(conversation_id, user)? => Ok(c),
        _ => Err(ApiError::not_found("Conversation not found.")),
    }
}

/// A message in a conversation `user` takes part in.
fn member_message(db: &Database, message_id: Uuid, user: Uuid) -> ApiResult<(MessageRow, ConversationRow)> {
    let message = db
        .message(message_id)?
        .ok_or_else(|| ApiError::not_found("Message not found."))?;
    let conversation = member_conversation(db, message.conversation_id, user)
        .map_err(|_| ApiError::not_found("Message not found."))?;
    Ok((message, conversation))
}

fn require_accounts(db: &Database, ids: &[Uuid]) -> ApiResult<()> {
    for id in ids {
        if db.account_by_id(*id)?.is_none() {
            return Err(ApiError::Validation(format!("User {} does not exist.", id)));
        }
    }
    Ok(())
}

// -- Wire shapes --

/// Everything needed to render a batch of messages.
struct MessageContext {
    key: String,
    reactions: Vec<ReactionRow>,
    reads: Vec<ReadRow>,
    replies: HashMap<Uuid, MessageRow>,
}

impl MessageContext {
    fn load(db: &Database, key: &str, messages: &[MessageRow]) -> ApiResult<Self> {
        let ids: Vec<Uuid> = messages.iter().map(|m| m.message_id).collect();
        let mut replies = HashMap::new();
        for reply_to in messages.iter().filter_map(|m| m.reply_to) {
            if let Some(original) = db.message(reply_to)? {
                replies.insert(reply_to, original);
            }
        }
        Ok(Self {
            key: key.to_string(),
            reactions: db.reactions_for(&ids)?,
            reads: db.read_receipts(&ids)?,
            replies,
        })
    }

    fn open(&self, sealed: &Option<String>) -> Option<String> {
        sealed.as_deref().map(|s| open_or_raw(&self.key, s))
    }

    fn render(&self, row: &MessageRow, state: &AppState, now: DateTime<Utc>) -> MessageResponse {
        let reactions = ReactionKind::ALL
            .iter()
            .filter_map(|kind| {
                let user_ids: Vec<Uuid> = self
                    .reactions
                    .iter()
                    .filter(|r| r.message_id == row.message_id && r.reaction == *kind)
                    .map(|r| r.user_id)
                    .collect();
                (!user_ids.is_empty()).then(|| ReactionSummary {
                    reaction: *kind,
                    emoji: kind.emoji().to_string(),
                    count: user_ids.len(),
                    user_ids,
                })
            })
            .collect();

        MessageResponse {
            message_id: row.message_id,
            conversation_id: row.conversation_id,
            sender: user_summary(&row.sender, &state.storage),
            content: self.open(&row.content),
            message_type: row.message_type,
            attachment: row.attachment.as_ref().map(|a| attachment_info(a, state)),
            is_edited: row.is_edited,
            edited_at: row.edited_at,
            reply_to: row.reply_to.and_then(|id| self.replies.get(&id)).map(|original| ReplyPreview {
                message_id: original.message_id,
                sender_name: original.sender.display_name(),
                content: self.open(&original.content),
            }),
            reactions,
            read_by: self
                .reads
                .iter()
                .filter(|r| r.message_id == row.message_id)
                .map(|r| r.user_id)
                .collect(),
            timestamp: row.timestamp,
            time_ago: time_ago(row.timestamp, now),
        }
    }
}

fn attachment_info(a: &Attachment, state: &AppState) -> AttachmentInfo {
    AttachmentInfo {
        url: state.storage.url(&a.path),
        file_name: Some(a.file_name.clone()),
        file_size: Some(a.file_size),
        mime_type: Some(a.mime_type.clone()),
        is_compressed: a.is_compressed,
        original_file_size: Some(a.original_file_size),
    }
}

fn participant_response(row: &ParticipantRow, state: &AppState) -> ParticipantResponse {
    ParticipantResponse {
        user: user_summary(&row.user, &state.storage),
        status: row.status,
        last_seen: row.last_seen,
    }
}

struct ConversationView {
    row: ConversationRow,
    participants: Vec<ParticipantRow>,
    last_message: Option<(MessageRow, MessageContext)>,
    unread_count: u64,
}

fn load_view(db: &Database, row: ConversationRow, viewer: Uuid) -> ApiResult<ConversationView> {
    let participants = db.participants(row.conversation_id)?;
    let last_message = match db.last_visible_message(row.conversation_id, viewer)? {
        Some(message) => {
            let context = MessageContext::load(db, &row.encryption_key, std::slice::from_ref(&message))?;
            Some((message, context))
        }
        None => None,
    };
    let unread_count = db.unread_count(row.conversation_id, viewer)?;
    Ok(ConversationView {
        row,
        participants,
        last_message,
        unread_count,
    })
}

fn render_view(view: &ConversationView, state: &AppState, now: DateTime<Utc>) -> ConversationResponse {
    ConversationResponse {
        conversation_id: view.row.conversation_id,
        name: view.row.name.clone(),
        is_group: view.row.is_group,
        created_by: view.row.created_by,
        participants: view.participants.iter().map(|p| participant_response(p, state)).collect(),
        last_message: view
            .last_message
            .as_ref()
            .map(|(message, context)| context.render(message, state, now)),
        unread_count: view.unread_count,
        created_at: view.row.created_at,
        updated_at: view.row.updated_at,
    }
}

fn message_type_for(kind: FileKind) -> MessageType {
    match kind {
        FileKind::Image => MessageType::Image,
        FileKind::Video => MessageType::Video,
        FileKind::Audio => MessageType::Audio,
        FileKind::File => MessageType::File,
        FileKind::Document => MessageType::Document,
    }
}

// -- Conversations --

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    let views = state
        .blocking(move |db| {
            db.conversations_for(me)?
                .into_iter()
                .map(|row| load_view(db, row, me))
                .collect::<ApiResult<Vec<_>>>()
        })
        .await?;
    let now = Utc::now();
    Ok(ok(views.iter().map(|v| render_view(v, &state, now)).collect::<Vec<_>>()))
}

/// Returns the conversation and whether it was newly created.
fn open_conversation(
    db: &Database,
    me: Uuid,
    others: Vec<Uuid>,
    name: Option<String>,
    is_group: bool,
) -> ApiResult<(ConversationView, bool)> {
    if others.is_empty() {
        return Err(ApiError::Validation("Cannot start a conversation with yourself.".into()));
    }
    require_accounts(db, &others)?;

    if !is_group && others.len() == 1 {
        if let Some(existing) = db.find_direct_conversation(me, others[0])? {
            let row = member_conversation(db, existing, me)?;
            return Ok((load_view(db, row, me)?, false));
        }
    }

    let conversation_id = Uuid::new_v4();
    let mut participants = vec![me];
    participants.extend(others);
    db.create_conversation(&NewConversation {
        conversation_id,
        name,
        is_group,
        created_by: me,
        encryption_key: key_to_base64(&generate_conversation_key()),
        participants,
    })?;
    let row = member_conversation(db, conversation_id, me)?;
    Ok((load_view(db, row, me)?, true))
}

pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ValidJson(body): ValidJson<ConversationCreate>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    let mut others: Vec<Uuid> = Vec::new();
    for id in body.participant_ids {
        if id != me && !others.contains(&id) {
            others.push(id);
        }
    }
    let is_group = body.is_group || others.len() > 1;
    let name = body.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());

    let (view, created_new) = state
        .blocking(move |db| open_conversation(db, me, others, name, is_group))
        .await?;
    if created_new {
        info!("{} started conversation {}", claims.email, view.row.conversation_id);
    }
    let message = if created_new {
        "Conversation created successfully."
    } else {
        "Conversation already exists."
    };
    Ok(created_or_ok(created_new, render_view(&view, &state, Utc::now()), message))
}

pub async fn with_user(
    State(state): State<AppState>,
    Path(acc_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    if acc_id == me {
        return Err(ApiError::bad_request("Cannot start a conversation with yourself."));
    }
    let (view, created_new) = state
        .blocking(move |db| {
            if db.account_by_id(acc_id)?.is_none() {
                return Err(ApiError::not_found("User not found."));
            }
            open_conversation(db, me, vec![acc_id], None, false)
        })
        .await?;
    Ok(created_or_ok(created_new, render_view(&view, &state, Utc::now()), "Conversation ready."))
}

pub async fn conversation_detail(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    let view = state
        .blocking(move |db| {
            let row = member_conversation(db, conversation_id, me)?;
            load_view(db, row, me)
        })
        .await?;
    Ok(ok(render_view(&view, &state, Utc::now())))
}

pub async fn rename(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    ValidJson(body): ValidJson<ConversationRename>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    let name = body.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::Validation("Name cannot be blank.".into()));
    }
    let stored = name.clone();
    let view = state
        .blocking(move |db| {
            member_conversation(db, conversation_id, me)?;
            db.rename_conversation(conversation_id, Some(&stored))?;
            let row = member_conversation(db, conversation_id, me)?;
            load_view(db, row, me)
        })
        .await?;

    state
        .dispatcher
        .publish(&GatewayEvent::ConversationRenamed { conversation_id, name });
    Ok(ok_with(render_view(&view, &state, Utc::now()), "Conversation renamed successfully."))
}

pub async fn hide_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    let hidden = state
        .blocking(move |db| {
            member_conversation(db, conversation_id, me)?;
            Ok(db.hide_conversation(conversation_id, me)?)
        })
        .await?;
    let message = if hidden {
        "Conversation deleted successfully."
    } else {
        "Conversation already deleted."
    };
    Ok(ok_with(serde_json::Value::Null, message))
}

pub async fn restore_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    let view = state
        .blocking(move |db| {
            let row = member_conversation(db, conversation_id, me)?;
            if !db.unhide_conversation(conversation_id, me)? {
                return Err(ApiError::bad_request("Conversation is not deleted."));
            }
            load_view(db, row, me)
        })
        .await?;
    Ok(ok_with(render_view(&view, &state, Utc::now()), "Conversation restored successfully."))
}

// -- Group management --

pub async fn delete_group(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    state
        .blocking(move |db| {
            let row = member_conversation(db, conversation_id, me)?;
            if !row.is_group {
                return Err(ApiError::bad_request("Only group conversations can be deleted for everyone."));
            }
            if row.created_by != Some(me) {
                return Err(ApiError::forbidden("Only the group creator can delete the group."));
            }
            Ok(db.delete_conversation(conversation_id)?)
        })
        .await?;

    info!("{} deleted group {}", claims.email, conversation_id);
    state.dispatcher.publish(&GatewayEvent::GroupDeleted { conversation_id });
    Ok(ok_with(serde_json::Value::Null, "Group deleted successfully."))
}

pub async fn participants(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    let rows = state
        .blocking(move |db| {
            member_conversation(db, conversation_id, me)?;
            Ok(db.participants(conversation_id)?)
        })
        .await?;
    Ok(ok(rows.iter().map(|p| participant_response(p, &state)).collect::<Vec<_>>()))
}

pub async fn add_participants(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    ValidJson(body): ValidJson<ParticipantsRequest>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    let (added, rows) = state
        .blocking(move |db| {
            let row = member_conversation(db, conversation_id, me)?;
            if !row.is_group {
                return Err(ApiError::bad_request("Participants can only be added to group conversations."));
            }
            require_accounts(db, &body.participant_ids)?;
            let added = db.add_participants(conversation_id, &body.participant_ids)?;
            Ok((added, db.participants(conversation_id)?))
        })
        .await?;

    if !added.is_empty() {
        state.dispatcher.publish(&GatewayEvent::ParticipantsUpdated {
            conversation_id,
            participant_ids: rows.iter().map(|p| p.user.id).collect(),
        });
    }
    Ok(ok_with(
        rows.iter().map(|p| participant_response(p, &state)).collect::<Vec<_>>(),
        format!("{} participant(s) added.", added.len()),
    ))
}

pub async fn remove_participants(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    ValidJson(body): ValidJson<ParticipantsRequest>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    let (removed, rows) = state
        .blocking(move |db| {
            let row = member_conversation(db, conversation_id, me)?;
            if !row.is_group {
                return Err(ApiError::bad_request(
                    "Participants can only be removed from group conversations.",
                ));
            }
            // Members may leave; only the creator removes others.
            let removing_others = body.participant_ids.iter().any(|id| *id != me);
            if removing_others && row.created_by != Some(me) {
                return Err(ApiError::forbidden("Only the group creator can remove other participants."));
            }
            let removed = db.remove_participants(conversation_id, &body.participant_ids)?;
            Ok((removed, db.participants(conversation_id)?))
        })
        .await?;

    if !removed.is_empty() {
        state.dispatcher.publish(&GatewayEvent::ParticipantsUpdated {
            conversation_id,
            participant_ids: rows.iter().map(|p| p.user.id).collect(),
        });
    }
    Ok(ok_with(
        rows.iter().map(|p| participant_response(p, &state)).collect::<Vec<_>>(),
        format!("{} participant(s) removed.", removed.len()),
    ))
}

// -- Messages --

pub async fn list_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Query(page): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    let (limit, offset) = page.window(MESSAGE_PAGE_SIZE);
    let (rows, total, context) = state
        .blocking(move |db| {
            let conversation = member_conversation(db, conversation_id, me)?;
            let (rows, total) = db.messages_for(conversation_id, me, limit, offset)?;
            let context = MessageContext::load(db, &conversation.encryption_key, &rows)?;
            Ok((rows, total, context))
        })
        .await?;

    let now = Utc::now();
    let results = rows.iter().map(|m| context.render(m, &state, now)).collect();
    Ok(ok(Page::new(results, total, page.page(), limit)))
}

/// A message body, sent either as JSON or as multipart with an `attachment`.
pub struct MessageInput {
    pub body: MessageCreate,
    pub attachment: Option<(String, Vec<u8>)>,
}

impl FromRequest<AppState> for MessageInput {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("multipart/form-data"));

        if !is_multipart {
            let ValidJson(body) = ValidJson::<MessageCreate>::from_request(req, state).await?;
            return Ok(MessageInput { body, attachment: None });
        }

        let multipart = Multipart::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        let form = Form::read(multipart).await?;
        let message_type = form
            .text("message_type")
            .map(|t| t.parse::<MessageType>())
            .transpose()
            .map_err(|e| ApiError::Validation(e.to_string()))?;
        let reply_to = form
            .text("reply_to")
            .map(|r| r.parse::<Uuid>())
            .transpose()
            .map_err(|_| ApiError::Validation("reply_to must be a message id.".into()))?;
        let body = MessageCreate {
            content: form.text("content"),
            message_type,
            reply_to,
        };
        body.validate()?;
        let attachment = form
            .file("attachment")
            .map(|f| (f.file_name.clone(), f.bytes.to_vec()));
        Ok(MessageInput { body, attachment })
    }
}

/// Checks, compresses and stores an attachment.
async fn store_attachment(state: &AppState, file_name: String, bytes: Vec<u8>) -> ApiResult<(FileKind, Attachment)> {
    if !is_message_attachment(&file_name) {
        return Err(agora_media::MediaError::Unsupported(file_name).into());
    }
    let kind = agora_media::classify(&file_name);
    let original_size = bytes.len() as u64;
    check_size(kind, original_size)?;

    let processed = process_upload(kind, bytes, &file_name, &state.config.compression).await;
    let path = state
        .storage
        .save("chat_attachments", &processed.file_name, &processed.bytes)
        .await?;
    Ok((
        kind,
        Attachment {
            path,
            file_name: processed.file_name,
            file_size: processed.bytes.len() as u64,
            mime_type: processed.mime_type,
            is_compressed: processed.compressed,
            original_file_size: original_size,
        },
    ))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    input: MessageInput,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    let MessageInput { body, attachment } = input;
    let content = body.content.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
    if content.is_none() && attachment.is_none() {
        return Err(ApiError::Validation("Message must have content or an attachment.".into()));
    }

    let reply_to = body.reply_to;
    let conversation = state
        .blocking(move |db| {
            let conversation = member_conversation(db, conversation_id, me)?;
            if let Some(reply_to) = reply_to {
                let original = db.message(reply_to)?;
                if original.is_none_or(|m| m.conversation_id != conversation_id) {
                    return Err(ApiError::Validation("Replied message is not in this conversation.".into()));
                }
            }
            Ok(conversation)
        })
        .await?;

    let (message_type, attachment) = match attachment {
        Some((file_name, bytes)) => {
            let (kind, stored) = store_attachment(&state, file_name, bytes).await?;
            (message_type_for(kind), Some(stored))
        }
        None => (body.message_type.unwrap_or(MessageType::Text), None),
    };

    let key = conversation.encryption_key.clone();
    let sealed = content
        .as_deref()
        .map(|text| seal(&key, text))
        .transpose()
        .map_err(anyhow::Error::from)?;

    let stored_path = attachment.as_ref().map(|a| a.path.clone());
    let result = state
        .blocking(move |db| {
            let row = db.insert_message(&NewMessage {
                message_id: Uuid::new_v4(),
                conversation_id,
                sender_id: me,
                content: sealed,
                message_type,
                attachment,
                reply_to,
            })?;
            let context = MessageContext::load(db, &key, std::slice::from_ref(&row))?;
            Ok((row, context))
        })
        .await;
    let (row, context) = match result {
        Ok(stored) => stored,
        Err(e) => {
            if let Some(path) = stored_path {
                if let Err(cleanup) = state.storage.delete(&path).await {
                    warn!("Failed to delete orphaned attachment {}: {}", path, cleanup);
                }
            }
            return Err(e);
        }
    };

    let message = context.render(&row, &state, Utc::now());
    state.dispatcher.publish(&GatewayEvent::MessageCreated {
        conversation_id,
        message: Box::new(message.clone()),
    });
    Ok(created(message, "Message sent successfully."))
}

pub async fn message_detail(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    let (row, context) = state
        .blocking(move |db| {
            let (row, conversation) = member_message(db, message_id, me)?;
            if row.sender.id != me {
                return Err(ApiError::forbidden("You can only view your own messages here."));
            }
            let context = MessageContext::load(db, &conversation.encryption_key, std::slice::from_ref(&row))?;
            Ok((row, context))
        })
        .await?;
    Ok(ok(context.render(&row, &state, Utc::now())))
}

pub async fn edit_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    ValidJson(body): ValidJson<MessageEdit>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    let content = body.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::Validation("Message cannot be blank.".into()));
    }
    let (row, context) = state
        .blocking(move |db| {
            let (row, conversation) = member_message(db, message_id, me)?;
            if row.sender.id != me {
                return Err(ApiError::forbidden("You can only edit your own messages."));
            }
            let sealed = seal(&conversation.encryption_key, &content).map_err(anyhow::Error::from)?;
            let row = db
                .edit_message(message_id, &sealed)?
                .ok_or_else(|| ApiError::not_found("Message not found."))?;
            let context = MessageContext::load(db, &conversation.encryption_key, std::slice::from_ref(&row))?;
            Ok((row, context))
        })
        .await?;

    let message = context.render(&row, &state, Utc::now());
    state.dispatcher.publish(&GatewayEvent::MessageEdited {
        conversation_id: row.conversation_id,
        message: Box::new(message.clone()),
    });
    Ok(ok_with(message, "Message updated successfully."))
}

pub async fn hide_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    let (conversation_id, hidden) = state
        .blocking(move |db| {
            let (row, _) = member_message(db, message_id, me)?;
            Ok((row.conversation_id, db.hide_message(message_id, me)?))
        })
        .await?;

    if !hidden {
        return Ok(ok_with(serde_json::Value::Null, "Message already deleted."));
    }
    state.dispatcher.publish(&GatewayEvent::MessageDeleted {
        conversation_id,
        message_id,
        user_id: me,
    });
    Ok(ok_with(serde_json::Value::Null, "Message deleted successfully."))
}

pub async fn restore_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    let conversation_id = state
        .blocking(move |db| {
            let (row, _) = member_message(db, message_id, me)?;
            if !db.unhide_message(message_id, me)? {
                return Err(ApiError::bad_request("Message is not deleted."));
            }
            Ok(row.conversation_id)
        })
        .await?;

    state.dispatcher.publish(&GatewayEvent::MessageRestored {
        conversation_id,
        message_id,
        user_id: me,
    });
    Ok(ok_with(serde_json::Value::Null, "Message restored successfully."))
}

// -- Receipts, typing, reactions, presence --

pub async fn mark_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    let receipt = state
        .blocking(move |db| {
            member_conversation(db, conversation_id, me)?;
            match db.last_visible_message(conversation_id, me)? {
                Some(latest) => Ok(ReadReceipt {
                    message_id: Some(latest.message_id),
                    read_at: db.mark_read(latest.message_id, me)?,
                }),
                None => Ok(ReadReceipt {
                    message_id: None,
                    read_at: Utc::now(),
                }),
            }
        })
        .await?;

    if let Some(message_id) = receipt.message_id {
        state.dispatcher.publish(&GatewayEvent::ReadReceipt {
            conversation_id,
            message_id,
            user_id: me,
            read_at: receipt.read_at,
        });
    }
    Ok(ok_with(receipt, "Messages marked as read."))
}

pub async fn typing(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<TypingRequest>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    let is_typing = body.is_typing;
    let display_name = state
        .blocking(move |db| {
            member_conversation(db, conversation_id, me)?;
            db.set_typing(me, is_typing.then_some(conversation_id))?;
            Ok(db.user_ref(me)?.map(|u| u.display_name()).unwrap_or_default())
        })
        .await?;

    state.dispatcher.publish(&GatewayEvent::Typing {
        conversation_id,
        user_id: me,
        display_name,
        is_typing,
    });
    Ok(ok(serde_json::json!({ "is_typing": is_typing })))
}

pub async fn react(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<ReactionRequest>,
) -> ApiResult<impl IntoResponse> {
    let reaction: ReactionKind = body.reaction.parse().map_err(|_| {
        let allowed: Vec<&str> = ReactionKind::ALL.iter().map(|r| r.as_str()).collect();
        ApiError::bad_request(format!("Invalid reaction. Choose one of: {}.", allowed.join(", ")))
    })?;

    let me = claims.sub;
    let (conversation_id, added) = state
        .blocking(move |db| {
            let (row, _) = member_message(db, message_id, me)?;
            Ok((row.conversation_id, db.toggle_message_reaction(message_id, me, reaction)?))
        })
        .await?;

    let action = if added { ReactionAction::Added } else { ReactionAction::Removed };
    state.dispatcher.publish(&GatewayEvent::Reaction {
        conversation_id,
        message_id,
        user_id: me,
        reaction,
        action,
    });
    Ok(ok(ReactionToggled {
        message_id,
        reaction,
        action,
    }))
}

pub async fn set_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<StatusRequest>,
) -> ApiResult<impl IntoResponse> {
    let status: PresenceStatus = body
        .status
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid status. Choose one of: online, away, busy, offline."))?;
    let row = announce_status(&state.db, &state.dispatcher, claims.sub, status).await?;
    Ok(ok_with(
        StatusResponse {
            status: row.status,
            last_seen: row.last_seen,
        },
        "Status updated successfully.",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_kinds_map_to_message_types() {
        assert_eq!(message_type_for(FileKind::Image), MessageType::Image);
        assert_eq!(message_type_for(FileKind::Video), MessageType::Video);
        assert_eq!(message_type_for(FileKind::File), MessageType::File);
        assert_eq!(message_type_for(FileKind::Document), MessageType::Document);
    }
}
