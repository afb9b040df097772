use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::chat::MessageResponse;
use crate::models::{PresenceStatus, ReactionAction, ReactionKind};

/// Events pushed to chat clients over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Connection authenticated and registered
    Ready { user_id: Uuid, display_name: String },

    MessageCreated {
        conversation_id: Uuid,
        message: Box<MessageResponse>,
    },

    MessageEdited {
        conversation_id: Uuid,
        message: Box<MessageResponse>,
    },

    /// A participant hid a message from their own view
    MessageDeleted {
        conversation_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
    },

    MessageRestored {
        conversation_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
    },

    ReadReceipt {
        conversation_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
        read_at: DateTime<Utc>,
    },

    Reaction {
        conversation_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
        reaction: ReactionKind,
        action: ReactionAction,
    },

    Typing {
        conversation_id: Uuid,
        user_id: Uuid,
        display_name: String,
        is_typing: bool,
    },

    Status {
        conversation_id: Uuid,
        user_id: Uuid,
        status: PresenceStatus,
        last_seen: DateTime<Utc>,
    },

    ParticipantsUpdated {
        conversation_id: Uuid,
        participant_ids: Vec<Uuid>,
    },

    ConversationRenamed {
        conversation_id: Uuid,
        name: String,
    },

    GroupDeleted { conversation_id: Uuid },
}

impl GatewayEvent {
    /// The conversation group this event is published to.
    /// `None` for connection-level events sent straight to one client.
    pub fn conversation_id(&self) -> Option<Uuid> {
        match self {
            Self::Ready { .. } => None,
            Self::MessageCreated { conversation_id, .. }
            | Self::MessageEdited { conversation_id, .. }
            | Self::MessageDeleted { conversation_id, .. }
            | Self::MessageRestored { conversation_id, .. }
            | Self::ReadReceipt { conversation_id, .. }
            | Self::Reaction { conversation_id, .. }
            | Self::Typing { conversation_id, .. }
            | Self::Status { conversation_id, .. }
            | Self::ParticipantsUpdated { conversation_id, .. }
            | Self::ConversationRenamed { conversation_id, .. }
            | Self::GroupDeleted { conversation_id } => Some(*conversation_id),
        }
    }

    /// Who still belongs to the conversation after a membership change.
    /// A deleted group has no members left.
    pub fn remaining_members(&self) -> Option<&[Uuid]> {
        match self {
            Self::ParticipantsUpdated { participant_ids, .. } => Some(participant_ids.as_slice()),
            Self::GroupDeleted { .. } => Some(&[][..]),
            _ => None,
        }
    }
}

/// Commands sent from client to server over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Start receiving a conversation's events; only honoured for participants
    Join { conversation_id: Uuid },

    Leave { conversation_id: Uuid },

    Typing { conversation_id: Uuid, is_typing: bool },
}

/// Name of the fan-out group for a conversation.
pub fn group_name(conversation_id: Uuid) -> String {
    format!("chat_{}", conversation_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_scoped_to_their_conversation() {
        let cid = Uuid::new_v4();
        let event = GatewayEvent::GroupDeleted { conversation_id: cid };
        assert_eq!(event.conversation_id(), Some(cid));

        let ready = GatewayEvent::Ready { user_id: Uuid::new_v4(), display_name: "a".into() };
        assert_eq!(ready.conversation_id(), None);
    }

    #[test]
    fn membership_changes_carry_remaining_members() {
        let cid = Uuid::new_v4();
        let kept = Uuid::new_v4();
        let updated = GatewayEvent::ParticipantsUpdated { conversation_id: cid, participant_ids: vec![kept] };
        assert_eq!(updated.remaining_members(), Some(&[kept][..]));

        let deleted = GatewayEvent::GroupDeleted { conversation_id: cid };
        assert_eq!(deleted.remaining_members(), Some(&[][..]));

        let renamed = GatewayEvent::ConversationRenamed { conversation_id: cid, name: "Crew".into() };
        assert_eq!(renamed.remaining_members(), None);
    }

    #[test]
    fn command_wire_format() {
        let cid = Uuid::new_v4();
        let raw = format!(r#"{{"type":"Join","data":{{"conversation_id":"{}"}}}}"#, cid);
        match serde_json::from_str::<GatewayCommand>(&raw).unwrap() {
            GatewayCommand::Join { conversation_id } => assert_eq!(conversation_id, cid),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn group_names() {
        let cid = Uuid::nil();
        assert_eq!(group_name(cid), "chat_00000000-0000-0000-0000-000000000000");
    }
}
