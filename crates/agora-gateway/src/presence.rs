use std::sync::Arc;

use anyhow::Result;
use uuid::Uuid;

use agora_db::Database;
use agora_db::models::UserStatusRow;
use agora_types::events::GatewayEvent;
use agora_types::models::PresenceStatus;

use crate::dispatcher::Dispatcher;

/// Stores the user's presence and announces it in every conversation the
/// user still sees.
pub async fn announce_status(
    db: &Arc<Database>,
    dispatcher: &Dispatcher,
    user_id: Uuid,
    status: PresenceStatus,
) -> Result<UserStatusRow> {
    let db = db.clone();
    let (row, conversations) = tokio::task::spawn_blocking(move || {
        let row = db.set_status(user_id, status)?;
        let conversations = db.visible_conversation_ids(user_id)?;
        Ok::<_, agora_db::DbError>((row, conversations))
    })
    .await??;

    for conversation_id in conversations {
        dispatcher.publish(&GatewayEvent::Status {
            conversation_id,
            user_id,
            status: row.status,
            last_seen: row.last_seen,
        });
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_db::models::{NewAccount, NewConversation};

    #[tokio::test]
    async fn status_is_stored_and_published_per_conversation() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let mut users = Vec::new();
        for email in ["a@example.com", "b@example.com"] {
            let id = Uuid::new_v4();
            db.create_account(&NewAccount {
                id,
                profile_id: Uuid::new_v4(),
                email: email.into(),
                full_name: email.into(),
                password_hash: "x".into(),
                is_staff: false,
            })
            .unwrap();
            users.push(id);
        }
        let cid = Uuid::new_v4();
        db.create_conversation(&NewConversation {
            conversation_id: cid,
            name: None,
            is_group: false,
            created_by: users[0],
            encryption_key: "k".into(),
            participants: users.clone(),
        })
        .unwrap();

        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        let row = announce_status(&db, &dispatcher, users[0], PresenceStatus::Away).await.unwrap();
        assert_eq!(row.status, PresenceStatus::Away);

        let published = rx.recv().await.unwrap();
        assert_eq!(published.conversation_id, cid);
        assert!(published.json.contains("\"away\""));
    }
}
