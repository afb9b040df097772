use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use agora_db::Database;
use agora_types::events::{GatewayCommand, GatewayEvent, group_name};
use agora_types::models::PresenceStatus;

use crate::dispatcher::{Dispatcher, Published};
use crate::presence::announce_status;

/// Server pings every 15 seconds; two unanswered pings drop the connection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const MAX_MISSED_PONGS: u8 = 2;

type Subscriptions = Arc<RwLock<HashSet<Uuid>>>;

/// Runs one chat connection. The token was validated at the HTTP upgrade, so
/// the client goes straight to Ready.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    user_id: Uuid,
    display_name: String,
) {
    let (mut sender, mut receiver) = socket.split();

    let ready = GatewayEvent::Ready {
        user_id,
        display_name: display_name.clone(),
    };
    let ready = match serde_json::to_string(&ready) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize Ready: {}", e);
            return;
        }
    };
    if sender.send(Message::Text(ready.into())).await.is_err() {
        return;
    }

    info!("{} ({}) connected to chat gateway", display_name, user_id);

    let (conn_id, first) = dispatcher.connect(user_id).await;
    if first {
        if let Err(e) = announce_status(&db, &dispatcher, user_id, PresenceStatus::Online).await {
            warn!("Failed to mark {} online: {:#}", user_id, e);
        }
    }

    let mut broadcast_rx = dispatcher.subscribe();
    let subscriptions: Subscriptions = Arc::new(RwLock::new(HashSet::new()));
    let send_subscriptions = subscriptions.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_pongs: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let published = match result {
                        Ok(published) => published,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if !forward(&send_subscriptions, user_id, &published).await {
                        continue;
                    }

                    if sender.send(Message::Text(published.json.to_string().into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_pongs = 0;
                    } else {
                        missed_pongs += 1;
                        if missed_pongs >= MAX_MISSED_PONGS {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_pongs);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let recv_dispatcher = dispatcher.clone();
    let recv_db = db.clone();
    let recv_name = display_name.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&recv_dispatcher, &recv_db, user_id, &recv_name, cmd, &subscriptions)
                            .await;
                    }
                    Err(e) => {
                        let raw: String = text.chars().take(200).collect();
                        warn!("{} ({}) bad command: {} -- raw: {}", recv_name, user_id, e, raw);
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    if dispatcher.disconnect(user_id, conn_id).await {
        if let Err(e) = announce_status(&db, &dispatcher, user_id, PresenceStatus::Offline).await {
            warn!("Failed to mark {} offline: {:#}", user_id, e);
        }
    }
    info!("{} ({}) disconnected from chat gateway", display_name, user_id);
}

/// True when this connection joined the event's group. A membership change
/// that leaves the user out is still delivered, then ends the subscription.
async fn forward(subscriptions: &Subscriptions, user_id: Uuid, published: &Published) -> bool {
    let cid = published.conversation_id;
    if !subscriptions.read().await.contains(&cid) {
        return false;
    }
    if let Some(members) = &published.members {
        if !members.contains(&user_id) {
            subscriptions.write().await.remove(&cid);
            debug!("{} no longer in {}, unsubscribed", user_id, group_name(cid));
        }
    }
    true
}

async fn handle_command(
    dispatcher: &Dispatcher,
    db: &Arc<Database>,
    user_id: Uuid,
    display_name: &str,
    cmd: GatewayCommand,
    subscriptions: &Subscriptions,
) {
    match cmd {
        GatewayCommand::Join { conversation_id } => {
            let check = db.clone();
            let allowed = tokio::task::spawn_blocking(move || check.is_participant(conversation_id, user_id)).await;
            match allowed {
                Ok(Ok(true)) => {
                    subscriptions.write().await.insert(conversation_id);
                    debug!("{} joined {}", user_id, group_name(conversation_id));
                }
                Ok(Ok(false)) => {
                    warn!("{} tried to join {} without being a participant", user_id, conversation_id);
                }
                Ok(Err(e)) => warn!("Participant check failed: {}", e),
                Err(e) => warn!("Participant check panicked: {}", e),
            }
        }
        GatewayCommand::Leave { conversation_id } => {
            subscriptions.write().await.remove(&conversation_id);
            debug!("{} left {}", user_id, group_name(conversation_id));
        }
        GatewayCommand::Typing {
            conversation_id,
            is_typing,
        } => {
            if !subscriptions.read().await.contains(&conversation_id) {
                return;
            }

            let store = db.clone();
            let typing_in = is_typing.then_some(conversation_id);
            match tokio::task::spawn_blocking(move || store.set_typing(user_id, typing_in)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Failed to store typing state: {}", e),
                Err(e) => warn!("Typing update panicked: {}", e),
            }

            dispatcher.publish(&GatewayEvent::Typing {
                conversation_id,
                user_id,
                display_name: display_name.to_string(),
                is_typing,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_db::models::{NewAccount, NewConversation};

    fn account(db: &Database, email: &str) -> Uuid {
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
        id
    }

    fn setup() -> (Arc<Database>, Uuid, Uuid, Uuid) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let a = account(&db, "a@example.com");
        let b = account(&db, "b@example.com");
        let outsider = account(&db, "c@example.com");
        let cid = Uuid::new_v4();
        db.create_conversation(&NewConversation {
            conversation_id: cid,
            name: None,
            is_group: false,
            created_by: a,
            encryption_key: "k".into(),
            participants: vec![a, b],
        })
        .unwrap();
        (db, a, outsider, cid)
    }

    #[tokio::test]
    async fn join_requires_participation() {
        let (db, member, outsider, cid) = setup();
        let dispatcher = Dispatcher::new();

        let subs: Subscriptions = Arc::default();
        let join = GatewayCommand::Join { conversation_id: cid };
        handle_command(&dispatcher, &db, outsider, "c", join.clone(), &subs).await;
        assert!(subs.read().await.is_empty());

        handle_command(&dispatcher, &db, member, "a", join, &subs).await;
        assert!(subs.read().await.contains(&cid));

        handle_command(&dispatcher, &db, member, "a", GatewayCommand::Leave { conversation_id: cid }, &subs).await;
        assert!(subs.read().await.is_empty());
    }

    #[tokio::test]
    async fn removed_member_stops_receiving_group_events() {
        let (db, member, _, cid) = setup();
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        let subs: Subscriptions = Arc::default();
        handle_command(&dispatcher, &db, member, "a", GatewayCommand::Join { conversation_id: cid }, &subs).await;

        let renamed = GatewayEvent::ConversationRenamed { conversation_id: cid, name: "Crew".into() };
        dispatcher.publish(&renamed);
        assert!(forward(&subs, member, &rx.recv().await.unwrap()).await);

        let kept = Uuid::new_v4();
        dispatcher.publish(&GatewayEvent::ParticipantsUpdated { conversation_id: cid, participant_ids: vec![kept] });
        assert!(forward(&subs, member, &rx.recv().await.unwrap()).await);
        assert!(!subs.read().await.contains(&cid));

        dispatcher.publish(&renamed);
        assert!(!forward(&subs, member, &rx.recv().await.unwrap()).await);
    }

    #[tokio::test]
    async fn remaining_members_keep_their_subscription() {
        let (_db, member, _, cid) = setup();
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        let subs: Subscriptions = Arc::default();
        subs.write().await.insert(cid);

        dispatcher.publish(&GatewayEvent::ParticipantsUpdated { conversation_id: cid, participant_ids: vec![member] });
        assert!(forward(&subs, member, &rx.recv().await.unwrap()).await);
        assert!(subs.read().await.contains(&cid));

        dispatcher.publish(&GatewayEvent::GroupDeleted { conversation_id: cid });
        assert!(forward(&subs, member, &rx.recv().await.unwrap()).await);
        assert!(subs.read().await.is_empty());
    }

    #[tokio::test]
    async fn typing_is_stored_and_published_for_joined_groups() {
        let (db, member, _, cid) = setup();
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        let subs: Subscriptions = Arc::default();

        let typing = GatewayCommand::Typing { conversation_id: cid, is_typing: true };
        handle_command(&dispatcher, &db, member, "a", typing.clone(), &subs).await;
        assert!(rx.try_recv().is_err());

        subs.write().await.insert(cid);
        handle_command(&dispatcher, &db, member, "a", typing, &subs).await;
        let published = rx.recv().await.unwrap();
        assert_eq!(published.conversation_id, cid);
        assert!(published.json.contains("\"is_typing\":true"));

        let status = db.user_status(member).unwrap().unwrap();
        assert_eq!(status.typing_in, Some(cid));
    }
}
