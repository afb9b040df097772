use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tracing::{error, trace};
use uuid::Uuid;

use agora_types::events::{GatewayEvent, group_name};

/// An event already serialized for the wire, tagged with its conversation group.
#[derive(Debug, Clone)]
pub struct Published {
    pub conversation_id: Uuid,
    pub json: Arc<str>,
    /// Set on membership changes: the users still in the conversation.
    pub members: Option<Arc<[Uuid]>>,
}

/// Fans events out to every connection that joined the event's conversation.
/// Delivery is best effort: nothing is acknowledged, stored or replayed.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    broadcast_tx: broadcast::Sender<Published>,

    /// Live connections per user: user_id -> conn_ids
    connections: RwLock<HashMap<Uuid, HashSet<Uuid>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Published> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Publishes to the event's conversation group. Events without a
    /// conversation are connection-level and never published.
    pub fn publish(&self, event: &GatewayEvent) {
        let Some(conversation_id) = event.conversation_id() else {
            return;
        };
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize gateway event: {}", e);
                return;
            }
        };
        trace!("Publishing to {}", group_name(conversation_id));
        // No receivers just means nobody is listening.
        let _ = self.inner.broadcast_tx.send(Published {
            conversation_id,
            json: json.into(),
            members: event.remaining_members().map(Arc::from),
        });
    }

    /// Registers a connection. Returns (conn_id, first) where `first` is true
    /// when the user had no other live connection.
    pub async fn connect(&self, user_id: Uuid) -> (Uuid, bool) {
        let conn_id = Uuid::new_v4();
        let mut connections = self.inner.connections.write().await;
        let conns = connections.entry(user_id).or_default();
        let first = conns.is_empty();
        conns.insert(conn_id);
        (conn_id, first)
    }

    /// Drops a connection. Returns true when it was the user's last one.
    pub async fn disconnect(&self, user_id: Uuid, conn_id: Uuid) -> bool {
        let mut connections = self.inner.connections.write().await;
        let Some(conns) = connections.get_mut(&user_id) else {
            return false;
        };
        if !conns.remove(&conn_id) {
            return false;
        }
        if conns.is_empty() {
            connections.remove(&user_id);
            return true;
        }
        false
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.connections.read().await.contains_key(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscribers_tagged_by_conversation() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        let cid = Uuid::new_v4();

        dispatcher.publish(&GatewayEvent::GroupDeleted { conversation_id: cid });
        let got = rx.recv().await.unwrap();
        assert_eq!(got.conversation_id, cid);
        assert!(got.json.contains("GroupDeleted"));
        assert_eq!(got.members.as_deref(), Some(&[][..]));
    }

    #[tokio::test]
    async fn connection_level_events_are_not_published() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        dispatcher.publish(&GatewayEvent::Ready {
            user_id: Uuid::new_v4(),
            display_name: "x".into(),
        });
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn online_until_last_connection_closes() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (first, is_first) = dispatcher.connect(user).await;
        let (second, again) = dispatcher.connect(user).await;
        assert!(is_first);
        assert!(!again);

        assert!(!dispatcher.disconnect(user, first).await);
        assert!(!dispatcher.disconnect(user, first).await);
        assert!(dispatcher.is_online(user).await);
        assert!(dispatcher.disconnect(user, second).await);
        assert!(!dispatcher.is_online(user).await);
    }
}
