use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tracing::{debug, error};
use uuid::Uuid;

use kinship_types::chat::Topic;
use kinship_types::events::{Envelope, GatewayEvent};

/// An event serialized once at publish time, tagged with its topic so each
/// connection can filter without re-parsing.
#[derive(Debug, Clone)]
pub struct Published {
    pub topic: Arc<str>,
    pub json: Arc<str>,
}

/// Routes published events to connected clients and tracks who is online.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Every connection holds a receiver and filters on its own topics
    broadcast_tx: broadcast::Sender<Published>,

    /// Open connections per online user
    online_users: RwLock<HashMap<Uuid, usize>>,
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
                online_users: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to published events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Published> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Publish an event on a topic. Delivery is best effort: with no
    /// connection listening the event is dropped.
    pub fn publish(&self, topic: &Topic, event: GatewayEvent) {
        let topic = topic.to_string();
        let envelope = Envelope {
            topic: Some(topic.clone()),
            event,
        };
        let json = match serde_json::to_string(&envelope) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize event for {}: {}", topic, e);
                return;
            }
        };

        if self
            .inner
            .broadcast_tx
            .send(Published {
                topic: topic.as_str().into(),
                json: json.into(),
            })
            .is_err()
        {
            debug!("No listeners for {}", topic);
        }
    }

    /// Count a new connection for `user_id`. The first connection announces
    /// the user as online.
    pub async fn user_online(&self, user_id: Uuid) {
        let first = {
            let mut online = self.inner.online_users.write().await;
            let count = online.entry(user_id).or_insert(0);
            *count += 1;
            *count == 1
        };

        if first {
            self.publish(&Topic::Presence, GatewayEvent::PresenceUpdate { user_id, online: true });
        }
    }

    /// Drop one connection for `user_id`. The last one going away announces
    /// the user as offline.
    pub async fn user_offline(&self, user_id: Uuid) {
        let last = {
            let mut online = self.inner.online_users.write().await;
            match online.get_mut(&user_id) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    false
                }
                Some(_) => {
                    online.remove(&user_id);
                    true
                }
                None => false,
            }
        };

        if last {
            self.publish(&Topic::Presence, GatewayEvent::PresenceUpdate { user_id, online: false });
        }
    }

    /// Get list of online users.
    pub async fn online_users(&self) -> Vec<Uuid> {
        self.inner.online_users.read().await.keys().copied().collect()
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.online_users.read().await.contains_key(&user_id)
    }
}
