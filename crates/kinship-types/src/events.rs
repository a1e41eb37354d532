use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ExtendedMessage, Message, PublicUser};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, name: String },

    /// A message addressed to the subscriber, published on `user:<id>:chats`
    NewMessage(ExtendedMessage),

    /// A message posted in a conversation, published on `chat:<chat_id>`
    IncomingMessage(Message),

    /// The subscriber gained a friend, published on `user:<id>:friends`
    NewFriend(PublicUser),

    /// Someone asked to connect with the subscriber
    IncomingFriendRequest {
        sender_id: Uuid,
        sender_name: String,
        sender_email: String,
    },

    /// A user came online or went offline
    PresenceUpdate { user_id: Uuid, online: bool },

    /// A subscribe command named a topic this connection may not see
    SubscriptionDenied { topic: String },
}

/// What actually goes over the wire: the event plus the topic it was
/// published on. Direct replies (ready, denials) have no topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub event: GatewayEvent,
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Start receiving events published on these topics
    Subscribe { topics: Vec<String> },

    /// Stop receiving events for these topics
    Unsubscribe { topics: Vec<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_use_adjacent_tagging() {
        let cmd: GatewayCommand = serde_json::from_str(
            r#"{"type":"subscribe","data":{"topics":["presence"]}}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            GatewayCommand::Subscribe {
                topics: vec!["presence".into()]
            }
        );
    }

    #[test]
    fn envelope_omits_missing_topic() {
        let env = Envelope {
            topic: None,
            event: GatewayEvent::PresenceUpdate {
                user_id: Uuid::nil(),
                online: true,
            },
        };
        let json = serde_json::to_value(&env).unwrap();
        assert!(json.get("topic").is_none());
        assert_eq!(json["event"]["type"], "presence_update");
        assert_eq!(json["event"]["data"]["online"], true);
    }
}
