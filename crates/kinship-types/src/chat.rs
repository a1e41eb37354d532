use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use uuid::Uuid;

const CHAT_ID_SEPARATOR: &str = "--";

/// Canonical id of the one-to-one chat between two users: both ids sorted
/// and joined with `--`, so either participant derives the same id.
pub fn chat_href(a: Uuid, b: Uuid) -> String {
    let (a, b) = (a.to_string(), b.to_string());
    if a <= b {
        format!("{a}{CHAT_ID_SEPARATOR}{b}")
    } else {
        format!("{b}{CHAT_ID_SEPARATOR}{a}")
    }
}

/// Page path of a chat as seen by `session_id`.
pub fn chat_path(session_id: Uuid, other: Uuid) -> String {
    format!("/chat/{}", chat_href(session_id, other))
}

/// Split a chat id back into its participants. Only canonical ids (sorted,
/// two distinct users) are accepted.
pub fn parse_chat_id(chat_id: &str) -> Option<(Uuid, Uuid)> {
    let (a, b) = chat_id.split_once(CHAT_ID_SEPARATOR)?;
    let a: Uuid = a.parse().ok()?;
    let b: Uuid = b.parse().ok()?;
    if a == b || chat_href(a, b) != chat_id {
        return None;
    }
    Some((a, b))
}

/// Given a chat id and one participant, return the other participant.
pub fn chat_partner(chat_id: &str, user_id: Uuid) -> Option<Uuid> {
    let (a, b) = parse_chat_id(chat_id)?;
    if a == user_id {
        Some(b)
    } else if b == user_id {
        Some(a)
    } else {
        None
    }
}

/// Pub/sub topic names used by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// `user:<id>:chats` — new messages addressed to the user.
    Chats(Uuid),
    /// `user:<id>:friends` — friendships the user just gained.
    Friends(Uuid),
    /// `user:<id>:incoming_friend_requests`
    IncomingFriendRequests(Uuid),
    /// `chat:<chat_id>` — every message of one conversation.
    Chat(String),
    /// `presence` — online/offline transitions.
    Presence,
}

impl Topic {
    /// Whether `user_id` may subscribe to this topic.
    pub fn is_visible_to(&self, user_id: Uuid) -> bool {
        match self {
            Self::Chats(owner) | Self::Friends(owner) | Self::IncomingFriendRequests(owner) => {
                *owner == user_id
            }
            Self::Chat(chat_id) => chat_partner(chat_id, user_id).is_some(),
            Self::Presence => true,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chats(id) => write!(f, "user:{id}:chats"),
            Self::Friends(id) => write!(f, "user:{id}:friends"),
            Self::IncomingFriendRequests(id) => write!(f, "user:{id}:incoming_friend_requests"),
            Self::Chat(chat_id) => write!(f, "chat:{chat_id}"),
            Self::Presence => f.write_str("presence"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid topic '{0}'")]
pub struct InvalidTopic(pub String);

impl FromStr for Topic {
    type Err = InvalidTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidTopic(s.to_string());

        if s == "presence" {
            return Ok(Self::Presence);
        }

        if let Some(chat_id) = s.strip_prefix("chat:") {
            parse_chat_id(chat_id).ok_or_else(invalid)?;
            return Ok(Self::Chat(chat_id.to_string()));
        }

        let rest = s.strip_prefix("user:").ok_or_else(invalid)?;
        let (id, kind) = rest.split_once(':').ok_or_else(invalid)?;
        let id: Uuid = id.parse().map_err(|_| invalid())?;
        match kind {
            "chats" => Ok(Self::Chats(id)),
            "friends" => Ok(Self::Friends(id)),
            "incoming_friend_requests" => Ok(Self::IncomingFriendRequests(id)),
            _ => Err(invalid()),
        }
    }
}
