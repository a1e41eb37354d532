//! Client-side chat list state.
//!
//! The sidebar starts from the user's friends, then folds in gateway events
//! as they arrive: new friends become active chats, and messages from anyone
//! other than the chat currently on screen are kept as unseen until the user
//! opens that chat.

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::chat::{chat_href, chat_path};
use crate::events::GatewayEvent;
use crate::models::{ExtendedMessage, PublicUser};

/// One row of the rendered chat list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SidebarEntry {
    pub friend_id: Uuid,
    pub name: String,
    pub image: Option<String>,
    pub href: String,
    pub unseen_count: usize,
}

#[derive(Debug, Clone)]
pub struct SidebarChatList {
    session_id: Uuid,
    pathname: String,
    active_chats: Vec<PublicUser>,
    unseen_messages: Vec<ExtendedMessage>,
}

impl SidebarChatList {
    pub fn new(friends: Vec<PublicUser>, session_id: Uuid) -> Self {
        Self {
            session_id,
            pathname: String::new(),
            active_chats: friends,
            unseen_messages: Vec::new(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn pathname(&self) -> &str {
        &self.pathname
    }

    pub fn active_chats(&self) -> &[PublicUser] {
        &self.active_chats
    }

    pub fn unseen_messages(&self) -> &[ExtendedMessage] {
        &self.unseen_messages
    }

    /// Feed one gateway event into the list. Returns `true` when the event
    /// warrants a notification toast.
    pub fn apply(&mut self, event: &GatewayEvent) -> bool {
        match event {
            GatewayEvent::NewMessage(message) => self.on_new_message(message.clone()),
            GatewayEvent::NewFriend(friend) => {
                self.on_new_friend(friend.clone());
                false
            }
            _ => false,
        }
    }

    pub fn on_new_friend(&mut self, friend: PublicUser) {
        if self.active_chats.iter().any(|f| f.id == friend.id) {
            debug!("{} already in chat list", friend.id);
            return;
        }
        self.active_chats.push(friend);
    }

    /// Record an incoming message unless its chat is the one on screen.
    pub fn on_new_message(&mut self, message: ExtendedMessage) -> bool {
        let open_chat = chat_path(self.session_id, message.message.sender_id);
        if self.pathname == open_chat {
            return false;
        }
        self.unseen_messages.push(message);
        true
    }

    /// The user moved to `pathname`. Opening a chat marks everything its
    /// sender sent as seen.
    pub fn navigate(&mut self, pathname: impl Into<String>) {
        self.pathname = pathname.into();
        if !self.pathname.contains("chat") {
            return;
        }
        let pathname = &self.pathname;
        self.unseen_messages
            .retain(|msg| !pathname.contains(&msg.message.sender_id.to_string()));
    }

    pub fn unseen_count(&self, friend_id: Uuid) -> usize {
        self.unseen_messages
            .iter()
            .filter(|msg| msg.message.sender_id == friend_id)
            .count()
    }

    pub fn total_unseen(&self) -> usize {
        self.unseen_messages.len()
    }

    /// Active chats sorted by name, each with its link and unseen count.
    pub fn entries(&self) -> Vec<SidebarEntry> {
        let mut friends: Vec<&PublicUser> = self.active_chats.iter().collect();
        friends.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        friends
            .into_iter()
            .map(|friend| SidebarEntry {
                friend_id: friend.id,
                name: friend.name.clone(),
                image: friend.image.clone(),
                href: format!("/chat/{}", chat_href(self.session_id, friend.id)),
                unseen_count: self.unseen_count(friend.id),
            })
            .collect()
    }
}
