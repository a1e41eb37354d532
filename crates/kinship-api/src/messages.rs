use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use kinship_db::models::{MessageCursor, MessageRow, format_timestamp, now_timestamp, parse_timestamp};
use kinship_types::api::{ChatListEntry, Claims, MarkSeenResponse, SendMessageRequest};
use kinship_types::chat::{Topic, chat_href, chat_partner, parse_chat_id};
use kinship_types::events::GatewayEvent;
use kinship_types::models::{ExtendedMessage, Message, PublicUser, User};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

const MAX_MESSAGE_CHARS: usize = 2000;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// `created_at` of the oldest message already loaded; only older
    /// messages are returned.
    pub before: Option<String>,
    /// Id of that message, so messages sharing its timestamp are not skipped
    pub before_id: Option<Uuid>,
}

fn default_limit() -> u32 {
    50
}

/// GET /chats — every friend with the last message and unseen count.
pub async fn chat_list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ChatListEntry>>, ApiError> {
    let db = state.clone();
    let uid = claims.sub.to_string();
    let rows = blocking(move || db.db.chat_overview(&uid)).await?;

    let chats = rows
        .into_iter()
        .map(|row| -> anyhow::Result<ChatListEntry> {
            let friend = PublicUser::try_from(row.friend)?;
            let chat_id = chat_href(claims.sub, friend.id);
            Ok(ChatListEntry {
                href: format!("/chat/{chat_id}"),
                chat_id,
                last_message: row.last_message.map(Message::try_from).transpose()?,
                unseen_count: row.unseen_count,
                friend,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Json(chats))
}

/// GET /chats/{chat_id}/messages — newest first.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Message>>, ApiError> {
    authorize_chat(&state, &chat_id, claims.sub).await?;

    // Normalise the cursor so it compares correctly against stored text
    let before = query
        .before
        .as_deref()
        .map(|raw| parse_timestamp(raw).map(format_timestamp))
        .transpose()
        .map_err(|_| ApiError::BadRequest("Invalid cursor"))?
        .map(|created_at| MessageCursor {
            created_at,
            id: query.before_id.map(|id| id.to_string()),
        });
    let limit = query.limit.clamp(1, 200);

    let db = state.clone();
    let rows = blocking(move || db.db.get_messages(&chat_id, limit, before.as_ref())).await?;

    let messages = rows
        .into_iter()
        .map(Message::try_from)
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Json(messages))
}

/// POST /chats/{chat_id}/messages
pub async fn send_message(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let text = req.text.trim().to_string();
    if text.is_empty() || text.chars().count() > MAX_MESSAGE_CHARS {
        debug!("{} sent an empty or oversized message", claims.sub);
        return Err(ApiError::InvalidFields);
    }

    let partner = authorize_chat(&state, &chat_id, claims.sub).await?;

    let row = MessageRow {
        id: Uuid::new_v4().to_string(),
        chat_id: chat_id.clone(),
        sender_id: claims.sub.to_string(),
        receiver_id: partner.to_string(),
        text,
        created_at: now_timestamp(),
        seen_at: None,
    };

    let db = state.clone();
    let uid = claims.sub.to_string();
    let (row, sender) = blocking(move || {
        let sender = db
            .db
            .get_user_by_id(&uid)?
            .ok_or_else(|| anyhow::anyhow!("sender {} has no account", uid))?;
        db.db.insert_message(&row)?;
        Ok((row, User::try_from(sender)?))
    })
    .await?;

    let message = Message::try_from(row)?;

    state.dispatcher.publish(
        &Topic::Chat(chat_id),
        GatewayEvent::IncomingMessage(message.clone()),
    );
    state.dispatcher.publish(
        &Topic::Chats(partner),
        GatewayEvent::NewMessage(ExtendedMessage {
            message: message.clone(),
            sender_img: sender.image,
            sender_name: sender.name,
        }),
    );

    info!("{} messaged {}", claims.sub, partner);
    Ok((StatusCode::CREATED, Json(message)))
}

/// POST /chats/{chat_id}/seen — the caller has read the conversation.
pub async fn mark_chat_seen(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MarkSeenResponse>, ApiError> {
    authorize_chat(&state, &chat_id, claims.sub).await?;

    let db = state.clone();
    let uid = claims.sub.to_string();
    let seen = blocking(move || db.db.mark_chat_seen(&chat_id, &uid, &now_timestamp())).await?;

    Ok(Json(MarkSeenResponse { seen }))
}

/// The caller must be one of the two participants and still be friends
/// with the other. Returns the other participant.
async fn authorize_chat(state: &AppState, chat_id: &str, user_id: Uuid) -> Result<Uuid, ApiError> {
    if parse_chat_id(chat_id).is_none() {
        return Err(ApiError::BadRequest("Invalid chat id"));
    }
    let partner = chat_partner(chat_id, user_id).ok_or(ApiError::Forbidden)?;

    let db = state.clone();
    let (uid, pid) = (user_id.to_string(), partner.to_string());
    if !blocking(move || db.db.are_friends(&uid, &pid)).await? {
        return Err(ApiError::Forbidden);
    }
    Ok(partner)
}
