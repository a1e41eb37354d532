use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::info;
use uuid::Uuid;

use kinship_db::models::parse_timestamp;
use kinship_types::api::{ActionResponse, Claims, FriendRequestBody, FriendRequestView};
use kinship_types::chat::Topic;
use kinship_types::events::GatewayEvent;
use kinship_types::models::{PublicUser, User};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

/// GET /friends
pub async fn list_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<PublicUser>>, ApiError> {
    let db = state.clone();
    let uid = claims.sub.to_string();
    let rows = blocking(move || db.db.list_friends(&uid)).await?;

    let friends = rows
        .into_iter()
        .map(PublicUser::try_from)
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Json(friends))
}

/// GET /friends/requests — requests waiting for the caller's answer.
pub async fn list_friend_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<FriendRequestView>>, ApiError> {
    let db = state.clone();
    let uid = claims.sub.to_string();
    let rows = blocking(move || db.db.incoming_friend_requests(&uid)).await?;

    let requests = rows
        .into_iter()
        .map(|row| -> anyhow::Result<FriendRequestView> {
            Ok(FriendRequestView {
                sender_id: row.sender_id.parse()?,
                sender_name: row.sender_name,
                sender_email: row.sender_email,
                created_at: parse_timestamp(&row.created_at)?,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Json(requests))
}

enum RequestOutcome {
    Sent { receiver: User, sender: User },
    /// The receiver had already asked the sender; the request was accepted
    Accepted { receiver: User, sender: User },
}

/// POST /friends/requests — ask the user with this email to connect.
pub async fn send_friend_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<FriendRequestBody>,
) -> Result<(StatusCode, Json<ActionResponse>), ApiError> {
    let email = req.email.trim().to_lowercase();

    let db = state.clone();
    let sender_id = claims.sub.to_string();
    let outcome = blocking(move || {
        let Some(receiver) = db.db.get_user_by_email(&email)? else {
            return Ok(Err(ApiError::NotFound("This person does not exist.")));
        };
        let receiver = User::try_from(receiver)?;
        let receiver_id = receiver.id.to_string();
        let sender = db
            .db
            .get_user_by_id(&sender_id)?
            .ok_or_else(|| anyhow::anyhow!("sender {} has no account", sender_id))?;
        let sender = User::try_from(sender)?;

        if receiver_id == sender_id {
            return Ok(Err(ApiError::BadRequest("You cannot add yourself as a friend")));
        }
        if db.db.are_friends(&sender_id, &receiver_id)? {
            return Ok(Err(ApiError::Conflict("Already friends with this user")));
        }
        if db.db.has_friend_request(&sender_id, &receiver_id)? {
            return Ok(Err(ApiError::Conflict("Already sent a friend request")));
        }

        if db.db.has_friend_request(&receiver_id, &sender_id)? {
            db.db.accept_friend_request(&receiver_id, &sender_id)?;
            return Ok(Ok(RequestOutcome::Accepted { receiver, sender }));
        }

        db.db.create_friend_request(&sender_id, &receiver_id)?;
        Ok(Ok(RequestOutcome::Sent { receiver, sender }))
    })
    .await??;

    match outcome {
        RequestOutcome::Sent { receiver, sender } => {
            state.dispatcher.publish(
                &Topic::IncomingFriendRequests(receiver.id),
                GatewayEvent::IncomingFriendRequest {
                    sender_id: sender.id,
                    sender_name: sender.name,
                    sender_email: sender.email,
                },
            );
            info!("{} sent a friend request to {}", sender.id, receiver.id);
            Ok((StatusCode::CREATED, Json(ActionResponse::success("Friend request sent!"))))
        }
        RequestOutcome::Accepted { receiver, sender } => {
            announce_friendship(&state, sender, receiver);
            Ok((StatusCode::OK, Json(ActionResponse::success("Friend added!"))))
        }
    }
}

/// POST /friends/requests/{sender_id}/accept
pub async fn accept_friend_request(
    State(state): State<AppState>,
    Path(sender_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ActionResponse>, ApiError> {
    let db = state.clone();
    let sid = sender_id.to_string();
    let rid = claims.sub.to_string();
    let users = blocking(move || {
        if !db.db.accept_friend_request(&sid, &rid)? {
            return Ok(None);
        }
        let sender = db.db.get_user_by_id(&sid)?;
        let receiver = db.db.get_user_by_id(&rid)?;
        match (sender, receiver) {
            (Some(s), Some(r)) => Ok(Some((User::try_from(s)?, User::try_from(r)?))),
            _ => Err(anyhow::anyhow!("friend vanished while accepting")),
        }
    })
    .await?
    .ok_or(ApiError::NotFound("No friend request"))?;

    let (sender, receiver) = users;
    announce_friendship(&state, sender, receiver);

    Ok(Json(ActionResponse::success("Friend added!")))
}

/// POST /friends/requests/{sender_id}/deny
pub async fn deny_friend_request(
    State(state): State<AppState>,
    Path(sender_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ActionResponse>, ApiError> {
    let db = state.clone();
    let sid = sender_id.to_string();
    let rid = claims.sub.to_string();
    let removed = blocking(move || db.db.delete_friend_request(&sid, &rid)).await?;
    if !removed {
        return Err(ApiError::NotFound("No friend request"));
    }

    Ok(Json(ActionResponse::success("Friend request denied")))
}

/// Tell each side about the other on their `friends` topic.
fn announce_friendship(state: &AppState, a: User, b: User) {
    info!("{} and {} are now friends", a.id, b.id);
    let (a_id, b_id) = (a.id, b.id);
    state
        .dispatcher
        .publish(&Topic::Friends(a_id), GatewayEvent::NewFriend(PublicUser::from(b)));
    state
        .dispatcher
        .publish(&Topic::Friends(b_id), GatewayEvent::NewFriend(PublicUser::from(a)));
}

#[cfg(test)]
pub(crate) mod tests {
    use kinship_types::events::Envelope;

    use super::*;
    use crate::auth::tests::{signed_up, test_state};

    pub(crate) async fn befriend(state: &AppState, a: &Claims, b: &Claims) {
        send_friend_request(
            State(state.clone()),
            Extension(a.clone()),
            Json(FriendRequestBody {
                email: format!("{}@example.com", b.name.to_lowercase()),
            }),
        )
        .await
        .unwrap();
        accept_friend_request(State(state.clone()), Path(a.sub), Extension(b.clone()))
            .await
            .unwrap();
    }

    fn request(email: &str) -> Json<FriendRequestBody> {
        Json(FriendRequestBody { email: email.into() })
    }

    #[tokio::test]
    async fn request_then_accept_announces_both_sides() {
        let state = test_state().await;
        let amal = signed_up(&state, "Amal").await;
        let kasun = signed_up(&state, "Kasun").await;
        let mut rx = state.dispatcher.subscribe();

        let (status, _) = send_friend_request(State(state.clone()), Extension(amal.clone()), request("kasun@example.com"))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let Json(pending) = list_friend_requests(State(state.clone()), Extension(kasun.clone()))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].sender_id, amal.sub);

        accept_friend_request(State(state.clone()), Path(amal.sub), Extension(kasun.clone()))
            .await
            .unwrap();

        let Json(friends) = list_friends(State(state.clone()), Extension(amal.clone())).await.unwrap();
        assert_eq!(friends.len(), 1);
        assert_eq!(friends[0].id, kasun.sub);

        let topics: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|p| p.topic.to_string())
            .collect();
        assert_eq!(
            topics,
            vec![
                Topic::IncomingFriendRequests(kasun.sub).to_string(),
                Topic::Friends(amal.sub).to_string(),
                Topic::Friends(kasun.sub).to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn crossed_requests_become_friendship() {
        let state = test_state().await;
        let amal = signed_up(&state, "Amal").await;
        let kasun = signed_up(&state, "Kasun").await;
        let mut rx = state.dispatcher.subscribe();

        send_friend_request(State(state.clone()), Extension(amal.clone()), request("kasun@example.com"))
            .await
            .unwrap();
        let (status, Json(resp)) =
            send_friend_request(State(state.clone()), Extension(kasun.clone()), request("amal@example.com"))
                .await
                .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp, ActionResponse::success("Friend added!"));
        assert!(state.db.are_friends(&amal.sub.to_string(), &kasun.sub.to_string()).unwrap());

        let last = std::iter::from_fn(|| rx.try_recv().ok()).last().unwrap();
        let envelope: Envelope = serde_json::from_str(&last.json).unwrap();
        assert!(matches!(envelope.event, GatewayEvent::NewFriend(_)));
    }

    #[tokio::test]
    async fn request_guards() {
        let state = test_state().await;
        let amal = signed_up(&state, "Amal").await;
        let kasun = signed_up(&state, "Kasun").await;

        let err = send_friend_request(State(state.clone()), Extension(amal.clone()), request("amal@example.com"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let err = send_friend_request(State(state.clone()), Extension(amal.clone()), request("nobody@example.com"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ApiError::NotFound(_)));

        send_friend_request(State(state.clone()), Extension(amal.clone()), request("kasun@example.com"))
            .await
            .unwrap();
        let err = send_friend_request(State(state.clone()), Extension(amal.clone()), request("kasun@example.com"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ApiError::Conflict(_)));

        deny_friend_request(State(state.clone()), Path(amal.sub), Extension(kasun.clone()))
            .await
            .unwrap();
        let err = accept_friend_request(State(state.clone()), Path(amal.sub), Extension(kasun))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
