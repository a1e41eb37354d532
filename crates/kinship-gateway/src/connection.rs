use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use kinship_types::api::Claims;
use kinship_types::chat::Topic;
use kinship_types::events::{Envelope, GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// A fresh socket must identify within this window.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

type Subscriptions = Arc<RwLock<HashSet<String>>>;

/// Handle a single WebSocket connection: identify, then relay published
/// events for the topics the client subscribes to.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, jwt_secret: String) {
    let (mut sender, mut receiver) = socket.split();

    let claims = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(claims) => claims,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };
    let user_id = claims.sub;

    info!("{} ({}) connected to gateway", claims.name, user_id);

    let ready = GatewayEvent::Ready {
        user_id,
        name: claims.name.clone(),
    };
    if send_direct(&mut sender, None, ready).await.is_err() {
        return;
    }

    // Let the client know who is already here before announcing ourselves
    for uid in dispatcher.online_users().await {
        let event = GatewayEvent::PresenceUpdate {
            user_id: uid,
            online: true,
        };
        if send_direct(&mut sender, Some(Topic::Presence.to_string()), event)
            .await
            .is_err()
        {
            return;
        }
    }

    dispatcher.user_online(user_id).await;

    run_connection_loop(sender, receiver, dispatcher.clone(), user_id).await;

    dispatcher.user_offline(user_id).await;
    info!("{} ({}) disconnected from gateway", claims.name, user_id);
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    dispatcher: Dispatcher,
    user_id: Uuid,
) {
    let mut broadcast_rx = dispatcher.subscribe();

    // Per-connection topic subscriptions (shared between send and recv tasks).
    let subscriptions: Subscriptions = Arc::new(RwLock::new(HashSet::new()));
    let send_subscriptions = subscriptions.clone();

    // Replies addressed to this connection only
    let (direct_tx, mut direct_rx) = mpsc::unbounded_channel::<GatewayEvent>();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let msg = match result {
                        Ok(msg) => msg,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} messages", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if !is_subscribed(&send_subscriptions, &msg.topic) {
                        continue;
                    }

                    if sender.send(Message::Text(msg.json.to_string().into())).await.is_err() {
                        break;
                    }
                }
                event = direct_rx.recv() => {
                    let Some(event) = event else { break };
                    if send_direct(&mut sender, None, event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let recv_subscriptions = subscriptions.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(user_id, cmd, &recv_subscriptions, &direct_tx),
                    Err(e) => {
                        let raw: String = text.chars().take(200).collect();
                        warn!("{} bad command: {} -- raw: {}", user_id, e, raw);
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

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

fn handle_command(
    user_id: Uuid,
    cmd: GatewayCommand,
    subscriptions: &Subscriptions,
    direct_tx: &mpsc::UnboundedSender<GatewayEvent>,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::Subscribe { topics } => {
            let (allowed, denied) = authorize_topics(user_id, topics);
            debug!("{} subscribing to {} topics", user_id, allowed.len());

            subscriptions
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .extend(allowed);

            for topic in denied {
                warn!("{} denied subscription to {}", user_id, topic);
                let _ = direct_tx.send(GatewayEvent::SubscriptionDenied { topic });
            }
        }

        GatewayCommand::Unsubscribe { topics } => {
            let mut subs = subscriptions.write().unwrap_or_else(|e| e.into_inner());
            for raw in topics {
                // Subscriptions are stored under the canonical spelling
                let topic = raw.parse::<Topic>().map(|t| t.to_string()).unwrap_or(raw);
                subs.remove(&topic);
            }
        }
    }
}

/// Split requested topics into those `user_id` may follow and the rest.
/// Allowed topics are returned in their canonical spelling.
pub fn authorize_topics(user_id: Uuid, topics: Vec<String>) -> (Vec<String>, Vec<String>) {
    let mut allowed = Vec::new();
    let mut denied = Vec::new();

    for raw in topics {
        match raw.parse::<Topic>() {
            Ok(topic) if topic.is_visible_to(user_id) => allowed.push(topic.to_string()),
            _ => denied.push(raw),
        }
    }

    (allowed, denied)
}

fn is_subscribed(subscriptions: &Subscriptions, topic: &str) -> bool {
    subscriptions
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .contains(topic)
}

async fn send_direct(
    sender: &mut SplitSink<WebSocket, Message>,
    topic: Option<String>,
    event: GatewayEvent,
) -> Result<(), axum::Error> {
    let envelope = Envelope { topic, event };
    let text = match serde_json::to_string(&envelope) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to serialize direct event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await
}

async fn wait_for_identify(receiver: &mut SplitStream<WebSocket>, jwt_secret: &str) -> Option<Claims> {
    let timeout = tokio::time::timeout(IDENTIFY_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some(token_data.claims);
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}
