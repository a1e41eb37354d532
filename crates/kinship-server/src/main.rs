mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, patch, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use kinship_api::auth::{self, AppState, AppStateInner};
use kinship_api::middleware::require_auth;
use kinship_api::storage::ImageStore;
use kinship_api::{friends, messages, photos, profiles};
use kinship_db::Database;
use kinship_gateway::connection;
use kinship_gateway::dispatcher::Dispatcher;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kinship=debug,kinship_api=debug,kinship_gateway=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::load()?;

    let db = Database::open(&config.db_path)?;
    let images = ImageStore::new(config.image_dir.clone(), &config.public_url).await?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        dispatcher: Dispatcher::new(),
        images,
    });

    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/health", get(health))
        .route("/gateway", get(ws_upgrade))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/me", get(auth::me))
        // Profile
        .route("/profile", post(profiles::create_profile).get(profiles::get_my_profile))
        .route(
            "/profile/photo",
            put(photos::update_profile_photo).delete(photos::remove_profile_photo),
        )
        .route("/profile/{section}", patch(profiles::update_profile))
        .route("/profiles", get(profiles::browse_profiles))
        .route("/profiles/{profile_id}", get(profiles::get_profile))
        // Friends
        .route("/friends", get(friends::list_friends))
        .route(
            "/friends/requests",
            get(friends::list_friend_requests).post(friends::send_friend_request),
        )
        .route("/friends/requests/{sender_id}/accept", post(friends::accept_friend_request))
        .route("/friends/requests/{sender_id}/deny", post(friends::deny_friend_request))
        // Chats
        .route("/chats", get(messages::chat_list))
        .route(
            "/chats/{chat_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/chats/{chat_id}/seen", post(messages::mark_chat_seen))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service("/images", ServeDir::new(&config.image_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.bind_addr().parse()?;
    info!("Kinship server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher.clone(), state.jwt_secret.clone())
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
