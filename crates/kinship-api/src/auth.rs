use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use rand_core::OsRng;
use tracing::{debug, info};
use uuid::Uuid;

use kinship_db::Database;
use kinship_gateway::dispatcher::Dispatcher;
use kinship_types::api::{Claims, LoginRequest, LoginResponse, MeResponse, RegisterRequest, RegisterResponse};
use kinship_types::models::User;

use crate::blocking;
use crate::error::ApiError;
use crate::storage::ImageStore;

/// Sessions last this long before the client has to log in again.
const TOKEN_LIFETIME_DAYS: i64 = 30;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    pub images: ImageStore,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    let name = req.name.trim().to_string();

    if email.len() > 254 || !email.contains('@') {
        debug!("register: bad email");
        return Err(ApiError::InvalidFields);
    }
    if name.is_empty() || name.chars().count() > 64 {
        debug!("register: bad name");
        return Err(ApiError::InvalidFields);
    }
    if req.password.len() < 8 {
        debug!("register: short password");
        return Err(ApiError::InvalidFields);
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?
        .to_string();

    let user_id = Uuid::new_v4();

    let db = state.clone();
    let created =
        blocking(move || db.db.create_user(&user_id.to_string(), &email, &name, &password_hash)).await?;

    if !created {
        return Err(ApiError::EmailTaken);
    }

    info!("Registered user {}", user_id);

    let token = create_token(&state.jwt_secret, user_id, req.name.trim())?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();

    let db = state.clone();
    let user = blocking(move || db.db.get_user_by_email(&email))
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("corrupt password hash for {}: {e}", user.id))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::InvalidCredentials)?;

    let user = User::try_from(user)?;
    let token = create_token(&state.jwt_secret, user.id, &user.name)?;

    Ok(Json(LoginResponse {
        user_id: user.id,
        name: user.name,
        is_new_user: user.is_new_user,
        token,
    }))
}

/// GET /me — the signed-in user and whether onboarding is done.
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MeResponse>, ApiError> {
    let db = state.clone();
    let uid = claims.sub.to_string();
    let (user, has_profile) = blocking(move || {
        let user = db.db.get_user_by_id(&uid)?;
        let has_profile = db.db.has_profile(&uid)?;
        Ok((user, has_profile))
    })
    .await?;

    // A valid token for a deleted user
    let user = User::try_from(user.ok_or(ApiError::Unauthorized)?)?;

    Ok(Json(MeResponse {
        id: user.id,
        email: user.email,
        name: user.name,
        image: user.image,
        is_new_user: user.is_new_user,
        has_profile,
    }))
}

pub fn create_token(secret: &str, user_id: Uuid, name: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        name: name.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_LIFETIME_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

#[cfg(test)]
pub(crate) mod tests {
    use axum::response::IntoResponse;

    use kinship_types::api::ActionResponse;

    use super::*;

    pub(crate) async fn test_state() -> AppState {
        let dir = std::env::temp_dir().join(format!("kinship-api-{}", Uuid::new_v4()));
        Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            jwt_secret: "test-secret".into(),
            dispatcher: Dispatcher::new(),
            images: ImageStore::new(dir, "http://localhost:3000").await.unwrap(),
        })
    }

    /// Register a user and return claims as the middleware would build them.
    pub(crate) async fn signed_up(state: &AppState, name: &str) -> Claims {
        let resp = register(
            State(state.clone()),
            Json(RegisterRequest {
                email: format!("{}@example.com", name.to_lowercase()),
                name: name.into(),
                password: "correct horse".into(),
            }),
        )
        .await
        .unwrap()
        .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let user = state
            .db
            .get_user_by_email(&format!("{}@example.com", name.to_lowercase()))
            .unwrap()
            .unwrap();
        Claims {
            sub: user.id.parse().unwrap(),
            name: name.into(),
            exp: usize::MAX,
        }
    }

    pub(crate) async fn body_json<T: serde::de::DeserializeOwned>(resp: axum::response::Response) -> T {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let state = test_state().await;
        signed_up(&state, "Amal").await;

        let err = register(
            State(state.clone()),
            Json(RegisterRequest {
                email: " AMAL@example.com ".into(),
                name: "Other".into(),
                password: "another pass".into(),
            }),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, ApiError::EmailTaken));

        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body: ActionResponse = body_json(resp).await;
        assert_eq!(body, ActionResponse::error("Email already in use!"));
    }

    #[tokio::test]
    async fn concurrent_sign_ups_with_one_email_conflict() {
        let state = test_state().await;
        let attempt = |name: &str| {
            register(
                State(state.clone()),
                Json(RegisterRequest {
                    email: "twin@example.com".into(),
                    name: name.into(),
                    password: "correct horse".into(),
                }),
            )
        };

        let (a, b) = tokio::join!(attempt("First"), attempt("Second"));
        let results = [a.map(|r| r.into_response().status()), b.map(|r| r.into_response().status())];

        let created = results.iter().filter(|r| r.as_ref().is_ok_and(|s| *s == StatusCode::CREATED)).count();
        let taken = results.iter().filter(|r| matches!(r, Err(ApiError::EmailTaken))).count();
        assert_eq!((created, taken), (1, 1));
    }

    #[tokio::test]
    async fn login_checks_password() {
        let state = test_state().await;
        signed_up(&state, "Kasun").await;

        let ok = login(
            State(state.clone()),
            Json(LoginRequest {
                email: "kasun@example.com".into(),
                password: "correct horse".into(),
            }),
        )
        .await
        .unwrap()
        .into_response();
        let body: LoginResponse = body_json(ok).await;
        assert_eq!(body.name, "Kasun");
        assert!(body.is_new_user);

        let bad = login(
            State(state.clone()),
            Json(LoginRequest {
                email: "kasun@example.com".into(),
                password: "wrong horse".into(),
            }),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(bad, ApiError::InvalidCredentials));
    }

    #[tokio::test]
    async fn register_validates_input() {
        let state = test_state().await;
        let err = register(
            State(state),
            Json(RegisterRequest {
                email: "not-an-email".into(),
                name: "X".into(),
                password: "long enough".into(),
            }),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, ApiError::InvalidFields));
    }

    #[tokio::test]
    async fn me_reports_onboarding_state() {
        let state = test_state().await;
        let claims = signed_up(&state, "Nimal").await;

        let Json(me) = me(State(state), Extension(claims)).await.unwrap();
        assert_eq!(me.email, "nimal@example.com");
        assert!(me.is_new_user);
        assert!(!me.has_profile);
    }
}
