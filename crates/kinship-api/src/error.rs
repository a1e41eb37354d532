use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use kinship_types::api::ActionResponse;

/// Every failure an action can report. The display string is exactly what
/// the client sees under `"error"`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    /// Authenticated, but not allowed to touch this resource
    #[error("Unauthorized")]
    Forbidden,

    #[error("Invalid fields!")]
    InvalidFields,

    #[error("Invalid credentials!")]
    InvalidCredentials,

    #[error("Email already in use!")]
    EmailTaken,

    #[error("User already has a profile")]
    ProfileExists,

    #[error("Profile not found")]
    ProfileNotFound,

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(&'static str),

    #[error("{0}")]
    BadRequest(&'static str),

    #[error("Invalid image")]
    InvalidImage,

    #[error("Error uploading image")]
    Upload(#[source] anyhow::Error),

    #[error("Something went wrong!")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::InvalidFields | Self::BadRequest(_) | Self::InvalidImage => StatusCode::BAD_REQUEST,
            Self::EmailTaken | Self::ProfileExists | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ProfileNotFound | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upload(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            Self::Internal(e) => error!("Internal error: {:#}", e),
            Self::Upload(e) => error!("Image upload failed: {:#}", e),
            _ => {}
        }

        (self.status(), Json(ActionResponse::error(self.to_string()))).into_response()
    }
}
