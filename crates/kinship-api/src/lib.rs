pub mod auth;
pub mod error;
pub mod friends;
pub mod messages;
pub mod middleware;
pub mod photos;
pub mod profiles;
pub mod storage;
pub mod validation;

use tracing::error;

use crate::error::ApiError;

/// Run blocking database work off the async runtime.
pub(crate) async fn blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.into())
        })?
        .map_err(ApiError::from)
}
