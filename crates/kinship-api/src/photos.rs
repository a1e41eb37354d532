use axum::{Extension, Json, extract::State};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use tracing::{debug, info, warn};
use uuid::Uuid;

use kinship_types::api::{ActionResponse, Claims, ProfilePhotoRequest};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::storage::{ImageType, MAX_IMAGE_SIZE};
use crate::validation::{is_acceptable_image_ref, is_base64_image};

/// Where an image reference ended up. `stored_key` is set only when this
/// request wrote a new object; a dedup hit may already be in use elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub url: String,
    pub stored_key: Option<String>,
}

/// Split `data:image/<type>;base64,<payload>` into its type and bytes.
pub fn parse_data_url(value: &str) -> Result<(ImageType, Vec<u8>), ApiError> {
    let rest = value.strip_prefix("data:").ok_or(ApiError::InvalidImage)?;
    let (mime, payload) = rest.split_once(";base64,").ok_or(ApiError::InvalidImage)?;
    let kind = ImageType::from_mime(mime).ok_or(ApiError::InvalidImage)?;

    // Base64 inflates by 4/3; reject obviously oversized payloads before decoding
    if payload.len() / 4 * 3 > MAX_IMAGE_SIZE + 3 {
        return Err(ApiError::InvalidImage);
    }

    let bytes = B64.decode(payload.trim()).map_err(|_| ApiError::InvalidImage)?;
    if bytes.is_empty() || bytes.len() > MAX_IMAGE_SIZE {
        return Err(ApiError::InvalidImage);
    }
    Ok((kind, bytes))
}

/// Upload data URLs to the image store; hosted URLs pass through.
pub async fn resolve_image(state: &AppState, owner: Uuid, value: &str) -> Result<ResolvedImage, ApiError> {
    if !is_base64_image(value) {
        return Ok(ResolvedImage {
            url: value.to_string(),
            stored_key: None,
        });
    }

    let (kind, bytes) = parse_data_url(value)?;
    let stored = state
        .images
        .put(owner, kind, &bytes)
        .await
        .map_err(ApiError::Upload)?;

    Ok(ResolvedImage {
        url: stored.url,
        stored_key: stored.created.then_some(stored.key),
    })
}

/// Remove an object written earlier in a request that then failed.
pub async fn discard_upload(state: &AppState, image: &ResolvedImage) {
    if let Some(key) = &image.stored_key {
        if let Err(e) = state.images.delete(key).await {
            warn!("Failed to discard orphaned image {}: {:#}", key, e);
        }
    }
}

/// PUT /profile/photo — upload (if needed) and point the profile at the new
/// image, then drop the image it replaced.
pub async fn update_profile_photo(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ProfilePhotoRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    let value = req.profile_image.trim();
    if !is_acceptable_image_ref(value) {
        debug!("{} sent an unusable image reference", claims.sub);
        return Err(ApiError::InvalidImage);
    }

    let image = resolve_image(&state, claims.sub, value).await?;

    let db = state.clone();
    let uid = claims.sub.to_string();
    let url = image.url.clone();
    let change = match blocking(move || db.db.set_profile_image(&uid, Some(&url))).await {
        Ok(Some(change)) => change,
        Ok(None) => {
            discard_upload(&state, &image).await;
            return Err(ApiError::ProfileNotFound);
        }
        Err(e) => {
            discard_upload(&state, &image).await;
            return Err(e);
        }
    };

    if let Some(previous) = change.previous.as_deref() {
        if previous != image.url {
            delete_if_ours(&state, previous).await;
        }
    }

    info!("{} updated profile photo", claims.sub);
    Ok(Json(ActionResponse::success("Profile photo updated!")))
}

/// DELETE /profile/photo
pub async fn remove_profile_photo(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ActionResponse>, ApiError> {
    let db = state.clone();
    let uid = claims.sub.to_string();
    let change = blocking(move || db.db.set_profile_image(&uid, None))
        .await?
        .ok_or(ApiError::ProfileNotFound)?;

    if let Some(previous) = change.previous.as_deref() {
        delete_if_ours(&state, previous).await;
    }

    info!("{} removed profile photo", claims.sub);
    Ok(Json(ActionResponse::success("Profile photo removed!")))
}

/// Images hosted elsewhere are left alone.
async fn delete_if_ours(state: &AppState, url: &str) {
    let Some(key) = state.images.key_from_url(url) else {
        return;
    };
    if let Err(e) = state.images.delete(&key).await {
        warn!("Failed to delete replaced image {}: {:#}", key, e);
    }
}
