use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use tracing::{debug, info};
use uuid::Uuid;

use kinship_db::profiles::{CreateProfileOutcome, ProfileFilter};
use kinship_types::api::{ActionResponse, BrowseQuery, Claims, ProfileForm, ProfileResponse};
use kinship_types::models::{Gender, UserProfile};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::photos::{discard_upload, resolve_image};
use crate::validation::{ProfileSection, validate_profile, validate_section};

const DEFAULT_BROWSE_LIMIT: u32 = 20;
const MAX_BROWSE_LIMIT: u32 = 100;

/// POST /profile — create the signed-in user's profile and finish
/// onboarding.
pub async fn create_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(form): Json<ProfileForm>,
) -> Result<(StatusCode, Json<ActionResponse>), ApiError> {
    let mut profile = validate_profile(&form).map_err(|e| {
        debug!("create_profile from {}: {}", claims.sub, e);
        ApiError::InvalidFields
    })?;

    let db = state.clone();
    let uid = claims.sub.to_string();
    if blocking(move || db.db.has_profile(&uid)).await? {
        return Err(ApiError::ProfileExists);
    }

    // A data URL is uploaded first so only a link lands in the database
    let image = match profile.profile_image.as_deref() {
        Some(value) => Some(resolve_image(&state, claims.sub, value).await?),
        None => None,
    };
    profile.profile_image = image.as_ref().map(|i| i.url.clone());

    let db = state.clone();
    let uid = claims.sub.to_string();
    let profile_id = Uuid::new_v4();
    let result = blocking(move || {
        if db.db.get_user_by_id(&uid)?.is_none() {
            return Ok(None);
        }
        db.db.create_profile(&profile_id.to_string(), &uid, &profile).map(Some)
    })
    .await;

    let outcome = match result {
        Ok(Some(CreateProfileOutcome::Created)) => Ok(()),
        Ok(Some(CreateProfileOutcome::AlreadyExists)) => Err(ApiError::ProfileExists),
        Ok(None) => Err(ApiError::Unauthorized),
        Err(e) => Err(e),
    };

    if let Err(e) = outcome {
        if let Some(image) = &image {
            discard_upload(&state, image).await;
        }
        return Err(e);
    }

    info!("{} created profile {}", claims.sub, profile_id);
    Ok((
        StatusCode::CREATED,
        Json(ActionResponse::success("Profile created successfully!")),
    ))
}

/// GET /profile
pub async fn get_my_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let db = state.clone();
    let uid = claims.sub.to_string();
    let row = blocking(move || db.db.get_profile_by_user(&uid))
        .await?
        .ok_or(ApiError::ProfileNotFound)?;

    Ok(Json(UserProfile::try_from(row)?.into()))
}

/// GET /profiles/{profile_id}
pub async fn get_profile(
    State(state): State<AppState>,
    Path(profile_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let db = state.clone();
    let pid = profile_id.to_string();
    let row = blocking(move || db.db.get_profile(&pid))
        .await?
        .ok_or(ApiError::ProfileNotFound)?;

    Ok(Json(UserProfile::try_from(row)?.into()))
}

/// GET /profiles — other members, optionally filtered.
pub async fn browse_profiles(
    State(state): State<AppState>,
    Query(query): Query<BrowseQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ProfileResponse>>, ApiError> {
    let gender = query
        .gender
        .as_deref()
        .map(str::parse::<Gender>)
        .transpose()
        .map_err(|_| ApiError::InvalidFields)?;

    let filter = ProfileFilter {
        gender,
        religion: query.religion.filter(|r| !r.trim().is_empty()),
        min_age: query.min_age,
        max_age: query.max_age,
    };
    let limit = query.limit.unwrap_or(DEFAULT_BROWSE_LIMIT).min(MAX_BROWSE_LIMIT);

    let db = state.clone();
    let uid = claims.sub.to_string();
    let rows = blocking(move || db.db.browse_profiles(&uid, &filter, limit)).await?;

    let profiles = rows
        .into_iter()
        .map(|row| UserProfile::try_from(row).map(ProfileResponse::from))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Json(profiles))
}

/// PATCH /profile/{section} — save one detail panel.
pub async fn update_profile(
    State(state): State<AppState>,
    Path(section): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(form): Json<ProfileForm>,
) -> Result<Json<ActionResponse>, ApiError> {
    let update = section
        .parse::<ProfileSection>()
        .and_then(|section| validate_section(section, &form))
        .map_err(|e| {
            debug!("update_profile {} from {}: {}", section, claims.sub, e);
            ApiError::InvalidFields
        })?;

    let db = state.clone();
    let uid = claims.sub.to_string();
    let updated = blocking(move || db.db.update_profile(&uid, &update)).await?;
    if !updated {
        return Err(ApiError::ProfileNotFound);
    }

    Ok(Json(ActionResponse::success("Profile updated!")))
}
