use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, PublicUser, UserProfile};
use crate::summary::ProfileSummary;

// -- JWT Claims --

/// JWT claims shared across kinship-api (REST middleware) and
/// kinship-gateway (WebSocket authentication).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub exp: usize,
}

// -- Action results --

/// Outcome of a mutating action: `{"success": "..."}` or `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionResponse {
    Success(String),
    Error(String),
}

impl ActionResponse {
    pub fn success(msg: impl Into<String>) -> Self {
        Self::Success(msg.into())
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self::Error(msg.into())
    }
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub name: String,
    pub is_new_user: bool,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub image: Option<String>,
    pub is_new_user: bool,
    pub has_profile: bool,
}

// -- Profiles --

/// The profile form as submitted. Numbers arrive as text, the way a web
/// form posts them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileForm {
    pub name: Option<String>,
    pub age: Option<String>,
    pub gender: Option<String>,
    pub dob: Option<String>,
    pub height: Option<String>,
    pub language: Option<String>,
    pub marital_status: Option<String>,
    pub religion: Option<String>,
    pub ethnicity: Option<String>,
    pub caste: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    #[serde(alias = "familyStatus")]
    pub family_status: Option<String>,
    #[serde(alias = "familyType")]
    pub family_type: Option<String>,
    #[serde(alias = "familyValues")]
    pub family_values: Option<String>,
    pub education: Option<String>,
    #[serde(alias = "employedSector")]
    pub employed_sector: Option<String>,
    #[serde(alias = "jobTitle")]
    pub job_title: Option<String>,
    #[serde(alias = "annualIncome")]
    pub annual_income: Option<String>,
    pub profile_image: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfilePhotoRequest {
    pub profile_image: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub summary: ProfileSummary,
}

impl From<UserProfile> for ProfileResponse {
    fn from(profile: UserProfile) -> Self {
        let summary = ProfileSummary::from(&profile);
        Self { profile, summary }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct BrowseQuery {
    pub gender: Option<String>,
    pub religion: Option<String>,
    pub min_age: Option<f64>,
    pub max_age: Option<f64>,
    pub limit: Option<u32>,
}

// -- Friends --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FriendRequestBody {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequestView {
    pub sender_id: Uuid,
    pub sender_name: String,
    pub sender_email: String,
    pub created_at: DateTime<Utc>,
}

// -- Chat --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatListEntry {
    pub friend: PublicUser,
    pub chat_id: String,
    pub href: String,
    pub last_message: Option<Message>,
    pub unseen_count: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkSeenResponse {
    pub seen: usize,
}
