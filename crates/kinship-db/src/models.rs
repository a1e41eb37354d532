//! Database row types — these map directly to SQLite rows.
//! Conversion into kinship-types models happens here so the API layer never
//! sees raw column strings.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use uuid::Uuid;

use kinship_types::models::{Gender, MaritalStatus, Message, PublicUser, User, UserProfile};

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub name: String,
    pub password: String,
    pub image: Option<String>,
    pub is_new_user: bool,
    pub created_at: String,
}

pub struct ProfileRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub age: f64,
    pub gender: String,
    pub dob: String,
    pub height: Option<f64>,
    pub language: Option<String>,
    pub marital_status: Option<String>,
    pub religion: Option<String>,
    pub ethnicity: Option<String>,
    pub caste: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub family_status: Option<String>,
    pub family_type: Option<String>,
    pub family_values: Option<String>,
    pub education: Option<String>,
    pub employed_sector: Option<String>,
    pub job_title: Option<String>,
    pub annual_income: Option<f64>,
    pub profile_image: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: String,
    pub created_at: String,
    pub seen_at: Option<String>,
}

/// Position in a chat's history: everything strictly older than this
/// message. `id` breaks ties between messages stored in the same millisecond.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageCursor {
    pub created_at: String,
    pub id: Option<String>,
}

impl MessageCursor {
    /// The cursor that continues right after `row`.
    pub fn after(row: &MessageRow) -> Self {
        Self {
            created_at: row.created_at.clone(),
            id: Some(row.id.clone()),
        }
    }
}

pub struct FriendRequestRow {
    pub sender_id: String,
    pub sender_name: String,
    pub sender_email: String,
    pub created_at: String,
}

/// One friend as shown in the chat list.
pub struct ChatOverviewRow {
    pub friend: UserRow,
    pub last_message: Option<MessageRow>,
    pub unseen_count: u32,
}

/// Timestamp format written by this crate. Fixed width, so text ordering
/// matches time ordering.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') has no timezone; it is UTC.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .with_context(|| format!("corrupt timestamp '{raw}'"))
}

fn parse_uuid(raw: &str, column: &str) -> Result<Uuid> {
    raw.parse::<Uuid>()
        .with_context(|| format!("corrupt {column} '{raw}'"))
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(Self {
            id: parse_uuid(&row.id, "users.id")?,
            email: row.email,
            name: row.name,
            image: row.image,
            is_new_user: row.is_new_user,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

impl TryFrom<UserRow> for PublicUser {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        User::try_from(row).map(PublicUser::from)
    }
}

impl TryFrom<ProfileRow> for UserProfile {
    type Error = anyhow::Error;

    fn try_from(row: ProfileRow) -> Result<Self> {
        let marital_status = row
            .marital_status
            .as_deref()
            .map(str::parse::<MaritalStatus>)
            .transpose()
            .with_context(|| format!("corrupt marital_status on profile '{}'", row.id))?;

        Ok(Self {
            id: parse_uuid(&row.id, "user_profiles.id")?,
            user_id: parse_uuid(&row.user_id, "user_profiles.user_id")?,
            name: row.name,
            age: row.age,
            gender: row
                .gender
                .parse::<Gender>()
                .with_context(|| format!("corrupt gender on profile '{}'", row.id))?,
            dob: NaiveDate::parse_from_str(&row.dob, "%Y-%m-%d")
                .with_context(|| format!("corrupt dob on profile '{}'", row.id))?,
            height: row.height,
            language: row.language,
            marital_status,
            religion: row.religion,
            ethnicity: row.ethnicity,
            caste: row.caste,
            country: row.country,
            state: row.state,
            city: row.city,
            family_status: row.family_status,
            family_type: row.family_type,
            family_values: row.family_values,
            education: row.education,
            employed_sector: row.employed_sector,
            job_title: row.job_title,
            annual_income: row.annual_income,
            profile_image: row.profile_image,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Self {
            id: parse_uuid(&row.id, "messages.id")?,
            sender_id: parse_uuid(&row.sender_id, "messages.sender_id")?,
            receiver_id: parse_uuid(&row.receiver_id, "messages.receiver_id")?,
            chat_id: row.chat_id,
            text: row.text,
            created_at: parse_timestamp(&row.created_at)?,
            seen_at: row.seen_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}
