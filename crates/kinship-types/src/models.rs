use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub image: Option<String>,
    pub is_new_user: bool,
    pub created_at: DateTime<Utc>,
}

/// The part of a user that other users get to see (friends, chat partners).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            image: user.image,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaritalStatus {
    NeverMarried,
    Divorced,
    Widowed,
    Separated,
    AwaitingDivorce,
}

impl MaritalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NeverMarried => "never_married",
            Self::Divorced => "divorced",
            Self::Widowed => "widowed",
            Self::Separated => "separated",
            Self::AwaitingDivorce => "awaiting_divorce",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown value '{0}'")]
pub struct UnknownVariant(pub String);

impl FromStr for Gender {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(Self::Male),
            "female" => Ok(Self::Female),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl FromStr for MaritalStatus {
    type Err = UnknownVariant;

    /// Accepts both the stored form (`never_married`) and the labels the
    /// profile form uses (`Never Married`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "never_married" | "single" => Ok(Self::NeverMarried),
            "divorced" => Ok(Self::Divorced),
            "widowed" => Ok(Self::Widowed),
            "separated" => Ok(Self::Separated),
            "awaiting_divorce" => Ok(Self::AwaitingDivorce),
            _ => Err(UnknownVariant(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub age: f64,
    pub gender: Gender,
    pub dob: NaiveDate,
    /// Centimetres.
    pub height: Option<f64>,
    pub language: Option<String>,
    pub marital_status: Option<MaritalStatus>,
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A validated profile ready to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProfile {
    pub name: String,
    pub age: f64,
    pub gender: Gender,
    pub dob: NaiveDate,
    pub height: Option<f64>,
    pub language: Option<String>,
    pub marital_status: Option<MaritalStatus>,
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
}

/// A validated edit of one profile detail panel.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileUpdate {
    Basic {
        name: String,
        age: f64,
        dob: NaiveDate,
        height: Option<f64>,
        language: Option<String>,
        marital_status: Option<MaritalStatus>,
    },
    Religion {
        religion: Option<String>,
        ethnicity: Option<String>,
        caste: Option<String>,
    },
    Location {
        country: Option<String>,
        state: Option<String>,
        city: Option<String>,
    },
    Professional {
        education: Option<String>,
        employed_sector: Option<String>,
        job_title: Option<String>,
        annual_income: Option<f64>,
    },
    Family {
        family_status: Option<String>,
        family_type: Option<String>,
        family_values: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub chat_id: String,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub seen_at: Option<DateTime<Utc>>,
}

/// A message as pushed to the receiver's chat list, carrying enough of the
/// sender to render a notification without another lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedMessage {
    #[serde(flatten)]
    pub message: Message,
    pub sender_img: Option<String>,
    pub sender_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marital_status_accepts_form_labels() {
        assert_eq!("Never Married".parse(), Ok(MaritalStatus::NeverMarried));
        assert_eq!("awaiting-divorce".parse(), Ok(MaritalStatus::AwaitingDivorce));
        assert_eq!("widowed".parse(), Ok(MaritalStatus::Widowed));
        assert!("engaged".parse::<MaritalStatus>().is_err());
    }

    #[test]
    fn gender_is_case_insensitive() {
        assert_eq!(" Female ".parse(), Ok(Gender::Female));
        assert!("x".parse::<Gender>().is_err());
    }

    #[test]
    fn extended_message_flattens_message_fields() {
        let msg = ExtendedMessage {
            message: Message {
                id: Uuid::nil(),
                chat_id: "a--b".into(),
                sender_id: Uuid::nil(),
                receiver_id: Uuid::nil(),
                text: "hi".into(),
                created_at: DateTime::default(),
                seen_at: None,
            },
            sender_img: None,
            sender_name: "Nimal".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["text"], "hi");
        assert_eq!(json["sender_name"], "Nimal");
        assert!(json.get("message").is_none());
    }

    #[test]
    fn unknown_labels_name_the_value() {
        let err = "Engaged".parse::<MaritalStatus>().unwrap_err();
        assert_eq!(err.to_string(), "unknown value 'Engaged'");
        let as_error: &dyn std::error::Error = &err;
        assert!(as_error.source().is_none());
    }
}
