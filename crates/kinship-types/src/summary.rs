//! Display text for the profile header and detail panels.

use serde::Serialize;

use crate::models::UserProfile;

pub const NOT_DEFINED: &str = "Not defined";

const CM_PER_INCH: f64 = 2.54;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileSummary {
    pub name: String,
    /// e.g. `25 Years, 5 Ft 7 In / 170 Cms`
    pub age_and_height: String,
    /// e.g. `Buddhist, (Caste No Bar)`
    pub religion: String,
    /// e.g. `Kandy, Central Province, Sri Lanka`
    pub location: String,
    /// e.g. `B.Sc IT, Software Engineer`
    pub career: String,
    pub religion_details: ReligionDetails,
}

/// The religion panel: each value on its own, `Not defined` when missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReligionDetails {
    pub religion: String,
    pub ethnicity: String,
    pub caste: String,
}

impl From<&UserProfile> for ReligionDetails {
    fn from(profile: &UserProfile) -> Self {
        Self {
            religion: or_not_defined(&profile.religion).to_string(),
            ethnicity: or_not_defined(&profile.ethnicity).to_string(),
            caste: or_not_defined(&profile.caste).to_string(),
        }
    }
}

impl From<&UserProfile> for ProfileSummary {
    fn from(profile: &UserProfile) -> Self {
        let years = format!("{} Years", profile.age.trunc() as u32);
        let height = profile.height.map_or_else(|| NOT_DEFINED.to_string(), format_height);
        let age_and_height = format!("{years}, {height}");

        let caste = profile.caste.as_deref().unwrap_or("No Bar");
        let religion = format!("{}, (Caste {caste})", or_not_defined(&profile.religion));

        let location = join_defined(&[&profile.city, &profile.state, &profile.country]);
        let career = join_defined(&[&profile.education, &profile.job_title]);

        Self {
            name: profile.name.clone(),
            age_and_height,
            religion,
            location,
            career,
            religion_details: ReligionDetails::from(profile),
        }
    }
}

/// `170.0` → `5 Ft 7 In / 170 Cms`
pub fn format_height(cm: f64) -> String {
    let total_inches = (cm / CM_PER_INCH).round() as u32;
    format!(
        "{} Ft {} In / {} Cms",
        total_inches / 12,
        total_inches % 12,
        cm.round() as u32
    )
}

pub fn or_not_defined(value: &Option<String>) -> &str {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => v,
        _ => NOT_DEFINED,
    }
}

fn join_defined(parts: &[&Option<String>]) -> String {
    let defined: Vec<&str> = parts
        .iter()
        .filter_map(|p| p.as_deref())
        .filter(|p| !p.trim().is_empty())
        .collect();
    if defined.is_empty() {
        NOT_DEFINED.to_string()
    } else {
        defined.join(", ")
    }
}
