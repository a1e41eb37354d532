//! Turns string-typed form submissions into validated profile values.

use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use thiserror::Error;

use kinship_types::api::ProfileForm;
use kinship_types::models::{Gender, MaritalStatus, NewProfile, ProfileUpdate};

const MAX_NAME_LEN: usize = 100;
const MAX_TEXT_LEN: usize = 100;
const MIN_AGE: f64 = 18.0;
const MAX_AGE: f64 = 100.0;
const MIN_HEIGHT_CM: f64 = 100.0;
const MAX_HEIGHT_CM: f64 = 250.0;

/// The first field that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid field '{0}'")]
pub struct FieldError(pub &'static str);

type FieldResult<T> = Result<T, FieldError>;

/// The detail panels that can be edited independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSection {
    Basic,
    Religion,
    Location,
    Professional,
    Family,
}

impl FromStr for ProfileSection {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Self::Basic),
            "religion" => Ok(Self::Religion),
            "location" => Ok(Self::Location),
            "professional" => Ok(Self::Professional),
            "family" => Ok(Self::Family),
            _ => Err(FieldError("section")),
        }
    }
}

pub fn validate_profile(form: &ProfileForm) -> FieldResult<NewProfile> {
    Ok(NewProfile {
        name: required_name(&form.name)?,
        age: required_age(&form.age)?,
        gender: form
            .gender
            .as_deref()
            .ok_or(FieldError("gender"))?
            .parse::<Gender>()
            .map_err(|_| FieldError("gender"))?,
        dob: required_dob(&form.dob)?,
        height: height(&form.height)?,
        language: language(&form.language)?,
        marital_status: marital_status(&form.marital_status)?,
        religion: text(&form.religion, "religion")?,
        ethnicity: text(&form.ethnicity, "ethnicity")?,
        caste: text(&form.caste, "caste")?,
        country: text(&form.country, "country")?,
        state: text(&form.state, "state")?,
        city: text(&form.city, "city")?,
        family_status: text(&form.family_status, "family_status")?,
        family_type: text(&form.family_type, "family_type")?,
        family_values: text(&form.family_values, "family_values")?,
        education: text(&form.education, "education")?,
        employed_sector: text(&form.employed_sector, "employed_sector")?,
        job_title: text(&form.job_title, "job_title")?,
        annual_income: annual_income(&form.annual_income)?,
        profile_image: profile_image(&form.profile_image)?,
    })
}

/// Validate the fields of one section. Fields of other sections are ignored.
pub fn validate_section(section: ProfileSection, form: &ProfileForm) -> FieldResult<ProfileUpdate> {
    Ok(match section {
        ProfileSection::Basic => ProfileUpdate::Basic {
            name: required_name(&form.name)?,
            age: required_age(&form.age)?,
            dob: required_dob(&form.dob)?,
            height: height(&form.height)?,
            language: language(&form.language)?,
            marital_status: marital_status(&form.marital_status)?,
        },
        ProfileSection::Religion => ProfileUpdate::Religion {
            religion: text(&form.religion, "religion")?,
            ethnicity: text(&form.ethnicity, "ethnicity")?,
            caste: text(&form.caste, "caste")?,
        },
        ProfileSection::Location => ProfileUpdate::Location {
            country: text(&form.country, "country")?,
            state: text(&form.state, "state")?,
            city: text(&form.city, "city")?,
        },
        ProfileSection::Professional => ProfileUpdate::Professional {
            education: text(&form.education, "education")?,
            employed_sector: text(&form.employed_sector, "employed_sector")?,
            job_title: text(&form.job_title, "job_title")?,
            annual_income: annual_income(&form.annual_income)?,
        },
        ProfileSection::Family => ProfileUpdate::Family {
            family_status: text(&form.family_status, "family_status")?,
            family_type: text(&form.family_type, "family_type")?,
            family_values: text(&form.family_values, "family_values")?,
        },
    })
}

/// `http(s)` URLs and base64 image data URLs.
pub fn is_acceptable_image_ref(value: &str) -> bool {
    value.starts_with("https://") || value.starts_with("http://") || is_base64_image(value)
}

pub fn is_base64_image(value: &str) -> bool {
    value.starts_with("data:image/") && value.contains(";base64,")
}

/// Trimmed, empty treated as absent, bounded length.
fn text(value: &Option<String>, field: &'static str) -> FieldResult<Option<String>> {
    let Some(v) = value.as_deref().map(str::trim) else {
        return Ok(None);
    };
    if v.is_empty() {
        return Ok(None);
    }
    if v.chars().count() > MAX_TEXT_LEN {
        return Err(FieldError(field));
    }
    Ok(Some(v.to_string()))
}

fn number(value: &Option<String>, field: &'static str) -> FieldResult<Option<f64>> {
    let Some(v) = value.as_deref().map(str::trim) else {
        return Ok(None);
    };
    if v.is_empty() {
        return Ok(None);
    }
    let n: f64 = v.parse().map_err(|_| FieldError(field))?;
    if !n.is_finite() {
        return Err(FieldError(field));
    }
    Ok(Some(n))
}

fn required_name(value: &Option<String>) -> FieldResult<String> {
    let name = value.as_deref().map(str::trim).unwrap_or_default();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(FieldError("name"));
    }
    Ok(name.to_string())
}

fn required_age(value: &Option<String>) -> FieldResult<f64> {
    match number(value, "age")? {
        Some(age) if (MIN_AGE..=MAX_AGE).contains(&age) => Ok(age),
        _ => Err(FieldError("age")),
    }
}

fn required_dob(value: &Option<String>) -> FieldResult<NaiveDate> {
    let raw = value.as_deref().map(str::trim).ok_or(FieldError("dob"))?;
    // Accept a full ISO timestamp too; only the date part matters
    let date_part = raw.get(..10).unwrap_or(raw);
    let dob = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| FieldError("dob"))?;
    if dob > Utc::now().date_naive() {
        return Err(FieldError("dob"));
    }
    Ok(dob)
}

fn height(value: &Option<String>) -> FieldResult<Option<f64>> {
    match number(value, "height")? {
        Some(cm) if !(MIN_HEIGHT_CM..=MAX_HEIGHT_CM).contains(&cm) => Err(FieldError("height")),
        other => Ok(other),
    }
}

fn annual_income(value: &Option<String>) -> FieldResult<Option<f64>> {
    match number(value, "annual_income")? {
        Some(income) if income < 0.0 => Err(FieldError("annual_income")),
        other => Ok(other),
    }
}

fn language(value: &Option<String>) -> FieldResult<Option<String>> {
    Ok(text(value, "language")?.map(|l| l.to_lowercase()))
}

fn marital_status(value: &Option<String>) -> FieldResult<Option<MaritalStatus>> {
    text(value, "marital_status")?
        .map(|v| v.parse::<MaritalStatus>().map_err(|_| FieldError("marital_status")))
        .transpose()
}

fn profile_image(value: &Option<String>) -> FieldResult<Option<String>> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) if is_acceptable_image_ref(v) => Ok(Some(v.to_string())),
        Some(_) => Err(FieldError("profile_image")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> ProfileForm {
        ProfileForm {
            name: Some("  Nimali Perera ".into()),
            age: Some("26".into()),
            gender: Some("female".into()),
            dob: Some("1999-04-12".into()),
            height: Some("162.5".into()),
            language: Some("Sinhala".into()),
            marital_status: Some("Never Married".into()),
            religion: Some("Buddhist".into()),
            annual_income: Some("1500000".into()),
            ..ProfileForm::default()
        }
    }

    #[test]
    fn valid_form_is_normalized() {
        let p = validate_profile(&form()).unwrap();
        assert_eq!(p.name, "Nimali Perera");
        assert_eq!(p.age, 26.0);
        assert_eq!(p.gender, Gender::Female);
        assert_eq!(p.height, Some(162.5));
        assert_eq!(p.language.as_deref(), Some("sinhala"));
        assert_eq!(p.marital_status, Some(MaritalStatus::NeverMarried));
        assert_eq!(p.annual_income, Some(1_500_000.0));
        assert_eq!(p.caste, None);
    }

    #[test]
    fn required_fields_are_enforced() {
        for field in ["name", "age", "gender", "dob"] {
            let mut f = form();
            match field {
                "name" => f.name = Some("   ".into()),
                "age" => f.age = None,
                "gender" => f.gender = Some("unknown".into()),
                _ => f.dob = None,
            }
            assert_eq!(validate_profile(&f), Err(FieldError(field)));
        }
    }

    #[test]
    fn numbers_are_range_checked() {
        let mut f = form();
        f.age = Some("17".into());
        assert_eq!(validate_profile(&f), Err(FieldError("age")));

        let mut f = form();
        f.age = Some("twenty".into());
        assert_eq!(validate_profile(&f), Err(FieldError("age")));

        let mut f = form();
        f.height = Some("400".into());
        assert_eq!(validate_profile(&f), Err(FieldError("height")));

        let mut f = form();
        f.annual_income = Some("-1".into());
        assert_eq!(validate_profile(&f), Err(FieldError("annual_income")));

        let mut f = form();
        f.height = Some("".into());
        assert_eq!(validate_profile(&f).unwrap().height, None);
    }

    #[test]
    fn future_birth_dates_are_rejected() {
        let mut f = form();
        f.dob = Some("2999-01-01".into());
        assert_eq!(validate_profile(&f), Err(FieldError("dob")));

        let mut f = form();
        f.dob = Some("1999-04-12T00:00:00.000Z".into());
        assert!(validate_profile(&f).is_ok());
    }

    #[test]
    fn profile_image_must_be_url_or_data_url() {
        let mut f = form();
        f.profile_image = Some("ftp://x/y.png".into());
        assert_eq!(validate_profile(&f), Err(FieldError("profile_image")));

        f.profile_image = Some("data:image/png;base64,AAAA".into());
        assert!(validate_profile(&f).is_ok());
        f.profile_image = Some("https://utfs.io/f/abc.png".into());
        assert!(validate_profile(&f).is_ok());
    }

    #[test]
    fn sections_only_look_at_their_fields() {
        let f = ProfileForm {
            city: Some("Kandy".into()),
            age: Some("not a number".into()),
            ..ProfileForm::default()
        };
        let update = validate_section(ProfileSection::Location, &f).unwrap();
        assert_eq!(
            update,
            ProfileUpdate::Location {
                country: None,
                state: None,
                city: Some("Kandy".into()),
            }
        );
        assert_eq!(validate_section(ProfileSection::Basic, &f), Err(FieldError("name")));
        assert_eq!("hobbies".parse::<ProfileSection>(), Err(FieldError("section")));
    }

    #[test]
    fn field_errors_name_the_field() {
        assert_eq!(FieldError("dob").to_string(), "invalid field 'dob'");
    }
}
