use anyhow::Result;
use rusqlite::{Connection, Row, ToSql};

use kinship_types::models::{Gender, NewProfile, ProfileUpdate};

use crate::models::{ProfileRow, now_timestamp};
use crate::queries::OptionalExt;
use crate::Database;

const PROFILE_COLUMNS: &str = "id, user_id, name, age, gender, dob, height, language, marital_status,
    religion, ethnicity, caste, country, state, city, family_status, family_type, family_values,
    education, employed_sector, job_title, annual_income, profile_image, created_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateProfileOutcome {
    Created,
    AlreadyExists,
}

/// Result of swapping the profile image. `previous` is the image the
/// profile had before the write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoChange {
    pub previous: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileFilter {
    pub gender: Option<Gender>,
    pub religion: Option<String>,
    pub min_age: Option<f64>,
    pub max_age: Option<f64>,
}

impl Database {
    /// Insert the profile and clear the user's `is_new_user` flag in one
    /// transaction. The existence check runs inside the same transaction.
    pub fn create_profile(&self, id: &str, user_id: &str, p: &NewProfile) -> Result<CreateProfileOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if profile_id_for_user(&tx, user_id)?.is_some() {
                return Ok(CreateProfileOutcome::AlreadyExists);
            }

            let now = now_timestamp();
            tx.execute(
                "INSERT INTO user_profiles (
                    id, user_id, name, age, gender, dob, height, language, marital_status,
                    religion, ethnicity, caste, country, state, city,
                    family_status, family_type, family_values,
                    education, employed_sector, job_title, annual_income, profile_image,
                    created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                         ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?24)",
                rusqlite::params![
                    id,
                    user_id,
                    p.name,
                    p.age,
                    p.gender.as_str(),
                    p.dob.format("%Y-%m-%d").to_string(),
                    p.height,
                    p.language,
                    p.marital_status.map(|m| m.as_str()),
                    p.religion,
                    p.ethnicity,
                    p.caste,
                    p.country,
                    p.state,
                    p.city,
                    p.family_status,
                    p.family_type,
                    p.family_values,
                    p.education,
                    p.employed_sector,
                    p.job_title,
                    p.annual_income,
                    p.profile_image,
                    now,
                ],
            )?;

            tx.execute(
                "UPDATE users SET is_new_user = 0, image = COALESCE(?2, image) WHERE id = ?1",
                (user_id, p.profile_image.as_deref()),
            )?;

            tx.commit()?;
            Ok(CreateProfileOutcome::Created)
        })
    }

    pub fn get_profile_by_user(&self, user_id: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE user_id = ?1");
            conn.query_row(&sql, [user_id], profile_from_row).optional()
        })
    }

    pub fn get_profile(&self, id: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE id = ?1");
            conn.query_row(&sql, [id], profile_from_row).optional()
        })
    }

    pub fn has_profile(&self, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(profile_id_for_user(conn, user_id)?.is_some()))
    }

    /// Profiles other than the viewer's, newest first.
    pub fn browse_profiles(&self, viewer_id: &str, filter: &ProfileFilter, limit: u32) -> Result<Vec<ProfileRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {PROFILE_COLUMNS} FROM user_profiles
                 WHERE user_id <> ?1
                   AND (?2 IS NULL OR gender = ?2)
                   AND (?3 IS NULL OR lower(religion) = lower(?3))
                   AND (?4 IS NULL OR age >= ?4)
                   AND (?5 IS NULL OR age <= ?5)
                 ORDER BY created_at DESC
                 LIMIT ?6"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![
                        viewer_id,
                        filter.gender.map(|g| g.as_str()),
                        filter.religion,
                        filter.min_age,
                        filter.max_age,
                        limit
                    ],
                    profile_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Apply one section edit. Returns false when the user has no profile.
    pub fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<bool> {
        let (assignments, values) = section_assignments(update);

        self.with_conn(|conn| {
            let set_clause = assignments
                .iter()
                .enumerate()
                .map(|(i, column)| format!("{column} = ?{}", i + 3))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!("UPDATE user_profiles SET updated_at = ?2, {set_clause} WHERE user_id = ?1");

            let now = now_timestamp();
            let mut params: Vec<&dyn ToSql> = vec![&user_id, &now];
            params.extend(values.iter().map(|v| v.as_ref()));

            let n = conn.execute(&sql, params.as_slice())?;
            Ok(n > 0)
        })
    }

    /// Point the profile (and the user record) at `image`, or clear both when
    /// `image` is None. Returns None when the user has no profile.
    pub fn set_profile_image(&self, user_id: &str, image: Option<&str>) -> Result<Option<PhotoChange>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let previous: Option<Option<String>> = tx
                .query_row(
                    "SELECT profile_image FROM user_profiles WHERE user_id = ?1",
                    [user_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(previous) = previous else {
                return Ok(None);
            };

            tx.execute(
                "UPDATE user_profiles SET profile_image = ?2, updated_at = ?3 WHERE user_id = ?1",
                (user_id, image, now_timestamp()),
            )?;
            tx.execute("UPDATE users SET image = ?2 WHERE id = ?1", (user_id, image))?;

            tx.commit()?;
            Ok(Some(PhotoChange { previous }))
        })
    }
}

fn profile_id_for_user(conn: &Connection, user_id: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT id FROM user_profiles WHERE user_id = ?1",
        [user_id],
        |row| row.get(0),
    )
    .optional()
}

/// Column names and values written by a section edit.
fn section_assignments(update: &ProfileUpdate) -> (Vec<&'static str>, Vec<Box<dyn ToSql>>) {
    match update {
        ProfileUpdate::Basic {
            name,
            age,
            dob,
            height,
            language,
            marital_status,
        } => (
            vec!["name", "age", "dob", "height", "language", "marital_status"],
            vec![
                Box::new(name.clone()),
                Box::new(*age),
                Box::new(dob.format("%Y-%m-%d").to_string()),
                Box::new(*height),
                Box::new(language.clone()),
                Box::new(marital_status.map(|m| m.as_str())),
            ],
        ),
        ProfileUpdate::Religion {
            religion,
            ethnicity,
            caste,
        } => (
            vec!["religion", "ethnicity", "caste"],
            vec![
                Box::new(religion.clone()),
                Box::new(ethnicity.clone()),
                Box::new(caste.clone()),
            ],
        ),
        ProfileUpdate::Location {
            country,
            state,
            city,
        } => (
            vec!["country", "state", "city"],
            vec![
                Box::new(country.clone()),
                Box::new(state.clone()),
                Box::new(city.clone()),
            ],
        ),
        ProfileUpdate::Professional {
            education,
            employed_sector,
            job_title,
            annual_income,
        } => (
            vec!["education", "employed_sector", "job_title", "annual_income"],
            vec![
                Box::new(education.clone()),
                Box::new(employed_sector.clone()),
                Box::new(job_title.clone()),
                Box::new(*annual_income),
            ],
        ),
        ProfileUpdate::Family {
            family_status,
            family_type,
            family_values,
        } => (
            vec!["family_status", "family_type", "family_values"],
            vec![
                Box::new(family_status.clone()),
                Box::new(family_type.clone()),
                Box::new(family_values.clone()),
            ],
        ),
    }
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        age: row.get(3)?,
        gender: row.get(4)?,
        dob: row.get(5)?,
        height: row.get(6)?,
        language: row.get(7)?,
        marital_status: row.get(8)?,
        religion: row.get(9)?,
        ethnicity: row.get(10)?,
        caste: row.get(11)?,
        country: row.get(12)?,
        state: row.get(13)?,
        city: row.get(14)?,
        family_status: row.get(15)?,
        family_type: row.get(16)?,
        family_values: row.get(17)?,
        education: row.get(18)?,
        employed_sector: row.get(19)?,
        job_title: row.get(20)?,
        annual_income: row.get(21)?,
        profile_image: row.get(22)?,
        created_at: row.get(23)?,
        updated_at: row.get(24)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use kinship_types::models::{MaritalStatus, UserProfile};

    use super::*;

    fn seed_user(db: &Database, id: &str) {
        db.create_user(id, &format!("{id}@example.com"), id, "hash").unwrap();
    }

    fn new_profile(name: &str, gender: Gender, age: f64) -> NewProfile {
        NewProfile {
            name: name.into(),
            age,
            gender,
            dob: NaiveDate::from_ymd_opt(1998, 6, 15).unwrap(),
            height: Some(165.0),
            language: Some("sinhala".into()),
            marital_status: Some(MaritalStatus::NeverMarried),
            religion: Some("Buddhist".into()),
            ethnicity: None,
            caste: None,
            country: Some("Sri Lanka".into()),
            state: None,
            city: Some("Kandy".into()),
            family_status: None,
            family_type: None,
            family_values: None,
            education: None,
            employed_sector: None,
            job_title: None,
            annual_income: Some(1_200_000.0),
            profile_image: None,
        }
    }

    #[test]
    fn create_profile_clears_new_user_flag_once() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1");

        let outcome = db.create_profile("p1", "u1", &new_profile("Nimali", Gender::Female, 26.0)).unwrap();
        assert_eq!(outcome, CreateProfileOutcome::Created);
        assert!(!db.get_user_by_id("u1").unwrap().unwrap().is_new_user);

        let again = db.create_profile("p2", "u1", &new_profile("Other", Gender::Female, 30.0)).unwrap();
        assert_eq!(again, CreateProfileOutcome::AlreadyExists);
        assert!(db.get_profile("p2").unwrap().is_none());

        let row = db.get_profile_by_user("u1").unwrap().unwrap();
        let profile = UserProfile::try_from(row).unwrap();
        assert_eq!(profile.name, "Nimali");
        assert_eq!(profile.marital_status, Some(MaritalStatus::NeverMarried));
    }

    #[test]
    fn failed_profile_insert_leaves_user_untouched() {
        let db = Database::open_in_memory().unwrap();
        // No such user: the foreign key rejects the insert and the whole
        // transaction rolls back.
        assert!(db.create_profile("p1", "ghost", &new_profile("X", Gender::Male, 30.0)).is_err());
        assert!(db.get_profile("p1").unwrap().is_none());

        seed_user(&db, "u1");
        // Duplicate profile id collides on the primary key after u1 is checked.
        db.create_profile("p1", "u1", &new_profile("A", Gender::Male, 30.0)).unwrap();
        seed_user(&db, "u2");
        assert!(db.create_profile("p1", "u2", &new_profile("B", Gender::Male, 30.0)).is_err());
        assert!(db.get_user_by_id("u2").unwrap().unwrap().is_new_user);
    }

    #[test]
    fn section_update_touches_only_its_columns() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1");
        db.create_profile("p1", "u1", &new_profile("Nimali", Gender::Female, 26.0)).unwrap();

        let updated = db
            .update_profile(
                "u1",
                &ProfileUpdate::Religion {
                    religion: Some("Christian".into()),
                    ethnicity: Some("Sinhalese".into()),
                    caste: None,
                },
            )
            .unwrap();
        assert!(updated);

        let profile = UserProfile::try_from(db.get_profile("p1").unwrap().unwrap()).unwrap();
        assert_eq!(profile.religion.as_deref(), Some("Christian"));
        assert_eq!(profile.ethnicity.as_deref(), Some("Sinhalese"));
        assert_eq!(profile.city.as_deref(), Some("Kandy"));

        let missing = db
            .update_profile(
                "nobody",
                &ProfileUpdate::Location {
                    country: None,
                    state: None,
                    city: None,
                },
            )
            .unwrap();
        assert!(!missing);
    }

    #[test]
    fn set_profile_image_reports_previous_and_syncs_user() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1");
        assert_eq!(db.set_profile_image("u1", Some("http://x/1.png")).unwrap(), None);

        db.create_profile("p1", "u1", &new_profile("Nimali", Gender::Female, 26.0)).unwrap();

        let first = db.set_profile_image("u1", Some("http://x/1.png")).unwrap().unwrap();
        assert_eq!(first.previous, None);
        let second = db.set_profile_image("u1", Some("http://x/2.png")).unwrap().unwrap();
        assert_eq!(second.previous.as_deref(), Some("http://x/1.png"));
        assert_eq!(db.get_user_by_id("u1").unwrap().unwrap().image.as_deref(), Some("http://x/2.png"));

        let cleared = db.set_profile_image("u1", None).unwrap().unwrap();
        assert_eq!(cleared.previous.as_deref(), Some("http://x/2.png"));
        assert!(db.get_profile("p1").unwrap().unwrap().profile_image.is_none());
        assert!(db.get_user_by_id("u1").unwrap().unwrap().image.is_none());
    }

    #[test]
    fn browse_filters_and_excludes_viewer() {
        let db = Database::open_in_memory().unwrap();
        for id in ["me", "a", "b", "c"] {
            seed_user(&db, id);
        }
        db.create_profile("pm", "me", &new_profile("Me", Gender::Male, 30.0)).unwrap();
        db.create_profile("pa", "a", &new_profile("A", Gender::Female, 24.0)).unwrap();
        db.create_profile("pb", "b", &new_profile("B", Gender::Female, 35.0)).unwrap();
        db.create_profile("pc", "c", &new_profile("C", Gender::Male, 28.0)).unwrap();

        let filter = ProfileFilter {
            gender: Some(Gender::Female),
            religion: Some("buddhist".into()),
            min_age: None,
            max_age: Some(30.0),
        };
        let rows = db.browse_profiles("me", &filter, 20).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "pa");

        let all = db.browse_profiles("me", &ProfileFilter::default(), 20).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|r| r.user_id != "me"));
    }
}
