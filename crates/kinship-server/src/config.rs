use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use anyhow::{Context, bail};
use tracing::info;

/// Placeholder JWT secrets that must not reach a running server.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub image_dir: PathBuf,
    /// Base URL clients use to reach this server; stored image links start with it
    pub public_url: String,
    pub jwt_secret: String,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let jwt_secret = env::var("KINSHIP_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("KINSHIP_JWT_SECRET is unset or still a placeholder; set it in .env and restart");
        }

        Ok(Self {
            host: try_load("KINSHIP_HOST", "0.0.0.0")?,
            port: try_load("KINSHIP_PORT", "3000")?,
            db_path: try_load("KINSHIP_DB_PATH", "kinship.db")?,
            image_dir: try_load("KINSHIP_IMAGE_DIR", "./images")?,
            public_url: try_load::<String>("KINSHIP_PUBLIC_URL", "http://localhost:3000")?
                .trim_end_matches('/')
                .to_string(),
            jwt_secret,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("invalid {key} value '{raw}'"))
}
