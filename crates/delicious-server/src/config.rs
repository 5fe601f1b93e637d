use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use tracing::info;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub public_url: String,
    pub mail_from: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let jwt_secret = env::var("DELICIOUS_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("DELICIOUS_JWT_SECRET is unset or still a placeholder; set it in .env and restart");
        }

        let port: u16 = try_load("DELICIOUS_PORT", "7777")?;

        Ok(Self {
            host: try_load("DELICIOUS_HOST", "0.0.0.0")?,
            db_path: try_load("DELICIOUS_DB_PATH", "delicious.db")?,
            public_url: try_load("DELICIOUS_PUBLIC_URL", &format!("http://localhost:{}", port))?,
            mail_from: try_load("DELICIOUS_MAIL_FROM", "Delicious <noreply@delicious.local>")?,
            jwt_secret,
            port,
        })
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse()
        .map_err(|e| anyhow::anyhow!("{}", e))
        .with_context(|| format!("Invalid {key} value: {raw}"))
}
