//! Process configuration, read once at startup from `cmis.toml` and `CMIS_*`
//! environment variables.
use std::net::SocketAddr;

use anyhow::{bail, Result};
use chrono::Duration;
use config::{Config, Environment, File};
use serde::Deserialize;

/// What happens to a freshly stored reset token when its email cannot be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryFailurePolicy {
    /// Clear the token again so no undeliverable token stays live.
    Rollback,
    /// Leave the token stored until it expires or is replaced.
    Keep,
}

impl Default for DeliveryFailurePolicy {
    fn default() -> Self {
        DeliveryFailurePolicy::Rollback
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Secret the session cookie is signed with.
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Prefix of the links sent in reset emails.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
    #[serde(default = "default_reset_token_ttl_minutes")]
    pub reset_token_ttl_minutes: i64,
    #[serde(default)]
    pub delivery_failure: DeliveryFailurePolicy,
    /// Answer reset requests for unknown emails like successful ones.
    #[serde(default)]
    pub uniform_reset_response: bool,
    #[serde(default)]
    pub seed_sample_data: bool,
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    #[serde(default)]
    pub mail_from: Option<String>,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_max_connections() -> u32 {
    5
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_session_ttl_hours() -> i64 {
    48
}

fn default_reset_token_ttl_minutes() -> i64 {
    60
}

fn default_smtp_port() -> u16 {
    587
}

pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            database_url: None,
            max_connections: default_max_connections(),
            secret_key: None,
            base_url: default_base_url(),
            session_ttl_hours: default_session_ttl_hours(),
            reset_token_ttl_minutes: default_reset_token_ttl_minutes(),
            delivery_failure: DeliveryFailurePolicy::default(),
            uniform_reset_response: false,
            seed_sample_data: false,
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            mail_from: None,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let settings: Settings = Config::builder()
            .add_source(File::with_name("cmis").required(false))
            .add_source(Environment::with_prefix("CMIS").try_parsing(true))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.session_ttl_hours <= 0 {
            bail!("session_ttl_hours must be positive");
        }
        if self.reset_token_ttl_minutes <= 0 {
            bail!("reset_token_ttl_minutes must be positive");
        }
        if self.base_url.trim().is_empty() {
            bail!("base_url must not be empty");
        }
        if let Some(secret) = &self.secret_key {
            if secret.len() < MIN_SECRET_LEN {
                bail!("secret_key must be at least {} bytes", MIN_SECRET_LEN);
            }
        }
        Ok(())
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::hours(self.session_ttl_hours)
    }

    pub fn reset_token_ttl(&self) -> Duration {
        Duration::minutes(self.reset_token_ttl_minutes)
    }

    pub fn reset_link(&self, token: &str) -> String {
        format!("{}/reset_password/{}", self.base_url.trim_end_matches('/'), token)
    }

    /// SMTP delivery is only configured when host, credentials and sender are all present.
    pub fn smtp(&self) -> Option<SmtpSettings> {
        Some(SmtpSettings {
            host: self.smtp_host.clone()?,
            port: self.smtp_port,
            username: self.smtp_username.clone()?,
            password: self.smtp_password.clone()?,
            from: self.mail_from.clone()?,
        })
    }
}
