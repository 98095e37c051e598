//! Configuration: explicit objects built from the environment at startup
//! and passed into constructors. No component reads ambient process state.

use secrecy::SecretString;

use crate::error::ConfigError;

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gemini: GeminiConfig,
    /// `None` when no IMAP host is configured; mail ingestion disabled.
    pub mail: Option<MailConfig>,
    pub db_path: String,
    pub bind_port: u16,
    /// Poll interval for the mailbox loop. `0` disables the loop
    /// (the manual fetch endpoint still works).
    pub poll_interval_secs: u64,
}

/// Gemini API configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: SecretString,
    pub model: String,
    /// Models tried in order when the primary model is unavailable.
    pub fallback_models: Vec<String>,
}

/// IMAP/SMTP mail transport configuration.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl AppConfig {
    /// Build the full configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("GEMINI_API_KEY".into()))?;

        let model =
            std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.0-flash".to_string());

        let fallback_models: Vec<String> = std::env::var("GEMINI_FALLBACK_MODELS")
            .unwrap_or_else(|_| "gemini-2.5-flash,gemini-2.5-pro".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let db_path = std::env::var("RFP_ASSIST_DB_PATH")
            .unwrap_or_else(|_| "./data/rfp-assist.db".to_string());

        let bind_port = parse_env_u16("RFP_ASSIST_PORT", 8080)?;
        let poll_interval_secs = std::env::var("MAIL_POLL_INTERVAL_SECS")
            .ok()
            .map(|s| {
                s.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                    key: "MAIL_POLL_INTERVAL_SECS".into(),
                    message: e.to_string(),
                })
            })
            .transpose()?
            .unwrap_or(300);

        Ok(Self {
            gemini: GeminiConfig {
                api_key: SecretString::from(api_key),
                model,
                fallback_models,
            },
            mail: MailConfig::from_env()?,
            db_path,
            bind_port,
            poll_interval_secs,
        })
    }
}

impl MailConfig {
    /// Build mail config from environment variables.
    /// Returns `Ok(None)` if `MAIL_IMAP_HOST` is not set (mail disabled).
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Ok(imap_host) = std::env::var("MAIL_IMAP_HOST") else {
            return Ok(None);
        };

        let imap_port = parse_env_u16("MAIL_IMAP_PORT", 993)?;
        let smtp_host =
            std::env::var("MAIL_SMTP_HOST").unwrap_or_else(|_| imap_host.replace("imap", "smtp"));
        let smtp_port = parse_env_u16("MAIL_SMTP_PORT", 587)?;

        let username = std::env::var("MAIL_USERNAME")
            .map_err(|_| ConfigError::MissingEnvVar("MAIL_USERNAME".into()))?;
        let password = std::env::var("MAIL_PASSWORD")
            .map_err(|_| ConfigError::MissingEnvVar("MAIL_PASSWORD".into()))?;
        let from_address =
            std::env::var("MAIL_FROM_ADDRESS").unwrap_or_else(|_| username.clone());

        Ok(Some(Self {
            imap_host,
            imap_port,
            smtp_host,
            smtp_port,
            username,
            password: SecretString::from(password),
            from_address,
        }))
    }
}

fn parse_env_u16(key: &str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(key) {
        Ok(s) => s.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.into(),
            message: format!("expected a port number, got {s:?}"),
        }),
        Err(_) => Ok(default),
    }
}
