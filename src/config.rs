//! Configuration types, read from the environment.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};

/// Default Gemini model used for replies.
pub const DEFAULT_AGENT_MODEL: &str = "gemini-2.0-flash";

/// Default WhatsApp Cloud API base URL.
pub const DEFAULT_WHATSAPP_API_BASE_URL: &str = "https://graph.facebook.com/v21.0";

/// Default Google API base URL (Calendar FreeBusy lives under it).
pub const DEFAULT_GOOGLE_API_BASE_URL: &str = "https://www.googleapis.com";

/// Default Google OAuth token endpoint.
pub const DEFAULT_GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP listen port.
    pub server_port: u16,
    pub whatsapp: WhatsAppConfig,
    pub database: DatabaseConfig,
    /// `None` when no AI API key is configured; the agent then answers with
    /// its fallback response.
    pub llm: Option<LlmConfig>,
    /// Fernet key used for OAuth tokens at rest.
    pub encryption_key: SecretString,
    /// Google OAuth client, needed to refresh calendar tokens.
    pub google: GoogleConfig,
    pub classifier: ClassifierConfig,
}

/// WhatsApp webhook and Cloud API settings.
#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    /// Token echoed back during the `hub.challenge` handshake.
    pub verify_token: SecretString,
    /// Meta app secret, the HMAC key for `X-Hub-Signature-256`.
    pub app_secret: SecretString,
    pub api_base_url: String,
}

/// Where the relational store lives.
#[derive(Debug, Clone)]
pub enum DatabaseConfig {
    /// Embedded libSQL file.
    Local { path: PathBuf },
    /// Remote libSQL server (`libsql://` / `https://`).
    Remote {
        url: String,
        auth_token: SecretString,
    },
}

impl DatabaseConfig {
    /// Interpret a `DATABASE_URL` value.
    pub fn from_url(url: &str, auth_token: Option<String>) -> Self {
        if url.starts_with("libsql://") || url.starts_with("https://") || url.starts_with("http://")
        {
            DatabaseConfig::Remote {
                url: url.to_string(),
                auth_token: SecretString::from(auth_token.unwrap_or_default()),
            }
        } else {
            let path = url
                .strip_prefix("sqlite://")
                .or_else(|| url.strip_prefix("file:"))
                .unwrap_or(url);
            DatabaseConfig::Local {
                path: PathBuf::from(path),
            }
        }
    }
}

/// Google OAuth / Calendar settings.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
    pub api_base_url: String,
    pub token_url: String,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            api_base_url: DEFAULT_GOOGLE_API_BASE_URL.to_string(),
            token_url: DEFAULT_GOOGLE_TOKEN_URL.to_string(),
        }
    }
}

/// Intent classifier settings.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Path of the trained model artifact (JSON).
    pub model_path: PathBuf,
    /// Below this top-class probability the message is treated as OTHER.
    pub confidence_threshold: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("./whatsapp_intent_model.json"),
            confidence_threshold: 0.6,
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment (after `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, "Failed to load .env file");
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.into()));

        let server_port = parse_or(get("PORT"), "PORT", 8080u16)?;

        let whatsapp = WhatsAppConfig {
            verify_token: SecretString::from(require("WHATSAPP_VERIFY_TOKEN")?),
            app_secret: SecretString::from(require("WHATSAPP_APP_SECRET")?),
            api_base_url: get("WHATSAPP_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_WHATSAPP_API_BASE_URL.to_string()),
        };

        let database =
            DatabaseConfig::from_url(&require("DATABASE_URL")?, get("DATABASE_AUTH_TOKEN"));

        let llm = match get("GOOGLE_ADK_API_KEY") {
            Some(api_key) => Some(LlmConfig {
                backend: LlmBackend::Gemini,
                api_key: SecretString::from(api_key),
                model: get("AGENT_MODEL").unwrap_or_else(|| DEFAULT_AGENT_MODEL.to_string()),
            }),
            None => {
                tracing::warn!("GOOGLE_ADK_API_KEY not set - agent will return fallback responses");
                None
            }
        };

        let encryption_key = SecretString::from(require("ENCRYPTION_KEY")?);

        let google = GoogleConfig {
            client_id: get("GOOGLE_CLIENT_ID"),
            client_secret: get("GOOGLE_CLIENT_SECRET").map(SecretString::from),
            ..GoogleConfig::default()
        };

        let defaults = ClassifierConfig::default();
        let confidence_threshold = parse_or(
            get("CLASSIFIER_CONFIDENCE_THRESHOLD"),
            "CLASSIFIER_CONFIDENCE_THRESHOLD",
            defaults.confidence_threshold,
        )?;
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(ConfigError::InvalidValue {
                key: "CLASSIFIER_CONFIDENCE_THRESHOLD".into(),
                message: format!("{confidence_threshold} is outside [0, 1]"),
            });
        }
        let classifier = ClassifierConfig {
            model_path: get("CLASSIFIER_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            confidence_threshold,
        };

        Ok(Self {
            server_port,
            whatsapp,
            database,
            llm,
            encryption_key,
            google,
            classifier,
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}
