//! Error types for the Kerjasama agent.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Calendar error: {0}")]
    Calendar(#[from] CalendarError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Outbound messaging errors (WhatsApp Cloud API).
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Intent classifier errors.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("No trained model found at '{path}'. Run: kerjasama-agent train --output {path}")]
    ModelNotFound { path: String },

    #[error("Invalid model artifact: {0}")]
    InvalidModel(String),

    #[error("Training failed: {0}")]
    Training(String),

    #[error("Model serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Token encryption errors.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("Failed to decrypt token")]
    DecryptionFailed,

    #[error("Decrypted token is not valid UTF-8")]
    InvalidUtf8,
}

/// Google Calendar / OAuth errors.
#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("Failed to obtain valid credentials: {0}")]
    Credentials(String),

    #[error("Calendar API request failed: {0}")]
    Request(String),

    #[error("Calendar API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid calendar response: {0}")]
    InvalidResponse(String),
}

/// Errors surfaced by the webhook HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Invalid HMAC signature")]
    InvalidSignature,

    #[error("Forbidden")]
    VerificationFailed,

    #[error("Invalid JSON: {0}")]
    InvalidPayload(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WebhookError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::InvalidSignature | WebhookError::VerificationFailed => {
                StatusCode::FORBIDDEN
            }
            WebhookError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            WebhookError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(serde_json::json!({ "detail": self.to_string() }))).into_response()
    }
}
