//! Persisted domain records: users, businesses, OAuth tokens, messages.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DatabaseError;

/// Implements `Display`/`FromStr` over a fixed set of upper-case DB strings.
macro_rules! db_enum {
    ($name:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(DatabaseError::Constraint(format!(
                        "Invalid {}: {other}",
                        $label
                    ))),
                }
            }
        }
    };
}

// ── Users ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum UserStatus {
    #[default]
    Onboarding,
    Active,
    Suspended,
}

db_enum!(UserStatus, "user status", {
    Onboarding => "ONBOARDING",
    Active => "ACTIVE",
    Suspended => "SUSPENDED",
});

/// An account owner (the business operator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Businesses ──────────────────────────────────────────────────────

/// How generated replies should speak for the business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AiVoice {
    /// "I", for a solo professional.
    FirstPerson,
    /// Third person, by business name.
    Name,
    /// "we", for a team.
    We,
}

db_enum!(AiVoice, "ai_voice", {
    FirstPerson => "FIRST_PERSON",
    Name => "NAME",
    We => "WE",
});

/// Whether inbound messages for a business are processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WorkflowStatus {
    Active,
    #[default]
    Disabled,
}

db_enum!(WorkflowStatus, "workflow_status", {
    Active => "ACTIVE",
    Disabled => "DISABLED",
});

/// A business profile, one per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Business {
    pub id: Uuid,
    pub user_id: Uuid,
    pub owner_name: Option<String>,
    pub business_name: Option<String>,
    pub business_type: Option<String>,
    pub location: Option<String>,
    pub business_description: Option<String>,
    pub ai_voice: Option<AiVoice>,
    pub show_ai_disclaimer: bool,
    pub pricing_packages: Option<String>,
    pub instagram_handle: Option<String>,
    pub website_url: Option<String>,
    pub whatsapp_number: Option<String>,
    pub whatsapp_business_account_id: Option<String>,
    pub workflow_status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Business {
    /// A disabled business with no profile fields set.
    pub fn new(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            owner_name: None,
            business_name: None,
            business_type: None,
            location: None,
            business_description: None,
            ai_voice: None,
            show_ai_disclaimer: true,
            pricing_packages: None,
            instagram_handle: None,
            website_url: None,
            whatsapp_number: None,
            whatsapp_business_account_id: None,
            workflow_status: WorkflowStatus::Disabled,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.workflow_status == WorkflowStatus::Active
    }
}

// ── OAuth tokens ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OAuthProvider {
    GoogleCalendar,
    WhatsApp,
}

db_enum!(OAuthProvider, "oauth provider", {
    GoogleCalendar => "GOOGLE_CALENDAR",
    WhatsApp => "WHATSAPP",
});

/// Third-party credentials for a user. Token fields are Fernet ciphertext at
/// rest; see [`crate::crypto::TokenCipher::reveal`].
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuthToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: OAuthProvider,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expiry: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OAuthToken {
    pub fn new(user_id: Uuid, provider: OAuthProvider, access_token: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            provider,
            access_token: access_token.into(),
            refresh_token: None,
            token_expiry: None,
            scope: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthToken")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("provider", &self.provider)
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("token_expiry", &self.token_expiry)
            .finish()
    }
}

// ── Message log ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

db_enum!(MessageDirection, "message direction", {
    Inbound => "INBOUND",
    Outbound => "OUTBOUND",
});

/// One WhatsApp message, received or sent.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: Uuid,
    /// WhatsApp message ID (`wamid.*`) for inbound messages.
    pub external_id: Option<String>,
    pub business_id: Uuid,
    pub direction: MessageDirection,
    pub sender: String,
    pub recipient: String,
    pub content: String,
    pub intent: Option<String>,
    pub confidence: Option<f32>,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn inbound(
        external_id: &str,
        business_id: Uuid,
        sender: &str,
        recipient: &str,
        content: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_id: Some(external_id.to_string()),
            business_id,
            direction: MessageDirection::Inbound,
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            content: content.to_string(),
            intent: None,
            confidence: None,
            created_at: Utc::now(),
        }
    }

    pub fn outbound(business_id: Uuid, sender: &str, recipient: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_id: None,
            business_id,
            direction: MessageDirection::Outbound,
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            content: content.to_string(),
            intent: None,
            confidence: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_intent(mut self, intent: &str, confidence: f32) -> Self {
        self.intent = Some(intent.to_string());
        self.confidence = Some(confidence);
        self
    }
}

// ── LLM usage ───────────────────────────────────────────────────────

/// One LLM call, for cost tracking.
#[derive(Debug, Clone)]
pub struct LlmCallRecord {
    pub id: Uuid,
    pub business_id: Option<Uuid>,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost: Decimal,
    pub purpose: Option<String>,
    pub created_at: DateTime<Utc>,
}
