//! The `Database` trait, a single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::models::{
    Business, LlmCallRecord, OAuthProvider, OAuthToken, StoredMessage, User, UserStatus,
};

/// Backend-agnostic database trait covering users, businesses, tokens and
/// the message log.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    /// Create a user. Fails with `Constraint` if the email is taken.
    async fn create_user(&self, email: &str, status: UserStatus) -> Result<User, DatabaseError>;

    async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, DatabaseError>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError>;

    // ── Businesses ──────────────────────────────────────────────────

    /// Insert a business, or update every profile field if its id exists.
    async fn upsert_business(&self, business: &Business) -> Result<(), DatabaseError>;

    async fn get_business_by_user_id(&self, user_id: Uuid)
    -> Result<Option<Business>, DatabaseError>;

    async fn get_business_by_whatsapp_number(
        &self,
        whatsapp_number: &str,
    ) -> Result<Option<Business>, DatabaseError>;

    /// Look up the business that owns a WhatsApp Business Account.
    ///
    /// Only returns the business if its workflow is ACTIVE; inactive
    /// businesses do not have messages processed.
    async fn get_business_by_whatsapp_account_id(
        &self,
        account_id: &str,
    ) -> Result<Option<Business>, DatabaseError>;

    // ── OAuth tokens ────────────────────────────────────────────────

    /// Store a token, replacing any existing one for (user, provider).
    /// Token fields are stored as given (callers encrypt first).
    async fn save_oauth_token(&self, token: &OAuthToken) -> Result<(), DatabaseError>;

    /// Fetch the stored (encrypted) token for a user and provider.
    async fn get_oauth_token(
        &self,
        user_id: Uuid,
        provider: OAuthProvider,
    ) -> Result<Option<OAuthToken>, DatabaseError>;

    /// Replace the access token and expiry after a refresh.
    /// Returns false if no token has that id.
    async fn update_oauth_token(
        &self,
        token_id: Uuid,
        access_token: &str,
        token_expiry: Option<DateTime<Utc>>,
    ) -> Result<bool, DatabaseError>;

    // ── Message log ─────────────────────────────────────────────────

    /// Append a message. A duplicate `external_id` is a `Constraint` error.
    async fn record_message(&self, message: &StoredMessage) -> Result<(), DatabaseError>;

    /// Whether an inbound message with this WhatsApp id was already seen.
    async fn has_message(&self, external_id: &str) -> Result<bool, DatabaseError>;

    /// Messages for a business, most recent first.
    async fn list_messages(
        &self,
        business_id: Uuid,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, DatabaseError>;

    // ── LLM usage ───────────────────────────────────────────────────

    async fn record_llm_call(&self, call: &LlmCallRecord) -> Result<(), DatabaseError>;
}
