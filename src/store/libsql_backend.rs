//! libSQL implementation of the async `Database` trait.
//!
//! Supports local file, in-memory and remote (Turso / sqld) databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use secrecy::ExposeSecret;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::models::{
    AiVoice, Business, LlmCallRecord, OAuthProvider, OAuthToken, StoredMessage, User, UserStatus,
};
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open the database described by `config` and run migrations.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        match config {
            DatabaseConfig::Local { path } => Self::new_local(path).await,
            DatabaseConfig::Remote { url, auth_token } => {
                Self::new_remote(url, auth_token.expose_secret()).await
            }
        }
    }

    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DatabaseError::Pool(format!("Failed to create database directory: {e}"))
                })?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Connect to a remote libSQL server.
    pub async fn new_remote(url: &str, auth_token: &str) -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_remote(url.to_string(), auth_token.to_string())
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to connect to {url}: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(url = url, "Remote database connected");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to enable foreign keys: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

fn parse_uuid(s: &str) -> Result<Uuid, libsql::Error> {
    Uuid::parse_str(s).map_err(|e| libsql::Error::ToSqlConversionFailure(Box::new(e)))
}

/// Parse a validated enum column; invalid values surface as row errors.
fn parse_enum<T>(s: &str) -> Result<T, libsql::Error>
where
    T: std::str::FromStr<Err = DatabaseError>,
{
    s.parse()
        .map_err(|e: DatabaseError| libsql::Error::ToSqlConversionFailure(Box::new(e)))
}

/// Rows are also written by the onboarding app, so an empty or unknown voice
/// reads as unset instead of failing the whole row.
fn read_ai_voice(s: &str) -> Option<AiVoice> {
    if s.is_empty() {
        return None;
    }
    match s.parse() {
        Ok(voice) => Some(voice),
        Err(e) => {
            tracing::warn!(value = s, error = %e, "Ignoring unknown ai_voice");
            None
        }
    }
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_real(v: Option<f32>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Real(f64::from(v)),
        None => libsql::Value::Null,
    }
}

fn opt_datetime(dt: Option<DateTime<Utc>>) -> libsql::Value {
    match dt {
        Some(dt) => libsql::Value::Text(dt.to_rfc3339()),
        None => libsql::Value::Null,
    }
}

/// Map a libsql error, surfacing UNIQUE / FOREIGN KEY failures as constraint
/// violations.
fn map_write_err(op: &str, e: libsql::Error) -> DatabaseError {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") || msg.contains("FOREIGN KEY constraint failed") {
        DatabaseError::Constraint(format!("{op}: {msg}"))
    } else {
        DatabaseError::Query(format!("{op}: {msg}"))
    }
}

const USER_COLUMNS: &str = "id, email, status, created_at, updated_at";

fn row_to_user(row: &libsql::Row) -> Result<User, libsql::Error> {
    let id: String = row.get(0)?;
    let status: String = row.get(2)?;
    let created: String = row.get(3)?;
    let updated: String = row.get(4)?;
    Ok(User {
        id: parse_uuid(&id)?,
        email: row.get(1)?,
        status: parse_enum(&status)?,
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

const BUSINESS_COLUMNS: &str = "id, user_id, owner_name, business_name, business_type, location, \
    business_description, ai_voice, show_ai_disclaimer, pricing_packages, instagram_handle, \
    website_url, whatsapp_number, whatsapp_business_account_id, workflow_status, created_at, \
    updated_at";

fn row_to_business(row: &libsql::Row) -> Result<Business, libsql::Error> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let ai_voice: Option<String> = row.get(7).ok();
    let show_disclaimer: i64 = row.get(8)?;
    let workflow: String = row.get(14)?;
    let created: String = row.get(15)?;
    let updated: String = row.get(16)?;

    Ok(Business {
        id: parse_uuid(&id)?,
        user_id: parse_uuid(&user_id)?,
        owner_name: row.get(2).ok(),
        business_name: row.get(3).ok(),
        business_type: row.get(4).ok(),
        location: row.get(5).ok(),
        business_description: row.get(6).ok(),
        ai_voice: ai_voice.as_deref().and_then(read_ai_voice),
        show_ai_disclaimer: show_disclaimer != 0,
        pricing_packages: row.get(9).ok(),
        instagram_handle: row.get(10).ok(),
        website_url: row.get(11).ok(),
        whatsapp_number: row.get(12).ok(),
        whatsapp_business_account_id: row.get(13).ok(),
        workflow_status: parse_enum(&workflow)?,
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

const TOKEN_COLUMNS: &str = "id, user_id, provider, access_token, refresh_token, token_expiry, \
    scope, created_at, updated_at";

fn row_to_token(row: &libsql::Row) -> Result<OAuthToken, libsql::Error> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let provider: String = row.get(2)?;
    let expiry: Option<String> = row.get(5).ok();
    let created: String = row.get(7)?;
    let updated: String = row.get(8)?;
    Ok(OAuthToken {
        id: parse_uuid(&id)?,
        user_id: parse_uuid(&user_id)?,
        provider: parse_enum(&provider)?,
        access_token: row.get(3)?,
        refresh_token: row.get(4).ok(),
        token_expiry: parse_optional_datetime(&expiry),
        scope: row.get(6).ok(),
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

const MESSAGE_COLUMNS: &str = "id, external_id, business_id, direction, sender, recipient, \
    content, intent, confidence, created_at";

fn row_to_message(row: &libsql::Row) -> Result<StoredMessage, libsql::Error> {
    let id: String = row.get(0)?;
    let business_id: String = row.get(2)?;
    let direction: String = row.get(3)?;
    let confidence: Option<f64> = row.get(8).ok();
    let created: String = row.get(9)?;
    Ok(StoredMessage {
        id: parse_uuid(&id)?,
        external_id: row.get(1).ok(),
        business_id: parse_uuid(&business_id)?,
        direction: parse_enum(&direction)?,
        sender: row.get(4)?,
        recipient: row.get(5)?,
        content: row.get(6)?,
        intent: row.get(7).ok(),
        confidence: confidence.map(|c| c as f32),
        created_at: parse_datetime(&created),
    })
}

impl LibSqlBackend {
    /// Run a query expected to return at most one row.
    async fn query_one<T>(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
        map: fn(&libsql::Row) -> Result<T, libsql::Error>,
    ) -> Result<Option<T>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value =
                    map(&row).map_err(|e| DatabaseError::Query(format!("{op} row parse: {e}")))?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("{op}: {e}"))),
        }
    }
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Users ───────────────────────────────────────────────────────

    async fn create_user(&self, email: &str, status: UserStatus) -> Result<User, DatabaseError> {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            status,
            created_at: now,
            updated_at: now,
        };
        self.conn()
            .execute(
                "INSERT INTO users (id, email, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![
                    user.id.to_string(),
                    email,
                    status.as_str(),
                    now.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| map_write_err("create_user", e))?;
        debug!(user_id = %user.id, "User created");
        Ok(user)
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, DatabaseError> {
        self.query_one(
            "get_user_by_id",
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![user_id.to_string()],
            row_to_user,
        )
        .await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        self.query_one(
            "get_user_by_email",
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            params![email],
            row_to_user,
        )
        .await
    }

    // ── Businesses ──────────────────────────────────────────────────

    async fn upsert_business(&self, b: &Business) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO businesses ({BUSINESS_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                     ON CONFLICT(id) DO UPDATE SET
                        owner_name = excluded.owner_name,
                        business_name = excluded.business_name,
                        business_type = excluded.business_type,
                        location = excluded.location,
                        business_description = excluded.business_description,
                        ai_voice = excluded.ai_voice,
                        show_ai_disclaimer = excluded.show_ai_disclaimer,
                        pricing_packages = excluded.pricing_packages,
                        instagram_handle = excluded.instagram_handle,
                        website_url = excluded.website_url,
                        whatsapp_number = excluded.whatsapp_number,
                        whatsapp_business_account_id = excluded.whatsapp_business_account_id,
                        workflow_status = excluded.workflow_status,
                        updated_at = excluded.updated_at"
                ),
                params![
                    b.id.to_string(),
                    b.user_id.to_string(),
                    opt_text(b.owner_name.as_deref()),
                    opt_text(b.business_name.as_deref()),
                    opt_text(b.business_type.as_deref()),
                    opt_text(b.location.as_deref()),
                    opt_text(b.business_description.as_deref()),
                    opt_text(b.ai_voice.map(|v| v.as_str())),
                    i64::from(b.show_ai_disclaimer),
                    opt_text(b.pricing_packages.as_deref()),
                    opt_text(b.instagram_handle.as_deref()),
                    opt_text(b.website_url.as_deref()),
                    opt_text(b.whatsapp_number.as_deref()),
                    opt_text(b.whatsapp_business_account_id.as_deref()),
                    b.workflow_status.as_str(),
                    b.created_at.to_rfc3339(),
                    now,
                ],
            )
            .await
            .map_err(|e| map_write_err("upsert_business", e))?;
        debug!(business_id = %b.id, "Business upserted");
        Ok(())
    }

    async fn get_business_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Business>, DatabaseError> {
        self.query_one(
            "get_business_by_user_id",
            &format!("SELECT {BUSINESS_COLUMNS} FROM businesses WHERE user_id = ?1"),
            params![user_id.to_string()],
            row_to_business,
        )
        .await
    }

    async fn get_business_by_whatsapp_number(
        &self,
        whatsapp_number: &str,
    ) -> Result<Option<Business>, DatabaseError> {
        self.query_one(
            "get_business_by_whatsapp_number",
            &format!("SELECT {BUSINESS_COLUMNS} FROM businesses WHERE whatsapp_number = ?1"),
            params![whatsapp_number],
            row_to_business,
        )
        .await
    }

    async fn get_business_by_whatsapp_account_id(
        &self,
        account_id: &str,
    ) -> Result<Option<Business>, DatabaseError> {
        let business = self
            .query_one(
                "get_business_by_whatsapp_account_id",
                &format!(
                    "SELECT {BUSINESS_COLUMNS} FROM businesses WHERE whatsapp_business_account_id = ?1"
                ),
                params![account_id],
                row_to_business,
            )
            .await?;

        let Some(business) = business else {
            error!(account_id, "Business not found for WhatsApp account ID");
            return Ok(None);
        };

        if !business.is_active() {
            info!(
                business_id = %business.id,
                status = %business.workflow_status,
                "Business found but workflow is inactive"
            );
            return Ok(None);
        }

        Ok(Some(business))
    }

    // ── OAuth tokens ────────────────────────────────────────────────

    async fn save_oauth_token(&self, t: &OAuthToken) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO oauth_tokens ({TOKEN_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(user_id, provider) DO UPDATE SET
                        access_token = excluded.access_token,
                        refresh_token = excluded.refresh_token,
                        token_expiry = excluded.token_expiry,
                        scope = excluded.scope,
                        updated_at = excluded.updated_at"
                ),
                params![
                    t.id.to_string(),
                    t.user_id.to_string(),
                    t.provider.as_str(),
                    t.access_token.as_str(),
                    opt_text(t.refresh_token.as_deref()),
                    opt_datetime(t.token_expiry),
                    opt_text(t.scope.as_deref()),
                    t.created_at.to_rfc3339(),
                    now,
                ],
            )
            .await
            .map_err(|e| map_write_err("save_oauth_token", e))?;
        Ok(())
    }

    async fn get_oauth_token(
        &self,
        user_id: Uuid,
        provider: OAuthProvider,
    ) -> Result<Option<OAuthToken>, DatabaseError> {
        self.query_one(
            "get_oauth_token",
            &format!(
                "SELECT {TOKEN_COLUMNS} FROM oauth_tokens WHERE user_id = ?1 AND provider = ?2"
            ),
            params![user_id.to_string(), provider.as_str()],
            row_to_token,
        )
        .await
    }

    async fn update_oauth_token(
        &self,
        token_id: Uuid,
        access_token: &str,
        token_expiry: Option<DateTime<Utc>>,
    ) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE oauth_tokens SET access_token = ?2, token_expiry = ?3, updated_at = ?4
                 WHERE id = ?1",
                params![
                    token_id.to_string(),
                    access_token,
                    opt_datetime(token_expiry),
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(|e| map_write_err("update_oauth_token", e))?;

        if affected == 0 {
            error!(token_id = %token_id, "OAuth token not found for update");
            return Ok(false);
        }
        info!(token_id = %token_id, "Updated OAuth token with new access token");
        Ok(true)
    }

    // ── Message log ─────────────────────────────────────────────────

    async fn record_message(&self, m: &StoredMessage) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO messages ({MESSAGE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    m.id.to_string(),
                    opt_text(m.external_id.as_deref()),
                    m.business_id.to_string(),
                    m.direction.as_str(),
                    m.sender.as_str(),
                    m.recipient.as_str(),
                    m.content.as_str(),
                    opt_text(m.intent.as_deref()),
                    opt_real(m.confidence),
                    m.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| map_write_err("record_message", e))?;
        debug!(id = %m.id, direction = %m.direction, "Message recorded");
        Ok(())
    }

    async fn has_message(&self, external_id: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM messages WHERE external_id = ?1",
                params![external_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("has_message: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row.get(0).unwrap_or(0);
                Ok(count > 0)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(DatabaseError::Query(format!("has_message: {e}"))),
        }
    }

    async fn list_messages(
        &self,
        business_id: Uuid,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE business_id = ?1
                     ORDER BY created_at DESC LIMIT ?2"
                ),
                params![business_id.to_string(), limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_messages: {e}")))?;

        let mut messages = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_message(&row) {
                Ok(m) => messages.push(m),
                Err(e) => debug!(error = %e, "Skipping unparseable message row"),
            }
        }
        Ok(messages)
    }

    // ── LLM usage ───────────────────────────────────────────────────

    async fn record_llm_call(&self, call: &LlmCallRecord) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO llm_calls (id, business_id, model, input_tokens, output_tokens,
                    cost, purpose, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    call.id.to_string(),
                    opt_text(call.business_id.map(|id| id.to_string()).as_deref()),
                    call.model.as_str(),
                    i64::from(call.input_tokens),
                    i64::from(call.output_tokens),
                    call.cost.to_string(),
                    opt_text(call.purpose.as_deref()),
                    call.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| map_write_err("record_llm_call", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::store::models::{MessageDirection, WorkflowStatus};

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    async fn seed_business(db: &LibSqlBackend, status: WorkflowStatus) -> Business {
        let user = db
            .create_user("owner@salon.test", UserStatus::Active)
            .await
            .unwrap();
        let mut business = Business::new(user.id);
        business.business_name = Some("Test Salon".into());
        business.business_type = Some("hair salon".into());
        business.ai_voice = Some(AiVoice::We);
        business.whatsapp_number = Some("15551234567".into());
        business.whatsapp_business_account_id = Some("123456789".into());
        business.workflow_status = status;
        db.upsert_business(&business).await.unwrap();
        business
    }

    // ── Users ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn create_and_fetch_user() {
        let db = test_db().await;
        let user = db
            .create_user("a@example.com", UserStatus::Onboarding)
            .await
            .unwrap();

        let by_id = db.get_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "a@example.com");
        assert_eq!(by_id.status, UserStatus::Onboarding);

        let by_email = db.get_user_by_email("a@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);

        assert!(db.get_user_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_constraint_error() {
        let db = test_db().await;
        db.create_user("dup@example.com", UserStatus::Active)
            .await
            .unwrap();
        let err = db
            .create_user("dup@example.com", UserStatus::Active)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));
    }

    // ── Businesses ──────────────────────────────────────────────────

    #[tokio::test]
    async fn business_roundtrip_by_user_and_number() {
        let db = test_db().await;
        let business = seed_business(&db, WorkflowStatus::Active).await;

        let fetched = db
            .get_business_by_user_id(business.user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.id, business.id);
        assert_eq!(fetched.business_name.as_deref(), Some("Test Salon"));
        assert_eq!(fetched.ai_voice, Some(AiVoice::We));
        assert!(fetched.show_ai_disclaimer);
        assert!(fetched.pricing_packages.is_none());

        let by_number = db
            .get_business_by_whatsapp_number("15551234567")
            .await
            .unwrap();
        assert_eq!(by_number.unwrap().id, business.id);
    }

    #[tokio::test]
    async fn upsert_updates_existing_business() {
        let db = test_db().await;
        let mut business = seed_business(&db, WorkflowStatus::Active).await;
        business.pricing_packages = Some("Haircut: $30".into());
        business.show_ai_disclaimer = false;
        db.upsert_business(&business).await.unwrap();

        let fetched = db
            .get_business_by_user_id(business.user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.pricing_packages.as_deref(), Some("Haircut: $30"));
        assert!(!fetched.show_ai_disclaimer);
    }

    #[tokio::test]
    async fn business_requires_existing_user() {
        let db = test_db().await;
        let orphan = Business::new(Uuid::new_v4());
        let err = db.upsert_business(&orphan).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));
    }

    #[tokio::test]
    async fn unknown_ai_voice_reads_as_unset() {
        let db = test_db().await;
        let business = seed_business(&db, WorkflowStatus::Active).await;

        for stored in ["", "FRIENDLY"] {
            db.conn
                .execute(
                    "UPDATE businesses SET ai_voice = ?1 WHERE id = ?2",
                    params![stored, business.id.to_string()],
                )
                .await
                .unwrap();

            let fetched = db
                .get_business_by_whatsapp_account_id("123456789")
                .await
                .unwrap()
                .unwrap();
            assert_eq!(fetched.id, business.id);
            assert_eq!(fetched.ai_voice, None);
            assert!(crate::agent::voice_instruction(fetched.ai_voice).contains("third person"));
        }
    }

    #[tokio::test]
    async fn account_lookup_returns_only_active_businesses() {
        let db = test_db().await;
        let business = seed_business(&db, WorkflowStatus::Disabled).await;

        assert!(
            db.get_business_by_whatsapp_account_id("123456789")
                .await
                .unwrap()
                .is_none()
        );

        let mut active = business.clone();
        active.workflow_status = WorkflowStatus::Active;
        db.upsert_business(&active).await.unwrap();

        let found = db
            .get_business_by_whatsapp_account_id("123456789")
            .await
            .unwrap();
        assert_eq!(found.unwrap().id, business.id);

        assert!(
            db.get_business_by_whatsapp_account_id("unknown")
                .await
                .unwrap()
                .is_none()
        );
    }

    // ── OAuth tokens ────────────────────────────────────────────────

    #[tokio::test]
    async fn save_get_and_update_token() {
        let db = test_db().await;
        let business = seed_business(&db, WorkflowStatus::Active).await;

        let mut token = OAuthToken::new(business.user_id, OAuthProvider::GoogleCalendar, "enc-a");
        token.refresh_token = Some("enc-r".into());
        token.token_expiry = Some(Utc::now() + Duration::hours(1));
        db.save_oauth_token(&token).await.unwrap();

        let fetched = db
            .get_oauth_token(business.user_id, OAuthProvider::GoogleCalendar)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.access_token, "enc-a");
        assert_eq!(fetched.refresh_token.as_deref(), Some("enc-r"));
        assert!(fetched.token_expiry.is_some());

        assert!(
            db.get_oauth_token(business.user_id, OAuthProvider::WhatsApp)
                .await
                .unwrap()
                .is_none()
        );

        let new_expiry = Utc::now() + Duration::hours(2);
        assert!(
            db.update_oauth_token(token.id, "enc-b", Some(new_expiry))
                .await
                .unwrap()
        );
        let updated = db
            .get_oauth_token(business.user_id, OAuthProvider::GoogleCalendar)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.access_token, "enc-b");

        assert!(
            !db.update_oauth_token(Uuid::new_v4(), "x", None)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn saving_token_twice_replaces_it() {
        let db = test_db().await;
        let business = seed_business(&db, WorkflowStatus::Active).await;

        db.save_oauth_token(&OAuthToken::new(
            business.user_id,
            OAuthProvider::WhatsApp,
            "first",
        ))
        .await
        .unwrap();
        db.save_oauth_token(&OAuthToken::new(
            business.user_id,
            OAuthProvider::WhatsApp,
            "second",
        ))
        .await
        .unwrap();

        let fetched = db
            .get_oauth_token(business.user_id, OAuthProvider::WhatsApp)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.access_token, "second");
    }

    // ── Message log ─────────────────────────────────────────────────

    #[tokio::test]
    async fn record_and_dedup_messages() {
        let db = test_db().await;
        let business = seed_business(&db, WorkflowStatus::Active).await;

        let inbound = StoredMessage::inbound(
            "wamid.abc123",
            business.id,
            "14155551234",
            "15551234567",
            "How much?",
        )
        .with_intent("PRICING", 0.91);
        db.record_message(&inbound).await.unwrap();
        assert!(db.has_message("wamid.abc123").await.unwrap());
        assert!(!db.has_message("wamid.other").await.unwrap());

        let dup = StoredMessage::inbound(
            "wamid.abc123",
            business.id,
            "14155551234",
            "15551234567",
            "again",
        );
        assert!(matches!(
            db.record_message(&dup).await,
            Err(DatabaseError::Constraint(_))
        ));

        let reply = StoredMessage::outbound(business.id, "15551234567", "14155551234", "$30");
        db.record_message(&reply).await.unwrap();

        let listed = db.list_messages(business.id, 10).await.unwrap();
        assert_eq!(listed.len(), 2);
        let stored_inbound = listed
            .iter()
            .find(|m| m.direction == MessageDirection::Inbound)
            .unwrap();
        assert_eq!(stored_inbound.intent.as_deref(), Some("PRICING"));
        assert!((stored_inbound.confidence.unwrap() - 0.91).abs() < 0.001);
    }

    #[tokio::test]
    async fn record_llm_call_persists() {
        let db = test_db().await;
        let call = LlmCallRecord {
            id: Uuid::new_v4(),
            business_id: None,
            model: "gemini-2.0-flash".into(),
            input_tokens: 120,
            output_tokens: 40,
            cost: dec!(0.000028),
            purpose: Some("PRICING".into()),
            created_at: Utc::now(),
        };
        db.record_llm_call(&call).await.unwrap();

        let mut rows = db
            .conn()
            .query("SELECT cost FROM llm_calls WHERE id = ?1", params![call.id.to_string()])
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let cost: String = row.get(0).unwrap();
        assert_eq!(cost, "0.000028");
    }
}
