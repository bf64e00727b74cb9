//! Google Calendar availability via the FreeBusy API.
//!
//! Access tokens close to expiry are refreshed against Google's OAuth token
//! endpoint, and the new token is encrypted and written back to the store.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::config::GoogleConfig;
use crate::crypto::TokenCipher;
use crate::error::CalendarError;
use crate::store::Database;
use crate::store::models::OAuthToken;

/// Refresh tokens that expire within this many minutes.
pub const TOKEN_EXPIRY_BUFFER_MINUTES: i64 = 5;

/// A busy slot on the calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusyPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Outcome of one availability check. Failures land in `error`.
#[derive(Debug, Clone, PartialEq)]
pub struct AvailabilityResult {
    pub available: bool,
    pub busy_periods: Vec<BusyPeriod>,
    pub checked_range_start: NaiveDateTime,
    pub checked_range_end: NaiveDateTime,
    pub error: Option<String>,
}

impl AvailabilityResult {
    fn failed(time_min: NaiveDateTime, time_max: NaiveDateTime, error: String) -> Self {
        Self {
            available: false,
            busy_periods: Vec::new(),
            checked_range_start: time_min,
            checked_range_end: time_max,
            error: Some(error),
        }
    }
}

/// Source of calendar availability for a business owner.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Check `[time_min, time_max]` (naive, read as UTC) using a decrypted
    /// OAuth token. Never fails; errors are reported in the result.
    async fn get_availability(
        &self,
        token: &OAuthToken,
        time_min: NaiveDateTime,
        time_max: NaiveDateTime,
    ) -> AvailabilityResult;
}

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: std::collections::HashMap<String, FreeBusyCalendar>,
}

#[derive(Debug, Default, Deserialize)]
struct FreeBusyCalendar {
    #[serde(default)]
    busy: Vec<FreeBusySlot>,
}

#[derive(Debug, Deserialize)]
struct FreeBusySlot {
    start: String,
    end: String,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    expires_in: Option<i64>,
}

/// Google Calendar client backed by `reqwest`.
pub struct GoogleCalendar {
    client: reqwest::Client,
    api_base_url: String,
    token_url: String,
    client_id: Option<String>,
    client_secret: Option<SecretString>,
    db: Arc<dyn Database>,
    cipher: Arc<TokenCipher>,
}

impl GoogleCalendar {
    pub fn new(config: &GoogleConfig, db: Arc<dyn Database>, cipher: Arc<TokenCipher>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            db,
            cipher,
        }
    }

    /// A usable access token, refreshing first if it is empty or expiring.
    async fn valid_access_token(&self, token: &OAuthToken) -> Result<String, CalendarError> {
        let expiring = token.token_expiry.is_some_and(|expiry| {
            expiry < Utc::now() + Duration::minutes(TOKEN_EXPIRY_BUFFER_MINUTES)
        });

        if !expiring && !token.access_token.is_empty() {
            return Ok(token.access_token.clone());
        }

        let Some(refresh_token) = token.refresh_token.as_deref().filter(|t| !t.is_empty()) else {
            error!(token_id = %token.id, "Token expired and no refresh token available");
            return Err(CalendarError::Credentials(
                "token expired and no refresh token available".into(),
            ));
        };

        info!(token_id = %token.id, "Refreshing expired access token");
        let (access_token, expiry) = self.refresh(refresh_token).await?;

        let encrypted = self.cipher.encrypt(&access_token);
        match self
            .db
            .update_oauth_token(token.id, &encrypted, Some(expiry))
            .await
        {
            Ok(true) => info!(token_id = %token.id, "Access token refreshed successfully"),
            Ok(false) => warn!(token_id = %token.id, "Refreshed token no longer in database"),
            Err(e) => error!(token_id = %token.id, error = %e, "Failed to persist refreshed token"),
        }

        Ok(access_token)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<(String, DateTime<Utc>), CalendarError> {
        let (Some(client_id), Some(client_secret)) = (&self.client_id, &self.client_secret) else {
            error!("GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET must be set");
            return Err(CalendarError::Credentials(
                "GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET must be set".into(),
            ));
        };

        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.expose_secret()),
            ("refresh_token", refresh_token),
        ];

        let resp = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| CalendarError::Credentials(format!("token refresh failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(status = %status, "Failed to refresh access token");
            return Err(CalendarError::Credentials(format!(
                "token refresh returned {status}: {body}"
            )));
        }

        let refreshed: RefreshResponse = resp
            .json()
            .await
            .map_err(|e| CalendarError::Credentials(format!("invalid refresh response: {e}")))?;

        let expiry = Utc::now() + Duration::seconds(refreshed.expires_in.unwrap_or(3600));
        Ok((refreshed.access_token, expiry))
    }

    async fn query_free_busy(
        &self,
        access_token: &str,
        time_min: NaiveDateTime,
        time_max: NaiveDateTime,
    ) -> Result<Vec<BusyPeriod>, CalendarError> {
        let body = serde_json::json!({
            "timeMin": as_utc_rfc3339(time_min),
            "timeMax": as_utc_rfc3339(time_max),
            "items": [{ "id": "primary" }],
        });

        info!(%time_min, %time_max, "Querying FreeBusy API");
        let resp = self
            .client
            .post(format!("{}/calendar/v3/freeBusy", self.api_base_url))
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| CalendarError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CalendarError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: FreeBusyResponse = resp
            .json()
            .await
            .map_err(|e| CalendarError::InvalidResponse(e.to_string()))?;

        parsed
            .calendars
            .get("primary")
            .map(|c| c.busy.as_slice())
            .unwrap_or_default()
            .iter()
            .map(|slot| -> Result<BusyPeriod, CalendarError> {
                Ok(BusyPeriod {
                    start: parse_timestamp(&slot.start)?,
                    end: parse_timestamp(&slot.end)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl CalendarProvider for GoogleCalendar {
    async fn get_availability(
        &self,
        token: &OAuthToken,
        time_min: NaiveDateTime,
        time_max: NaiveDateTime,
    ) -> AvailabilityResult {
        let access_token = match self.valid_access_token(token).await {
            Ok(t) => t,
            Err(e) => return AvailabilityResult::failed(time_min, time_max, e.to_string()),
        };

        match self.query_free_busy(&access_token, time_min, time_max).await {
            Ok(busy_periods) => {
                let available = busy_periods.is_empty();
                info!(
                    available,
                    busy = busy_periods.len(),
                    "Availability check complete"
                );
                AvailabilityResult {
                    available,
                    busy_periods,
                    checked_range_start: time_min,
                    checked_range_end: time_max,
                    error: None,
                }
            }
            Err(e) => {
                error!(error = %e, "Calendar availability check failed");
                AvailabilityResult::failed(time_min, time_max, e.to_string())
            }
        }
    }
}

/// Describe `result` for the availability prompt.
///
/// Single-day checks read "Available on January 20, 2026" or "Busy on ...
/// during: 10:00 AM - 11:00 AM". Multi-day checks name the span and prefix
/// each busy slot with its day.
pub fn format_availability_for_prompt(result: &AvailabilityResult) -> String {
    if let Some(error) = &result.error {
        return format!("Unable to check calendar: {error}");
    }

    let start = result.checked_range_start.date();
    let end = result.checked_range_end.date();
    let single_day = start == end;
    let span = if single_day {
        format!("on {}", start.format("%B %d, %Y"))
    } else {
        format!(
            "between {} and {}",
            start.format("%B %d, %Y"),
            end.format("%B %d, %Y")
        )
    };

    if result.available {
        return format!("Available {span}");
    }

    let busy = result
        .busy_periods
        .iter()
        .map(|p| {
            let times = format!("{} - {}", p.start.format("%I:%M %p"), p.end.format("%I:%M %p"));
            if single_day {
                times
            } else {
                format!("{} {times}", p.start.format("%b %d"))
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("Busy {span} during: {busy}")
}

fn as_utc_rfc3339(dt: NaiveDateTime) -> String {
    Utc.from_utc_datetime(&dt)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, CalendarError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CalendarError::InvalidResponse(format!("bad timestamp {s:?}: {e}")))
}
