//! Response agent: builds the intent's prompt, calls the LLM, applies the
//! business's disclaimer setting.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::prompts::{self, PromptContext};
use crate::calendar::{CalendarProvider, format_availability_for_prompt};
use crate::classifier::Intent;
use crate::crypto::TokenCipher;
use crate::date_parser::{extract_date_range_for_general_query, extract_datetime_range};
use crate::llm::{CompletionRequest, CompletionResponse, LlmProvider};
use crate::store::Database;
use crate::store::models::{AiVoice, Business, LlmCallRecord, OAuthProvider};

/// Appended to generated replies when the business enables it.
pub const AI_DISCLAIMER: &str = "\n\n---\n🤖 This response was AI generated";

/// Sent when the LLM is unavailable or fails.
pub const FALLBACK_RESPONSE: &str =
    "I'm sorry, I'm having trouble processing your request right now. Please try again later.";

/// Sent when an availability question names no date.
pub const NO_DATE_RESPONSE: &str =
    "Could you let me know which date you have in mind? I'd be happy to check availability for you.";

const MAX_RESPONSE_TOKENS: u32 = 512;

/// Tone line for the prompt. Unset voices read as third person.
pub fn voice_instruction(voice: Option<AiVoice>) -> &'static str {
    match voice {
        Some(AiVoice::FirstPerson) => "Friendly and casual, using 'I'",
        Some(AiVoice::We) => "Friendly and casual, using 'we'",
        Some(AiVoice::Name) | None => {
            "Professional and courteous, refer to the business in third person"
        }
    }
}

/// Generates replies on behalf of a business.
pub struct ResponseAgent {
    llm: Option<Arc<dyn LlmProvider>>,
    db: Arc<dyn Database>,
    cipher: Arc<TokenCipher>,
    calendar: Arc<dyn CalendarProvider>,
}

impl ResponseAgent {
    /// `llm` is `None` when no API key is configured; every reply is then
    /// [`FALLBACK_RESPONSE`].
    pub fn new(
        llm: Option<Arc<dyn LlmProvider>>,
        db: Arc<dyn Database>,
        cipher: Arc<TokenCipher>,
        calendar: Arc<dyn CalendarProvider>,
    ) -> Self {
        if llm.is_none() {
            warn!("No LLM provider configured; agent will return fallback responses");
        }
        Self {
            llm,
            db,
            cipher,
            calendar,
        }
    }

    /// Produce a reply for `message`, or `None` if nothing should be sent.
    pub async fn invoke(&self, intent: Intent, message: &str, business: &Business) -> Option<String> {
        info!(%intent, business_id = %business.id, "Invoking agent");
        match intent {
            Intent::Availability => self.handle_availability(message, business).await,
            _ => Some(self.generate_response(message, intent, business, None).await),
        }
    }

    /// Availability replies need a date and a readable calendar. Missing
    /// calendar access is silent: the owner answers by hand.
    async fn handle_availability(&self, message: &str, business: &Business) -> Option<String> {
        let now = Utc::now().naive_utc();
        // A named day wins over its month: "January 20th" is one day.
        let Some((time_min, time_max)) = extract_datetime_range(message, now)
            .or_else(|| extract_date_range_for_general_query(message, now))
        else {
            info!(business_id = %business.id, "No date in availability question");
            return Some(NO_DATE_RESPONSE.to_string());
        };

        let stored = match self
            .db
            .get_oauth_token(business.user_id, OAuthProvider::GoogleCalendar)
            .await
        {
            Ok(Some(token)) => token,
            Ok(None) => {
                warn!(user_id = %business.user_id, "No Google Calendar token for business owner");
                return None;
            }
            Err(e) => {
                error!(error = %e, "Failed to load Google Calendar token");
                return None;
            }
        };
        let token = self.cipher.reveal(stored)?;

        let result = self
            .calendar
            .get_availability(&token, time_min, time_max)
            .await;
        if let Some(e) = &result.error {
            error!(business_id = %business.id, error = %e, "Calendar check failed");
            return None;
        }

        let availability = format_availability_for_prompt(&result);
        Some(
            self.generate_response(message, Intent::Availability, business, Some(&availability))
                .await,
        )
    }

    /// Run the LLM for `intent`. Always returns text; failures become
    /// [`FALLBACK_RESPONSE`].
    pub async fn generate_response(
        &self,
        message: &str,
        intent: Intent,
        business: &Business,
        availability_info: Option<&str>,
    ) -> String {
        let Some(llm) = &self.llm else {
            error!("LLM provider not configured");
            return FALLBACK_RESPONSE.to_string();
        };

        let prompt = build_prompt(message, intent, business, availability_info);
        let request = CompletionRequest::prompt(prompt).with_max_tokens(MAX_RESPONSE_TOKENS);

        match llm.complete(request).await {
            Ok(response) => {
                self.record_usage(llm.as_ref(), business, intent, &response)
                    .await;
                let mut text = response.content;
                if business.show_ai_disclaimer {
                    text.push_str(AI_DISCLAIMER);
                }
                text
            }
            Err(e) => {
                error!(error = %e, "LLM API error");
                FALLBACK_RESPONSE.to_string()
            }
        }
    }

    async fn record_usage(
        &self,
        llm: &dyn LlmProvider,
        business: &Business,
        intent: Intent,
        response: &CompletionResponse,
    ) {
        let record = LlmCallRecord {
            id: Uuid::new_v4(),
            business_id: Some(business.id),
            model: llm.model_name().to_string(),
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
            cost: llm.estimate_cost(response.input_tokens, response.output_tokens),
            purpose: Some(intent.to_string()),
            created_at: Utc::now(),
        };
        if let Err(e) = self.db.record_llm_call(&record).await {
            warn!(error = %e, "Failed to record LLM call");
        }
    }
}

fn build_prompt(
    message: &str,
    intent: Intent,
    business: &Business,
    availability_info: Option<&str>,
) -> String {
    let ctx = PromptContext {
        business_name: business.business_name.as_deref().unwrap_or_default(),
        business_vertical: business.business_type.as_deref().unwrap_or("business"),
        voice_instruction: voice_instruction(business.ai_voice),
        message,
    };

    match intent {
        Intent::Greeting => prompts::greeting_prompt(
            &ctx,
            business
                .business_description
                .as_deref()
                .unwrap_or("No description available"),
        ),
        Intent::Availability => prompts::availability_prompt(
            &ctx,
            availability_info.unwrap_or("No calendar information available"),
        ),
        Intent::Pricing => prompts::pricing_prompt(
            &ctx,
            business
                .pricing_packages
                .as_deref()
                .unwrap_or("No pricing information available"),
        ),
        Intent::Other => prompts::fallback_prompt(message),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDateTime, TimeZone};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use secrecy::SecretString;

    use super::*;
    use crate::calendar::{AvailabilityResult, BusyPeriod};
    use crate::error::LlmError;
    use crate::store::LibSqlBackend;
    use crate::store::models::{OAuthToken, UserStatus, WorkflowStatus};

    /// Records prompts; replies with `reply` or fails.
    struct StubLlm {
        reply: Option<String>,
        prompts: Mutex<Vec<String>>,
    }

    impl StubLlm {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(text.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl LlmProvider for StubLlm {
        fn model_name(&self) -> &str {
            "stub"
        }
        fn cost_per_token(&self) -> (Decimal, Decimal) {
            (dec!(0.000001), dec!(0.000002))
        }
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            let prompt = request
                .messages
                .iter()
                .map(|m| m.content.clone())
                .collect::<Vec<_>>()
                .join("\n");
            self.prompts.lock().unwrap().push(prompt);
            match &self.reply {
                Some(text) => Ok(CompletionResponse {
                    content: text.clone(),
                    input_tokens: 100,
                    output_tokens: 20,
                }),
                None => Err(LlmError::RequestFailed {
                    provider: "stub".into(),
                    reason: "boom".into(),
                }),
            }
        }
    }

    /// Returns a fixed result and counts calls.
    struct StubCalendar {
        busy: Vec<BusyPeriod>,
        error: Option<String>,
        calls: AtomicUsize,
        seen_token: Mutex<Option<String>>,
    }

    impl StubCalendar {
        fn new(busy: Vec<BusyPeriod>, error: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                busy,
                error: error.map(str::to_string),
                calls: AtomicUsize::new(0),
                seen_token: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl CalendarProvider for StubCalendar {
        async fn get_availability(
            &self,
            token: &OAuthToken,
            time_min: NaiveDateTime,
            time_max: NaiveDateTime,
        ) -> AvailabilityResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_token.lock().unwrap() = Some(token.access_token.clone());
            AvailabilityResult {
                available: self.busy.is_empty() && self.error.is_none(),
                busy_periods: self.busy.clone(),
                checked_range_start: time_min,
                checked_range_end: time_max,
                error: self.error.clone(),
            }
        }
    }

    struct Setup {
        agent: ResponseAgent,
        db: Arc<LibSqlBackend>,
        cipher: Arc<TokenCipher>,
        business: Business,
    }

    async fn setup(
        llm: Option<Arc<StubLlm>>,
        calendar: Arc<StubCalendar>,
        disclaimer: bool,
    ) -> Setup {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let cipher = Arc::new(
            TokenCipher::new(&SecretString::from(TokenCipher::generate_key())).unwrap(),
        );
        let user = db.create_user("salon@test", UserStatus::Active).await.unwrap();

        let mut business = Business::new(user.id);
        business.business_name = Some("Test Salon".into());
        business.business_type = Some("hair salon".into());
        business.business_description = Some("A premium hair salon".into());
        business.ai_voice = Some(AiVoice::Name);
        business.show_ai_disclaimer = disclaimer;
        business.pricing_packages = Some("Haircut: $30, Color: $80".into());
        business.workflow_status = WorkflowStatus::Active;
        db.upsert_business(&business).await.unwrap();

        let agent = ResponseAgent::new(
            llm.map(|l| l as Arc<dyn LlmProvider>),
            db.clone(),
            cipher.clone(),
            calendar,
        );
        Setup {
            agent,
            db,
            cipher,
            business,
        }
    }

    async fn connect_calendar(s: &Setup) {
        let mut token = OAuthToken::new(
            s.business.user_id,
            OAuthProvider::GoogleCalendar,
            s.cipher.encrypt("test_access_token"),
        );
        token.refresh_token = Some(s.cipher.encrypt("test_refresh_token"));
        token.token_expiry = Some(Utc::now() + chrono::Duration::hours(1));
        s.db.save_oauth_token(&token).await.unwrap();
    }

    fn busy_at(h: u32) -> BusyPeriod {
        let start: DateTime<Utc> = Utc.with_ymd_and_hms(2026, 1, 20, h, 0, 0).unwrap();
        BusyPeriod {
            start,
            end: start + chrono::Duration::hours(1),
        }
    }

    #[test]
    fn voice_instructions() {
        assert!(voice_instruction(Some(AiVoice::Name)).contains("third person"));
        assert!(voice_instruction(None).contains("third person"));
        assert!(voice_instruction(Some(AiVoice::FirstPerson)).contains("'I'"));
        assert!(voice_instruction(Some(AiVoice::We)).contains("'we'"));
    }

    #[test]
    fn prompt_defaults_for_missing_profile_fields() {
        let business = Business::new(Uuid::new_v4());
        let greeting = build_prompt("hi", Intent::Greeting, &business, None);
        assert!(greeting.contains("a business."));
        assert!(greeting.contains("No description available"));

        let pricing = build_prompt("price?", Intent::Pricing, &business, None);
        assert!(pricing.contains("No pricing information available"));

        assert_eq!(
            build_prompt("where?", Intent::Other, &business, None),
            "Respond helpfully to this message: where?"
        );
    }

    #[tokio::test]
    async fn greeting_uses_llm_text() {
        let llm = StubLlm::replying("Hello! Welcome to Test Salon.");
        let s = setup(Some(llm.clone()), StubCalendar::new(vec![], None), false).await;

        let reply = s
            .agent
            .invoke(Intent::Greeting, "Hi there!", &s.business)
            .await;
        assert_eq!(reply.as_deref(), Some("Hello! Welcome to Test Salon."));
        assert!(llm.last_prompt().contains("About the business: A premium hair salon"));
    }

    #[tokio::test]
    async fn pricing_prompt_includes_packages_and_disclaimer_is_appended() {
        let llm = StubLlm::replying("Our haircut is $30.");
        let s = setup(Some(llm.clone()), StubCalendar::new(vec![], None), true).await;

        let reply = s
            .agent
            .invoke(Intent::Pricing, "How much?", &s.business)
            .await
            .unwrap();
        assert_eq!(reply, format!("Our haircut is $30.{AI_DISCLAIMER}"));
        assert!(llm.last_prompt().contains("Haircut: $30, Color: $80"));
    }

    #[tokio::test]
    async fn missing_llm_returns_fallback() {
        let s = setup(None, StubCalendar::new(vec![], None), true).await;
        let reply = s.agent.invoke(Intent::Greeting, "Hi", &s.business).await;
        assert_eq!(reply.as_deref(), Some(FALLBACK_RESPONSE));
    }

    #[tokio::test]
    async fn llm_error_returns_fallback() {
        let s = setup(Some(StubLlm::failing()), StubCalendar::new(vec![], None), true).await;
        let reply = s.agent.invoke(Intent::Pricing, "Price?", &s.business).await;
        assert_eq!(reply.as_deref(), Some(FALLBACK_RESPONSE));
    }

    #[tokio::test]
    async fn availability_without_date_asks_for_one() {
        let llm = StubLlm::replying("unused");
        let calendar = StubCalendar::new(vec![], None);
        let s = setup(Some(llm.clone()), calendar.clone(), true).await;

        let reply = s
            .agent
            .invoke(Intent::Availability, "Are you available?", &s.business)
            .await;
        assert_eq!(reply.as_deref(), Some(NO_DATE_RESPONSE));
        assert_eq!(calendar.calls.load(Ordering::SeqCst), 0);
        assert!(llm.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn availability_without_calendar_token_is_silent() {
        let calendar = StubCalendar::new(vec![], None);
        let s = setup(Some(StubLlm::replying("unused")), calendar.clone(), false).await;

        let reply = s
            .agent
            .invoke(Intent::Availability, "Are you free on January 20th?", &s.business)
            .await;
        assert!(reply.is_none());
        assert_eq!(calendar.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn availability_calendar_error_is_silent() {
        let calendar = StubCalendar::new(vec![], Some("API quota exceeded"));
        let s = setup(Some(StubLlm::replying("unused")), calendar.clone(), false).await;
        connect_calendar(&s).await;

        let reply = s
            .agent
            .invoke(Intent::Availability, "Are you free on January 20th?", &s.business)
            .await;
        assert!(reply.is_none());
        assert_eq!(calendar.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn availability_when_free() {
        let llm = StubLlm::replying("Yes, we're available!");
        let calendar = StubCalendar::new(vec![], None);
        let s = setup(Some(llm.clone()), calendar.clone(), false).await;
        connect_calendar(&s).await;

        let reply = s
            .agent
            .invoke(Intent::Availability, "Are you free on January 20th?", &s.business)
            .await;
        assert_eq!(reply.as_deref(), Some("Yes, we're available!"));
        assert!(llm.last_prompt().contains("Calendar availability: Available on January 20, "));
        assert_eq!(
            calendar.seen_token.lock().unwrap().as_deref(),
            Some("test_access_token")
        );
    }

    #[tokio::test]
    async fn availability_when_busy_lists_periods() {
        let llm = StubLlm::replying("We're busy 10-11am.");
        let s = setup(
            Some(llm.clone()),
            StubCalendar::new(vec![busy_at(10)], None),
            false,
        )
        .await;
        connect_calendar(&s).await;

        let reply = s
            .agent
            .invoke(Intent::Availability, "Are you free on January 20th?", &s.business)
            .await;
        assert_eq!(reply.as_deref(), Some("We're busy 10-11am."));
        let prompt = llm.last_prompt();
        assert!(prompt.contains("Busy on January 20, "));
        assert!(prompt.contains("10:00 AM - 11:00 AM"));
    }

    #[tokio::test]
    async fn month_question_checks_the_whole_month() {
        let llm = StubLlm::replying("January looks open.");
        let s = setup(Some(llm.clone()), StubCalendar::new(vec![], None), false).await;
        connect_calendar(&s).await;

        s.agent
            .invoke(Intent::Availability, "What's your availability for January?", &s.business)
            .await
            .unwrap();
        let prompt = llm.last_prompt();
        assert!(prompt.contains("Available between January 01, "));
        assert!(prompt.contains(" and January 31, "));
    }

    #[tokio::test]
    async fn general_query_covers_the_whole_range() {
        let llm = StubLlm::replying("Plenty of slots next week.");
        let s = setup(Some(llm.clone()), StubCalendar::new(vec![], None), false).await;
        connect_calendar(&s).await;

        s.agent
            .invoke(Intent::Availability, "Any openings next week?", &s.business)
            .await
            .unwrap();
        assert!(llm.last_prompt().contains("Calendar availability: Available between"));
    }
}
