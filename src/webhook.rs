//! HTTP surface: health check and the WhatsApp webhook.
//!
//! Meta retries a delivery it has not seen acknowledged within 20 seconds, so
//! `POST /webhook` answers as soon as the signature and JSON check out and
//! hands the message to the processor on a spawned task.

use std::any::Any;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::error::WebhookError;
use crate::processor::MessageProcessor;
use crate::whatsapp::InboundWhatsAppMessage;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying `sha256=<hex>` of the raw request body.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Shared state for the webhook routes.
#[derive(Clone)]
pub struct AppState {
    pub verify_token: SecretString,
    pub app_secret: SecretString,
    pub processor: Arc<MessageProcessor>,
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/webhook", get(verify_webhook).post(handle_webhook));
    with_service_layers(routes).with_state(state)
}

/// Request tracing, and a 500 instead of a dropped connection on panic.
fn with_service_layers<S>(routes: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    routes
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("handler panicked");
    error!(panic = detail, "Request handler panicked");
    WebhookError::Internal(detail.to_string()).into_response()
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

#[derive(Debug, Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// GET /webhook
///
/// Meta's subscription handshake: echo `hub.challenge` if the token matches.
async fn verify_webhook(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> Result<String, WebhookError> {
    let token_matches = params
        .verify_token
        .as_deref()
        .is_some_and(|t| t == state.verify_token.expose_secret());

    if params.mode.as_deref() == Some("subscribe") && token_matches {
        info!("Webhook verified");
        return Ok(params.challenge.unwrap_or_default());
    }

    warn!(mode = ?params.mode, "Webhook verification failed");
    Err(WebhookError::VerificationFailed)
}

/// POST /webhook
async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, WebhookError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !verify_signature(state.app_secret.expose_secret(), &body, signature) {
        error!("Invalid webhook signature");
        return Err(WebhookError::InvalidSignature);
    }

    let payload: Value = serde_json::from_slice(&body).map_err(|e| {
        error!(error = %e, "Error parsing webhook payload");
        WebhookError::InvalidPayload(e.to_string())
    })?;
    debug!(%payload, "Received webhook payload");

    if let Some(message) = extract_message(&payload) {
        let processor = Arc::clone(&state.processor);
        tokio::spawn(async move {
            let message_id = message.message_id.clone();
            match processor.process(message).await {
                Ok(outcome) => debug!(%message_id, ?outcome, "Message processed"),
                Err(e) => error!(%message_id, error = %e, "Message processing failed"),
            }
        });
    }

    Ok(StatusCode::OK)
}

/// Check `header` (`sha256=<hex>`) against HMAC-SHA256 of `payload`.
///
/// The comparison is constant time. An empty secret never verifies.
pub fn verify_signature(secret: &str, payload: &[u8], header: &str) -> bool {
    if secret.is_empty() {
        error!("WHATSAPP_APP_SECRET not configured");
        return false;
    }

    let Some(hex_sig) = header.strip_prefix("sha256=") else {
        warn!("Invalid signature format");
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        warn!("Invalid signature format");
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Pull the first text message out of a webhook payload.
///
/// Status updates, non-text messages and payloads missing any of the
/// routing fields yield `None`.
pub fn extract_message(payload: &Value) -> Option<InboundWhatsAppMessage> {
    let entry = payload.get("entry")?.get(0)?;
    let value = entry.get("changes")?.get(0)?.get("value")?;

    let Some(message) = value.get("messages").and_then(|m| m.get(0)) else {
        debug!("No messages in payload (might be status update)");
        return None;
    };

    if message.get("type").and_then(Value::as_str) != Some("text") {
        return None;
    }

    let metadata = value.get("metadata")?;
    let text = message
        .get("text")
        .and_then(|t| t.get("body"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    Some(InboundWhatsAppMessage {
        message_id: message.get("id")?.as_str()?.to_string(),
        from: message.get("from")?.as_str()?.to_string(),
        to: metadata.get("display_phone_number")?.as_str()?.to_string(),
        phone_number_id: metadata.get("phone_number_id")?.as_str()?.to_string(),
        business_account_id: entry.get("id")?.as_str()?.to_string(),
        text: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::agent::ResponseAgent;
    use crate::calendar::GoogleCalendar;
    use crate::classifier::model::MODEL_VERSION;
    use crate::classifier::{Intent, IntentClassifier, IntentModel};
    use crate::config::GoogleConfig;
    use crate::crypto::TokenCipher;
    use crate::store::{Database, LibSqlBackend};
    use crate::whatsapp::WhatsAppSender;

    const SECRET: &str = "test_app_secret";

    /// Signature header value for `payload`, as Meta would send it.
    fn sign_payload(secret: &str, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn text_payload() -> Value {
        json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "business_account_123",
                "changes": [{
                    "value": {
                        "messaging_product": "whatsapp",
                        "metadata": {
                            "display_phone_number": "15551234567",
                            "phone_number_id": "phone_123"
                        },
                        "messages": [{
                            "from": "15559876543",
                            "id": "wamid.abc",
                            "timestamp": "1700000000",
                            "type": "text",
                            "text": { "body": "Hello, I need help" }
                        }]
                    },
                    "field": "messages"
                }]
            }]
        })
    }

    /// A model that calls everything OTHER, so spawned processing never
    /// reaches the network.
    fn silent_model() -> IntentModel {
        IntentModel {
            version: MODEL_VERSION,
            dims: 8,
            labels: Intent::ALL.to_vec(),
            weights: vec![vec![0.0; 8]; 4],
            bias: vec![0.0, 0.0, 0.0, 5.0],
        }
    }

    async fn app() -> Router {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let cipher = Arc::new(
            TokenCipher::new(&SecretString::from(TokenCipher::generate_key())).unwrap(),
        );
        let calendar = Arc::new(GoogleCalendar::new(
            &GoogleConfig::default(),
            db.clone(),
            cipher.clone(),
        ));
        let agent = Arc::new(ResponseAgent::new(None, db.clone(), cipher.clone(), calendar));
        let processor = Arc::new(MessageProcessor::new(
            db,
            Arc::new(IntentClassifier::new(silent_model(), 0.6)),
            agent,
            Arc::new(WhatsAppSender::new("http://127.0.0.1:9")),
            cipher,
        ));
        router(AppState {
            verify_token: SecretString::from("test_verify_token"),
            app_secret: SecretString::from(SECRET),
            processor,
        })
    }

    fn signed_post(body: &[u8], signature: Option<&str>) -> Request<Body> {
        let mut req = Request::post("/webhook").header("content-type", "application/json");
        if let Some(sig) = signature {
            req = req.header("X-Hub-Signature-256", sig);
        }
        req.body(Body::from(body.to_vec())).unwrap()
    }

    async fn body_string(resp: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn signature_roundtrip() {
        let payload = br#"{"test":"data"}"#;
        let header = sign_payload(SECRET, payload);
        assert!(verify_signature(SECRET, payload, &header));
    }

    #[test]
    fn signature_rejects_wrong_or_malformed_headers() {
        let payload = br#"{"test":"data"}"#;
        assert!(!verify_signature(SECRET, payload, "sha256=invalid_signature"));
        assert!(!verify_signature(SECRET, payload, "invalid_format"));
        assert!(!verify_signature(SECRET, payload, ""));
        let other = sign_payload("another_secret", payload);
        assert!(!verify_signature(SECRET, payload, &other));
    }

    #[test]
    fn signature_requires_a_secret() {
        let payload = b"{}";
        assert!(!verify_signature("", payload, &sign_payload("", payload)));
    }

    #[test]
    fn extracts_text_message() {
        let msg = extract_message(&text_payload()).unwrap();
        assert_eq!(
            msg,
            InboundWhatsAppMessage {
                message_id: "wamid.abc".into(),
                from: "15559876543".into(),
                to: "15551234567".into(),
                phone_number_id: "phone_123".into(),
                business_account_id: "business_account_123".into(),
                text: "Hello, I need help".into(),
            }
        );
    }

    #[test]
    fn status_updates_and_non_text_are_skipped() {
        let status = json!({
            "entry": [{
                "id": "business_account_123",
                "changes": [{ "value": { "statuses": [{ "id": "wamid.abc", "status": "delivered" }] } }]
            }]
        });
        assert!(extract_message(&status).is_none());

        let mut image = text_payload();
        image["entry"][0]["changes"][0]["value"]["messages"][0]["type"] = json!("image");
        assert!(extract_message(&image).is_none());

        assert!(extract_message(&json!({ "entry": [] })).is_none());
        assert!(extract_message(&json!({})).is_none());
    }

    #[test]
    fn missing_routing_fields_are_skipped() {
        let mut payload = text_payload();
        payload["entry"][0]
            .as_object_mut()
            .unwrap()
            .remove("id");
        assert!(extract_message(&payload).is_none());
    }

    #[tokio::test]
    async fn handler_panic_becomes_internal_error() {
        async fn explode() -> &'static str {
            panic!("database handle poisoned")
        }
        let app = with_service_layers(Router::new().route("/explode", get(explode)));

        let resp = app
            .oneshot(Request::get("/explode").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(body["detail"], "Internal error: database handle poisoned");
    }

    #[tokio::test]
    async fn health_endpoints() {
        let app = app().await;
        for path in ["/", "/health"] {
            let resp = app
                .clone()
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            let body: Value = serde_json::from_str(&body_string(resp).await).unwrap();
            assert_eq!(body, json!({ "status": "healthy" }));
        }
    }

    #[tokio::test]
    async fn verification_echoes_challenge() {
        let resp = app()
            .await
            .oneshot(
                Request::get(
                    "/webhook?hub.mode=subscribe&hub.verify_token=test_verify_token&hub.challenge=challenge_123",
                )
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "challenge_123");
    }

    #[tokio::test]
    async fn verification_rejects_bad_token_or_mode() {
        let app = app().await;
        for uri in [
            "/webhook?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=c",
            "/webhook?hub.mode=unsubscribe&hub.verify_token=test_verify_token&hub.challenge=c",
            "/webhook",
        ] {
            let resp = app
                .clone()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{uri}");
        }
    }

    #[tokio::test]
    async fn post_with_valid_signature_is_acknowledged() {
        let body = serde_json::to_vec(&text_payload()).unwrap();
        let sig = sign_payload(SECRET, &body);
        let resp = app()
            .await
            .oneshot(signed_post(&body, Some(&sig)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn post_with_bad_or_missing_signature_is_forbidden() {
        let body = serde_json::to_vec(&text_payload()).unwrap();
        let app = app().await;

        let resp = app
            .clone()
            .oneshot(signed_post(&body, Some("sha256=deadbeef")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let detail: Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(detail["detail"], "Invalid HMAC signature");

        let resp = app.oneshot(signed_post(&body, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn post_with_invalid_json_is_bad_request() {
        let body = b"not json";
        let sig = sign_payload(SECRET, body);
        let resp = app().await.oneshot(signed_post(body, Some(&sig))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn post_status_update_is_acknowledged() {
        let body = serde_json::to_vec(&json!({
            "entry": [{ "id": "x", "changes": [{ "value": { "statuses": [] } }] }]
        }))
        .unwrap();
        let sig = sign_payload(SECRET, &body);
        let resp = app().await.oneshot(signed_post(&body, Some(&sig))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
