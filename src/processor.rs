//! Message processor: takes one inbound WhatsApp message from dedup through
//! to the sent reply.
//!
//! Flow:
//! 1. Skip messages already in the log (Meta retries deliveries)
//! 2. Resolve the business by WhatsApp Business Account ID
//! 3. Classify and record the inbound message
//! 4. Ask the agent for a reply
//! 5. Send it with the owner's WhatsApp token and record it

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::agent::ResponseAgent;
use crate::classifier::{Intent, IntentClassifier};
use crate::crypto::TokenCipher;
use crate::error::{DatabaseError, Error};
use crate::store::Database;
use crate::store::models::{OAuthProvider, StoredMessage};
use crate::whatsapp::{InboundWhatsAppMessage, ReplySender};

/// Where processing of a message stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// Already processed.
    Duplicate,
    /// No active business owns the account.
    UnknownBusiness,
    /// Classified as off-topic; the owner answers by hand.
    Ignored { confidence: f32 },
    /// The agent chose not to answer.
    NoReply,
    /// The owner has no usable WhatsApp token.
    MissingWhatsAppToken,
    SendFailed,
    Replied { intent: Intent },
}

pub struct MessageProcessor {
    db: Arc<dyn Database>,
    classifier: Arc<IntentClassifier>,
    agent: Arc<ResponseAgent>,
    sender: Arc<dyn ReplySender>,
    cipher: Arc<TokenCipher>,
}

impl MessageProcessor {
    pub fn new(
        db: Arc<dyn Database>,
        classifier: Arc<IntentClassifier>,
        agent: Arc<ResponseAgent>,
        sender: Arc<dyn ReplySender>,
        cipher: Arc<TokenCipher>,
    ) -> Self {
        Self {
            db,
            classifier,
            agent,
            sender,
            cipher,
        }
    }

    /// Process one message. Storage failures are errors; everything else is
    /// a [`ProcessOutcome`].
    pub async fn process(&self, msg: InboundWhatsAppMessage) -> Result<ProcessOutcome, Error> {
        info!(
            message_id = %msg.message_id,
            from = %msg.from,
            account = %msg.business_account_id,
            "Processing inbound message"
        );

        if self.db.has_message(&msg.message_id).await? {
            info!(message_id = %msg.message_id, "Duplicate message, skipping");
            return Ok(ProcessOutcome::Duplicate);
        }

        let Some(business) = self
            .db
            .get_business_by_whatsapp_account_id(&msg.business_account_id)
            .await?
        else {
            return Ok(ProcessOutcome::UnknownBusiness);
        };

        let classification = self.classifier.classify(&msg.text);
        info!(
            intent = %classification.intent,
            confidence = classification.confidence,
            "Message classified"
        );

        let inbound = StoredMessage::inbound(
            &msg.message_id,
            business.id,
            &msg.from,
            &msg.to,
            &msg.text,
        )
        .with_intent(classification.intent.as_str(), classification.confidence);
        match self.db.record_message(&inbound).await {
            Ok(()) => {}
            // A concurrent delivery of the same message won the insert.
            Err(DatabaseError::Constraint(_)) => {
                info!(message_id = %msg.message_id, "Duplicate message, skipping");
                return Ok(ProcessOutcome::Duplicate);
            }
            Err(e) => return Err(e.into()),
        }

        if classification.intent == Intent::Other {
            info!(business_id = %business.id, "Intent OTHER, not responding");
            return Ok(ProcessOutcome::Ignored {
                confidence: classification.confidence,
            });
        }

        let Some(reply) = self
            .agent
            .invoke(classification.intent, &msg.text, &business)
            .await
        else {
            info!(business_id = %business.id, "Agent produced no reply");
            return Ok(ProcessOutcome::NoReply);
        };

        let token = self
            .db
            .get_oauth_token(business.user_id, OAuthProvider::WhatsApp)
            .await?
            .and_then(|t| self.cipher.reveal(t));
        let Some(token) = token else {
            error!(user_id = %business.user_id, "No WhatsApp token for business owner");
            return Ok(ProcessOutcome::MissingWhatsAppToken);
        };

        if let Err(e) = self
            .sender
            .send_text(&msg.from, &reply, &msg.phone_number_id, &token.access_token)
            .await
        {
            error!(to = %msg.from, error = %e, "Failed to send reply");
            return Ok(ProcessOutcome::SendFailed);
        }

        let outbound = StoredMessage::outbound(business.id, &msg.to, &msg.from, &reply);
        if let Err(e) = self.db.record_message(&outbound).await {
            warn!(error = %e, "Failed to record outbound message");
        }

        info!(to = %msg.from, intent = %classification.intent, "Reply sent");
        Ok(ProcessOutcome::Replied {
            intent: classification.intent,
        })
    }
}
