//! Turns mailbox messages into payment candidates.
//!
//! Extraction (`PaymentExtractor`) is pure: provider identification, text flattening and
//! field extraction. Attribution (`EmailParser`) then binds the extracted reference to an
//! order through the order store.

pub mod registry;
pub mod text;

use crate::domain::candidate::PaymentCandidate;
use crate::domain::message::MailMessage;
use crate::domain::money::Amount;
use crate::domain::order::{Order, PaymentStatus};
use crate::domain::ports::OrderStoreHandle;
use crate::domain::provider::Provider;
use crate::error::Result;
use chrono::{DateTime, Utc};
use registry::{ProviderDescriptor, ProviderRegistry};
use tracing::{debug, info};

/// The reference as found in the memo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceToken {
    /// Complete `ORD-<uuid>` reference.
    Full(String),
    /// Eight-character suffix from an `Order #XXXXXXXX` note.
    Short(String),
}

impl ReferenceToken {
    fn from_match(raw: &str) -> Self {
        if raw.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("ORD-")) {
            ReferenceToken::Full(raw.to_string())
        } else {
            ReferenceToken::Short(raw.to_ascii_uppercase())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ReferenceToken::Full(s) | ReferenceToken::Short(s) => s,
        }
    }
}

/// Fields pulled from one message before attribution.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPayment {
    pub provider: Provider,
    pub amount: Amount,
    pub reference: ReferenceToken,
    pub sender: Option<String>,
    pub transaction_id: String,
    pub source_message_id: String,
    pub email_date: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct PaymentExtractor {
    registry: ProviderRegistry,
}

impl PaymentExtractor {
    /// Creates a new extractor over the given provider registry.
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    /// Forwarded messages are identified by provider signatures in their text, everything
    /// else by sender domain.
    pub fn identify(&self, message: &MailMessage, body: &str) -> Option<&ProviderDescriptor> {
        if text::is_forwarded(message, body) {
            let haystack = format!("{}\n{}", message.subject, body);
            self.registry.by_signature(&haystack)
        } else {
            message
                .sender_domain()
                .and_then(|domain| self.registry.by_sender_domain(&domain))
        }
    }

    /// Returns `None` when the message is not an attributable payment notification.
    pub fn extract(&self, message: &MailMessage, now: DateTime<Utc>) -> Option<ExtractedPayment> {
        let body = text::body_text(message);
        let descriptor = self.identify(message, &body)?;
        let text = format!("{}\n{}", message.subject, body);

        let reference = descriptor.reference.extract(&text).map(|r| ReferenceToken::from_match(&r));
        let Some(reference) = reference else {
            debug!(provider = %descriptor.provider, message_id = %message.id, "no order reference in payment email");
            return None;
        };

        let amount = descriptor
            .amount
            .extract(&text)
            .and_then(|raw| raw.parse::<Amount>().ok());
        let Some(amount) = amount else {
            debug!(provider = %descriptor.provider, message_id = %message.id, "unparseable amount in payment email");
            return None;
        };

        let sender = descriptor.sender.extract(&text);
        let transaction_id = descriptor
            .transaction_id
            .extract(&text)
            .filter(|id| !id.to_ascii_uppercase().starts_with("ORD"))
            .unwrap_or_else(|| {
                let at = message.date.unwrap_or(now);
                format!("{}-{}", descriptor.provider, at.timestamp_millis())
            });

        Some(ExtractedPayment {
            provider: descriptor.provider,
            amount,
            reference,
            sender,
            transaction_id,
            source_message_id: message.id.clone(),
            email_date: message.date,
        })
    }
}

/// Result of parsing one message.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// Not a payment email, or one missing a usable reference or amount.
    NotApplicable,
    /// A payment email whose reference resolves to no eligible order.
    Unattributed { reference: String },
    Candidate(PaymentCandidate),
}

pub struct EmailParser {
    extractor: PaymentExtractor,
    orders: OrderStoreHandle,
}

impl EmailParser {
    /// Creates a new parser that resolves references against `orders`.
    pub fn new(extractor: PaymentExtractor, orders: OrderStoreHandle) -> Self {
        Self { extractor, orders }
    }

    pub async fn parse(&self, message: &MailMessage, now: DateTime<Utc>) -> Result<ParseOutcome> {
        let Some(extracted) = self.extractor.extract(message, now) else {
            return Ok(ParseOutcome::NotApplicable);
        };

        let Some(order) = self.resolve(&extracted.reference).await? else {
            info!(
                reference = extracted.reference.as_str(),
                provider = %extracted.provider,
                message_id = %message.id,
                "payment email references no eligible order"
            );
            return Ok(ParseOutcome::Unattributed {
                reference: extracted.reference.as_str().to_string(),
            });
        };

        Ok(ParseOutcome::Candidate(PaymentCandidate {
            provider: extracted.provider,
            amount: extracted.amount,
            order_reference: order.reference,
            sender: extracted.sender,
            transaction_id: extracted.transaction_id,
            source_message_id: extracted.source_message_id,
            email_date: extracted.email_date,
        }))
    }

    /// Full references resolve to awaiting or already-verified orders, so re-delivered
    /// payments reach the duplicate check. Short references only resolve among orders
    /// still being polled.
    async fn resolve(&self, reference: &ReferenceToken) -> Result<Option<Order>> {
        match reference {
            ReferenceToken::Full(full) => Ok(self
                .orders
                .find_by_reference(full)
                .await?
                .filter(|o| {
                    matches!(
                        o.status(),
                        PaymentStatus::Awaiting | PaymentStatus::Verified
                    )
                })),
            ReferenceToken::Short(short) => {
                let mut matches: Vec<Order> = self
                    .orders
                    .find_awaiting_eligible()
                    .await?
                    .into_iter()
                    .filter(|o| o.short_reference() == *short)
                    .collect();
                if matches.len() > 1 {
                    info!(short_reference = %short, count = matches.len(), "ambiguous short reference");
                    return Ok(None);
                }
                Ok(matches.pop())
            }
        }
    }
}
