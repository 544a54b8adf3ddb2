use super::money::Amount;
use super::provider::Provider;
use chrono::{DateTime, Utc};

/// Payment data extracted from one inbound email. Never persisted.
///
/// `order_reference` is the full reference of the order the candidate was bound to, even
/// when the email itself only carried the short form.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentCandidate {
    pub provider: Provider,
    pub amount: Amount,
    pub order_reference: String,
    pub sender: Option<String>,
    pub transaction_id: String,
    pub source_message_id: String,
    pub email_date: Option<DateTime<Utc>>,
}
