use super::link::{PaymentLink, QrEncoding};
use super::message::MailMessage;
use super::money::Amount;
use super::order::{Customer, Order};
use crate::config::MailboxSettings;
use crate::error::Result;
use async_trait::async_trait;
use secrecy::SecretString;
use serde::Serialize;
use std::sync::Arc;

/// Upstream order persistence, narrowed to what payment verification needs.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Case-insensitive lookup by full reference.
    async fn find_by_reference(&self, reference: &str) -> Result<Option<Order>>;
    /// Orders in `awaiting` whose payment has been requested.
    async fn find_awaiting_eligible(&self) -> Result<Vec<Order>>;
    async fn save(&self, order: Order) -> Result<()>;
}

/// Session-oriented access to the monitored mailbox.
///
/// A session has a single owner; `connect` is a no-op when already connected and
/// `disconnect` is idempotent.
#[async_trait]
pub trait Mailbox: Send {
    async fn connect(&mut self) -> Result<()>;
    /// Unseen messages in mailbox order. Empty when there are none.
    async fn list_unseen(&mut self) -> Result<Vec<MailMessage>>;
    /// Messages (seen or not) whose headers or body contain `text`.
    async fn search(&mut self, text: &str) -> Result<Vec<MailMessage>>;
    async fn mark_read(&mut self, id: &str) -> Result<()>;
    async fn move_to(&mut self, id: &str, folder: &str) -> Result<()>;
    async fn disconnect(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Normal,
    High,
    Urgent,
}

/// Data handed to the payer-reminder template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayerReminder {
    pub order_reference: String,
    pub short_reference: String,
    pub note: String,
    pub amount: Amount,
    pub reminder_number: u32,
    pub links: Vec<PaymentLink>,
    pub qr_encodings: Vec<QrEncoding>,
}

/// Outbound notifications. Callers treat every call as fire-and-forget.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_operations(&self, subject: &str, body: &str, priority: Priority)
    -> Result<()>;
    async fn notify_payer(&self, order: &Order, payer: &Customer, data: &PayerReminder)
    -> Result<()>;
}

/// Downstream effects of a confirmed payment (pickup scheduling, receipts).
#[async_trait]
pub trait OrderWorkflow: Send + Sync {
    async fn payment_verified(&self, order: &Order) -> Result<()>;
}

/// Reversible cipher for stored credentials.
pub trait SecretCipher: Send + Sync {
    fn decrypt(&self, ciphertext: &str) -> Result<SecretString>;
}

/// Source of mailbox endpoint and credentials, read at every connect.
#[async_trait]
pub trait MailboxConfigSource: Send + Sync {
    async fn mailbox_settings(&self) -> Result<MailboxSettings>;
}

pub type OrderStoreHandle = Arc<dyn OrderStore>;
pub type NotifierHandle = Arc<dyn Notifier>;
pub type OrderWorkflowHandle = Arc<dyn OrderWorkflow>;
pub type MailboxBox = Box<dyn Mailbox>;
