use crate::domain::message::MailMessage;
use crate::domain::order::{Customer, Order};
use crate::domain::ports::{
    Mailbox, Notifier, OrderStore, OrderWorkflow, PayerReminder, Priority,
};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;

/// A thread-safe in-memory order store keyed by lower-cased reference.
///
/// Backs the tests and the `links`-only CLI path; the JSON file store wraps one.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<String, Order>>>,
}

impl InMemoryOrderStore {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new store seeded with `orders`.
    pub fn with_orders(orders: impl IntoIterator<Item = Order>) -> Self {
        let map = orders
            .into_iter()
            .map(|o| (o.reference.to_ascii_lowercase(), o))
            .collect();
        Self {
            orders: Arc::new(RwLock::new(map)),
        }
    }

    /// All orders, sorted by reference.
    pub async fn all(&self) -> Vec<Order> {
        let orders = self.orders.read().await;
        let mut all: Vec<Order> = orders.values().cloned().collect();
        all.sort_by(|a, b| a.reference.cmp(&b.reference));
        all
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn find_by_reference(&self, reference: &str) -> Result<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.get(&reference.to_ascii_lowercase()).cloned())
    }

    async fn find_awaiting_eligible(&self) -> Result<Vec<Order>> {
        Ok(self
            .all()
            .await
            .into_iter()
            .filter(Order::is_eligible)
            .collect())
    }

    async fn save(&self, order: Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        orders.insert(order.reference.to_ascii_lowercase(), order);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct StoredMessage {
    message: MailMessage,
    seen: bool,
    folder: String,
}

#[derive(Debug, Default)]
struct MailboxState {
    messages: Vec<StoredMessage>,
    connected: bool,
    connects: usize,
    disconnects: usize,
    fail_connect: bool,
    fail_mark_read: bool,
    list_delay: Option<Duration>,
}

const INBOX: &str = "INBOX";

/// A mailbox held in memory. Clones share state, so a test can keep a handle while the
/// job runner owns another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMailbox {
    state: Arc<Mutex<MailboxState>>,
}

impl InMemoryMailbox {
    /// Creates a new, empty mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MailboxState> {
        // Poisoning only follows a panic in another test thread.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds an unseen message to the inbox.
    pub fn deliver(&self, message: MailMessage) {
        self.state().messages.push(StoredMessage {
            message,
            seen: false,
            folder: INBOX.to_string(),
        });
    }

    pub fn is_seen(&self, id: &str) -> bool {
        self.state()
            .messages
            .iter()
            .any(|m| m.message.id == id && m.seen)
    }

    pub fn folder_of(&self, id: &str) -> Option<String> {
        self.state()
            .messages
            .iter()
            .find(|m| m.message.id == id)
            .map(|m| m.folder.clone())
    }

    pub fn unseen_count(&self) -> usize {
        self.state().messages.iter().filter(|m| !m.seen).count()
    }

    pub fn connects(&self) -> usize {
        self.state().connects
    }

    pub fn disconnects(&self) -> usize {
        self.state().disconnects
    }

    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    pub fn fail_connect(&self, fail: bool) {
        self.state().fail_connect = fail;
    }

    pub fn fail_mark_read(&self, fail: bool) {
        self.state().fail_mark_read = fail;
    }

    /// Makes every `list_unseen` call take at least `delay`.
    pub fn set_list_delay(&self, delay: Option<Duration>) {
        self.state().list_delay = delay;
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.state().connected {
            Ok(())
        } else {
            Err(PaymentError::Transport("mailbox not connected".into()))
        }
    }
}

#[async_trait]
impl Mailbox for InMemoryMailbox {
    async fn connect(&mut self) -> Result<()> {
        let mut state = self.state();
        if state.connected {
            return Ok(());
        }
        if state.fail_connect {
            return Err(PaymentError::Transport("authentication failed".into()));
        }
        state.connected = true;
        state.connects += 1;
        Ok(())
    }

    async fn list_unseen(&mut self) -> Result<Vec<MailMessage>> {
        self.ensure_connected()?;
        let delay = self.state().list_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .state()
            .messages
            .iter()
            .filter(|m| !m.seen && m.folder == INBOX)
            .map(|m| m.message.clone())
            .collect())
    }

    async fn search(&mut self, text: &str) -> Result<Vec<MailMessage>> {
        self.ensure_connected()?;
        let needle = text.to_lowercase();
        Ok(self
            .state()
            .messages
            .iter()
            .filter(|m| m.folder == INBOX)
            .filter(|m| {
                let msg = &m.message;
                [
                    Some(&msg.subject),
                    msg.text.as_ref(),
                    msg.html.as_ref(),
                ]
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&needle))
            })
            .map(|m| m.message.clone())
            .collect())
    }

    async fn mark_read(&mut self, id: &str) -> Result<()> {
        self.ensure_connected()?;
        let mut state = self.state();
        if state.fail_mark_read {
            return Err(PaymentError::Transport("STORE rejected".into()));
        }
        match state.messages.iter_mut().find(|m| m.message.id == id) {
            Some(m) => {
                m.seen = true;
                Ok(())
            }
            None => Err(PaymentError::Transport(format!("no message {id}"))),
        }
    }

    async fn move_to(&mut self, id: &str, folder: &str) -> Result<()> {
        self.ensure_connected()?;
        let mut state = self.state();
        match state.messages.iter_mut().find(|m| m.message.id == id) {
            Some(m) => {
                m.folder = folder.to_string();
                Ok(())
            }
            None => Err(PaymentError::Transport(format!("no message {id}"))),
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        let mut state = self.state();
        if state.connected {
            state.connected = false;
            state.disconnects += 1;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationsNotice {
    pub subject: String,
    pub body: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayerNotice {
    pub order_reference: String,
    pub payer_email: String,
    pub data: PayerReminder,
}

/// Keeps every notification it is asked to send.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    operations: Mutex<Vec<OperationsNotice>>,
    payers: Mutex<Vec<PayerNotice>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    /// Creates a new notifier with nothing recorded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call records nothing and returns an error while set.
    pub fn fail_all(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn operations(&self) -> Vec<OperationsNotice> {
        self.operations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn payer_notices(&self) -> Vec<PayerNotice> {
        self.payers.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn operations_matching(&self, subject_prefix: &str) -> usize {
        self.operations()
            .iter()
            .filter(|n| n.subject.starts_with(subject_prefix))
            .count()
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            Err(PaymentError::Notification("notifier unavailable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_operations(
        &self,
        subject: &str,
        body: &str,
        priority: Priority,
    ) -> Result<()> {
        self.check()?;
        self.operations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(OperationsNotice {
                subject: subject.to_string(),
                body: body.to_string(),
                priority,
            });
        Ok(())
    }

    async fn notify_payer(
        &self,
        order: &Order,
        payer: &Customer,
        data: &PayerReminder,
    ) -> Result<()> {
        self.check()?;
        self.payers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(PayerNotice {
                order_reference: order.reference.clone(),
                payer_email: payer.email.clone(),
                data: data.clone(),
            });
        Ok(())
    }
}

/// Records which orders were handed to the downstream workflow.
#[derive(Debug, Default)]
pub struct RecordingWorkflow {
    verified: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl RecordingWorkflow {
    /// Creates a new workflow with nothing recorded.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_all(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn verified_references(&self) -> Vec<String> {
        self.verified
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl OrderWorkflow for RecordingWorkflow {
    async fn payment_verified(&self, order: &Order) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PaymentError::Notification("workflow unavailable".into()));
        }
        self.verified
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(order.reference.clone());
        Ok(())
    }
}
