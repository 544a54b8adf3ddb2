use super::link::{PaymentLink, QrEncoding};
use super::money::Amount;
use super::provider::Provider;
use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of trailing reference characters shown to payers.
pub const SHORT_REFERENCE_LEN: usize = 8;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Awaiting,
    Verified,
    Failed,
}

impl PaymentStatus {
    /// `Verified` and `Failed` are never left once reached.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Verified | PaymentStatus::Failed)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Awaiting => "awaiting",
            PaymentStatus::Verified => "verified",
            PaymentStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Customer {
    pub name: String,
    pub email: String,
}

/// The payment-tracking part of an order.
///
/// The upstream order workflow creates it and moves it to `Awaiting`; from there only this
/// crate mutates it, until it reaches `Verified` or `Failed`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub status: PaymentStatus,
    pub expected_amount: Amount,
    #[serde(default)]
    pub method: Option<Provider>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub requested_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub check_attempts: u32,
    #[serde(default)]
    pub last_check_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reminder_count: u32,
    #[serde(default)]
    pub last_reminder_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub links: Vec<PaymentLink>,
    #[serde(default)]
    pub qr_encodings: Vec<QrEncoding>,
}

impl PaymentRecord {
    pub fn new(expected_amount: Amount) -> Self {
        Self {
            status: PaymentStatus::Pending,
            expected_amount,
            method: None,
            transaction_id: None,
            requested_at: None,
            verified_at: None,
            check_attempts: 0,
            last_check_at: None,
            reminder_count: 0,
            last_reminder_at: None,
            notes: String::new(),
            links: Vec::new(),
            qr_encodings: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Order {
    /// Opaque `ORD-<uuid>` token the payer copies into the payment memo.
    pub reference: String,
    pub customer: Customer,
    pub payment: PaymentRecord,
}

impl Order {
    pub fn new(reference: impl Into<String>, customer: Customer, expected_amount: Amount) -> Self {
        Self {
            reference: reference.into(),
            customer,
            payment: PaymentRecord::new(expected_amount),
        }
    }

    /// Builds an order the upstream workflow has already asked the customer to pay.
    pub fn awaiting(
        reference: impl Into<String>,
        customer: Customer,
        expected_amount: Amount,
        requested_at: DateTime<Utc>,
    ) -> Self {
        let mut order = Self::new(reference, customer, expected_amount);
        order.payment.status = PaymentStatus::Awaiting;
        order.payment.requested_at = Some(requested_at);
        order
    }

    pub fn short_reference(&self) -> String {
        short_reference(&self.reference)
    }

    pub fn status(&self) -> PaymentStatus {
        self.payment.status
    }

    /// Polled only while awaiting and after payment was actually requested.
    pub fn is_eligible(&self) -> bool {
        self.payment.status == PaymentStatus::Awaiting && self.payment.requested_at.is_some()
    }

    fn ensure_awaiting(&self) -> Result<(), PaymentError> {
        if self.payment.status == PaymentStatus::Awaiting {
            Ok(())
        } else {
            Err(PaymentError::OrderNotAwaiting {
                reference: self.reference.clone(),
                status: self.payment.status,
            })
        }
    }

    /// Counts one poll that found no payment. Returns the new attempt count.
    pub fn record_check(&mut self, now: DateTime<Utc>) -> Result<u32, PaymentError> {
        self.ensure_awaiting()?;
        self.payment.check_attempts = self.payment.check_attempts.saturating_add(1);
        self.payment.last_check_at = Some(now);
        Ok(self.payment.check_attempts)
    }

    pub fn mark_verified(
        &mut self,
        provider: Provider,
        transaction_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), PaymentError> {
        self.ensure_awaiting()?;
        self.payment.status = PaymentStatus::Verified;
        self.payment.verified_at = Some(now);
        self.payment.last_check_at = Some(now);
        self.payment.transaction_id = Some(transaction_id.into());
        self.payment.method = Some(provider);
        Ok(())
    }

    pub fn mark_failed(&mut self, now: DateTime<Utc>) -> Result<(), PaymentError> {
        self.ensure_awaiting()?;
        self.payment.status = PaymentStatus::Failed;
        self.payment.last_check_at = Some(now);
        Ok(())
    }

    /// Stores freshly generated links and counts the reminder.
    pub fn record_reminder(
        &mut self,
        links: Vec<PaymentLink>,
        qr_encodings: Vec<QrEncoding>,
        now: DateTime<Utc>,
    ) -> Result<u32, PaymentError> {
        self.ensure_awaiting()?;
        self.payment.links = links;
        self.payment.qr_encodings = qr_encodings;
        self.payment.reminder_count += 1;
        self.payment.last_reminder_at = Some(now);
        Ok(self.payment.reminder_count)
    }

    /// Appends a line to the free-text notes.
    pub fn annotate(&mut self, note: &str) {
        if !self.payment.notes.is_empty() {
            self.payment.notes.push('\n');
        }
        self.payment.notes.push_str(note);
    }
}

/// Last eight characters of a reference, upper-cased.
pub fn short_reference(reference: &str) -> String {
    let chars: Vec<char> = reference.chars().collect();
    let start = chars.len().saturating_sub(SHORT_REFERENCE_LEN);
    chars[start..].iter().collect::<String>().to_ascii_uppercase()
}
