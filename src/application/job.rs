//! The verification job: one owner for the mailbox session, the single-flight flag and the
//! per-order attempt bookkeeping.
//!
//! A cycle runs two phases against one mailbox session:
//!
//! 1. bulk scan of unseen messages, each parsed and verified;
//! 2. targeted re-check of every order still awaiting payment, which searches the mailbox
//!    for the order's reference and otherwise counts a failed attempt, sending reminders and
//!    escalating on the configured cadence.
//!
//! Mailbox calls are bounded by a timeout. A transport failure aborts the rest of the cycle;
//! any other failure is confined to the message or order it happened on.

use super::cadence::{CadenceAction, ReminderCadence};
use super::links::PaymentLinkGenerator;
use super::verifier::{PaymentVerifier, VerificationOutcome};
use crate::config::Settings;
use crate::domain::message::MailMessage;
use crate::domain::order::{Order, PaymentStatus};
use crate::domain::ports::{
    Mailbox, MailboxBox, NotifierHandle, OrderStoreHandle, OrderWorkflowHandle, PayerReminder,
    Priority,
};
use crate::error::{PaymentError, Result};
use crate::parsing::{EmailParser, ParseOutcome, PaymentExtractor};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct JobSettings {
    pub cadence: ReminderCadence,
    pub mailbox_timeout: Duration,
    /// Handled messages are moved here after being marked read.
    pub processed_folder: Option<String>,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            cadence: ReminderCadence::default(),
            mailbox_timeout: Duration::from_secs(30),
            processed_folder: None,
        }
    }
}

impl JobSettings {
    /// Creates new job settings from the loaded configuration.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            cadence: ReminderCadence::from_settings(&settings.schedule),
            mailbox_timeout: settings.mailbox.timeout(),
            processed_folder: settings.mailbox.processed_folder.clone(),
        }
    }
}

/// Counters for one completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub messages_scanned: usize,
    pub not_applicable: usize,
    pub unattributed: usize,
    pub verified: usize,
    pub duplicates: usize,
    pub underpaid: usize,
    pub item_errors: usize,
    pub marked_read: usize,
    pub orders_rechecked: usize,
    pub attempts_recorded: usize,
    pub reminders_sent: usize,
    pub escalations: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleRun {
    Completed(CycleReport),
    /// Another cycle held the single-flight flag.
    Skipped,
}

struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct PaymentJob {
    mailbox: Mutex<MailboxBox>,
    parser: EmailParser,
    verifier: PaymentVerifier,
    orders: OrderStoreHandle,
    notifier: NotifierHandle,
    links: PaymentLinkGenerator,
    settings: JobSettings,
    running: AtomicBool,
}

impl PaymentJob {
    /// Creates a new job over the given adapters. Nothing runs until `run_cycle`.
    pub fn new(
        mailbox: MailboxBox,
        orders: OrderStoreHandle,
        notifier: NotifierHandle,
        workflow: OrderWorkflowHandle,
        links: PaymentLinkGenerator,
        settings: JobSettings,
    ) -> Self {
        Self {
            mailbox: Mutex::new(mailbox),
            parser: EmailParser::new(PaymentExtractor::default(), orders.clone()),
            verifier: PaymentVerifier::new(orders.clone(), notifier.clone(), workflow),
            orders,
            notifier,
            links,
            settings,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn try_begin(&self) -> Option<FlightGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard(&self.running))
    }

    /// Runs one scan-then-recheck cycle, or skips if one is already in flight.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleRun> {
        let Some(_guard) = self.try_begin() else {
            warn!("verification cycle still running; skipping tick");
            return Ok(CycleRun::Skipped);
        };

        let mut mailbox = self.mailbox.lock().await;
        let mut report = CycleReport::default();
        let result = self.run_session(&mut **mailbox, now, &mut report).await;

        if let Err(e) = self.call("disconnect", mailbox.disconnect()).await {
            warn!(error = %e, "mailbox disconnect failed");
        }

        match result {
            Ok(()) => {
                info!(
                    scanned = report.messages_scanned,
                    verified = report.verified,
                    duplicates = report.duplicates,
                    underpaid = report.underpaid,
                    rechecked = report.orders_rechecked,
                    reminders = report.reminders_sent,
                    escalations = report.escalations,
                    "verification cycle complete"
                );
                Ok(CycleRun::Completed(report))
            }
            Err(e) => {
                error!(error = %e, "verification cycle aborted");
                Err(e)
            }
        }
    }

    async fn run_session(
        &self,
        mailbox: &mut dyn Mailbox,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Result<()> {
        self.call("connect", mailbox.connect()).await?;

        let mut seen_this_cycle = HashSet::new();
        let mut settled = HashSet::new();

        let unseen = self.call("list unseen", mailbox.list_unseen()).await?;
        report.messages_scanned = unseen.len();
        for message in unseen {
            seen_this_cycle.insert(message.id.clone());
            if let Some((reference, outcome)) = self.handle_message(mailbox, &message, now, report).await?
                && outcome.is_verified()
            {
                settled.insert(reference.to_ascii_lowercase());
            }
        }

        let awaiting = self.orders.find_awaiting_eligible().await?;
        for order in awaiting {
            if settled.contains(&order.reference.to_ascii_lowercase()) {
                continue;
            }
            report.orders_rechecked += 1;
            match self
                .recheck_order(mailbox, &order, now, report, &mut seen_this_cycle)
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_transport() => return Err(e),
                Err(e) => {
                    warn!(order = %order.reference, error = %e, "order re-check failed");
                    report.item_errors += 1;
                }
            }
        }
        Ok(())
    }

    /// Parses and verifies one message. Only transport errors escape; everything else is
    /// logged and counted against the message.
    async fn handle_message(
        &self,
        mailbox: &mut dyn Mailbox,
        message: &MailMessage,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Result<Option<(String, VerificationOutcome)>> {
        let candidate = match self.parser.parse(message, now).await {
            Ok(ParseOutcome::Candidate(candidate)) => candidate,
            Ok(ParseOutcome::NotApplicable) => {
                debug!(message_id = %message.id, subject = %message.subject, "not a payment email");
                report.not_applicable += 1;
                return Ok(None);
            }
            Ok(ParseOutcome::Unattributed { .. }) => {
                report.unattributed += 1;
                return Ok(None);
            }
            Err(e) => return self.item_failure(message, e, report),
        };

        let outcome = match self.verifier.verify(&candidate, now).await {
            Ok(outcome) => outcome,
            Err(e) => return self.item_failure(message, e, report),
        };

        match outcome {
            VerificationOutcome::Verified { .. } => report.verified += 1,
            VerificationOutcome::Duplicate => report.duplicates += 1,
            VerificationOutcome::Underpaid { .. } => report.underpaid += 1,
        }
        if outcome.is_handled() {
            self.finish_message(mailbox, &message.id, report).await;
        }
        Ok(Some((candidate.order_reference, outcome)))
    }

    fn item_failure<T>(
        &self,
        message: &MailMessage,
        e: PaymentError,
        report: &mut CycleReport,
    ) -> Result<Option<T>> {
        if e.is_transport() {
            return Err(e);
        }
        match &e {
            PaymentError::OrderNotFound(reference) => {
                info!(message_id = %message.id, reference = %reference, "payment for unknown order");
                report.unattributed += 1;
            }
            _ => {
                warn!(message_id = %message.id, error = %e, "payment email left for retry");
                report.item_errors += 1;
            }
        }
        Ok(None)
    }

    /// Best-effort: marks the message read and files it away. Failures are only logged.
    async fn finish_message(&self, mailbox: &mut dyn Mailbox, id: &str, report: &mut CycleReport) {
        match self.call("mark read", mailbox.mark_read(id)).await {
            Ok(()) => report.marked_read += 1,
            Err(e) => warn!(message_id = id, error = %e, "failed to mark message read"),
        }
        if let Some(folder) = self.settings.processed_folder.as_deref()
            && let Err(e) = self.call("move", mailbox.move_to(id, folder)).await
        {
            warn!(message_id = id, folder, error = %e, "failed to move processed message");
        }
    }

    async fn recheck_order(
        &self,
        mailbox: &mut dyn Mailbox,
        order: &Order,
        now: DateTime<Utc>,
        report: &mut CycleReport,
        seen_this_cycle: &mut HashSet<String>,
    ) -> Result<()> {
        // The short reference also matches memos carrying the full reference.
        let found = self
            .call("search", mailbox.search(&order.short_reference()))
            .await?;
        for message in found {
            if !seen_this_cycle.insert(message.id.clone()) {
                continue;
            }
            if let Some((reference, outcome)) =
                self.handle_message(mailbox, &message, now, report).await?
                && outcome.is_verified()
                && reference.eq_ignore_ascii_case(&order.reference)
            {
                return Ok(());
            }
        }
        self.record_missed_check(&order.reference, now, report).await
    }

    /// Counts one attempt without a payment, then reminds or escalates per the cadence.
    pub async fn record_missed_check(
        &self,
        reference: &str,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Result<()> {
        let mut order = self
            .orders
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| PaymentError::OrderNotFound(reference.to_string()))?;
        if order.status() != PaymentStatus::Awaiting {
            return Ok(());
        }

        let attempts = order.record_check(now)?;
        report.attempts_recorded += 1;
        debug!(order = %order.reference, attempts, "no payment found yet");

        match self.settings.cadence.action_for(attempts) {
            CadenceAction::Escalate => {
                order.mark_failed(now)?;
                self.orders.save(order.clone()).await?;
                report.escalations += 1;
                self.escalate(&order, now).await;
            }
            CadenceAction::Remind => {
                self.remind(&mut order, now, report).await?;
            }
            CadenceAction::None => self.orders.save(order).await?,
        }
        Ok(())
    }

    async fn remind(
        &self,
        order: &mut Order,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Result<()> {
        let amount = order.payment.expected_amount;
        let generated = match self
            .links
            .generate(&order.reference, amount, Some(&order.customer.name))
        {
            Ok(generated) => generated,
            Err(e) => {
                error!(order = %order.reference, error = %e, "could not regenerate payment links; reminder not sent");
                return self.orders.save(order.clone()).await;
            }
        };

        let reminder_number = order.record_reminder(
            generated.links.clone(),
            generated.qr_encodings.clone(),
            now,
        )?;
        self.orders.save(order.clone()).await?;
        report.reminders_sent += 1;
        info!(order = %order.reference, reminder_number, "sending payment reminder");

        let data = PayerReminder {
            order_reference: order.reference.clone(),
            short_reference: generated.short_reference,
            note: generated.note,
            amount,
            reminder_number,
            links: generated.links,
            qr_encodings: generated.qr_encodings,
        };
        if let Err(e) = self
            .notifier
            .notify_payer(order, &order.customer, &data)
            .await
        {
            warn!(order = %order.reference, error = %e, "payer reminder failed");
        }
        Ok(())
    }

    async fn escalate(&self, order: &Order, now: DateTime<Utc>) {
        let elapsed = order
            .payment
            .requested_at
            .map(|at| now - at)
            .unwrap_or_else(TimeDelta::zero)
            .max(TimeDelta::zero());
        warn!(
            order = %order.reference,
            attempts = order.payment.check_attempts,
            "payment not received; order failed"
        );
        let body = format!(
            "No payment was found for order {reference} after {hours}h {minutes}m \
             ({attempts} checks, {reminders} reminders).\n\
             Customer: {name} <{email}>\n\
             Expected amount: ${amount}\n\
             The order has been marked failed and will no longer be polled.",
            reference = order.reference,
            hours = elapsed.num_hours(),
            minutes = elapsed.num_minutes() % 60,
            attempts = order.payment.check_attempts,
            reminders = order.payment.reminder_count,
            name = order.customer.name,
            email = order.customer.email,
            amount = order.payment.expected_amount.to_fixed(),
        );
        if let Err(e) = self
            .notifier
            .notify_operations(
                &format!("Payment not received for order #{}", order.short_reference()),
                &body,
                Priority::Urgent,
            )
            .await
        {
            warn!(order = %order.reference, error = %e, "escalation notification failed");
        }
    }

    /// Bounds a mailbox call by the configured timeout.
    async fn call<T>(&self, op: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.settings.mailbox_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(PaymentError::Transport(format!(
                "mailbox {op} timed out after {:?}",
                self.settings.mailbox_timeout
            ))),
        }
    }
}
