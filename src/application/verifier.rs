use crate::domain::candidate::PaymentCandidate;
use crate::domain::order::{Order, PaymentStatus};
use crate::domain::ports::{NotifierHandle, OrderStoreHandle, OrderWorkflowHandle, Priority};
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerificationOutcome {
    /// Order moved to `verified`. `overpayment` is set when more than expected arrived.
    Verified { overpayment: Option<Decimal> },
    /// Order was already verified; nothing changed.
    Duplicate,
    /// Less than expected arrived; the order keeps awaiting.
    Underpaid { shortfall: Decimal },
}

impl VerificationOutcome {
    /// Handled outcomes mark their source message as processed.
    pub fn is_handled(&self) -> bool {
        !matches!(self, VerificationOutcome::Underpaid { .. })
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, VerificationOutcome::Verified { .. })
    }
}

/// Applies the amount-tolerance policy to a candidate and records the result on its order.
///
/// Amounts at or above the expected value verify the order; anything below leaves it
/// awaiting. Operator notifications and downstream workflow calls never change the outcome.
pub struct PaymentVerifier {
    orders: OrderStoreHandle,
    notifier: NotifierHandle,
    workflow: OrderWorkflowHandle,
}

impl PaymentVerifier {
    /// Creates a new verifier over the order store and notification ports.
    pub fn new(
        orders: OrderStoreHandle,
        notifier: NotifierHandle,
        workflow: OrderWorkflowHandle,
    ) -> Self {
        Self {
            orders,
            notifier,
            workflow,
        }
    }

    pub async fn verify(
        &self,
        candidate: &PaymentCandidate,
        now: DateTime<Utc>,
    ) -> Result<VerificationOutcome> {
        let mut order = self
            .orders
            .find_by_reference(&candidate.order_reference)
            .await?
            .ok_or_else(|| PaymentError::OrderNotFound(candidate.order_reference.clone()))?;

        match order.status() {
            PaymentStatus::Verified => {
                warn!(order = %order.reference, provider = %candidate.provider, "duplicate payment received");
                self.report_duplicate(&order, candidate).await;
                return Ok(VerificationOutcome::Duplicate);
            }
            PaymentStatus::Awaiting => {}
            status => {
                return Err(PaymentError::OrderNotAwaiting {
                    reference: order.reference,
                    status,
                });
            }
        }

        let expected = order.payment.expected_amount;
        let delta = candidate.amount - expected;

        if delta < Decimal::ZERO {
            let shortfall = -delta;
            warn!(order = %order.reference, %shortfall, "underpayment received");
            self.fire(
                &format!("Underpayment for order #{}", order.short_reference()),
                &format!(
                    "Order {reference} expected ${expected}, received ${received} via {provider} \
                     (transaction {txn}, sender {sender}). Shortfall: ${shortfall}. \
                     The order is still awaiting payment.",
                    reference = order.reference,
                    expected = expected.to_fixed(),
                    received = candidate.amount.to_fixed(),
                    provider = candidate.provider,
                    txn = candidate.transaction_id,
                    sender = candidate.sender.as_deref().unwrap_or("unknown"),
                    shortfall = money(shortfall),
                ),
                Priority::High,
            )
            .await;
            return Ok(VerificationOutcome::Underpaid { shortfall });
        }

        order.mark_verified(candidate.provider, candidate.transaction_id.clone(), now)?;
        let overpayment = (delta > Decimal::ZERO).then_some(delta);
        if let Some(over) = overpayment {
            order.annotate(&format!(
                "Overpaid by ${} via {} (transaction {})",
                money(over),
                candidate.provider,
                candidate.transaction_id
            ));
        }
        self.orders.save(order.clone()).await?;
        info!(
            order = %order.reference,
            provider = %candidate.provider,
            transaction = %candidate.transaction_id,
            "payment verified"
        );

        if let Some(over) = overpayment {
            self.fire(
                &format!("Overpayment for order #{}", order.short_reference()),
                &format!(
                    "Order {} expected ${}, received ${} via {}. Overpaid by ${}; reconcile or refund.",
                    order.reference,
                    expected.to_fixed(),
                    candidate.amount.to_fixed(),
                    candidate.provider,
                    money(over),
                ),
                Priority::Normal,
            )
            .await;
        }

        if let Err(e) = self.workflow.payment_verified(&order).await {
            warn!(order = %order.reference, error = %e, "order workflow hook failed after verification");
        }

        Ok(VerificationOutcome::Verified { overpayment })
    }

    async fn report_duplicate(&self, order: &Order, candidate: &PaymentCandidate) {
        self.fire(
            &format!("Duplicate payment for order #{}", order.short_reference()),
            &format!(
                "Order {} was already verified (transaction {}). Another ${} arrived via {} \
                 (transaction {}, sender {}). No state was changed; a refund may be required.",
                order.reference,
                order.payment.transaction_id.as_deref().unwrap_or("unknown"),
                candidate.amount.to_fixed(),
                candidate.provider,
                candidate.transaction_id,
                candidate.sender.as_deref().unwrap_or("unknown"),
            ),
            Priority::High,
        )
        .await;
    }

    async fn fire(&self, subject: &str, body: &str, priority: Priority) {
        if let Err(e) = self
            .notifier
            .notify_operations(subject, body, priority)
            .await
        {
            warn!(error = %e, subject, "operator notification failed");
        }
    }
}

fn money(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(2))
}
