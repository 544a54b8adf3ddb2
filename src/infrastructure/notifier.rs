use crate::domain::order::{Customer, Order};
use crate::domain::ports::{Notifier, OrderWorkflow, PayerReminder, Priority};
use crate::error::Result;
use async_trait::async_trait;
use tracing::{info, warn};

/// Writes notifications to the log instead of sending them.
///
/// Outbound email lives outside this crate; the CLI uses this so operators can follow
/// anomalies from the service log.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify_operations(
        &self,
        subject: &str,
        body: &str,
        priority: Priority,
    ) -> Result<()> {
        match priority {
            Priority::Normal => info!(target: "paymatch::operations", ?priority, subject, body),
            Priority::High | Priority::Urgent => {
                warn!(target: "paymatch::operations", ?priority, subject, body)
            }
        }
        Ok(())
    }

    async fn notify_payer(
        &self,
        order: &Order,
        payer: &Customer,
        data: &PayerReminder,
    ) -> Result<()> {
        let links: Vec<&str> = data.links.iter().map(|l| l.uri.as_str()).collect();
        info!(
            target: "paymatch::payer",
            order = %order.reference,
            payer = %payer.email,
            reminder = data.reminder_number,
            amount = %data.amount,
            note = %data.note,
            ?links,
            "payment reminder"
        );
        Ok(())
    }
}

/// Logs verified orders for the downstream fulfilment process.
#[derive(Debug, Default, Clone)]
pub struct TracingWorkflow;

#[async_trait]
impl OrderWorkflow for TracingWorkflow {
    async fn payment_verified(&self, order: &Order) -> Result<()> {
        info!(
            target: "paymatch::workflow",
            order = %order.reference,
            customer = %order.customer.email,
            method = ?order.payment.method,
            "order ready for pickup"
        );
        Ok(())
    }
}
