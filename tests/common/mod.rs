#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use paymatch::application::job::{JobSettings, PaymentJob};
use paymatch::application::links::PaymentLinkGenerator;
use paymatch::config::LinkSettings;
use paymatch::domain::message::MailMessage;
use paymatch::domain::money::Amount;
use paymatch::domain::order::{Customer, Order};
use paymatch::domain::ports::OrderStore;
use paymatch::infrastructure::in_memory::{
    InMemoryMailbox, InMemoryOrderStore, RecordingNotifier, RecordingWorkflow,
};
use rust_decimal::Decimal;
use std::sync::Arc;

pub const REF: &str = "ORD-1b9d6bcd-bbfd-4b2d-9b5d-ab8dfbbd4bed";
pub const SHORT: &str = "FBBD4BED";
pub const OTHER_REF: &str = "ORD-9c4e1f02-7a3b-4c1d-8e2f-0123456789ab";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap()
}

pub fn amount(value: Decimal) -> Amount {
    Amount::new(value).unwrap()
}

pub fn jane() -> Customer {
    Customer {
        name: "Jane Roe".into(),
        email: "jane@example.com".into(),
    }
}

pub fn awaiting_order(reference: &str, expected: Decimal) -> Order {
    Order::awaiting(reference, jane(), amount(expected), t0())
}

pub fn message(id: &str, from: &str, subject: &str, text: &str) -> MailMessage {
    let from_address = from
        .rsplit_once('<')
        .map(|(_, addr)| addr.trim_end_matches('>').to_string())
        .unwrap_or_else(|| from.to_string());
    MailMessage {
        id: id.into(),
        from: from.into(),
        from_address,
        subject: subject.into(),
        date: Some(t0()),
        text: Some(text.into()),
        html: None,
        message_id: Some(format!("<{id}@mail.test>")),
    }
}

pub fn venmo_email(id: &str, dollars: &str, memo: &str) -> MailMessage {
    message(
        id,
        "Venmo <venmo@venmo.com>",
        &format!("Jane Roe paid you ${dollars}"),
        &format!("Jane Roe paid you\n${dollars}\n{memo}\nPayment ID: 4012345678901234567"),
    )
}

pub fn paypal_email(id: &str, dollars: &str, memo: &str) -> MailMessage {
    message(
        id,
        "service@paypal.com",
        "You've got money",
        &format!(
            "Jane Roe sent you ${dollars} USD\nNote from Jane Roe: {memo}\nTransaction ID: 8AB12345CD6789012"
        ),
    )
}

pub fn cashapp_email(id: &str, dollars: &str, memo: &str) -> MailMessage {
    message(
        id,
        "Cash App <cash@square.com>",
        &format!("Jane Roe sent you ${dollars} for {memo}"),
        "Payment received\nIdentifier #D8KQ3X",
    )
}

pub fn zelle_email(id: &str, dollars: &str, memo: &str) -> MailMessage {
    message(
        id,
        "Zelle <alerts@zellepay.com>",
        "You received money with Zelle",
        &format!("Jane Roe sent you ${dollars}\nMemo: {memo}\nConfirmation number: ZL12345"),
    )
}

pub fn newsletter(id: &str) -> MailMessage {
    message(
        id,
        "news@example.com",
        "Our autumn menu",
        "Pumpkin bread is back. Order now!",
    )
}

pub fn link_settings() -> LinkSettings {
    LinkSettings {
        product_name: "Bakery".into(),
        venmo_handle: Some("@corner-bakery".into()),
        paypal_handle: Some("cornerbakery".into()),
        cashtag: Some("$CornerBakery".into()),
        qr_size: 64,
        ..LinkSettings::default()
    }
}

/// A job wired to in-memory adapters, with handles the test keeps for inspection.
pub struct Harness {
    pub mailbox: InMemoryMailbox,
    pub store: InMemoryOrderStore,
    pub notifier: Arc<RecordingNotifier>,
    pub workflow: Arc<RecordingWorkflow>,
    pub job: Arc<PaymentJob>,
}

impl Harness {
    pub fn new(orders: Vec<Order>) -> Self {
        Self::with_settings(orders, JobSettings::default())
    }

    pub fn with_settings(orders: Vec<Order>, settings: JobSettings) -> Self {
        Self::with_links(orders, settings, link_settings())
    }

    pub fn with_links(orders: Vec<Order>, settings: JobSettings, links: LinkSettings) -> Self {
        let mailbox = InMemoryMailbox::new();
        let store = InMemoryOrderStore::with_orders(orders);
        let notifier = Arc::new(RecordingNotifier::new());
        let workflow = Arc::new(RecordingWorkflow::new());
        let job = Arc::new(PaymentJob::new(
            Box::new(mailbox.clone()),
            Arc::new(store.clone()),
            notifier.clone(),
            workflow.clone(),
            PaymentLinkGenerator::new(links),
            settings,
        ));
        Self {
            mailbox,
            store,
            notifier,
            workflow,
            job,
        }
    }

    pub async fn order(&self, reference: &str) -> Order {
        self.store
            .find_by_reference(reference)
            .await
            .unwrap()
            .unwrap()
    }
}
