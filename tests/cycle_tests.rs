mod common;

use chrono::{DateTime, TimeDelta, Utc};
use common::*;
use paymatch::application::cadence::ReminderCadence;
use paymatch::application::job::{CycleReport, CycleRun, JobSettings, PaymentJob};
use paymatch::application::links::PaymentLinkGenerator;
use paymatch::config::LinkSettings;
use paymatch::domain::order::PaymentStatus;
use paymatch::domain::ports::{OrderStore, Priority};
use paymatch::error::PaymentError;
use paymatch::infrastructure::in_memory::{InMemoryMailbox, RecordingNotifier, RecordingWorkflow};
use paymatch::infrastructure::json_file::JsonFileOrderStore;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

fn tick(n: i64) -> DateTime<Utc> {
    t0() + TimeDelta::minutes(5 * n)
}

async fn completed(h: &Harness, now: DateTime<Utc>) -> CycleReport {
    match h.job.run_cycle(now).await.unwrap() {
        CycleRun::Completed(report) => report,
        CycleRun::Skipped => panic!("cycle unexpectedly skipped"),
    }
}

#[tokio::test]
async fn test_verified_message_is_marked_read_and_others_left_alone() {
    let h = Harness::new(vec![awaiting_order(REF, dec!(12.50))]);
    h.mailbox.deliver(newsletter("1"));
    h.mailbox.deliver(venmo_email("2", "12.50", REF));

    let report = completed(&h, tick(1)).await;
    assert_eq!(report.messages_scanned, 2);
    assert_eq!(report.not_applicable, 1);
    assert_eq!(report.verified, 1);
    assert_eq!(report.marked_read, 1);
    assert_eq!(report.orders_rechecked, 0);

    assert!(h.mailbox.is_seen("2"));
    assert!(!h.mailbox.is_seen("1"));
    assert_eq!(h.order(REF).await.status(), PaymentStatus::Verified);
    assert_eq!(h.workflow.verified_references(), vec![REF.to_string()]);
    assert!(!h.mailbox.is_connected());
}

#[tokio::test]
async fn test_processed_messages_move_to_configured_folder() {
    let settings = JobSettings {
        processed_folder: Some("Payments/Done".into()),
        ..JobSettings::default()
    };
    let h = Harness::with_settings(vec![awaiting_order(REF, dec!(12.50))], settings);
    h.mailbox.deliver(paypal_email("1", "12.50", REF));

    completed(&h, tick(1)).await;
    assert_eq!(h.mailbox.folder_of("1").as_deref(), Some("Payments/Done"));
}

#[tokio::test]
async fn test_mark_read_failure_still_verifies() {
    let h = Harness::new(vec![awaiting_order(REF, dec!(12.50))]);
    h.mailbox.deliver(venmo_email("1", "12.50", REF));
    h.mailbox.fail_mark_read(true);

    let report = completed(&h, tick(1)).await;
    assert_eq!(report.verified, 1);
    assert_eq!(report.marked_read, 0);
    assert_eq!(h.order(REF).await.status(), PaymentStatus::Verified);
}

#[tokio::test]
async fn test_underpaid_message_stays_unread_with_one_alert_per_cycle() {
    let h = Harness::new(vec![awaiting_order(REF, dec!(12.50))]);
    h.mailbox.deliver(venmo_email("1", "10.00", REF));

    let report = completed(&h, tick(1)).await;
    assert_eq!(report.underpaid, 1);
    assert_eq!(report.attempts_recorded, 1);
    assert!(!h.mailbox.is_seen("1"));
    assert_eq!(h.notifier.operations_matching("Underpayment for order #"), 1);

    let order = h.order(REF).await;
    assert_eq!(order.status(), PaymentStatus::Awaiting);
    assert_eq!(order.payment.check_attempts, 1);

    completed(&h, tick(2)).await;
    assert_eq!(h.notifier.operations_matching("Underpayment for order #"), 2);
}

#[tokio::test]
async fn test_duplicate_payment_is_flagged_and_marked_read() {
    let h = Harness::new(vec![awaiting_order(REF, dec!(12.50))]);
    h.mailbox.deliver(venmo_email("1", "12.50", REF));
    completed(&h, tick(1)).await;

    h.mailbox.deliver(cashapp_email("2", "12.50", REF));
    let report = completed(&h, tick(2)).await;
    assert_eq!(report.duplicates, 1);
    assert!(h.mailbox.is_seen("2"));
    assert_eq!(h.notifier.operations_matching("Duplicate payment for order #"), 1);
    assert_eq!(h.workflow.verified_references().len(), 1);
}

#[tokio::test]
async fn test_unknown_reference_is_left_unread() {
    let h = Harness::new(vec![]);
    h.mailbox.deliver(venmo_email("1", "12.50", OTHER_REF));

    let report = completed(&h, tick(1)).await;
    assert_eq!(report.unattributed, 1);
    assert!(!h.mailbox.is_seen("1"));
    assert!(h.notifier.operations().is_empty());
}

#[tokio::test]
async fn test_targeted_recheck_finds_already_read_payment() {
    let h = Harness::new(vec![awaiting_order(REF, dec!(12.50))]);
    h.mailbox.deliver(venmo_email("1", "12.50", &format!("Bakery Order #{SHORT}")));
    // Someone opened the notification in a mail client before the poller saw it.
    {
        use paymatch::domain::ports::Mailbox;
        let mut mb = h.mailbox.clone();
        mb.connect().await.unwrap();
        mb.mark_read("1").await.unwrap();
        mb.disconnect().await.unwrap();
    }

    let report = completed(&h, tick(1)).await;
    assert_eq!(report.messages_scanned, 0);
    assert_eq!(report.orders_rechecked, 1);
    assert_eq!(report.verified, 1);
    assert_eq!(report.attempts_recorded, 0);
    assert_eq!(h.order(REF).await.status(), PaymentStatus::Verified);
}

#[tokio::test]
async fn test_attempts_increase_by_one_per_cycle() {
    let h = Harness::new(vec![awaiting_order(REF, dec!(12.50))]);
    for n in 1..=5 {
        let report = completed(&h, tick(n)).await;
        assert_eq!(report.attempts_recorded, 1);
        let order = h.order(REF).await;
        assert_eq!(order.payment.check_attempts, n as u32);
        assert_eq!(order.payment.last_check_at, Some(tick(n)));
    }
}

#[tokio::test]
async fn test_pending_orders_are_not_polled() {
    let mut pending = awaiting_order(REF, dec!(12.50));
    pending.payment.requested_at = None;
    let h = Harness::new(vec![pending]);

    let report = completed(&h, tick(1)).await;
    assert_eq!(report.orders_rechecked, 0);
    assert_eq!(h.order(REF).await.payment.check_attempts, 0);
}

#[tokio::test]
async fn test_reminders_follow_the_cadence() {
    let h = Harness::new(vec![awaiting_order(REF, dec!(12.50))]);
    let cadence = ReminderCadence::default();

    for n in 1..=30 {
        completed(&h, tick(n)).await;
        let expected = (1..=n as u32).filter(|a| cadence.reminder_due(*a)).count();
        assert_eq!(h.notifier.payer_notices().len(), expected, "after attempt {n}");
    }

    let notices = h.notifier.payer_notices();
    let numbers: Vec<u32> = notices.iter().map(|n| n.data.reminder_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);

    let first = &notices[0];
    assert_eq!(first.payer_email, "jane@example.com");
    assert_eq!(first.data.short_reference, SHORT);
    assert_eq!(first.data.note, format!("Bakery Order #{SHORT}"));
    assert_eq!(first.data.links.len(), 3);
    assert_eq!(first.data.qr_encodings.len(), 3);

    let order = h.order(REF).await;
    assert_eq!(order.payment.reminder_count, 3);
    assert_eq!(order.payment.last_reminder_at, Some(tick(30)));
    assert_eq!(order.payment.links, first.data.links);
}

#[tokio::test]
async fn test_escalation_fires_once_at_max_attempts() {
    let h = Harness::new(vec![awaiting_order(REF, dec!(12.50))]);

    for n in 1..=47 {
        completed(&h, tick(n)).await;
    }
    let order = h.order(REF).await;
    assert_eq!(order.status(), PaymentStatus::Awaiting);
    assert_eq!(order.payment.check_attempts, 47);
    assert_eq!(h.notifier.operations_matching("Payment not received"), 0);

    let report = completed(&h, tick(48)).await;
    assert_eq!(report.escalations, 1);
    assert_eq!(report.reminders_sent, 0);

    let order = h.order(REF).await;
    assert_eq!(order.status(), PaymentStatus::Failed);
    assert_eq!(order.payment.check_attempts, 48);
    assert_eq!(order.payment.reminder_count, 4);

    let ops = h.notifier.operations();
    let escalation = ops
        .iter()
        .find(|n| n.subject == format!("Payment not received for order #{SHORT}"))
        .unwrap();
    assert_eq!(escalation.priority, Priority::Urgent);
    assert!(escalation.body.contains("4h 0m"));
    assert!(escalation.body.contains("48 checks"));
    assert!(escalation.body.contains("jane@example.com"));
    assert!(escalation.body.contains("$12.50"));

    for n in 49..=52 {
        let report = completed(&h, tick(n)).await;
        assert_eq!(report.orders_rechecked, 0);
    }
    assert_eq!(h.notifier.operations_matching("Payment not received"), 1);
    assert_eq!(h.order(REF).await.payment.check_attempts, 48);
}

#[tokio::test]
async fn test_escalation_never_reports_negative_elapsed_time() {
    let mut order = awaiting_order(REF, dec!(12.50));
    // Clock skew: the request was stamped after the cycle's clock.
    order.payment.requested_at = Some(tick(100));
    let settings = JobSettings {
        cadence: ReminderCadence {
            max_attempts: 1,
            ..ReminderCadence::default()
        },
        ..JobSettings::default()
    };
    let h = Harness::with_settings(vec![order], settings);

    let report = completed(&h, tick(1)).await;
    assert_eq!(report.escalations, 1);
    let ops = h.notifier.operations();
    assert_eq!(ops.len(), 1);
    assert!(ops[0].body.contains("after 0h 0m"), "{}", ops[0].body);
}

#[tokio::test]
async fn test_reminder_with_unencodable_links_is_not_counted() {
    let links = LinkSettings {
        product_name: "x".repeat(5000),
        venmo_handle: Some("@corner-bakery".into()),
        ..LinkSettings::default()
    };
    let settings = JobSettings {
        cadence: ReminderCadence {
            first_reminder_attempt: 1,
            ..ReminderCadence::default()
        },
        ..JobSettings::default()
    };
    let h = Harness::with_links(vec![awaiting_order(REF, dec!(12.50))], settings, links);

    let report = completed(&h, tick(1)).await;
    assert_eq!(report.attempts_recorded, 1);
    assert_eq!(report.reminders_sent, 0);
    assert!(h.notifier.payer_notices().is_empty());

    let order = h.order(REF).await;
    assert_eq!(order.payment.check_attempts, 1);
    assert_eq!(order.payment.reminder_count, 0);
    assert!(order.payment.links.is_empty());
}

#[tokio::test]
async fn test_failed_order_write_does_not_turn_a_payment_into_a_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orders.json");
    let store = Arc::new(JsonFileOrderStore::open(&path).unwrap());
    store.save(awaiting_order(REF, dec!(12.50))).await.unwrap();

    let mailbox = InMemoryMailbox::new();
    let notifier = Arc::new(RecordingNotifier::new());
    let workflow = Arc::new(RecordingWorkflow::new());
    let job = PaymentJob::new(
        Box::new(mailbox.clone()),
        store.clone(),
        notifier.clone(),
        workflow.clone(),
        PaymentLinkGenerator::new(link_settings()),
        JobSettings::default(),
    );

    // A non-empty directory where the file belongs makes every write fail.
    std::fs::remove_file(&path).unwrap();
    std::fs::create_dir(&path).unwrap();
    std::fs::write(path.join("keep"), "x").unwrap();
    mailbox.deliver(venmo_email("1", "12.50", REF));

    let CycleRun::Completed(report) = job.run_cycle(tick(1)).await.unwrap() else {
        panic!("cycle unexpectedly skipped");
    };
    assert_eq!(report.verified, 0);
    // The payment email and the follow-up attempt both failed to save.
    assert_eq!(report.item_errors, 2);
    assert!(!mailbox.is_seen("1"));
    assert!(workflow.verified_references().is_empty());
    let order = store.find_by_reference(REF).await.unwrap().unwrap();
    assert_eq!(order.status(), PaymentStatus::Awaiting);
    assert_eq!(order.payment.check_attempts, 0);

    std::fs::remove_dir_all(&path).unwrap();
    let CycleRun::Completed(report) = job.run_cycle(tick(2)).await.unwrap() else {
        panic!("cycle unexpectedly skipped");
    };
    assert_eq!(report.verified, 1);
    assert_eq!(report.duplicates, 0);
    assert!(mailbox.is_seen("1"));
    assert_eq!(notifier.operations_matching("Duplicate payment for order #"), 0);
    assert_eq!(workflow.verified_references(), vec![REF.to_string()]);

    let reopened = JsonFileOrderStore::open(&path).unwrap();
    let order = reopened.find_by_reference(REF).await.unwrap().unwrap();
    assert_eq!(order.status(), PaymentStatus::Verified);
}

#[tokio::test]
async fn test_connect_failure_aborts_without_touching_orders() {
    let h = Harness::new(vec![awaiting_order(REF, dec!(12.50))]);
    h.mailbox.fail_connect(true);

    let err = h.job.run_cycle(tick(1)).await.unwrap_err();
    assert!(err.is_transport());
    assert_eq!(h.order(REF).await.payment.check_attempts, 0);
    assert!(!h.job.is_running());

    h.mailbox.fail_connect(false);
    completed(&h, tick(2)).await;
    assert_eq!(h.order(REF).await.payment.check_attempts, 1);
}

#[tokio::test]
async fn test_slow_mailbox_times_out_and_disconnects() {
    let settings = JobSettings {
        mailbox_timeout: Duration::from_millis(50),
        ..JobSettings::default()
    };
    let h = Harness::with_settings(vec![awaiting_order(REF, dec!(12.50))], settings);
    h.mailbox.set_list_delay(Some(Duration::from_millis(500)));

    let err = h.job.run_cycle(tick(1)).await.unwrap_err();
    assert!(matches!(err, PaymentError::Transport(ref m) if m.contains("timed out")));
    assert!(!h.mailbox.is_connected());
    assert_eq!(h.mailbox.disconnects(), 1);
    assert_eq!(h.order(REF).await.payment.check_attempts, 0);
}

#[tokio::test]
async fn test_overlapping_cycle_is_skipped() {
    let h = Harness::new(vec![awaiting_order(REF, dec!(12.50))]);
    h.mailbox.set_list_delay(Some(Duration::from_millis(200)));

    let job = h.job.clone();
    let first = tokio::spawn(async move { job.run_cycle(tick(1)).await });
    while !h.job.is_running() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(h.job.run_cycle(tick(1)).await.unwrap(), CycleRun::Skipped);
    assert!(matches!(first.await.unwrap().unwrap(), CycleRun::Completed(_)));
    assert_eq!(h.order(REF).await.payment.check_attempts, 1);
}
