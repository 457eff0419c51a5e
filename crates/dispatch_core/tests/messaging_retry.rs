//! Integration coverage for the messaging retry queue (§4.C7): a provider that
//! always fails exhausts the retry budget and lands on `FAILED` with the error
//! recorded, without ever touching the database.

use std::sync::Arc;

use dispatch_core::messaging::RetryQueue;
use dispatch_core::models::{NotificationChannel, NotificationStatus, RideNotification};
use dispatch_core::testing::FakeMessageProvider;
use uuid::Uuid;

fn never_connects_pool() -> dispatch_core::db::Pool {
    sqlx::Pool::connect_lazy("postgres://unused/unused").expect("lazy pool never connects")
}

fn notification() -> RideNotification {
    RideNotification {
        id: Uuid::new_v4(),
        trip_id: Uuid::new_v4(),
        driver_id: Uuid::new_v4(),
        channel: NotificationChannel::Whatsapp,
        status: NotificationStatus::Pending,
        message_id: None,
        retries: 0,
        error: None,
    }
}

#[tokio::test]
async fn a_successful_send_marks_the_notification_sent() {
    let provider = Arc::new(FakeMessageProvider::default());
    let (queue, _rx) = RetryQueue::new(never_connects_pool(), provider.clone(), None);
    let mut note = notification();

    queue.attempt(&mut note, "+15551234567", "your driver is on the way").await;

    assert_eq!(note.status, NotificationStatus::Sent);
    assert!(note.message_id.is_some());
    assert_eq!(provider.sent_count(), 1);
}

#[tokio::test]
async fn repeated_failures_exhaust_the_retry_budget_and_terminate_as_failed() {
    let provider = Arc::new(FakeMessageProvider::default());
    *provider.should_fail.lock().unwrap() = true;
    let (queue, _rx) = RetryQueue::new(never_connects_pool(), provider, None);
    let mut note = notification();

    // §4.C7: a hard cap of 3 retries after the first attempt, four attempts total,
    // before the record is terminal.
    for _ in 0..4 {
        queue.attempt(&mut note, "+15551234567", "trip update").await;
    }

    assert_eq!(note.status, NotificationStatus::Failed);
    assert!(note.error.is_some());
    assert_eq!(note.retries, 4);
}

#[tokio::test]
async fn falls_back_to_the_secondary_provider_when_the_primary_rejects() {
    let primary = Arc::new(FakeMessageProvider::default());
    *primary.should_fail.lock().unwrap() = true;
    let fallback = Arc::new(FakeMessageProvider::default());
    let (queue, _rx) = RetryQueue::new(never_connects_pool(), primary.clone(), Some(fallback.clone()));
    let mut note = notification();

    queue.attempt(&mut note, "+15551234567", "fallback path").await;

    assert_eq!(note.status, NotificationStatus::Sent);
    assert_eq!(fallback.sent_count(), 1);
    assert_eq!(primary.sent_count(), 0, "the primary never actually records a send on rejection");
}
