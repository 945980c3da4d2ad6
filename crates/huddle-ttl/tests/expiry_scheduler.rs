//! Integration tests for the expiry scheduler.
//!
//! Uses `start_paused = true` so the Tokio clock only moves when every task
//! is idle; sleeps and timeouts resolve instantly and deterministically.

use std::time::Duration;

use huddle_ttl::{Expired, ExpiryScheduler};

// =========================================================================
// Firing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_timer_fires_with_key_and_ticket() {
    let (scheduler, mut expired) = ExpiryScheduler::<String>::new();
    let handle = scheduler.schedule(Duration::from_secs(300), "K7QX".to_string());
    let ticket = handle.ticket();

    let Expired { key, ticket: fired } = expired.recv().await.unwrap();
    assert_eq!(key, "K7QX");
    assert_eq!(fired, ticket);
}

#[tokio::test(start_paused = true)]
async fn test_timer_does_not_fire_early() {
    let (scheduler, mut expired) = ExpiryScheduler::<String>::new();
    let _handle = scheduler.schedule(Duration::from_secs(10), "ABCD".to_string());

    let early = tokio::time::timeout(Duration::from_secs(9), expired.recv()).await;
    assert!(early.is_err(), "timer fired before its deadline");

    let on_time = tokio::time::timeout(Duration::from_secs(2), expired.recv()).await;
    assert!(on_time.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_remaining_counts_down() {
    let (scheduler, _expired) = ExpiryScheduler::<String>::new();
    let handle = scheduler.schedule(Duration::from_secs(10), "ABCD".to_string());

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(handle.remaining(), Duration::from_secs(6));
}

// =========================================================================
// Cancellation
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_before_deadline_prevents_firing() {
    let (scheduler, mut expired) = ExpiryScheduler::<String>::new();
    let handle = scheduler.schedule(Duration::from_secs(5), "ABCD".to_string());

    assert!(scheduler.cancel(handle));

    let result = tokio::time::timeout(Duration::from_secs(60), expired.recv()).await;
    assert!(result.is_err(), "cancelled timer still fired");
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_cancels_timer() {
    let (scheduler, mut expired) = ExpiryScheduler::<String>::new();
    drop(scheduler.schedule(Duration::from_secs(5), "ABCD".to_string()));

    let result = tokio::time::timeout(Duration::from_secs(60), expired.recv()).await;
    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_after_firing_reports_false() {
    let (scheduler, mut expired) = ExpiryScheduler::<String>::new();
    let handle = scheduler.schedule(Duration::from_secs(1), "ABCD".to_string());

    expired.recv().await.unwrap();
    tokio::task::yield_now().await;

    assert!(!scheduler.cancel(handle));
}

// =========================================================================
// Rescheduling
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_reschedule_shortens_lifetime_and_changes_ticket() {
    let (scheduler, mut expired) = ExpiryScheduler::<String>::new();
    let long = scheduler.schedule(Duration::from_secs(300), "ABCD".to_string());
    let old_ticket = long.ticket();

    let short = scheduler.reschedule(long, Duration::from_secs(10), "ABCD".to_string());
    assert_ne!(short.ticket(), old_ticket);

    let fired = tokio::time::timeout(Duration::from_secs(11), expired.recv())
        .await
        .expect("short timer should fire within its window")
        .unwrap();
    assert_eq!(fired.ticket, short.ticket());

    // The replaced five-minute timer never reports.
    let stale = tokio::time::timeout(Duration::from_secs(600), expired.recv()).await;
    assert!(stale.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_tickets_are_unique_across_clones() {
    let (scheduler, _expired) = ExpiryScheduler::<String>::new();
    let other = scheduler.clone();

    let a = scheduler.schedule(Duration::from_secs(5), "A".to_string());
    let b = other.schedule(Duration::from_secs(5), "B".to_string());
    let c = scheduler.schedule(Duration::from_secs(5), "C".to_string());

    assert_ne!(a.ticket(), b.ticket());
    assert_ne!(b.ticket(), c.ticket());
    assert_ne!(a.ticket(), c.ticket());
}

#[tokio::test(start_paused = true)]
async fn test_receiver_closes_when_schedulers_dropped() {
    let (scheduler, mut expired) = ExpiryScheduler::<String>::new();
    drop(scheduler);
    assert!(expired.recv().await.is_none());
}
