//! Framework integration tests: scripted collectors against a real
//! SQLite store in a temp directory.

use chrono::{Duration, Utc};
use serde_json::json;

use dealsignal_collect::testing::MockCollector;
use dealsignal_collect::{CollectContext, CollectorRunner, CollectorStatus};
use dealsignal_common::config::HttpSettings;
use dealsignal_common::{CancelFlag, NewSignal, SignalType, SuppressionEntry};
use dealsignal_http::{RateLimitedClient, RateLimiter};
use dealsignal_store::SignalStore;

async fn test_store() -> (SignalStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = SignalStore::open(dir.path().join("signals.db")).await.unwrap();
    (store, dir)
}

fn ctx(dry_run: bool) -> CollectContext {
    let http =
        RateLimitedClient::new(&HttpSettings::default(), RateLimiter::uniform(100.0, 100)).unwrap();
    CollectContext::new(http, 7, dry_run)
}

fn signal(key: &str, days_ago: i64) -> NewSignal {
    NewSignal::new(
        SignalType::Incorporation,
        "mock_source",
        key,
        Utc::now() - Duration::days(days_ago),
    )
    .with_confidence(0.8)
}

fn batch(n: usize) -> Vec<NewSignal> {
    (0..n)
        .map(|i| signal(&format!("domain:startup{i}.io"), i as i64))
        .collect()
}

// =========================================================================
// Dedup across reruns (Scenario A)
// =========================================================================

#[tokio::test]
async fn rerun_with_identical_window_skips_duplicates() {
    let (store, _dir) = test_store().await;
    let runner = CollectorRunner::new(store.clone());
    let collector = MockCollector::new("mock_source").with_batch(batch(5));

    let first = runner.run(&collector, &ctx(false)).await;
    assert_eq!(first.status, CollectorStatus::Success);
    assert_eq!(first.signals_found, 5);
    assert_eq!(first.signals_new, 5);
    assert_eq!(first.signals_suppressed, 0);
    assert!(first.accounting_holds());

    // Same lookback, same source events: nothing new lands.
    let second = runner.run(&collector, &ctx(false)).await;
    assert_eq!(second.status, CollectorStatus::Success);
    assert_eq!(second.signals_new, 0);
    assert_eq!(second.signals_suppressed, 0);
    assert_eq!(second.signals_duplicate, 5);
    assert!(second.accounting_holds());

    let stats = store.get_stats().await.unwrap();
    assert_eq!(stats.total_signals, 5);
}

// =========================================================================
// Suppression respect (Scenario B)
// =========================================================================

#[tokio::test]
async fn suppressed_companies_are_never_saved() {
    let (store, _dir) = test_store().await;
    store
        .update_suppression_cache(&[SuppressionEntry {
            canonical_key: "domain:acme.ai".to_string(),
            crm_page_id: "page-1".to_string(),
            status: "Passed".to_string(),
            company_name: Some("Acme".to_string()),
            cached_at: Utc::now(),
            expires_at: Utc::now() + Duration::days(7),
            metadata: json!({}),
        }])
        .await
        .unwrap();

    let runner = CollectorRunner::new(store.clone());
    let collector =
        MockCollector::new("mock_source").with_batch(vec![signal("domain:acme.ai", 1)]);

    let result = runner.run(&collector, &ctx(false)).await;
    assert_eq!(result.signals_found, 1);
    assert_eq!(result.signals_suppressed, 1);
    assert_eq!(result.signals_new, 0);
    assert!(result.accounting_holds());

    assert!(!store.is_duplicate("domain:acme.ai").await.unwrap());
}

// =========================================================================
// Error isolation and accounting
// =========================================================================

#[tokio::test]
async fn per_record_errors_yield_partial_success() {
    let (store, _dir) = test_store().await;
    let runner = CollectorRunner::new(store.clone());
    let collector = MockCollector::new("mock_source").with_batch_and_errors(
        batch(3),
        vec!["record 42: no canonical key derivable".to_string()],
    );

    let result = runner.run(&collector, &ctx(false)).await;
    assert_eq!(result.status, CollectorStatus::PartialSuccess);
    assert_eq!(result.signals_found, 4);
    assert_eq!(result.signals_new, 3);
    assert_eq!(result.errors.len(), 1);
    assert!(result.accounting_holds());

    // The keyless record was not persisted.
    let stats = store.get_stats().await.unwrap();
    assert_eq!(stats.total_signals, 3);
}

#[tokio::test]
async fn open_failure_is_a_clean_error_result() {
    let (store, _dir) = test_store().await;
    let runner = CollectorRunner::new(store.clone());
    let collector = MockCollector::new("mock_source").failing_open();

    let result = runner.run(&collector, &ctx(false)).await;
    assert_eq!(result.status, CollectorStatus::Error);
    assert_eq!(result.signals_found, 0);
    assert!(!result.errors.is_empty());
}

#[tokio::test]
async fn empty_run_is_success_with_zero_counters() {
    let (store, _dir) = test_store().await;
    let runner = CollectorRunner::new(store);
    let collector = MockCollector::new("mock_source");

    let result = runner.run(&collector, &ctx(false)).await;
    assert_eq!(result.status, CollectorStatus::Success);
    assert_eq!(result.signals_found, 0);
    assert_eq!(result.signals_new, 0);
    assert_eq!(result.signals_suppressed, 0);
    assert!(result.errors.is_empty());
}

// =========================================================================
// Dry run
// =========================================================================

#[tokio::test]
async fn dry_run_accounts_but_writes_nothing() {
    let (store, _dir) = test_store().await;

    // Seed one existing signal so the dry run has a duplicate to skip.
    store.save_signal(&signal("domain:startup0.io", 0)).await.unwrap();

    let runner = CollectorRunner::new(store.clone());
    let collector = MockCollector::new("mock_source").with_batch(batch(4));

    let result = runner.run(&collector, &ctx(true)).await;
    assert_eq!(result.status, CollectorStatus::DryRun);
    assert!(result.dry_run);
    assert_eq!(result.signals_duplicate, 1);
    assert_eq!(result.signals_new, 3);
    assert!(result.accounting_holds());

    // Only the seed row is in the store.
    let stats = store.get_stats().await.unwrap();
    assert_eq!(stats.total_signals, 1);
}

// =========================================================================
// Cancellation
// =========================================================================

#[tokio::test]
async fn cancelled_run_reports_partial_success() {
    let (store, _dir) = test_store().await;
    let runner = CollectorRunner::new(store.clone());
    let collector = MockCollector::new("mock_source").with_batch(batch(10));

    let cancel = CancelFlag::new();
    cancel.cancel();
    let context = ctx(false).with_cancel(cancel);

    let result = runner.run(&collector, &context).await;
    assert!(result.cancelled);
    assert_eq!(result.status, CollectorStatus::PartialSuccess);
    // Nothing persisted after the cancellation point.
    assert_eq!(result.signals_new, 0);
    let stats = store.get_stats().await.unwrap();
    assert_eq!(stats.total_signals, 0);
}

// =========================================================================
// Duplicate policy off
// =========================================================================

#[tokio::test]
async fn skip_duplicates_off_defers_to_store_idempotence() {
    let (store, _dir) = test_store().await;
    let runner = CollectorRunner::new(store.clone());
    let collector = MockCollector::new("mock_source")
        .with_batch(vec![signal("domain:acme.ai", 1)])
        .with_skip_duplicates(false);

    let first = runner.run(&collector, &ctx(false)).await;
    assert_eq!(first.signals_new, 1);

    // Identical tuple on rerun: the store reports it as existing, the
    // runner books it as a duplicate.
    let second = runner.run(&collector, &ctx(false)).await;
    assert_eq!(second.signals_new, 0);
    assert_eq!(second.signals_duplicate, 1);
    assert!(second.accounting_holds());

    let stats = store.get_stats().await.unwrap();
    assert_eq!(stats.total_signals, 1);
}
