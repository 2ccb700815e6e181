mod support;

use std::time::Duration;

use canvasdeck_common::types::SaveSummary;
use canvasdeck_session::{NotificationKind, PersistenceError, SavePhase};
use support::{id, snapshot, Harness, ScriptedAdapter};

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn partial_failure_is_counted_and_failed_page_stays_dirty() {
    let h = Harness::new(ScriptedAdapter::with_pages(&["A", "B", "C"]));
    h.adapter.script("C", vec![Err(PersistenceError::from_status(422, "bad payload"))]);
    h.open(&["A", "B", "C"]).await;

    h.type_text("edit on A");
    h.session.tabs().switch_to_page(&id("C")).unwrap();
    h.type_text("edit on C");

    let summary = h.session.save_all().await;
    assert_eq!(summary, SaveSummary { succeeded: 1, failed: 1 });
    assert!(!h.is_dirty("A"));
    assert!(!h.is_dirty("B"));
    assert!(h.is_dirty("C"));
    assert_eq!(h.adapter.store_count("A"), 1);
    assert_eq!(h.adapter.store_count("B"), 0);
    assert_eq!(h.session.scheduler().phase(&id("C")), SavePhase::FailedPermanent);

    let warnings = h.notifier.of_kind(NotificationKind::Warning);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].counts, Some(summary));
    // Individual failures are folded into the summary.
    assert!(h.notifier.of_kind(NotificationKind::Error).is_empty());
}

#[tokio::test(start_paused = true)]
async fn nothing_dirty_reports_zero_counts() {
    let h = Harness::new(ScriptedAdapter::with_pages(&["A", "B"]));
    h.open(&["A", "B"]).await;

    let summary = h.session.save_all().await;
    assert_eq!(summary, SaveSummary::default());
    assert_eq!(h.adapter.total_stores(), 0);

    let info = h.notifier.of_kind(NotificationKind::Info);
    assert_eq!(info.len(), 1);
    assert_eq!(info[0].message, "No unsaved changes");
}

#[tokio::test(start_paused = true)]
async fn save_all_flushes_the_live_editor_first() {
    let h = Harness::new(ScriptedAdapter::with_pages(&["A"]));
    h.open(&["A"]).await;
    h.type_text("typed just now");

    let summary = h.session.save_all().await;
    assert_eq!(summary, SaveSummary { succeeded: 1, failed: 0 });
    assert_eq!(h.adapter.remote("A").unwrap().components, snapshot("typed just now").components);
    assert_eq!(h.notifier.of_kind(NotificationKind::Success).len(), 1);

    // The pending debounce was superseded.
    sleep_ms(30_000).await;
    assert_eq!(h.adapter.store_count("A"), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_calls_join_the_running_pass() {
    let h = Harness::new(
        ScriptedAdapter::with_pages(&["A", "B"]).store_delay(Duration::from_millis(1_000)),
    );
    h.open(&["A", "B"]).await;
    h.type_text("edit on A");

    let (first, second) = tokio::join!(h.session.save_all(), h.session.save_all());
    assert_eq!(first, SaveSummary { succeeded: 1, failed: 0 });
    assert_eq!(first, second);
    assert_eq!(h.adapter.store_count("A"), 1);
    assert_eq!(h.notifier.of_kind(NotificationKind::Success).len(), 1);

    // Once finished, a new call runs its own pass.
    let third = h.session.save_all().await;
    assert_eq!(third, SaveSummary::default());
}

#[tokio::test(start_paused = true)]
async fn save_all_waits_behind_an_in_flight_autosave() {
    let h = Harness::new(
        ScriptedAdapter::with_pages(&["A"]).store_delay(Duration::from_millis(1_000)),
    );
    h.open(&["A"]).await;

    h.type_text("one");
    sleep_ms(3_100).await;
    assert_eq!(h.adapter.store_count("A"), 1);
    h.type_text("two");

    let summary = h.session.save_all().await;
    assert_eq!(summary, SaveSummary { succeeded: 1, failed: 0 });
    assert!(!h.is_dirty("A"));
    assert_eq!(h.adapter.remote("A").unwrap().components, snapshot("two").components);
    assert_eq!(h.adapter.max_in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_during_save_all_is_retried_later() {
    let h = Harness::new(ScriptedAdapter::with_pages(&["A"]));
    h.adapter.script("A", vec![Err(PersistenceError::transient("connection reset"))]);
    h.open(&["A"]).await;
    h.type_text("draft");

    let summary = h.session.save_all().await;
    assert_eq!(summary, SaveSummary { succeeded: 0, failed: 1 });
    assert_eq!(h.session.scheduler().phase(&id("A")), SavePhase::PendingRetry);
    assert_eq!(h.notifier.of_kind(NotificationKind::Error).len(), 1);

    sleep_ms(2_001).await;
    assert_eq!(h.adapter.store_count("A"), 2);
    assert!(!h.is_dirty("A"));
}

#[tokio::test(start_paused = true)]
async fn pages_closed_before_their_turn_are_skipped() {
    let h = Harness::new(ScriptedAdapter::with_pages(&["A", "B"]));
    h.open(&["A", "B"]).await;
    h.type_text("on A");
    h.session.tabs().switch_to_page(&id("B")).unwrap();
    h.type_text("on B");
    h.session.tabs().close_page(&id("A")).await.unwrap();

    let summary = h.session.save_all().await;
    assert_eq!(summary, SaveSummary { succeeded: 1, failed: 0 });
    assert_eq!(h.adapter.store_count("A"), 0);
}
