mod support;

use std::time::Duration;

use canvasdeck_session::{
    CloseOutcome, EditorBridge, NotificationKind, SavePhase, SessionConfig, SessionError, TabEvent,
};
use support::{id, snapshot, Harness, ScriptedAdapter};

#[tokio::test(start_paused = true)]
async fn concurrent_opens_of_one_page_share_a_single_fetch() {
    let h = Harness::new(
        ScriptedAdapter::with_pages(&["P1"]).load_delay(Duration::from_millis(100)),
    );
    let tabs = h.session.tabs();

    let (p1a, p1b) = (id("P1"), id("P1"));
    let (first, second) =
        tokio::join!(tabs.open_page(&p1a, "Home"), tabs.open_page(&p1b, "Home"));

    let mut added = [first.unwrap(), second.unwrap()];
    added.sort();
    assert_eq!(added, [false, true]);
    assert_eq!(h.adapter.load_count(), 1);
    assert_eq!(tabs.open_order(), vec![id("P1")]);
    assert_eq!(tabs.active_page_id(), Some(id("P1")));
}

#[tokio::test]
async fn reopening_an_open_page_is_a_no_op() {
    let h = Harness::new(ScriptedAdapter::with_pages(&["P1"]));
    h.open(&["P1"]).await;

    assert!(!h.session.tabs().open_page(&id("P1"), "P1").await.unwrap());
    assert_eq!(h.adapter.load_count(), 1);
    assert_eq!(h.session.tabs().open_order().len(), 1);
}

#[tokio::test]
async fn failed_load_leaves_no_document_behind() {
    let h = Harness::new(ScriptedAdapter::with_pages(&["P1"]));

    let err = h.session.tabs().open_page(&id("missing"), "Missing").await.unwrap_err();
    assert!(matches!(err, SessionError::Load(_)));
    assert!(h.session.tabs().open_order().is_empty());
    assert!(h.session.store().document(&id("missing")).is_none());

    let errors = h.notifier.of_kind(NotificationKind::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].page_id, Some(id("missing")));

    // The failed fetch is not cached.
    let _ = h.session.tabs().open_page(&id("missing"), "Missing").await;
    assert_eq!(h.adapter.load_count(), 2);
}

#[tokio::test]
async fn opening_past_capacity_is_rejected_with_notification() {
    let names: Vec<String> = (1..=9).map(|n| format!("P{n}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let h = Harness::new(ScriptedAdapter::with_pages(&refs));
    h.open(&refs[..8]).await;
    assert_eq!(h.session.tabs().open_order().len(), 8);

    let err = h.session.tabs().open_page(&id("P9"), "P9").await.unwrap_err();
    assert!(matches!(err, SessionError::Capacity(_)));
    assert_eq!(h.session.tabs().open_order().len(), 8);
    assert!(!h.session.store().is_open(&id("P9")));
    assert_eq!(h.adapter.load_count(), 8);

    let errors = h.notifier.of_kind(NotificationKind::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains('8'));
}

#[tokio::test]
async fn configured_capacity_is_honoured() {
    let mut config = SessionConfig::default();
    config.tabs.max_open = 2;
    let h = Harness::with_config(ScriptedAdapter::with_pages(&["A", "B", "C"]), &config, true);
    h.open(&["A", "B"]).await;

    assert!(h.session.tabs().open_page(&id("C"), "C").await.is_err());
    h.session.tabs().close_page(&id("B")).await.unwrap();
    assert!(h.session.tabs().open_page(&id("C"), "C").await.unwrap());
}

#[tokio::test]
async fn last_open_page_cannot_be_closed() {
    let h = Harness::new(ScriptedAdapter::with_pages(&["P1"]));
    h.open(&["P1"]).await;

    let err = h.session.tabs().close_page(&id("P1")).await.unwrap_err();
    assert!(matches!(err, SessionError::LastPage(_)));
    assert_eq!(h.session.tabs().open_order(), vec![id("P1")]);
    assert_eq!(h.session.tabs().active_page_id(), Some(id("P1")));
    assert_eq!(h.notifier.of_kind(NotificationKind::Info).len(), 1);
}

#[tokio::test]
async fn closing_a_dirty_page_needs_confirmation() {
    let h = Harness::with_config(
        ScriptedAdapter::with_pages(&["P1", "P2"]),
        &SessionConfig::default(),
        false,
    );
    h.open(&["P1", "P2"]).await;
    h.type_text("unsaved");

    let outcome = h.session.tabs().close_page(&id("P1")).await.unwrap();
    assert_eq!(outcome, CloseOutcome::Declined);
    assert!(h.session.store().is_open(&id("P1")));
    assert!(h.is_dirty("P1"));
    assert_eq!(h.session.scheduler().phase(&id("P1")), SavePhase::PendingSave);

    // Clean pages close without asking.
    let outcome = h.session.tabs().close_page(&id("P2")).await.unwrap();
    assert_eq!(outcome, CloseOutcome::Closed { new_active: None });
    assert_eq!(h.session.tabs().open_order(), vec![id("P1")]);
}

#[tokio::test]
async fn closing_the_active_page_activates_a_neighbour() {
    let h = Harness::new(ScriptedAdapter::with_pages(&["A", "B", "C"]));
    h.open(&["A", "B", "C"]).await;
    let tabs = h.session.tabs();
    tabs.switch_to_page(&id("B")).unwrap();

    let outcome = tabs.close_page(&id("B")).await.unwrap();
    assert_eq!(outcome, CloseOutcome::Closed { new_active: Some(id("C")) });
    assert_eq!(h.editor.components(), snapshot("C").components);

    // No page after C, so fall back to the one before it.
    let outcome = tabs.close_page(&id("C")).await.unwrap();
    assert_eq!(outcome, CloseOutcome::Closed { new_active: Some(id("A")) });
    assert_eq!(tabs.active_page_id(), Some(id("A")));
    assert_eq!(h.editor.components(), snapshot("A").components);

    assert_eq!(tabs.close_page(&id("B")).await.unwrap(), CloseOutcome::NotOpen);
}

#[tokio::test]
async fn tab_events_follow_the_lifecycle() {
    let h = Harness::new(ScriptedAdapter::with_pages(&["P1", "P2"]));
    let tabs = h.session.tabs();
    let mut events = tabs.subscribe();

    h.open(&["P1", "P2"]).await;
    tabs.switch_to_page(&id("P2")).unwrap();
    tabs.close_page(&id("P2")).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            TabEvent::Opened { page_id: id("P1") },
            TabEvent::Activated { page_id: id("P1") },
            TabEvent::Opened { page_id: id("P2") },
            TabEvent::Activated { page_id: id("P2") },
            TabEvent::Closed { page_id: id("P2"), new_active: Some(id("P1")) },
            TabEvent::Activated { page_id: id("P1") },
        ]
    );
}

#[tokio::test]
async fn next_and_previous_wrap_around() {
    let h = Harness::new(ScriptedAdapter::with_pages(&["A", "B", "C"]));
    h.open(&["A", "B", "C"]).await;
    let tabs = h.session.tabs();

    assert_eq!(tabs.next_page().unwrap(), Some(id("B")));
    assert_eq!(tabs.next_page().unwrap(), Some(id("C")));
    assert_eq!(tabs.next_page().unwrap(), Some(id("A")));
    assert_eq!(tabs.previous_page().unwrap(), Some(id("C")));
    assert_eq!(tabs.active_page_id(), Some(id("C")));
}

#[tokio::test]
async fn focus_opens_and_activates() {
    let h = Harness::new(ScriptedAdapter::with_pages(&["A", "B"]));
    h.open(&["A"]).await;

    h.session.tabs().focus_page(&id("B"), "B").await.unwrap();
    assert_eq!(h.session.tabs().active_page_id(), Some(id("B")));
    assert_eq!(h.session.tabs().open_order(), vec![id("A"), id("B")]);
    assert_eq!(h.editor.components(), snapshot("B").components);
}

#[tokio::test(start_paused = true)]
async fn switching_pages_never_marks_them_dirty() {
    let h = Harness::new(ScriptedAdapter::with_pages(&["A", "B"]));
    h.open(&["A", "B"]).await;

    for _ in 0..3 {
        h.session.tabs().switch_to_page(&id("B")).unwrap();
        h.session.tabs().switch_to_page(&id("A")).unwrap();
    }

    assert!(!h.is_dirty("A"));
    assert!(!h.is_dirty("B"));
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.adapter.total_stores(), 0);
}

#[tokio::test]
async fn switching_round_trip_preserves_unsaved_edits() {
    let h = Harness::new(ScriptedAdapter::with_pages(&["A", "B"]));
    h.open(&["A", "B"]).await;
    h.type_text("draft on A");

    h.session.tabs().switch_to_page(&id("B")).unwrap();
    assert_eq!(h.editor.components(), snapshot("B").components);

    h.session.tabs().switch_to_page(&id("A")).unwrap();
    assert_eq!(h.editor.components(), snapshot("draft on A").components);
    assert!(h.is_dirty("A"));
    assert!(!h.is_dirty("B"));
}

#[tokio::test]
async fn switching_to_a_page_that_is_not_open_fails() {
    let h = Harness::new(ScriptedAdapter::with_pages(&["A"]));
    h.open(&["A"]).await;

    let err = h.session.tabs().switch_to_page(&id("B")).unwrap_err();
    assert!(matches!(err, SessionError::NotOpen(_)));
    assert_eq!(h.session.tabs().active_page_id(), Some(id("A")));
}

#[tokio::test]
async fn edits_without_an_open_page_are_ignored() {
    let h = Harness::new(ScriptedAdapter::with_pages(&["A"]));
    h.type_text("nowhere to go");
    assert!(h.session.store().dirty_pages().is_empty());
}
