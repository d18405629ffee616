/// Directory search and first-message flow, on a paused clock
mod common;

use common::{candidate, server_error, test_config, thread, MockApi};
use rentdesk_chat::compose::{ComposeFlow, ComposeState, Selection};
use rentdesk_chat::loader::{RetryPolicy, SnapshotLoader};
use rentdesk_chat::thread_store::ThreadStore;
use rentdesk_chat::utils::notice::{NoticeBoard, NoticeLevel};
use rentdesk_chat::SyncError;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

struct Harness {
    api: Arc<MockApi>,
    store: ThreadStore,
    notices: NoticeBoard,
    flow: ComposeFlow,
}

fn harness() -> Harness {
    let api = Arc::new(MockApi::new());
    let store = ThreadStore::new();
    let loader = SnapshotLoader::new(api.clone(), store.clone(), RetryPolicy::none());
    let notices = NoticeBoard::new();
    let flow = ComposeFlow::new(api.clone(), loader, notices.clone(), &test_config());
    Harness {
        api,
        store,
        notices,
        flow,
    }
}

#[tokio::test(start_paused = true)]
async fn test_typing_burst_issues_one_search() {
    let h = harness();
    h.api.push_search(Duration::ZERO, Ok(vec![candidate("u1", None)]));

    for query in ["om", "oma", "omar"] {
        h.flow.query_changed(query);
        sleep(Duration::from_millis(100)).await;
    }
    sleep(Duration::from_millis(500)).await;

    assert_eq!(*h.api.search_queries.lock().unwrap(), vec!["omar".to_string()]);
    match h.flow.state() {
        ComposeState::ResultsShown { query, candidates } => {
            assert_eq!(query, "omar");
            assert_eq!(candidates.len(), 1);
        }
        other => panic!("unexpected state {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_short_query_clears_without_searching() {
    let h = harness();
    h.flow.query_changed("om");
    h.flow.query_changed(" o ");
    sleep(Duration::from_millis(500)).await;

    assert!(h.api.search_queries.lock().unwrap().is_empty());
    assert_eq!(h.flow.state(), ComposeState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_slow_search_result_is_not_shown_after_new_input() {
    let h = harness();
    h.api.push_search(Duration::from_millis(1_000), Ok(vec![candidate("stale", None)]));
    h.api.push_search(Duration::ZERO, Ok(vec![candidate("u1", None)]));

    h.flow.query_changed("om");
    sleep(Duration::from_millis(400)).await; // first search now in flight
    h.flow.query_changed("omar");
    sleep(Duration::from_millis(2_000)).await;

    match h.flow.state() {
        ComposeState::ResultsShown { query, candidates } => {
            assert_eq!(query, "omar");
            assert_eq!(candidates[0].id, "u1");
        }
        other => panic!("unexpected state {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_search_failure_shows_empty_results_and_notice() {
    let h = harness();
    let mut notices = h.notices.subscribe();
    h.api.push_search(Duration::ZERO, Err(server_error()));

    h.flow.query_changed("omar");
    sleep(Duration::from_millis(500)).await;

    assert_eq!(
        h.flow.state(),
        ComposeState::ResultsShown {
            query: "omar".into(),
            candidates: vec![],
        }
    );
    assert_eq!(notices.try_recv().unwrap().level, NoticeLevel::Error);
}

#[tokio::test]
async fn test_existing_channel_routes_without_sending() {
    let h = harness();
    let revision = h.store.revision().await;

    let selection = h.flow.select(candidate("u1", Some("c1"))).unwrap();

    assert_eq!(selection, Selection::OpenExisting("c1".into()));
    assert_eq!(h.flow.state(), ComposeState::Idle);
    assert_eq!(h.api.send_calls(), 0);
    assert_eq!(h.store.revision().await, revision);
    assert!(h.flow.submit().await.is_err());
    assert_eq!(h.api.send_calls(), 0);
}

#[tokio::test]
async fn test_empty_draft_is_refused() {
    let h = harness();
    let mut notices = h.notices.subscribe();
    assert_eq!(h.flow.select(candidate("u2", None)).unwrap(), Selection::Compose);
    assert!(h.flow.set_draft("   "));

    let err = h.flow.submit().await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidInput(_)));
    assert_eq!(h.api.send_calls(), 0);
    assert_eq!(notices.try_recv().unwrap().text, "Please enter a message");
}

#[tokio::test]
async fn test_send_failure_keeps_draft_for_retry() {
    let h = harness();
    let mut notices = h.notices.subscribe();
    h.api.push_send(Err(server_error()));

    h.flow.select(candidate("u2", None)).unwrap();
    h.flow.set_draft("Is the flat still available?");
    assert!(h.flow.submit().await.is_err());

    match h.flow.state() {
        ComposeState::Composing { recipient, draft, error } => {
            assert_eq!(recipient.id, "u2");
            assert_eq!(draft, "Is the flat still available?");
            assert!(error.is_some());
        }
        other => panic!("unexpected state {:?}", other),
    }
    assert_eq!(notices.try_recv().unwrap().level, NoticeLevel::Error);
    assert_eq!(h.api.list_calls(), 0);

    // Second attempt goes through with the same draft
    let id = h.flow.submit().await.unwrap();
    assert_eq!(id, "ch-u2");
    assert_eq!(h.api.send_calls(), 2);
}

#[tokio::test]
async fn test_successful_send_reloads_threads() {
    let h = harness();
    let mut notices = h.notices.subscribe();
    h.api.push_snapshot(Duration::ZERO, Ok(vec![thread("ch-u2", 3)]));

    h.flow.select(candidate("u2", None)).unwrap();
    h.flow.set_draft("  Hello there  ");
    let id = h.flow.submit().await.unwrap();

    assert_eq!(id, "ch-u2");
    assert_eq!(
        *h.api.sent.lock().unwrap(),
        vec![("u2".to_string(), "Hello there".to_string())]
    );
    assert_eq!(h.api.list_calls(), 1);
    assert!(h.store.contains("ch-u2").await);
    assert_eq!(h.flow.state(), ComposeState::Idle);
    assert_eq!(notices.try_recv().unwrap().level, NoticeLevel::Success);
}
