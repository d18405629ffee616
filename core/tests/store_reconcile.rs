/// Thread store reconciliation between snapshots and live writes
mod common;

use common::{at, empty_thread, thread};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rentdesk_chat::push::UnknownThreadPolicy;
use rentdesk_chat::thread_store::{StoreChange, ThreadStore, UpsertOutcome};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn test_random_write_sequences_never_duplicate_ids() {
    let store = ThreadStore::new();
    let mut rng = StdRng::seed_from_u64(7);
    let ids = ["a", "b", "c", "d", "e"];

    for _ in 0..200 {
        if rng.gen_bool(0.2) {
            let snapshot: Vec<_> = (0..rng.gen_range(0..8))
                .map(|_| thread(ids[rng.gen_range(0..ids.len())], rng.gen_range(1..59)))
                .collect();
            store.bulk_replace(snapshot).await;
        } else {
            let t = thread(ids[rng.gen_range(0..ids.len())], rng.gen_range(1..59));
            store.upsert(t).await;
        }

        let all = store.get_all().await;
        let unique: HashSet<_> = all.iter().map(|t| t.id.clone()).collect();
        assert_eq!(unique.len(), all.len());
    }
}

#[tokio::test]
async fn test_older_upsert_leaves_stored_entry() {
    let store = ThreadStore::new();
    store.upsert(thread("a", 30)).await;

    let outcome = store.upsert(thread("a", 10)).await;
    assert_eq!(outcome, UpsertOutcome::Stale);
    assert_eq!(store.get("a").await.unwrap().updated_at, at(30));
}

#[tokio::test]
async fn test_live_event_during_snapshot_survives_install() {
    let store = ThreadStore::new();
    store.bulk_replace(vec![thread("a", 5)]).await;

    // Snapshot request goes out, then a live event for a new thread lands
    let issued_at = store.revision().await;
    store
        .apply_live(thread("fresh", 40), UnknownThreadPolicy::RequireMessage)
        .await;
    store
        .apply_live(thread("a", 41), UnknownThreadPolicy::RequireMessage)
        .await;

    // The snapshot predates both writes
    let summary = store
        .bulk_replace_since(vec![thread("a", 5), thread("b", 6)], issued_at)
        .await;

    assert_eq!(summary.preserved, 1);
    assert_eq!(summary.kept_newer, 1);
    assert!(store.contains("fresh").await);
    assert!(store.contains("b").await);
    assert_eq!(store.get("a").await.unwrap().updated_at, at(41));
}

#[tokio::test]
async fn test_snapshot_drops_entries_it_no_longer_lists() {
    let store = ThreadStore::new();
    store.bulk_replace(vec![thread("a", 1), thread("b", 2)]).await;

    let summary = store.bulk_replace(vec![thread("b", 2)]).await;
    assert_eq!(summary.dropped, 1);
    assert_eq!(summary.total, 1);
    assert!(!store.contains("a").await);
}

#[tokio::test]
async fn test_unseen_thread_policy() {
    let store = ThreadStore::new();

    let outcome = store
        .apply_live(thread("x", 3), UnknownThreadPolicy::RequireMessage)
        .await;
    assert_eq!(outcome, UpsertOutcome::Inserted);
    assert!(store.contains("x").await);

    let outcome = store
        .apply_live(empty_thread("y", 3), UnknownThreadPolicy::RequireMessage)
        .await;
    assert_eq!(outcome, UpsertOutcome::Ignored);
    assert!(!store.contains("y").await);

    let outcome = store
        .apply_live(empty_thread("y", 3), UnknownThreadPolicy::Accept)
        .await;
    assert_eq!(outcome, UpsertOutcome::Inserted);
}

#[tokio::test]
async fn test_subscribers_see_effective_writes_only() {
    let store = ThreadStore::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let sub = store
        .subscribe(Arc::new(move |change: &StoreChange| {
            sink.lock().unwrap().push(change.clone());
        }))
        .await;

    store.upsert(thread("a", 10)).await;
    store.upsert(thread("a", 10)).await; // identical
    store.upsert(thread("a", 5)).await; // stale
    store.apply_read_receipt("a", at(12)).await;
    store.apply_read_receipt("a", at(11)).await; // older receipt
    store.apply_read_receipt("missing", at(12)).await;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            StoreChange::Upserted { id: "a".into() },
            StoreChange::ReadReceipt { id: "a".into() },
        ]
    );

    assert!(store.unsubscribe(sub).await);
    store.upsert(thread("b", 1)).await;
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_record_without_id_is_rejected() {
    let store = ThreadStore::new();
    let outcome = store.upsert(thread("", 3)).await;
    assert_eq!(outcome, UpsertOutcome::Rejected);

    let summary = store.bulk_replace(vec![thread("", 3), thread("ok", 3)]).await;
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.total, 1);
}

#[tokio::test]
async fn test_receipt_survives_redelivery_and_stale_snapshot() {
    let store = ThreadStore::new();
    let update = thread("a", 10);
    store.apply_live(update.clone(), UnknownThreadPolicy::RequireMessage).await;
    assert!(store.apply_read_receipt("a", at(11)).await);

    assert_eq!(
        store.apply_live(update.clone(), UnknownThreadPolicy::RequireMessage).await,
        UpsertOutcome::Unchanged
    );
    store.bulk_replace(vec![update]).await;
    assert_eq!(store.get("a").await.unwrap().read_at, Some(at(11)));
}

#[tokio::test]
async fn test_empty_text_counts_as_no_message_for_unseen_threads() {
    let store = ThreadStore::new();
    let mut blank = thread("blank", 3);
    blank.last_message_text = Some(String::new());

    assert_eq!(
        store.apply_live(blank, UnknownThreadPolicy::RequireMessage).await,
        UpsertOutcome::Ignored
    );
    assert!(!store.contains("blank").await);
}
