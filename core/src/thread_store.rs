/// Canonical thread collection: the only writer of conversation state.
///
/// Snapshot loads and live events both land here. Every write goes through a
/// per-id freshness comparison, so whichever source delivers the newest version
/// of a thread wins, regardless of the order in which requests resolve.
use crate::chat_types::Thread;
use crate::push::UnknownThreadPolicy;
use chrono::{DateTime, Utc};
use std::collections::hash_map::Entry as MapEntry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// Monotonic write counter, bumped once per mutating operation
pub type Revision = u64;

/// Result of writing a single record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
    /// Same payload as the stored entry; nothing changed
    Unchanged,
    /// Incoming record is older than the stored one
    Stale,
    /// Malformed record (missing id)
    Rejected,
    /// Unknown thread dropped by the live-event policy
    Ignored,
}

impl UpsertOutcome {
    pub fn changed(self) -> bool {
        matches!(self, UpsertOutcome::Inserted | UpsertOutcome::Replaced)
    }
}

/// Counters describing one bulk replace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceSummary {
    /// Entries in the store afterwards
    pub total: usize,
    /// Previously stored entries missing from the snapshot and dropped
    pub dropped: usize,
    /// Entries missing from the snapshot but kept because they were written while it was in flight
    pub preserved: usize,
    /// Stored entries that were fresher than their snapshot counterpart
    pub kept_newer: usize,
    /// Snapshot records without an id
    pub rejected: usize,
}

/// Change notification delivered to store subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    Replaced { total: usize },
    Upserted { id: String },
    ReadReceipt { id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type StoreListener = Arc<dyn Fn(&StoreChange) + Send + Sync>;

#[derive(Debug, Clone)]
struct StoredThread {
    thread: Thread,
    written_at: Revision,
}

#[derive(Default)]
struct Inner {
    threads: HashMap<String, StoredThread>,
    revision: Revision,
}

/// Thread store shared by the loader, the live listener and readers
#[derive(Clone, Default)]
pub struct ThreadStore {
    inner: Arc<RwLock<Inner>>,
    listeners: Arc<RwLock<HashMap<SubscriptionId, StoreListener>>>,
}

impl ThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace one record unless it is older than the stored entry
    pub async fn upsert(&self, thread: Thread) -> UpsertOutcome {
        self.write_one(thread, UnknownThreadPolicy::Accept).await
    }

    /// Upsert used for push events; unknown threads go through `policy`
    pub async fn apply_live(&self, thread: Thread, policy: UnknownThreadPolicy) -> UpsertOutcome {
        self.write_one(thread, policy).await
    }

    async fn write_one(&self, mut thread: Thread, policy: UnknownThreadPolicy) -> UpsertOutcome {
        if thread.id.is_empty() {
            warn!("Rejected thread record without id (status {:?})", thread.status);
            return UpsertOutcome::Rejected;
        }

        let id = thread.id.clone();
        let outcome = {
            let mut guard = self.inner.write().await;
            let inner = &mut *guard;
            let next_rev = inner.revision + 1;

            let outcome = match inner.threads.entry(id.clone()) {
                MapEntry::Vacant(slot) => {
                    if policy == UnknownThreadPolicy::RequireMessage && !thread.has_message() {
                        UpsertOutcome::Ignored
                    } else {
                        slot.insert(StoredThread {
                            thread,
                            written_at: next_rev,
                        });
                        UpsertOutcome::Inserted
                    }
                }
                MapEntry::Occupied(mut slot) => {
                    let stored = slot.get();
                    keep_read_receipt(&mut thread, &stored.thread);
                    if stored.thread == thread {
                        UpsertOutcome::Unchanged
                    } else if thread.freshness() < stored.thread.freshness() {
                        UpsertOutcome::Stale
                    } else {
                        slot.insert(StoredThread {
                            thread,
                            written_at: next_rev,
                        });
                        UpsertOutcome::Replaced
                    }
                }
            };

            if outcome.changed() {
                inner.revision = next_rev;
            }
            outcome
        };

        match outcome {
            UpsertOutcome::Inserted | UpsertOutcome::Replaced => {
                debug!("Thread {} {:?}", id, outcome);
                self.notify(StoreChange::Upserted { id }).await;
            }
            UpsertOutcome::Stale => debug!("Dropped stale record for thread {}", id),
            UpsertOutcome::Ignored => debug!("Ignored live event for unseen thread {} without message", id),
            _ => {}
        }
        outcome
    }

    /// Install a snapshot as the canonical set
    pub async fn bulk_replace(&self, threads: Vec<Thread>) -> ReplaceSummary {
        let since = self.revision().await;
        self.bulk_replace_since(threads, since).await
    }

    /// Install a snapshot whose request was issued when the store was at `issued_at`.
    ///
    /// Per id, the fresher of the stored and incoming record wins. Stored entries
    /// absent from the snapshot are dropped, except those written after
    /// `issued_at`, which arrived while the request was in flight.
    pub async fn bulk_replace_since(&self, threads: Vec<Thread>, issued_at: Revision) -> ReplaceSummary {
        let mut summary = ReplaceSummary::default();
        {
            let mut guard = self.inner.write().await;
            let inner = &mut *guard;
            let next_rev = inner.revision + 1;
            let mut next: HashMap<String, StoredThread> = HashMap::with_capacity(threads.len());

            for thread in threads {
                if thread.id.is_empty() {
                    summary.rejected += 1;
                    continue;
                }

                let candidate = match inner.threads.get(&thread.id) {
                    Some(stored) if stored.thread.freshness() > thread.freshness() => {
                        summary.kept_newer += 1;
                        stored.clone()
                    }
                    Some(stored) => {
                        let mut thread = thread;
                        keep_read_receipt(&mut thread, &stored.thread);
                        if thread == stored.thread {
                            stored.clone()
                        } else {
                            StoredThread {
                                thread,
                                written_at: next_rev,
                            }
                        }
                    }
                    None => StoredThread {
                        thread,
                        written_at: next_rev,
                    },
                };

                // Duplicate ids inside one snapshot collapse to the fresher record
                match next.entry(candidate.thread.id.clone()) {
                    MapEntry::Occupied(mut slot) => {
                        if candidate.thread.freshness() >= slot.get().thread.freshness() {
                            slot.insert(candidate);
                        }
                    }
                    MapEntry::Vacant(slot) => {
                        slot.insert(candidate);
                    }
                }
            }

            for (id, stored) in inner.threads.drain() {
                if next.contains_key(&id) {
                    continue;
                }
                if stored.written_at > issued_at {
                    summary.preserved += 1;
                    next.insert(id, stored);
                } else {
                    summary.dropped += 1;
                }
            }

            inner.threads = next;
            inner.revision = next_rev;
            summary.total = inner.threads.len();
        }

        if summary.rejected > 0 {
            warn!("Snapshot contained {} thread record(s) without id", summary.rejected);
        }
        debug!("Snapshot installed: {:?}", summary);
        self.notify(StoreChange::Replaced { total: summary.total }).await;
        summary
    }

    /// Record that the latest message of a known thread was read at `read_at`
    pub async fn apply_read_receipt(&self, id: &str, read_at: DateTime<Utc>) -> bool {
        let applied = {
            let mut guard = self.inner.write().await;
            let inner = &mut *guard;
            let next_rev = inner.revision + 1;
            match inner.threads.get_mut(id) {
                Some(stored) if stored.thread.read_at.map_or(true, |at| at < read_at) => {
                    stored.thread.read_at = Some(read_at);
                    stored.written_at = next_rev;
                    inner.revision = next_rev;
                    true
                }
                _ => false,
            }
        };

        if applied {
            self.notify(StoreChange::ReadReceipt { id: id.to_string() }).await;
        } else {
            debug!("Read receipt for {} not applied", id);
        }
        applied
    }

    pub async fn get(&self, id: &str) -> Option<Thread> {
        let inner = self.inner.read().await;
        inner.threads.get(id).map(|s| s.thread.clone())
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.inner.read().await.threads.contains_key(id)
    }

    /// Current contents, in no defined order
    pub async fn get_all(&self) -> Vec<Thread> {
        let inner = self.inner.read().await;
        inner.threads.values().map(|s| s.thread.clone()).collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.threads.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.threads.is_empty()
    }

    pub async fn revision(&self) -> Revision {
        self.inner.read().await.revision
    }

    /// Register a change listener, invoked after each effective write
    pub async fn subscribe(&self, listener: StoreListener) -> SubscriptionId {
        let id = SubscriptionId(Uuid::new_v4());
        self.listeners.write().await.insert(id, listener);
        id
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.write().await.remove(&id).is_some()
    }

    async fn notify(&self, change: StoreChange) {
        // Snapshot the listeners so none is called while a lock is held
        let listeners: Vec<StoreListener> = self.listeners.read().await.values().cloned().collect();
        for listener in listeners {
            listener(&change);
        }
    }
}

/// An equally fresh record never takes back a receipt the store already holds
fn keep_read_receipt(incoming: &mut Thread, stored: &Thread) {
    if incoming.freshness() == stored.freshness() && incoming.read_at < stored.read_at {
        incoming.read_at = stored.read_at;
    }
}
