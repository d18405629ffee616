/// Snapshot loader: fetches the full thread list and installs it in the store
use crate::api::ChatApi;
use crate::chat_types::Thread;
use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::thread_store::{ReplaceSummary, ThreadStore};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// First load: drives the loading indicator
    Initial,
    /// Manual refresh: updates the store without the indicator
    Silent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Installed(ReplaceSummary),
    /// A newer load was issued before this one resolved; its result was discarded
    Superseded { generation: u64 },
}

/// Exponential backoff with jitter for transient snapshot failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            attempts: config.retry_attempts,
            base_delay: config.retry_base_delay,
            max_delay: config.retry_max_delay,
        }
    }

    pub fn none() -> Self {
        Self {
            attempts: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based), with up to 25% jitter added
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let base = self.base_delay.saturating_mul(factor).min(self.max_delay);
        let jitter_ms = (base.as_millis() as u64) / 4;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

#[derive(Clone)]
pub struct SnapshotLoader {
    api: Arc<dyn ChatApi>,
    store: ThreadStore,
    retry: RetryPolicy,
    generation: Arc<AtomicU64>,
    /// Generation of the latest Initial load, the one allowed to clear `loading`
    indicator_owner: Arc<AtomicU64>,
    loading: Arc<watch::Sender<bool>>,
}

impl SnapshotLoader {
    pub fn new(api: Arc<dyn ChatApi>, store: ThreadStore, retry: RetryPolicy) -> Self {
        let (loading, _) = watch::channel(true);
        Self {
            api,
            store,
            retry,
            generation: Arc::new(AtomicU64::new(0)),
            indicator_owner: Arc::new(AtomicU64::new(0)),
            loading: Arc::new(loading),
        }
    }

    /// Fetch and install a snapshot. On failure the store is left as it was.
    pub async fn load(&self, mode: LoadMode) -> Result<LoadOutcome> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let issued_at = self.store.revision().await;
        if mode == LoadMode::Initial {
            self.indicator_owner.store(generation, Ordering::SeqCst);
            self.loading.send_replace(true);
        }

        let fetched = self.fetch_with_retry(generation).await;

        if mode == LoadMode::Initial && self.indicator_owner.load(Ordering::SeqCst) == generation {
            self.loading.send_replace(false);
        }

        let threads = match fetched {
            Ok(threads) => threads,
            Err(SyncError::Cancelled(_)) => return Ok(LoadOutcome::Superseded { generation }),
            Err(e) => {
                error!("Failed to load channels: {}", e);
                return Err(e);
            }
        };

        if !self.is_current(generation) {
            debug!("Discarding snapshot #{} (superseded)", generation);
            return Ok(LoadOutcome::Superseded { generation });
        }

        let summary = self.store.bulk_replace_since(threads, issued_at).await;
        info!(
            "Loaded {} channels (dropped {}, kept {} newer, preserved {} live)",
            summary.total, summary.dropped, summary.kept_newer, summary.preserved
        );
        Ok(LoadOutcome::Installed(summary))
    }

    async fn fetch_with_retry(&self, generation: u64) -> Result<Vec<Thread>> {
        let mut attempt = 0;
        loop {
            match self.api.list_channels().await {
                Ok(threads) => return Ok(threads),
                Err(e) if e.is_transient() && attempt < self.retry.attempts => {
                    attempt += 1;
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "Snapshot #{} failed ({}), retry {}/{} in {:?}",
                        generation, e, attempt, self.retry.attempts, delay
                    );
                    sleep(delay).await;
                    if !self.is_current(generation) {
                        return Err(SyncError::Cancelled(format!("snapshot #{}", generation)));
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    /// Observe the first-load indicator
    pub fn loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    pub fn store(&self) -> &ThreadStore {
        &self.store
    }
}
