/// Cancellable delayed task: scheduling a new one cancels the pending one
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Identifies one scheduled run; stale once a newer run was scheduled or cancel was called
#[derive(Debug, Clone)]
pub struct Ticket {
    generation: u64,
    latest: Arc<AtomicU64>,
}

impl Ticket {
    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::SeqCst) == self.generation
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

pub struct Debouncer {
    delay: Duration,
    latest: Arc<AtomicU64>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            latest: Arc::new(AtomicU64::new(0)),
            pending: Mutex::new(None),
        }
    }

    /// Run `task` after the quiet period unless superseded first.
    ///
    /// The task receives its ticket so it can drop results that arrive after
    /// a newer run was scheduled. Must be called inside a tokio runtime.
    pub fn schedule<F, Fut>(&self, task: F) -> Ticket
    where
        F: FnOnce(Ticket) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let ticket = Ticket {
            generation: self.latest.fetch_add(1, Ordering::SeqCst) + 1,
            latest: self.latest.clone(),
        };

        let delay = self.delay;
        let run_ticket = ticket.clone();
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            if run_ticket.is_current() {
                task(run_ticket).await;
            }
        });

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.replace(handle) {
            previous.abort();
        }
        ticket
    }

    /// Cancel whatever is pending; in-flight results become stale
    pub fn cancel(&self) {
        self.latest.fetch_add(1, Ordering::SeqCst);
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.take() {
            previous.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
