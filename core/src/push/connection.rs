/// Push connection handle
///
/// The transport publishes decoded events into the handle; listeners register.
/// Every registered listener is handed a fresh subscription at the moment the
/// connection comes up, so events published right after `connect` reach it.
/// The connected flag is observable so listeners can release their
/// subscription when the connection drops.
use crate::chat_types::PushMessage;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info};

const DEFAULT_CAPACITY: usize = 256;

type SessionSender = mpsc::UnboundedSender<broadcast::Receiver<PushMessage>>;

#[derive(Clone)]
pub struct PushConnection {
    events: broadcast::Sender<PushMessage>,
    state: Arc<watch::Sender<bool>>,
    registry: Arc<Mutex<Registry>>,
    epoch: Arc<AtomicU64>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    slots: HashMap<u64, SessionSender>,
}

/// A registered listener's feed of per-connection subscriptions.
/// Dropping it unregisters the listener.
pub struct Registration {
    id: u64,
    sessions: mpsc::UnboundedReceiver<broadcast::Receiver<PushMessage>>,
    registry: Arc<Mutex<Registry>>,
}

impl Default for PushConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl PushConnection {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        let (state, _) = watch::channel(false);
        Self {
            events,
            state: Arc::new(state),
            registry: Arc::new(Mutex::new(Registry::default())),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark the connection active and subscribe every registered listener
    pub fn connect(&self) {
        let mut registry = self.registry();
        let mut epoch = 0;
        // The epoch moves before state watchers are woken
        let came_up = self.state.send_if_modified(|up| {
            if *up {
                return false;
            }
            *up = true;
            epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            true
        });
        if came_up {
            registry
                .slots
                .retain(|_, slot| slot.send(self.events.subscribe()).is_ok());
            info!("Push connection up (session {}, {} listener(s))", epoch, registry.slots.len());
        }
    }

    /// Mark the connection inactive; listeners release their subscriptions
    pub fn disconnect(&self) {
        let _registry = self.registry();
        if self.state.send_if_modified(|up| std::mem::replace(up, false)) {
            info!("Push connection down");
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.state.borrow()
    }

    /// Number of times the connection has come up
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Observe connected/disconnected transitions
    pub fn state(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Register a listener. If the connection is already up, the first
    /// subscription is delivered immediately.
    pub fn register(&self) -> Registration {
        let (tx, sessions) = mpsc::unbounded_channel();
        let mut registry = self.registry();
        if self.is_connected() {
            let _ = tx.send(self.events.subscribe());
        }
        let id = registry.next_id;
        registry.next_id += 1;
        registry.slots.insert(id, tx);
        Registration {
            id,
            sessions,
            registry: self.registry.clone(),
        }
    }

    /// Deliver one event to every subscriber. Returns how many received it.
    pub fn publish(&self, message: PushMessage) -> usize {
        if !self.is_connected() {
            debug!("Dropping {} while disconnected", message.event_name());
            return 0;
        }
        self.events.send(message).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PushMessage> {
        self.events.subscribe()
    }

    /// Number of live subscriptions on this connection
    pub fn listener_count(&self) -> usize {
        self.events.receiver_count()
    }
}

impl Registration {
    /// Next per-connection subscription; `None` once the connection handle is gone
    pub async fn next_session(&mut self) -> Option<broadcast::Receiver<PushMessage>> {
        self.sessions.recv().await
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.slots.remove(&self.id);
    }
}
