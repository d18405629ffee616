/// Live update listener: applies push events to the thread store.
///
/// The listener registers with the connection when attached and is handed one
/// subscription per active connection. It is released when the connection goes
/// inactive and for good when the guard is detached or dropped.
use crate::chat_types::PushMessage;
use crate::push::connection::{PushConnection, Registration};
use crate::push::presence::PresenceTracker;
use crate::thread_store::ThreadStore;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Handling of live events for threads the store has not seen yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnknownThreadPolicy {
    /// Insert only when the event carries message text
    #[default]
    RequireMessage,
    /// Insert every well-formed event
    Accept,
}

pub struct LiveUpdateListener {
    connection: PushConnection,
    store: ThreadStore,
    presence: Option<PresenceTracker>,
    policy: UnknownThreadPolicy,
}

/// Keeps the listener running; releasing it detaches the listener
pub struct ListenerGuard {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl LiveUpdateListener {
    pub fn new(connection: PushConnection, store: ThreadStore, policy: UnknownThreadPolicy) -> Self {
        Self {
            connection,
            store,
            presence: None,
            policy,
        }
    }

    pub fn with_presence(mut self, presence: PresenceTracker) -> Self {
        self.presence = Some(presence);
        self
    }

    /// Register with the connection and spawn the listener task. Registration
    /// happens before this returns, so a `connect` issued afterwards always
    /// reaches the listener. Must be called inside a tokio runtime.
    pub fn attach(self) -> ListenerGuard {
        let state = self.connection.state();
        let registration = self.connection.register();
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(self.run(state, registration, rx));
        ListenerGuard {
            shutdown: Some(tx),
            handle: Some(handle),
        }
    }

    async fn run(
        self,
        mut state: watch::Receiver<bool>,
        mut registration: Registration,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        loop {
            let mut events = tokio::select! {
                session = registration.next_session() => match session {
                    Some(events) => events,
                    None => return,
                },
                _ = &mut shutdown => return,
            };
            // A session handed out before a drop the listener has not seen yet
            // is drained and released straight away
            let mut live = *state.borrow_and_update();
            if live {
                info!("Live listener attached (session {})", self.connection.epoch());
            }

            while live {
                tokio::select! {
                    _ = &mut shutdown => {
                        info!("Live listener detached");
                        return;
                    }
                    changed = state.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        live = *state.borrow_and_update();
                    }
                    newer = registration.next_session() => {
                        // The connection flapped faster than the state was observed;
                        // the held subscription already covers the new session
                        if newer.is_none() {
                            return;
                        }
                        debug!("Live listener kept its subscription across a reconnect");
                    }
                    received = events.recv() => match received {
                        Ok(message) => self.handle(message).await,
                        Err(RecvError::Lagged(n)) => {
                            // Complete records only: the next event or snapshot repairs the gap
                            warn!("Live listener lagged {} events", n);
                        }
                        Err(RecvError::Closed) => return,
                    },
                }
            }

            // Events published before the drop are still applied
            loop {
                match events.try_recv() {
                    Ok(message) => self.handle(message).await,
                    Err(TryRecvError::Lagged(n)) => warn!("Live listener lagged {} events", n),
                    Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                }
            }
            drop(events);
            if let Some(presence) = &self.presence {
                presence.clear().await;
            }
            info!("Live listener released subscription (connection inactive)");
        }
    }

    async fn handle(&self, message: PushMessage) {
        match message {
            PushMessage::ChannelUpdate(thread) => {
                let id = thread.id.clone();
                let outcome = self.store.apply_live(thread, self.policy).await;
                debug!("Channel update {}: {:?}", id, outcome);
            }
            PushMessage::ReadReceipt { channel_id, read_at } => {
                self.store.apply_read_receipt(&channel_id, read_at).await;
            }
            PushMessage::UserOnline { user_id, .. } => {
                if let Some(presence) = &self.presence {
                    presence.mark_online(&user_id).await;
                }
            }
            PushMessage::UserOffline { user_id, .. } => {
                if let Some(presence) = &self.presence {
                    presence.mark_offline(&user_id).await;
                }
            }
        }
    }
}

impl ListenerGuard {
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the listener and wait until its subscription is released
    pub async fn detach(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        // Dropping the sender wakes the task, which then releases its subscription
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
