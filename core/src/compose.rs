/// Directory search and "message someone new" flow
///
/// Idle -> Searching -> ResultsShown -> (existing thread: route, done)
///                                   -> Composing -> Sending -> Idle
///                                                   Sending fails -> Composing
use crate::api::ChatApi;
use crate::chat_types::DirectoryCandidate;
use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::loader::{LoadMode, SnapshotLoader};
use crate::utils::debounce::Debouncer;
use crate::utils::notice::NoticeBoard;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeState {
    Idle,
    Searching {
        query: String,
    },
    ResultsShown {
        query: String,
        candidates: Vec<DirectoryCandidate>,
    },
    Composing {
        recipient: DirectoryCandidate,
        draft: String,
        error: Option<String>,
    },
    Sending {
        recipient: DirectoryCandidate,
        draft: String,
    },
}

/// What the caller should do after a candidate was picked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// A thread with this person exists; open it instead of creating one
    OpenExisting(String),
    /// No thread yet; the flow is now composing a first message
    Compose,
}

pub struct ComposeFlow {
    api: Arc<dyn ChatApi>,
    loader: SnapshotLoader,
    notices: NoticeBoard,
    state: Arc<watch::Sender<ComposeState>>,
    debouncer: Debouncer,
    min_query_len: usize,
}

impl ComposeFlow {
    pub fn new(api: Arc<dyn ChatApi>, loader: SnapshotLoader, notices: NoticeBoard, config: &Config) -> Self {
        let (state, _) = watch::channel(ComposeState::Idle);
        Self {
            api,
            loader,
            notices,
            state: Arc::new(state),
            debouncer: Debouncer::new(config.search_debounce),
            min_query_len: config.min_search_len,
        }
    }

    pub fn state(&self) -> ComposeState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ComposeState> {
        self.state.subscribe()
    }

    /// Search box changed. Restarts the debounce; short queries clear the results.
    pub fn query_changed(&self, query: &str) {
        if matches!(*self.state.borrow(), ComposeState::Sending { .. }) {
            debug!("Ignoring search input while sending");
            return;
        }

        let query = query.trim().to_string();
        if query.chars().count() < self.min_query_len {
            self.debouncer.cancel();
            self.state.send_replace(ComposeState::Idle);
            return;
        }

        self.state.send_replace(ComposeState::Searching { query: query.clone() });

        let api = self.api.clone();
        let state = self.state.clone();
        let notices = self.notices.clone();
        self.debouncer.schedule(move |ticket| async move {
            let result = api.search_directory(&query).await;
            if !ticket.is_current() {
                debug!("Discarding superseded search for {:?}", query);
                return;
            }

            let candidates = match result {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!("Directory search failed: {}", e);
                    notices.error(format!("Failed to search users: {}", e));
                    Vec::new()
                }
            };

            state.send_if_modified(|current| match current {
                ComposeState::Searching { query: pending } if *pending == query => {
                    *current = ComposeState::ResultsShown { query, candidates };
                    true
                }
                _ => false,
            });
        });
    }

    /// Pick a search result. Never touches the store.
    pub fn select(&self, candidate: DirectoryCandidate) -> Result<Selection> {
        if matches!(*self.state.borrow(), ComposeState::Sending { .. }) {
            return Err(SyncError::InvalidInput("a message is being sent".to_string()));
        }
        self.debouncer.cancel();

        if let Some(channel_id) = candidate.existing_channel_id.clone() {
            info!("Routing to existing channel {} for {}", channel_id, candidate.id);
            self.state.send_replace(ComposeState::Idle);
            return Ok(Selection::OpenExisting(channel_id));
        }

        self.state.send_replace(ComposeState::Composing {
            recipient: candidate,
            draft: String::new(),
            error: None,
        });
        Ok(Selection::Compose)
    }

    /// Update the draft while composing. Returns false in any other state.
    pub fn set_draft(&self, text: &str) -> bool {
        self.state.send_if_modified(|current| match current {
            ComposeState::Composing { draft, error, .. } => {
                *draft = text.to_string();
                *error = None;
                true
            }
            _ => false,
        })
    }

    /// Send the first message and create the thread. Returns the new channel id.
    pub async fn submit(&self) -> Result<String> {
        let (recipient, draft) = match self.state() {
            ComposeState::Composing { recipient, draft, .. } => (recipient, draft),
            _ => return Err(SyncError::InvalidInput("no recipient selected".to_string())),
        };

        let content = draft.trim().to_string();
        if content.is_empty() {
            self.notices.error("Please enter a message");
            return Err(SyncError::InvalidInput("message is empty".to_string()));
        }

        self.state.send_replace(ComposeState::Sending {
            recipient: recipient.clone(),
            draft: draft.clone(),
        });

        match self.api.send_and_create(&recipient.id, &content).await {
            Ok(channel_id) => {
                info!("Created channel {} with {}", channel_id, recipient.id);
                self.notices.success("Message sent successfully!");
                self.state.send_replace(ComposeState::Idle);
                if let Err(e) = self.loader.load(LoadMode::Initial).await {
                    warn!("Refresh after creating {} failed: {}", channel_id, e);
                }
                Ok(channel_id)
            }
            Err(e) => {
                error!("Failed to send message to {}: {}", recipient.id, e);
                self.notices.error(format!("Failed to send message: {}", e));
                self.state.send_replace(ComposeState::Composing {
                    recipient,
                    draft,
                    error: Some(e.to_string()),
                });
                Err(e)
            }
        }
    }

    /// Abandon the flow. A send in progress is left to finish.
    pub fn reset(&self) {
        if matches!(*self.state.borrow(), ComposeState::Sending { .. }) {
            return;
        }
        self.debouncer.cancel();
        self.state.send_replace(ComposeState::Idle);
    }
}
