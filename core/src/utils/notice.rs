/// Transient user-facing notifications (toasts)
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
    /// RFC3339
    pub timestamp: String,
}

pub struct NoticeBoard {
    sender: broadcast::Sender<Notice>,
}

impl Default for NoticeBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl NoticeBoard {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(32);
        Self { sender }
    }

    pub fn success(&self, text: impl Into<String>) {
        self.emit(NoticeLevel::Success, text.into());
    }

    pub fn error(&self, text: impl Into<String>) {
        self.emit(NoticeLevel::Error, text.into());
    }

    fn emit(&self, level: NoticeLevel, text: String) {
        match level {
            NoticeLevel::Success => info!("notice: {}", text),
            NoticeLevel::Error => warn!("notice: {}", text),
        }
        // Nobody watching is fine
        let _ = self.sender.send(Notice {
            level,
            text,
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }
}

impl Clone for NoticeBoard {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}
