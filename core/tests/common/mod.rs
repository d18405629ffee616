//! Shared fixtures for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rentdesk_chat::api::ChatApi;
use rentdesk_chat::chat_types::{ChannelStatus, DirectoryCandidate, Participant, Thread};
use rentdesk_chat::{Config, Result, SyncError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;

pub const VIEWER: &str = "landlord-1";

pub fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 1, 12, minute, 0).unwrap()
}

pub fn person(id: &str, first: &str, last: &str) -> Participant {
    Participant {
        id: id.into(),
        first_name: first.into(),
        last_name: last.into(),
        avatar_url: None,
    }
}

/// Thread between VIEWER and `tenant-<id>`, last touched at `minute`
pub fn thread(id: &str, minute: u32) -> Thread {
    Thread {
        id: id.into(),
        participant_a: person(&format!("tenant-{}", id), "Jane", "Doe"),
        participant_b: person(VIEWER, "Sam", "Lee"),
        status: ChannelStatus::Active,
        last_message_text: Some(format!("message at {}", minute)),
        last_message_at: Some(at(minute)),
        last_message_sender_id: Some(format!("tenant-{}", id)),
        read_at: None,
        created_at: at(0),
        updated_at: at(minute),
    }
}

pub fn empty_thread(id: &str, minute: u32) -> Thread {
    Thread {
        last_message_text: None,
        last_message_at: None,
        last_message_sender_id: None,
        ..thread(id, minute)
    }
}

pub fn candidate(id: &str, existing: Option<&str>) -> DirectoryCandidate {
    DirectoryCandidate {
        id: id.into(),
        first_name: "Omar".into(),
        last_name: "Haddad".into(),
        avatar_url: None,
        email: format!("{}@example.com", id),
        existing_channel_id: existing.map(str::to_string),
    }
}

pub fn test_config() -> Config {
    Config {
        viewer_id: VIEWER.into(),
        retry_attempts: 0,
        ..Default::default()
    }
}

/// Scripted `ChatApi`: each call pops the next response; exhausted queues
/// answer with an empty list / a generated channel id.
#[derive(Default)]
pub struct MockApi {
    pub snapshots: Mutex<VecDeque<(Duration, Result<Vec<Thread>>)>>,
    pub searches: Mutex<VecDeque<(Duration, Result<Vec<DirectoryCandidate>>)>>,
    pub sends: Mutex<VecDeque<Result<String>>>,
    pub list_calls: AtomicUsize,
    pub search_queries: Mutex<Vec<String>>,
    pub sent: Mutex<Vec<(String, String)>>,
    pub marked_read: Mutex<Vec<String>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_snapshot(&self, delay: Duration, result: Result<Vec<Thread>>) {
        self.snapshots.lock().unwrap().push_back((delay, result));
    }

    pub fn push_search(&self, delay: Duration, result: Result<Vec<DirectoryCandidate>>) {
        self.searches.lock().unwrap().push_back((delay, result));
    }

    pub fn push_send(&self, result: Result<String>) {
        self.sends.lock().unwrap().push_back(result);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn send_calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatApi for MockApi {
    async fn list_channels(&self) -> Result<Vec<Thread>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.snapshots.lock().unwrap().pop_front();
        match next {
            Some((delay, result)) => {
                sleep(delay).await;
                result
            }
            None => Ok(Vec::new()),
        }
    }

    async fn search_directory(&self, query: &str) -> Result<Vec<DirectoryCandidate>> {
        self.search_queries.lock().unwrap().push(query.to_string());
        let next = self.searches.lock().unwrap().pop_front();
        match next {
            Some((delay, result)) => {
                sleep(delay).await;
                result
            }
            None => Ok(Vec::new()),
        }
    }

    async fn send_and_create(&self, recipient_id: &str, content: &str) -> Result<String> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient_id.to_string(), content.to_string()));
        let next = self.sends.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(format!("ch-{}", recipient_id)))
    }

    async fn mark_read(&self, channel_id: &str) -> Result<()> {
        self.marked_read.lock().unwrap().push(channel_id.to_string());
        Ok(())
    }
}

pub fn server_error() -> SyncError {
    SyncError::Http {
        status: 503,
        message: "Service Unavailable".into(),
    }
}
