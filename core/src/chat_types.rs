/// Shared types for the chat layer: threads, participants, push events
use crate::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a conversation. Ended threads stay in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelStatus {
    Inquiry,
    Active,
    Ended,
}

impl ChannelStatus {
    /// Human-readable label for list views
    pub fn label(self) -> &'static str {
        match self {
            ChannelStatus::Inquiry => "Inquiry",
            ChannelStatus::Active => "Active Lease",
            ChannelStatus::Ended => "Ended Lease",
        }
    }

    pub fn as_wire(self) -> &'static str {
        match self {
            ChannelStatus::Inquiry => "INQUIRY",
            ChannelStatus::Active => "ACTIVE",
            ChannelStatus::Ended => "ENDED",
        }
    }
}

impl FromStr for ChannelStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INQUIRY" => Ok(ChannelStatus::Inquiry),
            "ACTIVE" => Ok(ChannelStatus::Active),
            "ENDED" => Ok(ChannelStatus::Ended),
            other => Err(SyncError::InvalidInput(format!("unknown channel status: {}", other))),
        }
    }
}

/// Status filter applied by the presenter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(ChannelStatus),
}

impl StatusFilter {
    pub fn matches(self, status: ChannelStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(wanted) => wanted == status,
        }
    }

    /// All → Inquiry → Active → Ended → All
    pub fn next(self) -> Self {
        match self {
            StatusFilter::All => StatusFilter::Only(ChannelStatus::Inquiry),
            StatusFilter::Only(ChannelStatus::Inquiry) => StatusFilter::Only(ChannelStatus::Active),
            StatusFilter::Only(ChannelStatus::Active) => StatusFilter::Only(ChannelStatus::Ended),
            StatusFilter::Only(ChannelStatus::Ended) => StatusFilter::All,
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusFilter::All => write!(f, "ALL"),
            StatusFilter::Only(status) => write!(f, "{}", status.as_wire()),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("ALL") {
            return Ok(StatusFilter::All);
        }
        s.parse::<ChannelStatus>().map(StatusFilter::Only)
    }
}

/// One party of a thread, with the profile fields the list view needs
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl Participant {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

/// A conversation between exactly two parties, as the server records it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    /// Empty when the payload carried no id; the store rejects such records
    #[serde(default)]
    pub id: String,
    #[serde(alias = "tenant")]
    pub participant_a: Participant,
    #[serde(alias = "landlord")]
    pub participant_b: Participant,
    pub status: ChannelStatus,
    #[serde(default)]
    pub last_message_text: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_message_sender_id: Option<String>,
    /// None means the latest message is unread by its recipient
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    /// Timestamp used to decide which of two versions of a record is newer
    pub fn freshness(&self) -> DateTime<Utc> {
        match self.last_message_at {
            Some(at) if at > self.updated_at => at,
            _ => self.updated_at,
        }
    }

    /// Latest message text, with an empty string treated as no message
    pub fn message_text(&self) -> Option<&str> {
        self.last_message_text.as_deref().filter(|text| !text.is_empty())
    }

    pub fn has_message(&self) -> bool {
        self.message_text().is_some()
    }
}

/// Prospective counterpart returned by the directory search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryCandidate {
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub email: String,
    /// Set when a thread with this person already exists
    #[serde(default)]
    pub existing_channel_id: Option<String>,
}

impl DirectoryCandidate {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

/// Body of the send-and-create request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChannelRequest {
    pub recipient_id: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChannelResponse {
    pub channel_id: String,
}

pub const EVENT_CHANNEL_UPDATE: &str = "chat:channel:update";
pub const EVENT_READ_RECEIPT: &str = "chat:message:read";
pub const EVENT_USER_ONLINE: &str = "presence:userOnline";
pub const EVENT_USER_OFFLINE: &str = "presence:userOffline";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadReceiptPayload {
    channel_id: String,
    read_at: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresencePayload {
    user_id: String,
    #[serde(default)]
    channel_id: Option<String>,
}

/// Push notifications delivered over the live connection
#[derive(Debug, Clone, PartialEq)]
pub enum PushMessage {
    /// Complete thread record, never a diff
    ChannelUpdate(Thread),
    ReadReceipt {
        channel_id: String,
        read_at: DateTime<Utc>,
    },
    UserOnline {
        user_id: String,
        channel_id: Option<String>,
    },
    UserOffline {
        user_id: String,
        channel_id: Option<String>,
    },
}

impl PushMessage {
    /// Decode a named push event. Unknown event names yield `Ok(None)`.
    pub fn from_named(event: &str, data: &str) -> Result<Option<Self>> {
        let message = match event {
            EVENT_CHANNEL_UPDATE => PushMessage::ChannelUpdate(serde_json::from_str(data)?),
            EVENT_READ_RECEIPT => {
                let p: ReadReceiptPayload = serde_json::from_str(data)?;
                PushMessage::ReadReceipt {
                    channel_id: p.channel_id,
                    read_at: p.read_at,
                }
            }
            EVENT_USER_ONLINE => {
                let p: PresencePayload = serde_json::from_str(data)?;
                PushMessage::UserOnline {
                    user_id: p.user_id,
                    channel_id: p.channel_id,
                }
            }
            EVENT_USER_OFFLINE => {
                let p: PresencePayload = serde_json::from_str(data)?;
                PushMessage::UserOffline {
                    user_id: p.user_id,
                    channel_id: p.channel_id,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(message))
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            PushMessage::ChannelUpdate(_) => EVENT_CHANNEL_UPDATE,
            PushMessage::ReadReceipt { .. } => EVENT_READ_RECEIPT,
            PushMessage::UserOnline { .. } => EVENT_USER_ONLINE,
            PushMessage::UserOffline { .. } => EVENT_USER_OFFLINE,
        }
    }
}
