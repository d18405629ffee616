/// Per-thread values derived for display. Pure functions over `Thread`.
use crate::chat_types::{Participant, Thread};
use chrono::{DateTime, Utc};

pub const PREVIEW_MAX_CHARS: usize = 50;
pub const NO_MESSAGES_PLACEHOLDER: &str = "No messages yet";
const YOU_SENT_PREFIX: &str = "You: ";
const ELLIPSIS: &str = "...";

/// Read-receipt indicator for the latest message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptState {
    /// No message exchanged yet, or the counterpart's message was already read
    None,
    /// Counterpart's message not yet read by the viewer
    Unread,
    /// Viewer's message not yet read by the counterpart
    Delivered,
    /// Viewer's message read by the counterpart
    Seen,
}

/// The participant who is not `viewer_id`
pub fn counterpart<'a>(thread: &'a Thread, viewer_id: &str) -> &'a Participant {
    if thread.participant_a.id == viewer_id {
        &thread.participant_b
    } else {
        &thread.participant_a
    }
}

pub fn unread(thread: &Thread, viewer_id: &str) -> bool {
    thread.read_at.is_none() && thread.last_message_sender_id.as_deref() != Some(viewer_id)
}

pub fn sent_by_viewer(thread: &Thread, viewer_id: &str) -> bool {
    thread.last_message_sender_id.as_deref() == Some(viewer_id)
}

pub fn preview_text(thread: &Thread, viewer_id: &str) -> String {
    let Some(text) = thread.message_text() else {
        return NO_MESSAGES_PLACEHOLDER.to_string();
    };

    let mut preview: String = text.chars().take(PREVIEW_MAX_CHARS).collect();
    if text.chars().nth(PREVIEW_MAX_CHARS).is_some() {
        preview.push_str(ELLIPSIS);
    }

    if sent_by_viewer(thread, viewer_id) {
        format!("{}{}", YOU_SENT_PREFIX, preview)
    } else {
        preview
    }
}

/// Latest of last message, update and creation time
pub fn last_activity(thread: &Thread) -> DateTime<Utc> {
    let mut latest = thread.created_at.max(thread.updated_at);
    if let Some(at) = thread.last_message_at {
        latest = latest.max(at);
    }
    latest
}

pub fn receipt_state(thread: &Thread, viewer_id: &str) -> ReceiptState {
    if sent_by_viewer(thread, viewer_id) {
        if thread.read_at.is_some() {
            ReceiptState::Seen
        } else {
            ReceiptState::Delivered
        }
    } else if unread(thread, viewer_id) && thread.has_message() {
        ReceiptState::Unread
    } else {
        ReceiptState::None
    }
}

pub fn unread_count<'a, I>(threads: I, viewer_id: &str) -> usize
where
    I: IntoIterator<Item = &'a Thread>,
{
    threads.into_iter().filter(|t| unread(t, viewer_id)).count()
}
