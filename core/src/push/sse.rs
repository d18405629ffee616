/// Server-sent events transport for the push connection
use crate::api::HttpChatApi;
use crate::chat_types::PushMessage;
use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::push::connection::PushConnection;
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub const EVENTS_PATH: &str = "/chat/events";

/// One dispatched event: name plus joined data lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Incremental `text/event-stream` parser; chunks may split lines anywhere
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    out.push(event);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }

        out
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

/// Feeds the push connection from the backend's event stream, reconnecting on loss
pub struct SseTransport {
    api: Arc<HttpChatApi>,
    connection: PushConnection,
    reconnect_attempts: u32,
    reconnect_delay: Duration,
}

impl SseTransport {
    pub fn new(api: Arc<HttpChatApi>, connection: PushConnection, config: &Config) -> Self {
        Self {
            api,
            connection,
            reconnect_attempts: config.reconnect_attempts,
            reconnect_delay: config.reconnect_delay,
        }
    }

    /// Run until reconnect attempts are exhausted
    pub async fn run(&self) -> Result<()> {
        let mut failures = 0u32;
        loop {
            match self.stream_once().await {
                Ok(delivered) => {
                    info!("Push stream closed after {} events", delivered);
                    failures = 0;
                }
                Err(e) => {
                    failures += 1;
                    warn!("Push stream connect failed ({}/{}): {}", failures, self.reconnect_attempts, e);
                }
            }
            self.connection.disconnect();

            if failures > self.reconnect_attempts {
                return Err(SyncError::Transport(format!(
                    "push stream unavailable after {} attempts",
                    failures
                )));
            }
            sleep(self.reconnect_delay).await;
        }
    }

    /// Errors only before the stream is established; afterwards returns the event count
    async fn stream_once(&self) -> Result<usize> {
        let mut body = self.api.open_stream(EVENTS_PATH).await?;
        self.connection.connect();

        let mut decoder = SseDecoder::new();
        let mut delivered = 0;
        while let Some(frame) = body.frame().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Push stream read error: {}", e);
                    break;
                }
            };
            let Some(chunk) = frame.data_ref() else {
                continue;
            };
            for event in decoder.feed(chunk) {
                match PushMessage::from_named(&event.event, &event.data) {
                    Ok(Some(message)) => {
                        self.connection.publish(message);
                        delivered += 1;
                    }
                    Ok(None) => debug!("Ignoring push event {}", event.event),
                    Err(e) => warn!("Dropped malformed {} event: {}", event.event, e),
                }
            }
        }
        Ok(delivered)
    }
}
