/// Chat backend client
///
/// Endpoints:
///   GET  /chat/channels                 snapshot of the viewer's threads
///   GET  /chat/users/search?q=...       directory lookup
///   POST /chat/channels/new             body: {"recipientId":"...","content":"..."}
///   POST /chat/:channel_id/read         mark the latest messages read
///   GET  /chat/events                   SSE stream of push events
use crate::chat_types::{DirectoryCandidate, NewChannelRequest, NewChannelResponse, Thread};
use crate::config::Config;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Operations the sync engine needs from the backend
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Full thread list for the current identity
    async fn list_channels(&self) -> Result<Vec<Thread>>;

    async fn search_directory(&self, query: &str) -> Result<Vec<DirectoryCandidate>>;

    /// Send a first message to `recipient_id`, creating the thread. Returns its id.
    async fn send_and_create(&self, recipient_id: &str, content: &str) -> Result<String>;

    async fn mark_read(&self, channel_id: &str) -> Result<()>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Wrapped { users: Vec<DirectoryCandidate> },
    Bare(Vec<DirectoryCandidate>),
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

type HttpClient = Client<HttpConnector, Full<Bytes>>;

/// `ChatApi` over plain HTTP/1.1
pub struct HttpChatApi {
    client: HttpClient,
    api_url: String,
    auth_token: Option<String>,
    request_timeout: Duration,
}

impl HttpChatApi {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
            request_timeout: config.request_timeout,
        }
    }

    fn uri(&self, path: &str) -> Result<Uri> {
        format!("{}{}", self.api_url, path)
            .parse::<Uri>()
            .map_err(|e| SyncError::Config(format!("Invalid URL for {}: {}", path, e)))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        accept: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Response<Incoming>> {
        let mut builder = Request::builder()
            .method(method.clone())
            .uri(self.uri(path)?)
            .header(ACCEPT, accept);
        if let Some(token) = &self.auth_token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if body.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        let request = builder
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| SyncError::Transport(format!("Failed to build request: {}", e)))?;

        debug!("{} {}", method, path);
        timeout(self.request_timeout, self.client.request(request))
            .await
            .map_err(|_| SyncError::Timeout(format!("{} {}", method, path)))?
            .map_err(|e| SyncError::Transport(format!("{} {}: {}", method, path, e)))
    }

    async fn read_body(&self, response: Response<Incoming>, path: &str) -> Result<(StatusCode, Bytes)> {
        let status = response.status();
        let body = timeout(self.request_timeout, response.into_body().collect())
            .await
            .map_err(|_| SyncError::Timeout(format!("reading {}", path)))?
            .map_err(|e| SyncError::Transport(format!("reading {}: {}", path, e)))?
            .to_bytes();
        Ok((status, body))
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<T> {
        let response = self.send(method, path, "application/json", body).await?;
        let (status, body) = self.read_body(response, path).await?;
        if !status.is_success() {
            return Err(http_error(status, &body));
        }
        Ok(serde_json::from_slice(&body)?)
    }

    /// Open a long-lived event stream; only the response head is subject to the timeout
    pub async fn open_stream(&self, path: &str) -> Result<Incoming> {
        let response = self.send(Method::GET, path, "text/event-stream", None).await?;
        let status = response.status();
        if !status.is_success() {
            let (_, body) = self.read_body(response, path).await?;
            return Err(http_error(status, &body));
        }
        Ok(response.into_body())
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn list_channels(&self) -> Result<Vec<Thread>> {
        self.request_json(Method::GET, "/chat/channels", None).await
    }

    async fn search_directory(&self, query: &str) -> Result<Vec<DirectoryCandidate>> {
        let path = format!("/chat/users/search?q={}", urlencoding::encode(query));
        let response: SearchResponse = self.request_json(Method::GET, &path, None).await?;
        Ok(match response {
            SearchResponse::Wrapped { users } => users,
            SearchResponse::Bare(users) => users,
        })
    }

    async fn send_and_create(&self, recipient_id: &str, content: &str) -> Result<String> {
        let body = serde_json::to_vec(&NewChannelRequest {
            recipient_id: recipient_id.to_string(),
            content: content.to_string(),
        })?;
        let response: NewChannelResponse = self
            .request_json(Method::POST, "/chat/channels/new", Some(body))
            .await?;
        Ok(response.channel_id)
    }

    async fn mark_read(&self, channel_id: &str) -> Result<()> {
        let path = format!("/chat/{}/read", urlencoding::encode(channel_id));
        let response = self
            .send(Method::POST, &path, "application/json", Some(b"{}".to_vec()))
            .await?;
        let (status, body) = self.read_body(response, &path).await?;
        if !status.is_success() {
            return Err(http_error(status, &body));
        }
        Ok(())
    }
}

fn http_error(status: StatusCode, body: &[u8]) -> SyncError {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
    SyncError::Http {
        status: status.as_u16(),
        message,
    }
}
