/// Configuration management
use crate::error::{Result, SyncError};
use crate::push::UnknownThreadPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_API_URL: &str = "http://127.0.0.1:5000/api";

/// Sync engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the chat backend, without trailing slash
    pub api_url: String,

    /// Id of the identity viewing the inbox
    pub viewer_id: String,

    /// Optional bearer token sent with every request
    pub auth_token: Option<String>,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// Quiet period before a directory search is issued
    pub search_debounce: Duration,

    /// Minimum query length that triggers a directory search
    pub min_search_len: usize,

    /// Snapshot attempts after the first failure
    pub retry_attempts: u32,

    /// Backoff for the first retry, doubled each attempt
    pub retry_base_delay: Duration,

    /// Backoff ceiling
    pub retry_max_delay: Duration,

    /// Push stream reconnect attempts before giving up
    pub reconnect_attempts: u32,

    /// Delay between push stream reconnects
    pub reconnect_delay: Duration,

    /// What to do with live events for threads the store has never seen
    pub unknown_thread_policy: UnknownThreadPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            viewer_id: String::new(),
            auth_token: None,
            request_timeout: Duration::from_secs(10),
            search_debounce: Duration::from_millis(300),
            min_search_len: 2,
            retry_attempts: 3,
            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(8),
            reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(1),
            unknown_thread_policy: UnknownThreadPolicy::RequireMessage,
        }
    }
}

impl Config {
    /// Create config from command line arguments
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut config = Self::default();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--api-url" => {
                    config.api_url = flag_value(args, i, "--api-url")?.to_string();
                    i += 2;
                }
                "--viewer" => {
                    config.viewer_id = flag_value(args, i, "--viewer")?.to_string();
                    i += 2;
                }
                "--token" => {
                    config.auth_token = Some(flag_value(args, i, "--token")?.to_string());
                    i += 2;
                }
                "--debounce-ms" => {
                    let ms = flag_value(args, i, "--debounce-ms")?
                        .parse::<u64>()
                        .map_err(|_| SyncError::Config("--debounce-ms must be a number".to_string()))?;
                    config.search_debounce = Duration::from_millis(ms);
                    i += 2;
                }
                "--retries" => {
                    config.retry_attempts = flag_value(args, i, "--retries")?
                        .parse::<u32>()
                        .map_err(|_| SyncError::Config("--retries must be a number".to_string()))?;
                    i += 2;
                }
                "--accept-empty-live" => {
                    config.unknown_thread_policy = UnknownThreadPolicy::Accept;
                    i += 1;
                }
                other => {
                    return Err(SyncError::Config(format!(
                        "Unknown argument: {}\nUsage: {} --viewer <id> [--api-url <url>] [--token <token>] [--debounce-ms <ms>] [--retries <n>] [--accept-empty-live]",
                        other,
                        args.first().map(String::as_str).unwrap_or("rentdesk-sync")
                    )));
                }
            }
        }

        // Env overrides (nice for scripts)
        if let Ok(url) = std::env::var("RENTDESK_API_URL") {
            config.api_url = url;
        }
        if let Ok(viewer) = std::env::var("RENTDESK_VIEWER_ID") {
            config.viewer_id = viewer;
        }
        if let Ok(token) = std::env::var("RENTDESK_TOKEN") {
            config.auth_token = Some(token);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.viewer_id.trim().is_empty() {
            return Err(SyncError::Config(
                "viewer id is required (--viewer or RENTDESK_VIEWER_ID)".to_string(),
            ));
        }
        if !self.api_url.starts_with("http://") {
            return Err(SyncError::Config(format!(
                "api url must be plain http://, got {}",
                self.api_url
            )));
        }
        if self.min_search_len == 0 {
            return Err(SyncError::Config("min_search_len must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| SyncError::Config(format!("{} requires a value", flag)))
}
