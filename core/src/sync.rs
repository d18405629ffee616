/// Wiring for the chat sync engine
use crate::api::{ChatApi, HttpChatApi};
use crate::chat_types::{StatusFilter, Thread};
use crate::compose::ComposeFlow;
use crate::config::Config;
use crate::error::Result;
use crate::loader::{LoadMode, LoadOutcome, RetryPolicy, SnapshotLoader};
use crate::presenter::present;
use crate::push::{ListenerGuard, LiveUpdateListener, PresenceTracker, PushConnection, SseTransport};
use crate::thread_store::ThreadStore;
use crate::utils::notice::NoticeBoard;
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub struct ChatSync {
    config: Config,
    api: Arc<dyn ChatApi>,
    /// Set when talking to a real backend; drives the SSE transport
    http: Option<Arc<HttpChatApi>>,
    store: ThreadStore,
    loader: SnapshotLoader,
    connection: PushConnection,
    presence: PresenceTracker,
    notices: NoticeBoard,
    compose: ComposeFlow,
}

impl ChatSync {
    /// Engine backed by the HTTP API at `config.api_url`
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let http = Arc::new(HttpChatApi::new(&config));
        let api: Arc<dyn ChatApi> = http.clone();
        let mut sync = Self::with_api(config, api);
        sync.http = Some(http);
        Ok(sync)
    }

    /// Engine over any `ChatApi`. Push events must be published on `connection()`.
    pub fn with_api(config: Config, api: Arc<dyn ChatApi>) -> Self {
        let store = ThreadStore::new();
        let loader = SnapshotLoader::new(api.clone(), store.clone(), RetryPolicy::from_config(&config));
        let notices = NoticeBoard::new();
        let compose = ComposeFlow::new(api.clone(), loader.clone(), notices.clone(), &config);
        let presence = PresenceTracker::new(config.viewer_id.clone());

        Self {
            config,
            api,
            http: None,
            store,
            loader,
            connection: PushConnection::new(),
            presence,
            notices,
            compose,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn viewer_id(&self) -> &str {
        &self.config.viewer_id
    }

    pub fn api(&self) -> &Arc<dyn ChatApi> {
        &self.api
    }

    pub fn store(&self) -> &ThreadStore {
        &self.store
    }

    pub fn loader(&self) -> &SnapshotLoader {
        &self.loader
    }

    pub fn connection(&self) -> &PushConnection {
        &self.connection
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn notices(&self) -> &NoticeBoard {
        &self.notices
    }

    pub fn compose(&self) -> &ComposeFlow {
        &self.compose
    }

    pub async fn load(&self) -> Result<LoadOutcome> {
        self.loader.load(LoadMode::Initial).await
    }

    /// Manual refresh; does not touch the loading indicator
    pub async fn refresh(&self) -> Result<LoadOutcome> {
        self.loader.load(LoadMode::Silent).await
    }

    /// Current inbox view
    pub async fn inbox(&self, filter: StatusFilter, query: &str) -> Vec<Thread> {
        let threads = self.store.get_all().await;
        present(&threads, filter, query, &self.config.viewer_id)
    }

    /// Mark a thread read on the server. The store is updated by the receipt push.
    pub async fn mark_read(&self, channel_id: &str) -> Result<()> {
        self.api.mark_read(channel_id).await
    }

    pub fn attach_listener(&self) -> ListenerGuard {
        LiveUpdateListener::new(
            self.connection.clone(),
            self.store.clone(),
            self.config.unknown_thread_policy,
        )
        .with_presence(self.presence.clone())
        .attach()
    }

    /// Start feeding `connection()` from the backend's event stream.
    /// None when the engine was built over a custom `ChatApi`.
    pub fn spawn_transport(&self) -> Option<JoinHandle<()>> {
        let http = self.http.as_ref()?;
        let transport = SseTransport::new(http.clone(), self.connection.clone(), &self.config);
        Some(tokio::spawn(async move {
            if let Err(e) = transport.run().await {
                error!("Push transport stopped: {}", e);
            }
        }))
    }

    /// Reload silently each time the connection comes back after a drop.
    /// Events published while it was down are never delivered.
    pub fn spawn_catch_up(&self) -> JoinHandle<()> {
        let mut state = self.connection.state();
        let connection = self.connection.clone();
        let loader = self.loader.clone();
        tokio::spawn(async move {
            let mut seen = connection.epoch();
            while state.changed().await.is_ok() {
                if !*state.borrow_and_update() {
                    continue;
                }
                let epoch = connection.epoch();
                if epoch > seen && epoch > 1 {
                    info!("Push connection restored (session {}), reloading channels", epoch);
                    if let Err(e) = loader.load(LoadMode::Silent).await {
                        warn!("Catch-up load failed: {}", e);
                    }
                }
                seen = epoch;
            }
        })
    }

    /// Run until Ctrl+C or SIGTERM
    pub async fn start(&self) -> Result<()> {
        info!("Starting chat sync for viewer {}", self.config.viewer_id);
        info!("API: {}", self.config.api_url);

        let guard = self.attach_listener();
        let catch_up = self.spawn_catch_up();
        let transport_handle = self.spawn_transport();

        if let Err(e) = self.load().await {
            warn!("Initial load failed: {}", e);
            self.notices.error(format!("Failed to load conversations: {}", e));
        }

        wait_for_shutdown().await;
        info!("Shutdown signal received, stopping...");

        if let Some(handle) = transport_handle {
            handle.abort();
        }
        catch_up.abort();
        self.connection.disconnect();
        guard.detach().await;

        info!("Chat sync stopped");
        Ok(())
    }
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Ctrl+C received"),
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("SIGTERM received");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
