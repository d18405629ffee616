/// RentDesk chat sync - headless entry point
use rentdesk_chat::chat_types::StatusFilter;
use rentdesk_chat::derivation::{preview_text, receipt_state, unread_count};
use rentdesk_chat::thread_store::StoreChange;
use rentdesk_chat::{ChatSync, Config};
use std::env;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let config = Config::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let sync = Arc::new(
        ChatSync::new(config).map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?,
    );
    info!("Starting RentDesk chat sync");
    info!("   Viewer: {}", sync.viewer_id());

    // Store listeners run synchronously; hand the work to a task
    let (tx, mut rx) = mpsc::unbounded_channel::<StoreChange>();
    sync.store()
        .subscribe(Arc::new(move |change: &StoreChange| {
            let _ = tx.send(change.clone());
        }))
        .await;

    let printer = {
        let sync = sync.clone();
        tokio::spawn(async move {
            while let Some(change) = rx.recv().await {
                let inbox = sync.inbox(StatusFilter::All, "").await;
                let viewer = sync.viewer_id();
                info!(
                    "{:?}: {} threads, {} unread",
                    change,
                    inbox.len(),
                    unread_count(&inbox, viewer)
                );
                for thread in inbox.iter().take(10) {
                    info!(
                        "  [{}] {} {:?} {}",
                        thread.status.label(),
                        thread.id,
                        receipt_state(thread, viewer),
                        preview_text(thread, viewer)
                    );
                }
            }
        })
    };

    sync.start().await
        .map_err(|e| anyhow::anyhow!("Sync error: {}", e))?;

    printer.abort();
    Ok(())
}
