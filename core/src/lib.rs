/// RentDesk chat sync
///
/// Keeps a viewer's conversation list in step with the backend: snapshot
/// loads, live push updates, read receipts, presence and the new-message
/// compose flow, over one shared thread store.

pub mod error;
pub mod config;
pub mod chat_types;
pub mod thread_store;
pub mod derivation;
pub mod presenter;
pub mod loader;
pub mod push;
pub mod api;
pub mod compose;
pub mod sync;
pub mod utils;

pub use error::{SyncError, Result};
pub use config::Config;
pub use sync::ChatSync;
