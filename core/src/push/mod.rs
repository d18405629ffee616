/// Live update plumbing: connection handle, listener, presence, SSE transport
pub mod connection;
pub mod listener;
pub mod presence;
pub mod sse;

pub use connection::PushConnection;
pub use listener::{ListenerGuard, LiveUpdateListener, UnknownThreadPolicy};
pub use presence::PresenceTracker;
pub use sse::{SseDecoder, SseTransport};
