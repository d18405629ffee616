/// Online status of counterparts, fed by presence events
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Clone)]
pub struct PresenceTracker {
    viewer_id: String,
    online: Arc<RwLock<HashSet<String>>>,
}

impl PresenceTracker {
    pub fn new(viewer_id: impl Into<String>) -> Self {
        Self {
            viewer_id: viewer_id.into(),
            online: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    pub async fn mark_online(&self, user_id: &str) {
        // Only track other users, not ourselves
        if user_id == self.viewer_id {
            return;
        }
        if self.online.write().await.insert(user_id.to_string()) {
            debug!("{} is online", user_id);
        }
    }

    pub async fn mark_offline(&self, user_id: &str) {
        if self.online.write().await.remove(user_id) {
            debug!("{} went offline", user_id);
        }
    }

    pub async fn is_online(&self, user_id: &str) -> bool {
        self.online.read().await.contains(user_id)
    }

    pub async fn online(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.online.read().await.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Forget everyone, e.g. after the push connection drops
    pub async fn clear(&self) {
        self.online.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_presence_ignores_viewer() {
        let presence = PresenceTracker::new("me");
        presence.mark_online("me").await;
        presence.mark_online("jane").await;
        presence.mark_online("sam").await;
        presence.mark_offline("sam").await;

        assert!(!presence.is_online("me").await);
        assert_eq!(presence.online().await, vec!["jane".to_string()]);

        presence.clear().await;
        assert!(!presence.is_online("jane").await);
    }
}
