use std::sync::Arc;

use tokio::sync::RwLock;

use crate::envelope::Envelope;

/// Development fallback store behind the `/messages` routes.
///
/// Process-local and reset on restart; the write lock is the whole
/// single-writer-at-a-time contract. Not a durability layer.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: Arc<RwLock<Vec<Envelope>>>,
}

impl MessageStore {
    pub fn new() -> MessageStore {
        MessageStore::default()
    }

    /// Appends a validated envelope and returns the stored copy.
    pub async fn append(&self, envelope: Envelope) -> Envelope {
        self.messages.write().await.push(envelope.clone());
        envelope
    }

    /// Every stored envelope, oldest first (most-recent-last on the wire).
    pub async fn all(&self) -> Vec<Envelope> {
        self.messages.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_preserves_order_most_recent_last() {
        let store = MessageStore::new();
        for i in 0..3 {
            let env = Envelope {
                user: "alice".to_owned(),
                text: format!("msg {}", i),
                timestamp: i,
                photo: None,
            };
            store.append(env).await;
        }
        let all = store.all().await;
        assert_eq!(all.len(), 3);
        assert_eq!(all.last().unwrap().text, "msg 2");
    }

    #[tokio::test]
    async fn append_echoes_the_stored_envelope() {
        let store = MessageStore::new();
        let env = Envelope::compose("alice", "hi", None).unwrap();
        let stored = store.append(env.clone()).await;
        assert_eq!(stored, env);
        assert_eq!(store.len().await, 1);
    }
}
