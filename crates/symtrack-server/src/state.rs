use std::collections::HashMap;
use std::sync::Arc;

use symtrack_core::HealthChatOrchestrator;
use symtrack_schema::StatusEvent;
use symtrack_store::HealthStore;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// Outbound status channels keyed by user id, one per open SSE stream.
/// A new stream for the same user replaces the previous sender.
#[derive(Default)]
pub struct StreamRegistry {
    senders: Mutex<HashMap<Uuid, mpsc::Sender<StatusEvent>>>,
}

impl StreamRegistry {
    pub const CHANNEL_CAPACITY: usize = 64;

    pub async fn subscribe(&self, user_id: Uuid) -> mpsc::Receiver<StatusEvent> {
        let (tx, rx) = mpsc::channel(Self::CHANNEL_CAPACITY);
        self.senders.lock().await.insert(user_id, tx);
        rx
    }

    pub async fn sender_for(&self, user_id: Uuid) -> Option<mpsc::Sender<StatusEvent>> {
        let mut senders = self.senders.lock().await;
        match senders.get(&user_id) {
            Some(tx) if !tx.is_closed() => Some(tx.clone()),
            Some(_) => {
                senders.remove(&user_id);
                None
            }
            None => None,
        }
    }
}

/// Shared application state accessible from all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: HealthStore,
    pub orchestrator: Arc<HealthChatOrchestrator>,
    pub streams: Arc<StreamRegistry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closed_stream_is_evicted() {
        let registry = StreamRegistry::default();
        let user_id = Uuid::new_v4();

        let rx = registry.subscribe(user_id).await;
        assert!(registry.sender_for(user_id).await.is_some());

        drop(rx);
        assert!(registry.sender_for(user_id).await.is_none());
        assert!(registry.sender_for(user_id).await.is_none());
    }

    #[tokio::test]
    async fn resubscribe_replaces_sender() {
        let registry = StreamRegistry::default();
        let user_id = Uuid::new_v4();

        let _old = registry.subscribe(user_id).await;
        let mut new = registry.subscribe(user_id).await;

        let tx = registry.sender_for(user_id).await.unwrap();
        tx.try_send(StatusEvent::now(symtrack_schema::StatusUpdate::Processing {
            message: "hi".into(),
        }))
        .unwrap();
        assert!(new.try_recv().is_ok());
    }
}
