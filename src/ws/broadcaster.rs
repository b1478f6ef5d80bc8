use crate::db::{TallyStore, read_snapshot};
use crate::ws::models::{Frame, Subscriber};
use crate::ws::registry::Registry;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// The snapshot could not be read or encoded; nothing was sent.
    Abandoned,
    Completed { delivered: usize, pruned: usize },
}

/// Pushes a freshly read snapshot to every registered connection.
#[derive(Clone)]
pub struct Broadcaster {
    store: Arc<dyn TallyStore>,
    registry: Registry,
    question: Arc<str>,
    delivery_timeout: Duration,
}

impl Broadcaster {
    pub fn new(
        store: Arc<dyn TallyStore>,
        registry: Registry,
        question: Arc<str>,
        delivery_timeout: Duration,
    ) -> Self {
        Broadcaster {
            store,
            registry,
            question,
            delivery_timeout,
        }
    }

    /// Best effort: a failed store read abandons this round without retry.
    /// Every member gets its own bounded delivery, all running at once, and
    /// members whose delivery fails are out of the registry by the time this
    /// returns.
    pub async fn broadcast(&self) -> BroadcastOutcome {
        let snapshot = match read_snapshot(self.store.as_ref(), &self.question).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("broadcast abandoned, failed to read tallies: {}", e);
                return BroadcastOutcome::Abandoned;
            }
        };

        let frame: Frame = match serde_json::to_string(&snapshot) {
            Ok(json) => json.into(),
            Err(e) => {
                error!("broadcast abandoned, failed to encode snapshot: {}", e);
                return BroadcastOutcome::Abandoned;
            }
        };

        let mut members: Vec<Subscriber> = Vec::new();
        self.registry
            .for_each(|subscriber| members.push(subscriber.clone()))
            .await;

        let results = join_all(members.iter().map(|subscriber| {
            let frame = frame.clone();
            async move {
                (
                    subscriber.id(),
                    subscriber.deliver(frame, self.delivery_timeout).await,
                )
            }
        }))
        .await;
        // Our clones of the outboxes must go before pruning, so a pruned
        // connection sees its mailbox close.
        drop(members);

        let mut delivered = 0;
        let mut pruned = 0;
        for (id, result) in results {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("{}, pruning", e);
                    self.registry.remove(id).await;
                    pruned += 1;
                }
            }
        }

        debug!(delivered, pruned, "broadcast complete");
        BroadcastOutcome::Completed { delivered, pruned }
    }

    /// Runs [`broadcast`](Self::broadcast) on a detached task.
    pub fn spawn_broadcast(&self) -> JoinHandle<BroadcastOutcome> {
        let broadcaster = self.clone();
        tokio::spawn(async move { broadcaster.broadcast().await })
    }
}
