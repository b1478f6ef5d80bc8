use crate::ws::models::{ConnectionId, Subscriber};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Live set of subscribed connections.
///
/// The lock is held only to mutate membership or to copy it out; delivery
/// happens on the copy, after the lock is released.
#[derive(Clone, Default)]
pub struct Registry {
    members: Arc<Mutex<HashMap<ConnectionId, Subscriber>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `subscriber` unless its id is already present.
    /// Returns the member count afterwards.
    pub async fn add(&self, subscriber: Subscriber) -> usize {
        let mut members = self.members.lock().await;
        members.entry(subscriber.id()).or_insert(subscriber);
        members.len()
    }

    /// Returns whether `id` was a member.
    pub async fn remove(&self, id: ConnectionId) -> bool {
        self.members.lock().await.remove(&id).is_some()
    }

    /// Calls `f` for each member of a snapshot taken under the lock. `f` runs
    /// unlocked, so members may join or leave (including the one being
    /// visited) while it executes.
    pub async fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Subscriber),
    {
        let snapshot: Vec<Subscriber> = self.members.lock().await.values().cloned().collect();
        for subscriber in &snapshot {
            f(subscriber);
        }
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.members.lock().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.members.lock().await.len()
    }
}
