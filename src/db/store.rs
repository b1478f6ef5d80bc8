use crate::db::connection::DbPool;
use crate::db::models::{PollOption, PollSnapshot};
use crate::db::repositories;
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// Durable option id -> tally storage.
#[async_trait]
pub trait TallyStore: Send + Sync {
    /// Every option, ordered by ascending id.
    async fn read_all(&self) -> Result<Vec<PollOption>, StoreError>;

    /// Atomically adds one vote. Fails with [`StoreError::OptionNotFound`]
    /// and changes nothing when `option_id` does not exist.
    async fn increment(&self, option_id: i32) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Reads a fresh snapshot. Nothing is cached between calls.
pub async fn read_snapshot(
    store: &dyn TallyStore,
    question: &str,
) -> Result<PollSnapshot, StoreError> {
    let options = store.read_all().await?;
    Ok(PollSnapshot {
        question: question.to_string(),
        options,
    })
}

pub struct PgTallyStore {
    pool: DbPool,
}

impl PgTallyStore {
    pub fn new(pool: DbPool) -> Self {
        PgTallyStore { pool }
    }
}

#[async_trait]
impl TallyStore for PgTallyStore {
    async fn read_all(&self) -> Result<Vec<PollOption>, StoreError> {
        Ok(repositories::get_poll_options(&self.pool).await?)
    }

    async fn increment(&self, option_id: i32) -> Result<(), StoreError> {
        if repositories::increment_votes(&self.pool, option_id).await? {
            Ok(())
        } else {
            Err(StoreError::OptionNotFound(option_id))
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(repositories::ping(&self.pool).await?)
    }
}

/// Process-local store, used when no database is configured.
#[derive(Default)]
pub struct MemoryTallyStore {
    options: Mutex<BTreeMap<i32, PollOption>>,
}

impl MemoryTallyStore {
    /// Options get ids `1..=n` in the order given.
    pub fn seeded(texts: &[String]) -> Self {
        let options = texts
            .iter()
            .zip(1..)
            .map(|(text, id)| {
                (
                    id,
                    PollOption {
                        id,
                        text: text.clone(),
                        votes: 0,
                    },
                )
            })
            .collect();

        MemoryTallyStore {
            options: Mutex::new(options),
        }
    }
}

#[async_trait]
impl TallyStore for MemoryTallyStore {
    async fn read_all(&self) -> Result<Vec<PollOption>, StoreError> {
        let options = self.options.lock().await;
        Ok(options.values().cloned().collect())
    }

    async fn increment(&self, option_id: i32) -> Result<(), StoreError> {
        let mut options = self.options.lock().await;
        match options.get_mut(&option_id) {
            Some(option) => {
                option.votes += 1;
                Ok(())
            }
            None => Err(StoreError::OptionNotFound(option_id)),
        }
    }
}
