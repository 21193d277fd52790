//! In-memory entity repository for testing.
//!
//! Serves preconfigured entities, records every batch it was asked for, and
//! supports failure injection.

use super::resolver::EntityRepository;
use crate::error::RepositoryError;
use crate::model::Entity;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Behavior configuration for failure injection.
#[derive(Debug, Clone, Default)]
pub enum MockBehavior {
    /// Serve entities normally.
    #[default]
    Normal,
    /// Fail with a specific error after N calls.
    FailAfter { calls: u64, error: RepositoryError },
    /// Fail whenever one of the ids is requested.
    FailOn {
        ids: Vec<String>,
        error: RepositoryError,
    },
    /// Simulate latency.
    WithLatency(Duration),
    /// Always fail.
    AlwaysFail(RepositoryError),
}

/// Record of a batch fetch for test verification.
#[derive(Debug, Clone)]
pub struct FetchRecord {
    pub ids: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Mock entity repository for testing.
pub struct MockEntityRepository {
    entities: Arc<RwLock<Vec<Entity>>>,
    call_count: AtomicU64,
    behavior: Arc<RwLock<MockBehavior>>,
    fetch_history: Arc<RwLock<Vec<FetchRecord>>>,
}

impl Default for MockEntityRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEntityRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::with_entities(Vec::new())
    }

    /// Creates a repository serving the given entities.
    ///
    /// Entities are served in insertion order; an id added twice is served twice.
    pub fn with_entities(entities: Vec<Entity>) -> Self {
        Self {
            entities: Arc::new(RwLock::new(entities)),
            call_count: AtomicU64::new(0),
            behavior: Arc::new(RwLock::new(MockBehavior::Normal)),
            fetch_history: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Adds an entity to serve.
    pub async fn add_entity(&self, entity: Entity) {
        self.entities.write().await.push(entity);
    }

    /// Sets the behavior for failure injection.
    pub async fn set_behavior(&self, behavior: MockBehavior) {
        let mut b = self.behavior.write().await;
        *b = behavior;
    }

    /// Gets the fetch history for test verification.
    pub async fn get_fetch_history(&self) -> Vec<FetchRecord> {
        self.fetch_history.read().await.clone()
    }

    /// Clears the fetch history and the call counter.
    pub async fn clear_history(&self) {
        self.fetch_history.write().await.clear();
        self.call_count.store(0, Ordering::SeqCst);
    }

    /// Gets the current call count.
    pub fn get_call_count(&self) -> u64 {
        self.call_count.load(Ordering::SeqCst)
    }

    async fn record_and_check(&self, ids: &[String]) -> Result<(), RepositoryError> {
        {
            let mut history = self.fetch_history.write().await;
            history.push(FetchRecord {
                ids: ids.to_vec(),
                timestamp: Utc::now(),
            });
        }

        let count = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;

        let behavior = self.behavior.read().await;
        match &*behavior {
            MockBehavior::Normal => Ok(()),
            MockBehavior::FailAfter { calls, error } => {
                if count > *calls {
                    Err(error.clone())
                } else {
                    Ok(())
                }
            }
            MockBehavior::FailOn {
                ids: failing,
                error,
            } => {
                if ids.iter().any(|id| failing.contains(id)) {
                    Err(error.clone())
                } else {
                    Ok(())
                }
            }
            MockBehavior::WithLatency(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(())
            }
            MockBehavior::AlwaysFail(error) => Err(error.clone()),
        }
    }
}

#[async_trait]
impl EntityRepository for MockEntityRepository {
    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<Entity>, RepositoryError> {
        self.record_and_check(ids).await?;

        let entities = self.entities.read().await;
        Ok(entities
            .iter()
            .filter(|entity| ids.contains(&entity.id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_returns_only_requested() {
        let repository = MockEntityRepository::with_entities(vec![
            Entity::new("urn:ngsi-ld:thing:1", "thing"),
            Entity::new("urn:ngsi-ld:thing:2", "thing"),
        ]);

        let entities = repository
            .fetch_by_ids(&["urn:ngsi-ld:thing:2".to_string(), "urn:ngsi-ld:thing:3".to_string()])
            .await
            .unwrap();

        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].id, "urn:ngsi-ld:thing:2");
        assert_eq!(repository.get_call_count(), 1);
    }

    #[tokio::test]
    async fn test_fail_after() {
        let repository = MockEntityRepository::new();
        repository
            .set_behavior(MockBehavior::FailAfter {
                calls: 1,
                error: RepositoryError::Query("limit".to_string()),
            })
            .await;

        assert!(repository.fetch_by_ids(&[]).await.is_ok());
        assert!(repository.fetch_by_ids(&[]).await.is_err());
        assert_eq!(repository.get_fetch_history().await.len(), 2);
    }

    #[tokio::test]
    async fn test_fail_on_id() {
        let repository = MockEntityRepository::new();
        repository
            .set_behavior(MockBehavior::FailOn {
                ids: vec!["urn:ngsi-ld:thing:bad".to_string()],
                error: RepositoryError::Query("bad".to_string()),
            })
            .await;

        assert!(repository
            .fetch_by_ids(&["urn:ngsi-ld:thing:ok".to_string()])
            .await
            .is_ok());
        assert!(repository
            .fetch_by_ids(&["urn:ngsi-ld:thing:bad".to_string()])
            .await
            .is_err());

        repository.clear_history().await;
        assert_eq!(repository.get_call_count(), 0);
    }
}
