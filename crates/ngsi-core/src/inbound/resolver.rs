//! Batched lookup of relationship targets.

use crate::error::{MappingResult, RepositoryError};
use crate::model::Entity;
use async_trait::async_trait;
use indexmap::IndexSet;
use ngsi_observability::fetch_span;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, Instrument};

/// Source of the entities that relationships point at.
///
/// Implementations may return fewer entities than requested, and may return
/// the same entity more than once.
#[async_trait]
pub trait EntityRepository: Send + Sync {
    /// Fetches all entities with the given ids in one round trip.
    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<Entity>, RepositoryError>;
}

/// Entities fetched for one level of an inbound mapping, keyed by id.
///
/// Immutable once built and cheap to clone; recursive branches share it.
#[derive(Debug, Clone, Default)]
pub struct RelationshipMap {
    entities: Arc<HashMap<String, Entity>>,
}

impl RelationshipMap {
    /// Builds the map; the first entity seen for an id wins.
    pub fn from_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let mut map = HashMap::new();
        for entity in entities {
            map.entry(entity.id.clone()).or_insert(entity);
        }
        Self {
            entities: Arc::new(map),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Issues the single batched fetch of one inbound call level.
#[derive(Clone)]
pub struct RelationshipResolver {
    repository: Arc<dyn EntityRepository>,
}

impl RelationshipResolver {
    pub fn new(repository: Arc<dyn EntityRepository>) -> Self {
        Self { repository }
    }

    /// Fetches the referenced entities.
    ///
    /// Ids are deduplicated keeping their first position. No fetch is issued
    /// for an empty id set.
    pub async fn resolve(&self, ids: &[String]) -> MappingResult<RelationshipMap> {
        let unique: IndexSet<&String> = ids.iter().collect();
        if unique.is_empty() {
            return Ok(RelationshipMap::default());
        }

        let batch: Vec<String> = unique.into_iter().cloned().collect();
        let entities = self
            .repository
            .fetch_by_ids(&batch)
            .instrument(fetch_span!(batch.len()))
            .await?;
        let relationships = RelationshipMap::from_entities(entities);

        debug!(
            requested = batch.len(),
            resolved = relationships.len(),
            "Fetched relationship targets"
        );
        Ok(relationships)
    }
}

impl std::fmt::Debug for RelationshipResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationshipResolver").finish_non_exhaustive()
    }
}
