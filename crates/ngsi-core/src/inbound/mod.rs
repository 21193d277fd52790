//! Entity to domain object mapping.
//!
//! Reconstructs a domain object graph from an NGSI-LD entity. Every call level
//! collects the ids its relationships point at, fetches them in one batch from
//! the [`EntityRepository`], and then materializes the related objects
//! concurrently. Each related object repeats the procedure for its own
//! relationships.
//!
//! Unresolvable targets are built from their id alone unless
//! [`MappingConfig::strict_relationships`] is set. A relationship pointing
//! back at an entity that is already being materialized further up the same
//! branch is built from its id alone as well, so reference cycles terminate.

pub mod mock;
pub mod resolver;

pub use mock::{FetchRecord, MockBehavior, MockEntityRepository};
pub use resolver::{EntityRepository, RelationshipMap, RelationshipResolver};

use crate::config::MappingConfig;
use crate::descriptor::{
    descriptor, AttributeBinding, AttributeKind, NgsiMapped, Related, Setter, Target,
    TypeDescriptor,
};
use crate::error::{MappingError, MappingResult};
use crate::model::wire::{is_relationship_shaped, relationship_from_value, timestamp_value};
use crate::model::{
    AttributeValue, Entity, Relationship, CREATED_AT, DATASET_ID, INSTANCE_ID, MODIFIED_AT,
    OBSERVED_AT,
};
use crate::unmapped::UnmappedProperty;
use futures::future::{self, try_join_all, BoxFuture};
use futures::{FutureExt, TryFutureExt};
use indexmap::IndexMap;
use ngsi_observability::mapping_span;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn, Instrument};

/// Ids of the entities being materialized along the current branch, outermost first.
pub(crate) type Lineage = Vec<String>;

enum Resolution {
    Single(Related),
    List(Vec<Related>),
}

/// Maps NGSI-LD entities to domain objects.
#[derive(Debug, Clone)]
pub struct InboundMapper {
    config: MappingConfig,
    resolver: RelationshipResolver,
}

impl InboundMapper {
    pub fn new(config: MappingConfig, repository: Arc<dyn EntityRepository>) -> Self {
        Self {
            config,
            resolver: RelationshipResolver::new(repository),
        }
    }

    pub fn config(&self) -> &MappingConfig {
        &self.config
    }

    /// Builds a `T` from the entity, resolving its relationships.
    ///
    /// Fails without a partial result if anything along the object graph fails.
    pub async fn from_entity<T: NgsiMapped>(&self, entity: Entity) -> MappingResult<T> {
        let span = mapping_span!(std::any::type_name::<T>(), entity.id);
        self.checked::<T>(entity, Lineage::new()).instrument(span).await
    }

    fn checked<T: NgsiMapped>(
        &self,
        entity: Entity,
        lineage: Lineage,
    ) -> BoxFuture<'_, MappingResult<T>> {
        Box::pin(async move {
            let descriptor = descriptor::<T>()?;
            let marker = descriptor.require_marker()?;
            if !marker.accepts_entity_type(&entity.entity_type) {
                return Err(MappingError::TypeMismatch {
                    actual: entity.entity_type,
                    accepted: marker.entity_types.clone(),
                });
            }
            self.build(descriptor, entity, lineage).await
        })
    }

    async fn build<T: NgsiMapped>(
        &self,
        descriptor: Arc<TypeDescriptor<T>>,
        entity: Entity,
        mut lineage: Lineage,
    ) -> MappingResult<T> {
        lineage.push(entity.id.clone());
        let attributes = entity.merged_attributes();

        let ids = referenced_ids(&descriptor, &attributes, &lineage);
        let relationships = self.resolver.resolve(&ids).await?;

        let mut object = descriptor.construct(&entity.id)?;

        let mut targets = Vec::new();
        let mut pending = Vec::new();
        for (name, value) in attributes {
            let Some(binding) = descriptor.setter_binding(&name) else {
                match descriptor.unmapped() {
                    Some(unmapped) => {
                        (unmapped.setter)(&mut object, UnmappedProperty::from_attribute(&name, &value))
                    }
                    None => warn!(
                        attribute = %name,
                        entity_id = %entity.id,
                        "Ignoring attribute since there is no mapping configured"
                    ),
                }
                continue;
            };

            match binding.kind {
                AttributeKind::Property | AttributeKind::GeoProperty => {
                    let value = property_value(binding, value)?;
                    if value.is_null() {
                        debug!(attribute = %name, "Skipping null property");
                        continue;
                    }
                    apply_value(binding, &mut object, value)?;
                }
                AttributeKind::PropertyList => {
                    let values = property_list_values(binding, value)?;
                    apply_list(binding, &mut object, values)?;
                }
                AttributeKind::Relationship => {
                    let target = target_of(binding)?;
                    let relationship = single_relationship(&name, &value)?;
                    pending.push(
                        self.resolve_related(
                            target,
                            binding.from_properties,
                            relationship,
                            relationships.clone(),
                            lineage.clone(),
                        )
                        .map_ok(Resolution::Single)
                        .boxed(),
                    );
                    targets.push(binding);
                }
                AttributeKind::RelationshipList => {
                    let target = target_of(binding)?;
                    let elements = relationship_list(&name, &value)?
                        .into_iter()
                        .map(|relationship| {
                            self.resolve_related(
                                target,
                                binding.from_properties,
                                relationship,
                                relationships.clone(),
                                lineage.clone(),
                            )
                        })
                        .collect::<Vec<_>>();
                    pending.push(try_join_all(elements).map_ok(Resolution::List).boxed());
                    targets.push(binding);
                }
                kind => {
                    return Err(MappingError::schema(
                        descriptor.type_name(),
                        format!(
                            "attribute {name} is bound as a {} which only exists on subscriptions",
                            kind.expected()
                        ),
                    ))
                }
            }
        }

        let resolved = try_join_all(pending).await?;
        for (binding, resolution) in targets.into_iter().zip(resolved) {
            apply_related(binding, &mut object, resolution)?;
        }
        Ok(object)
    }

    fn resolve_related(
        &self,
        target: Target,
        from_properties: bool,
        relationship: Relationship,
        relationships: RelationshipMap,
        lineage: Lineage,
    ) -> BoxFuture<'_, MappingResult<Related>> {
        if from_properties {
            return (target.from_relationship)(self, relationship, lineage);
        }
        if lineage.contains(&relationship.object) {
            debug!(
                object = %relationship.object,
                target = target.type_name,
                "Relationship points back into its own ancestry, materializing by id only"
            );
            return future::ready((target.id_only)(&relationship.object)).boxed();
        }
        match relationships.get(&relationship.object) {
            Some(entity) => {
                let mut entity = entity.clone();
                // properties on the relationship override the fetched state
                entity.attributes.extend(relationship.additional_properties);
                (target.materialize)(self, entity, lineage)
            }
            None if self.config.strict_relationships => {
                future::ready(Err(MappingError::RelationshipUnresolved(relationship.object))).boxed()
            }
            None => {
                debug!(
                    object = %relationship.object,
                    target = target.type_name,
                    "Relationship target was not found, materializing by id only"
                );
                future::ready((target.id_only)(&relationship.object)).boxed()
            }
        }
    }
}

pub(crate) fn materialize_related<R: NgsiMapped>(
    mapper: &InboundMapper,
    entity: Entity,
    lineage: Lineage,
) -> BoxFuture<'_, MappingResult<Related>> {
    mapper
        .checked::<R>(entity, lineage)
        .map_ok(|related| Box::new(related) as Related)
        .boxed()
}

pub(crate) fn related_from_relationship<R: NgsiMapped>(
    mapper: &InboundMapper,
    relationship: Relationship,
    lineage: Lineage,
) -> BoxFuture<'_, MappingResult<Related>> {
    Box::pin(async move {
        let descriptor = descriptor::<R>()?;
        let entity = entity_from_relationship(relationship);
        let related = mapper.build(descriptor, entity, lineage).await?;
        Ok(Box::new(related) as Related)
    })
}

pub(crate) fn related_id_only<R: NgsiMapped>(id: &str) -> MappingResult<Related> {
    let related = descriptor::<R>()?.construct(id)?;
    Ok(Box::new(related) as Related)
}

/// Stand-in entity carrying the relationship's metadata and embedded attributes.
///
/// Metadata wins over an embedded attribute of the same name.
fn entity_from_relationship(relationship: Relationship) -> Entity {
    let mut attributes = IndexMap::new();
    let timestamps = [
        (OBSERVED_AT, relationship.observed_at),
        (CREATED_AT, relationship.created_at),
        (MODIFIED_AT, relationship.modified_at),
    ];
    for (name, timestamp) in timestamps {
        if let Some(timestamp) = timestamp {
            attributes.insert(name.to_string(), AttributeValue::property(timestamp_value(&timestamp)));
        }
    }
    let identifiers = [
        (DATASET_ID, relationship.dataset_id),
        (INSTANCE_ID, relationship.instance_id),
    ];
    for (name, identifier) in identifiers {
        if let Some(identifier) = identifier {
            attributes.insert(name.to_string(), AttributeValue::property(identifier));
        }
    }
    for (name, value) in relationship.additional_properties {
        attributes.entry(name).or_insert(value);
    }

    let mut entity = Entity::new(relationship.object, String::new());
    entity.attributes = attributes;
    entity
}

fn referenced_ids<T>(
    descriptor: &TypeDescriptor<T>,
    attributes: &IndexMap<String, AttributeValue>,
    lineage: &[String],
) -> Vec<String> {
    let mut ids = Vec::new();
    for (name, value) in attributes {
        let Some(binding) = descriptor.setter_binding(name) else {
            continue;
        };
        if binding.from_properties {
            continue;
        }
        let relationships = match binding.kind {
            AttributeKind::Relationship => single_relationship(name, value).map(|r| vec![r]),
            AttributeKind::RelationshipList => relationship_list(name, value),
            _ => continue,
        };
        ids.extend(
            relationships
                .into_iter()
                .flatten()
                .map(|relationship| relationship.object)
                .filter(|id| !lineage.contains(id)),
        );
    }
    ids
}

fn target_of<T>(binding: &AttributeBinding<T>) -> MappingResult<Target> {
    binding.target.ok_or_else(|| {
        MappingError::schema(
            std::any::type_name::<T>(),
            format!("relationship {} does not declare a target type", binding.wire_name),
        )
    })
}

fn wrong_shape(wire_name: &str, kind: AttributeKind, actual: &AttributeValue) -> MappingError {
    MappingError::shape(wire_name, kind.expected(), format!("got a {}", actual.kind_name()))
}

/// A relationship flattened into a property value.
fn flattened_relationship(wire_name: &str, value: &Value) -> MappingResult<Relationship> {
    relationship_from_value(value).map_err(|e| {
        MappingError::shape(wire_name, AttributeKind::Relationship.expected(), e.to_string())
    })
}

/// A single relationship must arrive as one; the flattened-property form is
/// only tolerated inside relationship lists.
fn single_relationship(wire_name: &str, value: &AttributeValue) -> MappingResult<Relationship> {
    match value {
        AttributeValue::Relationship(relationship) => Ok(relationship.clone()),
        other => Err(wrong_shape(wire_name, AttributeKind::Relationship, other)),
    }
}

fn relationship_list(wire_name: &str, value: &AttributeValue) -> MappingResult<Vec<Relationship>> {
    match value {
        AttributeValue::RelationshipList(relationships) => Ok(relationships.clone()),
        AttributeValue::Relationship(relationship) => Ok(vec![relationship.clone()]),
        AttributeValue::PropertyList(properties)
            if properties
                .first()
                .is_some_and(|first| is_relationship_shaped(&first.value)) =>
        {
            properties
                .iter()
                .map(|property| flattened_relationship(wire_name, &property.value))
                .collect()
        }
        AttributeValue::Property(property) if is_relationship_shaped(&property.value) => {
            Ok(vec![flattened_relationship(wire_name, &property.value)?])
        }
        AttributeValue::Property(property)
            if property.value.as_array().is_some_and(Vec::is_empty) =>
        {
            Ok(Vec::new())
        }
        other => Err(wrong_shape(wire_name, AttributeKind::RelationshipList, other)),
    }
}

fn property_value<T>(binding: &AttributeBinding<T>, value: AttributeValue) -> MappingResult<Value> {
    match value {
        AttributeValue::Property(property) => Ok(property.value),
        AttributeValue::GeoProperty(property) => Ok(property.value),
        other => Err(wrong_shape(&binding.wire_name, binding.kind, &other)),
    }
}

/// Values of a property list, also accepting a single property holding a raw
/// list or a bare value.
fn property_list_values<T>(
    binding: &AttributeBinding<T>,
    value: AttributeValue,
) -> MappingResult<Vec<Value>> {
    match value {
        AttributeValue::PropertyList(properties) => {
            Ok(properties.into_iter().map(|property| property.value).collect())
        }
        AttributeValue::Property(property) => match property.value {
            Value::Array(elements) => Ok(elements),
            single => Ok(vec![single]),
        },
        other => Err(wrong_shape(&binding.wire_name, binding.kind, &other)),
    }
}

fn mutator_mismatch<T>(binding: &AttributeBinding<T>) -> MappingError {
    MappingError::schema(
        std::any::type_name::<T>(),
        format!(
            "attribute {} has no mutator accepting a {}",
            binding.wire_name,
            binding.kind.expected()
        ),
    )
}

fn apply_value<T>(binding: &AttributeBinding<T>, object: &mut T, value: Value) -> MappingResult<()> {
    match &binding.setter {
        Some(Setter::Value(set)) => set(object, value),
        _ => Err(mutator_mismatch(binding)),
    }
}

fn apply_list<T>(
    binding: &AttributeBinding<T>,
    object: &mut T,
    values: Vec<Value>,
) -> MappingResult<()> {
    match &binding.setter {
        Some(Setter::List(set)) => set(object, values),
        Some(Setter::Value(set)) => set(object, Value::Array(values)),
        _ => Err(mutator_mismatch(binding)),
    }
}

fn apply_related<T>(
    binding: &AttributeBinding<T>,
    object: &mut T,
    resolution: Resolution,
) -> MappingResult<()> {
    match (&binding.setter, resolution) {
        (Some(Setter::Related(set)), Resolution::Single(related)) => set(object, related),
        (Some(Setter::RelatedList(set)), Resolution::List(related)) => set(object, related),
        _ => Err(mutator_mismatch(binding)),
    }
}
