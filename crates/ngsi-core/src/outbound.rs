//! Domain object to entity mapping.

use crate::config::MappingConfig;
use crate::descriptor::{descriptor, AttributeBinding, AttributeKind, Getter, NgsiMapped};
use crate::error::{MappingError, MappingResult};
use crate::model::wire::is_uri_shaped;
use crate::model::{AttributeValue, Entity, GeoProperty, Property, Relationship};
use crate::unmapped;
use serde_json::Value;
use tracing::{debug, instrument};

/// Maps domain objects to NGSI-LD entities.
#[derive(Debug, Clone, Default)]
pub struct OutboundMapper {
    config: MappingConfig,
}

impl OutboundMapper {
    pub fn new(config: MappingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MappingConfig {
        &self.config
    }

    /// Builds the entity representing `object`.
    ///
    /// Attributes whose accessor yields nothing are left out. Dataset ids are
    /// dropped from single relationships and from one-element relationship
    /// lists, since brokers only accept them on lists of two or more.
    #[instrument(skip_all, fields(target = std::any::type_name::<T>()))]
    pub fn to_entity<T: NgsiMapped>(&self, object: &T) -> MappingResult<Entity> {
        let descriptor = descriptor::<T>()?;
        descriptor.require_marker()?;

        let id = descriptor.entity_id(object);
        if !is_uri_shaped(&id) {
            return Err(MappingError::Mapping(format!(
                "The id {id} of {} is not a valid URI",
                descriptor.type_name()
            )));
        }
        let entity_type = descriptor.entity_type(object);
        if entity_type.is_empty() {
            return Err(MappingError::Mapping(format!(
                "The type of {} is empty",
                descriptor.type_name()
            )));
        }

        let mut entity = Entity::new(id, entity_type);
        entity.context = Some(self.config.context_url.clone());

        for binding in descriptor.readable() {
            if let Some(attribute) = attribute_of(binding, object)? {
                entity.attributes.insert(binding.wire_name.clone(), attribute);
            }
        }

        if let Some(access) = descriptor.unmapped() {
            let properties = (access.getter)(object);
            for (name, attribute) in unmapped::to_attributes(&properties)? {
                if entity.attributes.contains_key(&name) {
                    debug!(attribute = %name, "Unmapped property shadowed by a bound attribute");
                    continue;
                }
                entity.attributes.insert(name, attribute);
            }
        }

        Ok(entity)
    }
}

fn attribute_of<T>(binding: &AttributeBinding<T>, object: &T) -> MappingResult<Option<AttributeValue>> {
    let Some(getter) = &binding.getter else {
        return Ok(None);
    };
    let attribute = match (binding.kind, getter) {
        (AttributeKind::Property, Getter::Value(get)) => get(object)?.map(AttributeValue::property),
        (AttributeKind::PropertyList, Getter::Value(get)) => get(object)?
            .map(|value| property_list(&binding.wire_name, value))
            .transpose()?,
        (AttributeKind::GeoProperty, Getter::Value(get)) => get(object)?
            .map(|value| AttributeValue::GeoProperty(GeoProperty::new(value))),
        (AttributeKind::Relationship, Getter::Relationship(get)) => {
            get(object)?.map(|mut relationship| {
                relationship.dataset_id = None;
                AttributeValue::Relationship(relationship)
            })
        }
        (AttributeKind::RelationshipList, Getter::RelationshipList(get)) => {
            get(object)?.map(|mut relationships| {
                if let [single] = relationships.as_mut_slice() {
                    single.dataset_id = None;
                }
                AttributeValue::RelationshipList(relationships)
            })
        }
        (kind, _) if kind.is_subscription_kind() => {
            debug!(attribute = %binding.wire_name, "Subscription attribute is not part of an entity");
            None
        }
        (kind, _) => {
            return Err(MappingError::schema(
                std::any::type_name::<T>(),
                format!(
                    "attribute {} has no accessor producing a {}",
                    binding.wire_name,
                    kind.expected()
                ),
            ))
        }
    };
    Ok(attribute)
}

fn property_list(wire_name: &str, value: Value) -> MappingResult<AttributeValue> {
    match value {
        Value::Array(elements) => Ok(AttributeValue::PropertyList(
            elements.into_iter().map(Property::new).collect(),
        )),
        other => Err(MappingError::Mapping(format!(
            "Property list {wire_name} did not produce a list: {other}"
        ))),
    }
}

/// The relationship pointing at `related`, as embedded in the entity referring to it.
///
/// The related type must declare a relationship-object and a dataset-id
/// accessor. Its property attributes marked for embedding travel along as
/// properties of the relationship.
pub fn relationship_of<R: NgsiMapped>(related: &R) -> MappingResult<Relationship> {
    let descriptor = descriptor::<R>()?;
    let type_name = descriptor.type_name();

    let object = descriptor.relationship_object(related).ok_or_else(|| {
        MappingError::Mapping(format!("The relationship target {type_name} does not provide an object accessor"))
    })?;
    if !is_uri_shaped(&object) {
        return Err(MappingError::Mapping(format!(
            "The object {object} of the relationship target {type_name} is not a URI"
        )));
    }

    let dataset_id = descriptor.dataset_id(related).ok_or_else(|| {
        MappingError::Mapping(format!("The relationship target {type_name} does not provide a datasetId accessor"))
    })?;
    if let Some(dataset_id) = dataset_id.as_deref().filter(|id| !is_uri_shaped(id)) {
        return Err(MappingError::Mapping(format!(
            "The datasetId {dataset_id} of the relationship target {type_name} is not a URI"
        )));
    }

    let mut relationship = Relationship::new(object);
    relationship.dataset_id = dataset_id;

    let embedded = descriptor
        .readable()
        .filter(|binding| binding.embed_property && binding.kind == AttributeKind::Property);
    for binding in embedded {
        if let Some(Getter::Value(get)) = &binding.getter {
            if let Some(value) = get(related)? {
                relationship
                    .additional_properties
                    .insert(binding.wire_name.clone(), AttributeValue::property(value));
            }
        }
    }

    Ok(relationship)
}
