//! Cache serialization of entities and attribute values.
//!
//! The NGSI-LD JSON form of an attribute is ambiguous once it leaves its
//! entity: a geo-property and a property both carry a `value`, and the mapper
//! only tells them apart by context. Cached values therefore carry an explicit
//! `@kind` discriminator on every attribute.

use crate::model::{AttributeValue, Entity, GeoProperty, Property, Relationship};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised by the cache codec.
#[derive(Error, Debug)]
pub enum CacheCodecError {
    #[error("Failed to serialize cache value: {0}")]
    Serialization(String),

    #[error("Failed to deserialize cache value: {0}")]
    Deserialization(String),
}

/// A value the codec knows how to store.
pub trait CacheValue: Sized {
    #[doc(hidden)]
    type Cached: Serialize + DeserializeOwned;

    #[doc(hidden)]
    fn to_cached(&self) -> Self::Cached;

    #[doc(hidden)]
    fn from_cached(cached: Self::Cached) -> Result<Self, CacheCodecError>;
}

/// Encodes and decodes cache entries with explicit attribute kinds.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolymorphicCacheCodec;

impl PolymorphicCacheCodec {
    pub fn encode<V: CacheValue>(&self, value: &V) -> Result<Vec<u8>, CacheCodecError> {
        serde_json::to_vec(&value.to_cached())
            .map_err(|e| CacheCodecError::Serialization(e.to_string()))
    }

    pub fn decode<V: CacheValue>(&self, bytes: &[u8]) -> Result<V, CacheCodecError> {
        let cached: V::Cached = serde_json::from_slice(bytes)
            .map_err(|e| CacheCodecError::Deserialization(e.to_string()))?;
        V::from_cached(cached)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedProperty {
    value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    observed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unit_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dataset_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedGeoProperty {
    value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    observed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dataset_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedRelationship {
    object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dataset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    observed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    modified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    additional_properties: IndexMap<String, CachedAttribute>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "@kind")]
pub enum CachedAttribute {
    Property(CachedProperty),
    PropertyList { values: Vec<CachedProperty> },
    GeoProperty(CachedGeoProperty),
    Relationship(CachedRelationship),
    RelationshipList { values: Vec<CachedRelationship> },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedEntity {
    id: String,
    #[serde(rename = "type")]
    entity_type: String,
    #[serde(rename = "@context", default, skip_serializing_if = "Option::is_none")]
    context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<CachedAttribute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    observation_space: Option<CachedAttribute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    operation_space: Option<CachedAttribute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    attributes: IndexMap<String, CachedAttribute>,
}

impl From<&Property> for CachedProperty {
    fn from(property: &Property) -> Self {
        Self {
            value: property.value.clone(),
            observed_at: property.observed_at,
            unit_code: property.unit_code.clone(),
            dataset_id: property.dataset_id.clone(),
        }
    }
}

impl From<CachedProperty> for Property {
    fn from(cached: CachedProperty) -> Self {
        Self {
            value: cached.value,
            observed_at: cached.observed_at,
            unit_code: cached.unit_code,
            dataset_id: cached.dataset_id,
        }
    }
}

impl From<&GeoProperty> for CachedGeoProperty {
    fn from(property: &GeoProperty) -> Self {
        Self {
            value: property.value.clone(),
            observed_at: property.observed_at,
            dataset_id: property.dataset_id.clone(),
        }
    }
}

impl From<CachedGeoProperty> for GeoProperty {
    fn from(cached: CachedGeoProperty) -> Self {
        Self {
            value: cached.value,
            observed_at: cached.observed_at,
            dataset_id: cached.dataset_id,
        }
    }
}

impl From<&Relationship> for CachedRelationship {
    fn from(relationship: &Relationship) -> Self {
        Self {
            object: relationship.object.clone(),
            dataset_id: relationship.dataset_id.clone(),
            observed_at: relationship.observed_at,
            created_at: relationship.created_at,
            modified_at: relationship.modified_at,
            instance_id: relationship.instance_id.clone(),
            additional_properties: relationship
                .additional_properties
                .iter()
                .map(|(name, value)| (name.clone(), value.into()))
                .collect(),
        }
    }
}

impl From<CachedRelationship> for Relationship {
    fn from(cached: CachedRelationship) -> Self {
        Self {
            object: cached.object,
            dataset_id: cached.dataset_id,
            observed_at: cached.observed_at,
            created_at: cached.created_at,
            modified_at: cached.modified_at,
            instance_id: cached.instance_id,
            additional_properties: cached
                .additional_properties
                .into_iter()
                .map(|(name, value)| (name, value.into()))
                .collect(),
        }
    }
}

impl From<&AttributeValue> for CachedAttribute {
    fn from(value: &AttributeValue) -> Self {
        match value {
            AttributeValue::Property(property) => CachedAttribute::Property(property.into()),
            AttributeValue::PropertyList(values) => CachedAttribute::PropertyList {
                values: values.iter().map(CachedProperty::from).collect(),
            },
            AttributeValue::GeoProperty(property) => CachedAttribute::GeoProperty(property.into()),
            AttributeValue::Relationship(relationship) => {
                CachedAttribute::Relationship(relationship.into())
            }
            AttributeValue::RelationshipList(values) => CachedAttribute::RelationshipList {
                values: values.iter().map(CachedRelationship::from).collect(),
            },
        }
    }
}

impl From<CachedAttribute> for AttributeValue {
    fn from(cached: CachedAttribute) -> Self {
        match cached {
            CachedAttribute::Property(property) => AttributeValue::Property(property.into()),
            CachedAttribute::PropertyList { values } => {
                AttributeValue::PropertyList(values.into_iter().map(Property::from).collect())
            }
            CachedAttribute::GeoProperty(property) => AttributeValue::GeoProperty(property.into()),
            CachedAttribute::Relationship(relationship) => {
                AttributeValue::Relationship(relationship.into())
            }
            CachedAttribute::RelationshipList { values } => AttributeValue::RelationshipList(
                values.into_iter().map(Relationship::from).collect(),
            ),
        }
    }
}

fn cached_geo(property: &Option<GeoProperty>) -> Option<CachedAttribute> {
    property
        .as_ref()
        .map(|property| CachedAttribute::GeoProperty(property.into()))
}

fn geo_from_cached(
    name: &str,
    cached: Option<CachedAttribute>,
) -> Result<Option<GeoProperty>, CacheCodecError> {
    match cached {
        None => Ok(None),
        Some(CachedAttribute::GeoProperty(property)) => Ok(Some(property.into())),
        Some(other) => Err(CacheCodecError::Deserialization(format!(
            "{name} must be a GeoProperty, found {}",
            AttributeValue::from(other).kind_name()
        ))),
    }
}

impl CacheValue for AttributeValue {
    type Cached = CachedAttribute;

    fn to_cached(&self) -> CachedAttribute {
        self.into()
    }

    fn from_cached(cached: CachedAttribute) -> Result<Self, CacheCodecError> {
        Ok(cached.into())
    }
}

impl CacheValue for Entity {
    type Cached = CachedEntity;

    fn to_cached(&self) -> CachedEntity {
        CachedEntity {
            id: self.id.clone(),
            entity_type: self.entity_type.clone(),
            context: self.context.clone(),
            location: cached_geo(&self.location),
            observation_space: cached_geo(&self.observation_space),
            operation_space: cached_geo(&self.operation_space),
            created_at: self.created_at,
            modified_at: self.modified_at,
            attributes: self
                .attributes
                .iter()
                .map(|(name, value)| (name.clone(), value.into()))
                .collect(),
        }
    }

    fn from_cached(cached: CachedEntity) -> Result<Self, CacheCodecError> {
        Ok(Entity {
            id: cached.id,
            entity_type: cached.entity_type,
            context: cached.context,
            location: geo_from_cached("location", cached.location)?,
            observation_space: geo_from_cached("observationSpace", cached.observation_space)?,
            operation_space: geo_from_cached("operationSpace", cached.operation_space)?,
            created_at: cached.created_at,
            modified_at: cached.modified_at,
            attributes: cached
                .attributes
                .into_iter()
                .map(|(name, value)| (name, value.into()))
                .collect(),
        })
    }
}

impl CacheValue for Vec<Entity> {
    type Cached = Vec<CachedEntity>;

    fn to_cached(&self) -> Vec<CachedEntity> {
        self.iter().map(Entity::to_cached).collect()
    }

    fn from_cached(cached: Vec<CachedEntity>) -> Result<Self, CacheCodecError> {
        cached.into_iter().map(Entity::from_cached).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn point() -> GeoProperty {
        GeoProperty::new(json!({"type": "Point", "coordinates": [13.4, 52.5]}))
    }

    fn entity() -> Entity {
        let mut entity = Entity::new("urn:ngsi-ld:store:1", "store")
            .with_attribute("name", AttributeValue::property("corner shop"))
            .with_attribute(
                "scores",
                AttributeValue::PropertyList(vec![Property::new(1), Property::new(2)]),
            )
            .with_attribute("area", point())
            .with_attribute(
                "owner",
                Relationship::new("urn:ngsi-ld:person:1")
                    .with_property("role", AttributeValue::property("founder")),
            )
            .with_attribute(
                "suppliers",
                AttributeValue::RelationshipList(vec![
                    Relationship::new("urn:ngsi-ld:supplier:1").with_dataset_id("urn:ngsi-ld:ds:1"),
                    Relationship::new("urn:ngsi-ld:supplier:2").with_dataset_id("urn:ngsi-ld:ds:2"),
                ]),
            );
        entity.location = Some(point());
        entity.created_at = Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap());
        entity
    }

    #[test]
    fn test_entity_round_trip_keeps_every_kind() {
        let codec = PolymorphicCacheCodec;
        let original = entity();

        let bytes = codec.encode(&original).unwrap();
        let decoded: Entity = codec.decode(&bytes).unwrap();

        assert_eq!(decoded, original);
        assert!(matches!(decoded.attribute("area"), Some(AttributeValue::GeoProperty(_))));
    }

    #[test]
    fn test_every_attribute_carries_its_kind() {
        let bytes = PolymorphicCacheCodec.encode(&entity()).unwrap();
        let raw: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(raw["location"]["@kind"], "GeoProperty");
        assert_eq!(raw["attributes"]["area"]["@kind"], "GeoProperty");
        assert_eq!(raw["attributes"]["name"]["@kind"], "Property");
        assert_eq!(raw["attributes"]["scores"]["@kind"], "PropertyList");
        assert_eq!(raw["attributes"]["suppliers"]["@kind"], "RelationshipList");
        assert_eq!(
            raw["attributes"]["owner"]["additionalProperties"]["role"]["@kind"],
            "Property"
        );
    }

    #[test]
    fn test_entity_list_round_trip() {
        let codec = PolymorphicCacheCodec;
        let entities = vec![entity(), Entity::new("urn:ngsi-ld:store:2", "store")];

        let bytes = codec.encode(&entities).unwrap();
        let decoded: Vec<Entity> = codec.decode(&bytes).unwrap();

        assert_eq!(decoded, entities);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let bytes = serde_json::to_vec(&json!({"@kind": "LanguageProperty", "value": "x"})).unwrap();

        let result = PolymorphicCacheCodec.decode::<AttributeValue>(&bytes);

        assert!(matches!(result, Err(CacheCodecError::Deserialization(_))));
    }

    #[test]
    fn test_well_known_geo_slot_rejects_other_kinds() {
        let bytes = serde_json::to_vec(&json!({
            "id": "urn:ngsi-ld:store:1",
            "type": "store",
            "location": {"@kind": "Property", "value": "somewhere"}
        }))
        .unwrap();

        let result = PolymorphicCacheCodec.decode::<Entity>(&bytes);

        assert!(matches!(result, Err(CacheCodecError::Deserialization(_))));
    }
}
