//! NGSI-LD entity and attribute value types.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON name of the well-known `location` geo-property.
pub const LOCATION: &str = "location";
/// JSON name of the well-known `observationSpace` geo-property.
pub const OBSERVATION_SPACE: &str = "observationSpace";
/// JSON name of the well-known `operationSpace` geo-property.
pub const OPERATION_SPACE: &str = "operationSpace";
/// JSON name of the well-known `createdAt` timestamp.
pub const CREATED_AT: &str = "createdAt";
/// JSON name of the well-known `modifiedAt` timestamp.
pub const MODIFIED_AT: &str = "modifiedAt";
/// JSON name of the `observedAt` timestamp on attributes.
pub const OBSERVED_AT: &str = "observedAt";
/// JSON name of the `datasetId` of an attribute.
pub const DATASET_ID: &str = "datasetId";
/// JSON name of the `instanceId` of an attribute.
pub const INSTANCE_ID: &str = "instanceId";

/// A named property holding an arbitrary JSON value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Property {
    pub value: Value,
    pub observed_at: Option<DateTime<Utc>>,
    pub unit_code: Option<String>,
    pub dataset_id: Option<String>,
}

impl Property {
    /// Creates a property with only a value set.
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }
}

/// A property whose value is a geo-shape (GeoJSON geometry).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct GeoProperty {
    pub value: Value,
    pub observed_at: Option<DateTime<Utc>>,
    pub dataset_id: Option<String>,
}

impl GeoProperty {
    /// Creates a geo-property with only a value set.
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }
}

/// A reference from one entity to another, addressed by URI.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Relationship {
    /// URI of the referenced entity.
    pub object: String,
    /// Disambiguates the members of a multi-valued relationship.
    pub dataset_id: Option<String>,
    pub observed_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub instance_id: Option<String>,
    /// Properties embedded in the relationship itself.
    pub additional_properties: IndexMap<String, AttributeValue>,
}

impl Relationship {
    /// Creates a relationship pointing at the given object URI.
    pub fn new(object: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            ..Default::default()
        }
    }

    /// Sets the dataset id.
    pub fn with_dataset_id(mut self, dataset_id: impl Into<String>) -> Self {
        self.dataset_id = Some(dataset_id.into());
        self
    }

    /// Adds an embedded attribute.
    pub fn with_property(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.additional_properties.insert(name.into(), value);
        self
    }
}

/// The value of a named entity attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum AttributeValue {
    Property(Property),
    PropertyList(Vec<Property>),
    GeoProperty(GeoProperty),
    Relationship(Relationship),
    RelationshipList(Vec<Relationship>),
}

impl AttributeValue {
    /// Short name of the variant, as used in diagnostics and the cache format.
    pub fn kind_name(&self) -> &'static str {
        match self {
            AttributeValue::Property(_) => "Property",
            AttributeValue::PropertyList(_) => "PropertyList",
            AttributeValue::GeoProperty(_) => "GeoProperty",
            AttributeValue::Relationship(_) => "Relationship",
            AttributeValue::RelationshipList(_) => "RelationshipList",
        }
    }

    /// Shorthand for a plain property.
    pub fn property(value: impl Into<Value>) -> Self {
        AttributeValue::Property(Property::new(value))
    }
}

impl From<Property> for AttributeValue {
    fn from(property: Property) -> Self {
        AttributeValue::Property(property)
    }
}

impl From<GeoProperty> for AttributeValue {
    fn from(property: GeoProperty) -> Self {
        AttributeValue::GeoProperty(property)
    }
}

impl From<Relationship> for AttributeValue {
    fn from(relationship: Relationship) -> Self {
        AttributeValue::Relationship(relationship)
    }
}

/// An NGSI-LD entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(rename = "@context", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoProperty>,
    #[serde(
        rename = "observationSpace",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub observation_space: Option<GeoProperty>,
    #[serde(
        rename = "operationSpace",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub operation_space: Option<GeoProperty>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "modifiedAt", default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    /// Named attributes, in insertion order.
    #[serde(flatten)]
    pub attributes: IndexMap<String, AttributeValue>,
}

impl Entity {
    /// Creates an entity without attributes.
    pub fn new(id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            context: None,
            location: None,
            observation_space: None,
            operation_space: None,
            created_at: None,
            modified_at: None,
            attributes: IndexMap::new(),
        }
    }

    /// Adds a named attribute, replacing any previous value.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Returns the named attribute, if present.
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// The set of well-known attributes that are present, as attribute values.
    ///
    /// Timestamps are wrapped into plain properties holding their RFC 3339 form.
    pub fn well_known_attributes(&self) -> IndexMap<String, AttributeValue> {
        let mut attributes = IndexMap::new();
        let geo = [
            (LOCATION, &self.location),
            (OBSERVATION_SPACE, &self.observation_space),
            (OPERATION_SPACE, &self.operation_space),
        ];
        for (name, value) in geo {
            if let Some(value) = value {
                attributes.insert(name.to_string(), AttributeValue::GeoProperty(value.clone()));
            }
        }
        let timestamps = [(CREATED_AT, self.created_at), (MODIFIED_AT, self.modified_at)];
        for (name, value) in timestamps {
            if let Some(value) = value {
                attributes.insert(
                    name.to_string(),
                    AttributeValue::property(super::wire::timestamp_value(&value)),
                );
            }
        }
        attributes
    }

    /// Well-known attributes merged with the named ones; named win on collision.
    pub fn merged_attributes(&self) -> IndexMap<String, AttributeValue> {
        let mut merged = self.well_known_attributes();
        for (name, value) in &self.attributes {
            merged.insert(name.clone(), value.clone());
        }
        merged
    }
}
