//! Logical NGSI-LD JSON shapes of attribute values.
//!
//! Converts between [`AttributeValue`] and its normalized NGSI-LD JSON form
//! (`{"type": "Property", "value": ...}`, `{"type": "Relationship", "object": ...}`,
//! arrays for multi-valued attributes). Byte-level encoding is left to `serde_json`.

use super::entity::{
    AttributeValue, GeoProperty, Property, Relationship, CREATED_AT, DATASET_ID, INSTANCE_ID,
    MODIFIED_AT, OBSERVED_AT,
};
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use thiserror::Error;

const TYPE: &str = "type";
const VALUE: &str = "value";
const OBJECT: &str = "object";
const UNIT_CODE: &str = "unitCode";

const PROPERTY_TYPE: &str = "Property";
const GEO_PROPERTY_TYPE: &str = "GeoProperty";
const RELATIONSHIP_TYPE: &str = "Relationship";

/// A JSON value that does not describe a valid NGSI-LD attribute.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Invalid NGSI-LD attribute: {0}")]
pub struct WireError(pub String);

/// RFC 3339 form of a timestamp, as used on the wire.
pub fn timestamp_value(timestamp: &DateTime<Utc>) -> Value {
    Value::String(timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn parse_timestamp(field: &str, value: &Value) -> Result<DateTime<Utc>, WireError> {
    let raw = value
        .as_str()
        .ok_or_else(|| WireError(format!("{field} must be a string, got {value}")))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| WireError(format!("{field} is not an RFC 3339 timestamp: {e}")))
}

fn optional_string(map: &Map<String, Value>, field: &str) -> Result<Option<String>, WireError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(WireError(format!("{field} must be a string, got {other}"))),
    }
}

fn optional_timestamp(
    map: &Map<String, Value>,
    field: &str,
) -> Result<Option<DateTime<Utc>>, WireError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => parse_timestamp(field, value).map(Some),
    }
}

fn declared_type(value: &Value) -> Option<&str> {
    value.as_object()?.get(TYPE)?.as_str()
}

/// Whether the JSON value is an object tagged as a relationship.
pub fn is_relationship_shaped(value: &Value) -> bool {
    declared_type(value) == Some(RELATIONSHIP_TYPE)
}

/// Whether the JSON value is an object tagged with any NGSI-LD attribute type.
pub fn is_attribute_shaped(value: &Value) -> bool {
    matches!(
        declared_type(value),
        Some(PROPERTY_TYPE) | Some(GEO_PROPERTY_TYPE) | Some(RELATIONSHIP_TYPE)
    )
}

/// Whether the string looks like an absolute URI (`scheme:rest`).
pub fn is_uri_shaped(candidate: &str) -> bool {
    let Some((scheme, rest)) = candidate.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    let valid_scheme = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid_scheme && !rest.is_empty() && !rest.chars().any(char::is_whitespace)
}

fn property_to_json(property: Property) -> Value {
    let mut map = Map::new();
    map.insert(TYPE.to_string(), Value::from(PROPERTY_TYPE));
    map.insert(VALUE.to_string(), property.value);
    if let Some(observed_at) = property.observed_at {
        map.insert(OBSERVED_AT.to_string(), timestamp_value(&observed_at));
    }
    if let Some(unit_code) = property.unit_code {
        map.insert(UNIT_CODE.to_string(), Value::from(unit_code));
    }
    if let Some(dataset_id) = property.dataset_id {
        map.insert(DATASET_ID.to_string(), Value::from(dataset_id));
    }
    Value::Object(map)
}

fn property_from_json(map: &Map<String, Value>) -> Result<Property, WireError> {
    Ok(Property {
        value: map.get(VALUE).cloned().unwrap_or(Value::Null),
        observed_at: optional_timestamp(map, OBSERVED_AT)?,
        unit_code: optional_string(map, UNIT_CODE)?,
        dataset_id: optional_string(map, DATASET_ID)?,
    })
}

impl From<GeoProperty> for Value {
    fn from(property: GeoProperty) -> Self {
        let mut map = Map::new();
        map.insert(TYPE.to_string(), Value::from(GEO_PROPERTY_TYPE));
        map.insert(VALUE.to_string(), property.value);
        if let Some(observed_at) = property.observed_at {
            map.insert(OBSERVED_AT.to_string(), timestamp_value(&observed_at));
        }
        if let Some(dataset_id) = property.dataset_id {
            map.insert(DATASET_ID.to_string(), Value::from(dataset_id));
        }
        Value::Object(map)
    }
}

impl TryFrom<Value> for GeoProperty {
    type Error = WireError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let map = value
            .as_object()
            .ok_or_else(|| WireError(format!("geo-property must be an object, got {value}")))?;
        Ok(GeoProperty {
            value: map.get(VALUE).cloned().unwrap_or(Value::Null),
            observed_at: optional_timestamp(map, OBSERVED_AT)?,
            dataset_id: optional_string(map, DATASET_ID)?,
        })
    }
}

fn relationship_to_json(relationship: Relationship) -> Value {
    let mut map = Map::new();
    map.insert(TYPE.to_string(), Value::from(RELATIONSHIP_TYPE));
    map.insert(OBJECT.to_string(), Value::from(relationship.object));
    if let Some(dataset_id) = relationship.dataset_id {
        map.insert(DATASET_ID.to_string(), Value::from(dataset_id));
    }
    let timestamps = [
        (OBSERVED_AT, relationship.observed_at),
        (CREATED_AT, relationship.created_at),
        (MODIFIED_AT, relationship.modified_at),
    ];
    for (field, timestamp) in timestamps {
        if let Some(timestamp) = timestamp {
            map.insert(field.to_string(), timestamp_value(&timestamp));
        }
    }
    if let Some(instance_id) = relationship.instance_id {
        map.insert(INSTANCE_ID.to_string(), Value::from(instance_id));
    }
    for (name, value) in relationship.additional_properties {
        map.insert(name, value.into());
    }
    Value::Object(map)
}

/// Parses a relationship from its JSON form.
pub fn relationship_from_value(value: &Value) -> Result<Relationship, WireError> {
    let map = value
        .as_object()
        .ok_or_else(|| WireError(format!("relationship must be an object, got {value}")))?;
    let object = map
        .get(OBJECT)
        .and_then(Value::as_str)
        .ok_or_else(|| WireError("relationship does not declare a string object".to_string()))?;

    let mut additional_properties = IndexMap::new();
    for (name, nested) in map {
        match name.as_str() {
            TYPE | OBJECT | DATASET_ID | OBSERVED_AT | CREATED_AT | MODIFIED_AT | INSTANCE_ID => {}
            _ => {
                additional_properties.insert(name.clone(), AttributeValue::try_from(nested.clone())?);
            }
        }
    }

    Ok(Relationship {
        object: object.to_string(),
        dataset_id: optional_string(map, DATASET_ID)?,
        observed_at: optional_timestamp(map, OBSERVED_AT)?,
        created_at: optional_timestamp(map, CREATED_AT)?,
        modified_at: optional_timestamp(map, MODIFIED_AT)?,
        instance_id: optional_string(map, INSTANCE_ID)?,
        additional_properties,
    })
}

impl From<AttributeValue> for Value {
    fn from(attribute: AttributeValue) -> Self {
        match attribute {
            AttributeValue::Property(property) => property_to_json(property),
            AttributeValue::PropertyList(properties) => {
                Value::Array(properties.into_iter().map(property_to_json).collect())
            }
            AttributeValue::GeoProperty(property) => property.into(),
            AttributeValue::Relationship(relationship) => relationship_to_json(relationship),
            AttributeValue::RelationshipList(relationships) => {
                Value::Array(relationships.into_iter().map(relationship_to_json).collect())
            }
        }
    }
}

impl TryFrom<Value> for AttributeValue {
    type Error = WireError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match &value {
            Value::Array(elements) => {
                if elements.iter().all(is_relationship_shaped) && !elements.is_empty() {
                    let relationships = elements
                        .iter()
                        .map(relationship_from_value)
                        .collect::<Result<Vec<_>, _>>()?;
                    return Ok(AttributeValue::RelationshipList(relationships));
                }
                let properties = elements
                    .iter()
                    .map(|element| match element {
                        Value::Object(map) if declared_type(element) == Some(PROPERTY_TYPE) => {
                            property_from_json(map)
                        }
                        other => Err(WireError(format!(
                            "list elements must all be properties or all be relationships, got {other}"
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(AttributeValue::PropertyList(properties))
            }
            Value::Object(map) => match declared_type(&value) {
                Some(PROPERTY_TYPE) => Ok(AttributeValue::Property(property_from_json(map)?)),
                Some(GEO_PROPERTY_TYPE) => Ok(AttributeValue::GeoProperty(GeoProperty::try_from(
                    value.clone(),
                )?)),
                Some(RELATIONSHIP_TYPE) => {
                    Ok(AttributeValue::Relationship(relationship_from_value(&value)?))
                }
                Some(other) => Err(WireError(format!("unsupported attribute type {other}"))),
                None if map.contains_key(OBJECT) => {
                    Ok(AttributeValue::Relationship(relationship_from_value(&value)?))
                }
                None if map.contains_key(VALUE) => {
                    Ok(AttributeValue::Property(property_from_json(map)?))
                }
                None => Err(WireError(format!("attribute does not declare a type: {value}"))),
            },
            // simplified representation, a bare value stands for a property
            _ => Ok(AttributeValue::property(value)),
        }
    }
}
