//! Free-form attributes that have no binding on the domain type.

use crate::error::{MappingError, MappingResult};
use crate::model::wire::is_attribute_shaped;
use crate::model::{AttributeValue, Property, Relationship};
use crate::reserved::ReservedWordCodec;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const ID: &str = "id";

/// A named attribute carried verbatim by a domain object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmappedProperty {
    pub name: String,
    pub value: Value,
}

impl UnmappedProperty {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// The wire attribute for this property, keyed by its escaped name.
    ///
    /// Returns `None` for a null value.
    pub fn to_attribute(&self) -> MappingResult<Option<(String, AttributeValue)>> {
        if self.value.is_null() {
            return Ok(None);
        }
        let attribute = attribute_from_plain(&self.name, &self.value)?;
        Ok(Some((ReservedWordCodec::escape(&self.name), attribute)))
    }

    /// Captures a wire attribute, unescaping its name and reducing it to plain JSON.
    pub fn from_attribute(name: &str, attribute: &AttributeValue) -> Self {
        Self {
            name: ReservedWordCodec::unescape(name),
            value: plain_value(attribute),
        }
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn attribute_from_plain(name: &str, value: &Value) -> MappingResult<AttributeValue> {
    match value {
        Value::Array(elements) if elements.iter().all(is_scalar) => {
            Ok(AttributeValue::property(value.clone()))
        }
        Value::Array(elements) => list_from_plain(name, elements),
        Value::Object(map) if map.contains_key(ID) => {
            relationship_from_plain(name, map).map(AttributeValue::Relationship)
        }
        Value::Object(map) => Ok(AttributeValue::property(resolve_map(name, map)?)),
        scalar => Ok(AttributeValue::property(scalar.clone())),
    }
}

fn list_from_plain(name: &str, elements: &[Value]) -> MappingResult<AttributeValue> {
    if elements.iter().any(is_scalar) {
        return Err(MappingError::Mapping(format!(
            "unmapped property {name} mixes plain values and objects in one list"
        )));
    }
    let mut properties = Vec::new();
    let mut relationships = Vec::new();
    for element in elements {
        match attribute_from_plain(name, element)? {
            AttributeValue::Relationship(relationship) => relationships.push(relationship),
            AttributeValue::Property(property) => properties.push(property),
            other => properties.push(Property::new(Value::from(other))),
        }
    }
    match (properties.is_empty(), relationships.is_empty()) {
        (_, true) => Ok(AttributeValue::PropertyList(properties)),
        (true, false) => Ok(AttributeValue::RelationshipList(relationships)),
        (false, false) => Err(MappingError::Mapping(format!(
            "unmapped property {name} mixes relationships and properties in one list"
        ))),
    }
}

fn relationship_from_plain(name: &str, map: &Map<String, Value>) -> MappingResult<Relationship> {
    let object = map.get(ID).and_then(Value::as_str).ok_or_else(|| {
        MappingError::Mapping(format!("unmapped property {name} has a non-string id"))
    })?;
    let mut relationship = Relationship::new(object);
    for (key, value) in map {
        if key == ID || value.is_null() {
            continue;
        }
        relationship.additional_properties.insert(
            ReservedWordCodec::escape(key),
            attribute_from_plain(key, value)?,
        );
    }
    Ok(relationship)
}

fn resolve_map(name: &str, map: &Map<String, Value>) -> MappingResult<Value> {
    let mut resolved = Map::new();
    for (key, value) in map {
        if value.is_null() {
            continue;
        }
        let attribute = attribute_from_plain(&format!("{name}.{key}"), value)?;
        resolved.insert(ReservedWordCodec::escape(key), attribute.into());
    }
    Ok(Value::Object(resolved))
}

fn plain_value(attribute: &AttributeValue) -> Value {
    match attribute {
        AttributeValue::Property(property) => plain_json(&property.value),
        AttributeValue::PropertyList(properties) => Value::Array(
            properties
                .iter()
                .map(|property| plain_json(&property.value))
                .collect(),
        ),
        AttributeValue::GeoProperty(property) => property.value.clone(),
        AttributeValue::Relationship(relationship) => plain_relationship(relationship),
        AttributeValue::RelationshipList(relationships) => {
            Value::Array(relationships.iter().map(plain_relationship).collect())
        }
    }
}

fn plain_relationship(relationship: &Relationship) -> Value {
    let mut map = Map::new();
    map.insert(ID.to_string(), Value::from(relationship.object.clone()));
    for (key, value) in &relationship.additional_properties {
        map.insert(ReservedWordCodec::unescape(key), plain_value(value));
    }
    Value::Object(map)
}

/// Reduces nested NGSI-LD attribute objects inside a property value.
fn plain_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut plain = Map::new();
            for (key, nested) in map {
                let reduced = if is_attribute_shaped(nested) {
                    AttributeValue::try_from(nested.clone())
                        .map(|attribute| plain_value(&attribute))
                        .unwrap_or_else(|_| nested.clone())
                } else {
                    plain_json(nested)
                };
                plain.insert(ReservedWordCodec::unescape(key), reduced);
            }
            Value::Object(plain)
        }
        Value::Array(elements) => Value::Array(elements.iter().map(plain_json).collect()),
        other => other.clone(),
    }
}

/// Converts a set of unmapped properties, first occurrence of a name wins.
pub(crate) fn to_attributes(
    properties: &[UnmappedProperty],
) -> MappingResult<IndexMap<String, AttributeValue>> {
    let mut attributes = IndexMap::new();
    for property in properties {
        if let Some((name, attribute)) = property.to_attribute()? {
            attributes.entry(name).or_insert(attribute);
        }
    }
    Ok(attributes)
}
