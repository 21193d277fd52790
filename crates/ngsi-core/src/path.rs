//! Translation of domain attribute paths into NGSI-LD attribute paths.
//!
//! Query builders address attributes by domain field names
//! (`mySubProperty.myName`); the broker knows them by their wire names
//! (`sub-entity.name`). Resolution walks the descriptor tables of mapped
//! types and the static field tables of plain types.

use crate::descriptor::{descriptor, FieldType, NgsiMapped, PlainField, QueryAttributeType, TypeShape};
use crate::error::{MappingError, MappingResult};
use tracing::{debug, warn};

const ID: &str = "id";

/// A resolved NGSI-LD attribute path and the scalar type found at its end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NgsiLdAttribute {
    pub path: Vec<String>,
    pub query_type: QueryAttributeType,
}

impl NgsiLdAttribute {
    fn literal(path: &[&str], query_type: QueryAttributeType) -> Self {
        Self {
            path: path.iter().map(|segment| segment.to_string()).collect(),
            query_type,
        }
    }

    /// The path joined with dots, as used in NGSI-LD query expressions.
    pub fn dotted(&self) -> String {
        self.path.join(".")
    }
}

/// Resolves domain attribute paths against mapped types.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributePathResolver;

impl AttributePathResolver {
    /// Resolves `path` (domain field names, outermost first) against `T`.
    pub fn resolve<T: NgsiMapped>(path: &[&str]) -> MappingResult<NgsiLdAttribute> {
        let Some(first) = path.first() else {
            return Err(MappingError::Mapping(
                "cannot resolve an empty attribute path".to_string(),
            ));
        };
        if *first == ID {
            return Ok(NgsiLdAttribute::literal(&[ID], QueryAttributeType::String));
        }
        let shape = descriptor::<T>()?.shape();
        resolve_in_shape(&shape, path)
    }

    /// Resolves a dot-separated path such as `mySubProperty.myName`.
    pub fn resolve_dotted<T: NgsiMapped>(path: &str) -> MappingResult<NgsiLdAttribute> {
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        Self::resolve::<T>(&segments)
    }
}

fn resolve_in_shape(shape: &TypeShape, path: &[&str]) -> MappingResult<NgsiLdAttribute> {
    if !shape.mapping_enabled {
        return Ok(NgsiLdAttribute::literal(path, shape_type(shape, path)?));
    }

    let (current, rest) = match path.split_first() {
        Some(split) => split,
        None => return Ok(NgsiLdAttribute::literal(&[], QueryAttributeType::String)),
    };

    let Some(field) = shape.accessible_field(current) else {
        warn!(
            attribute = *current,
            target = shape.type_name,
            "No corresponding field does exist for attribute"
        );
        return Ok(NgsiLdAttribute::literal(path, QueryAttributeType::String));
    };

    let mut resolved = vec![field.wire_name.clone()];
    let mut query_type = field.value_type.query_type();
    if !rest.is_empty() {
        let nested = resolve_in(field.element_type.unwrap_or(field.value_type), rest)?;
        resolved.extend(nested.path);
        query_type = nested.query_type;
    }

    Ok(NgsiLdAttribute {
        path: resolved,
        query_type,
    })
}

/// Resolves the remainder of a path below a field.
///
/// A mapped type whose descriptor cannot be built yields the path literally
/// with type `String`, as does a path continuing below a scalar.
fn resolve_in(field_type: FieldType, path: &[&str]) -> MappingResult<NgsiLdAttribute> {
    match field_type {
        FieldType::Mapped(shape) => match shape() {
            Some(shape) => resolve_in_shape(&shape, path),
            None => Ok(NgsiLdAttribute::literal(path, QueryAttributeType::String)),
        },
        FieldType::Plain(fields) => Ok(NgsiLdAttribute::literal(path, plain_type(fields, path)?)),
        FieldType::Scalar(_) => {
            debug!(path = ?path, "Path continues below an opaque value, keeping it literal");
            Ok(NgsiLdAttribute::literal(path, QueryAttributeType::String))
        }
    }
}

/// Infers the type at the end of `path` from the bindings of a type without
/// entity or subscription markers. Field names are kept, so only the type is
/// looked up; any readable binding counts.
fn shape_type(shape: &TypeShape, path: &[&str]) -> MappingResult<QueryAttributeType> {
    let Some((current, rest)) = path.split_first() else {
        return Ok(QueryAttributeType::String);
    };
    let field = shape
        .fields
        .iter()
        .find(|field| field.field_name == *current && field.readable)
        .ok_or_else(|| {
            MappingError::Mapping(format!("no field {current} exists for {}", shape.type_name))
        })?;
    if rest.is_empty() {
        return Ok(field.value_type.query_type());
    }
    match field.element_type.unwrap_or(field.value_type) {
        FieldType::Mapped(shape) => match shape() {
            Some(shape) => shape_type(&shape, rest),
            None => Ok(QueryAttributeType::String),
        },
        FieldType::Plain(fields) => plain_type(fields, rest),
        FieldType::Scalar(_) => Err(MappingError::Mapping(format!(
            "no field {} exists below the scalar {current}",
            rest[0]
        ))),
    }
}

/// Walks plain field tables along `path` and infers the type at its end.
fn plain_type(fields: &'static [PlainField], path: &[&str]) -> MappingResult<QueryAttributeType> {
    let mut current = FieldType::Plain(fields);
    for segment in path {
        let FieldType::Plain(fields) = current else {
            return Err(MappingError::Mapping(format!(
                "no field {segment} exists below a scalar value"
            )));
        };
        current = fields
            .iter()
            .find(|field| field.name == *segment)
            .map(|field| field.field_type)
            .ok_or_else(|| MappingError::Mapping(format!("no field {segment} exists")))?;
    }
    Ok(current.query_type())
}
