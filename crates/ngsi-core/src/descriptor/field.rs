//! Static field-type information used for query path resolution.

use std::any::TypeId;
use std::sync::Arc;

/// Scalar type of a query attribute, as used by query-building collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryAttributeType {
    #[default]
    String,
    Number,
    Boolean,
}

impl QueryAttributeType {
    /// Infers the query type of a Rust value type.
    pub fn of<V: 'static>() -> Self {
        let id = TypeId::of::<V>();
        let numeric = [
            TypeId::of::<i8>(),
            TypeId::of::<i16>(),
            TypeId::of::<i32>(),
            TypeId::of::<i64>(),
            TypeId::of::<i128>(),
            TypeId::of::<isize>(),
            TypeId::of::<u8>(),
            TypeId::of::<u16>(),
            TypeId::of::<u32>(),
            TypeId::of::<u64>(),
            TypeId::of::<u128>(),
            TypeId::of::<usize>(),
            TypeId::of::<f32>(),
            TypeId::of::<f64>(),
        ];
        if numeric.contains(&id) {
            QueryAttributeType::Number
        } else if id == TypeId::of::<bool>() {
            QueryAttributeType::Boolean
        } else {
            QueryAttributeType::String
        }
    }
}

/// Describes what lies behind a domain field.
#[derive(Debug, Clone, Copy)]
pub enum FieldType {
    /// A leaf value.
    Scalar(QueryAttributeType),
    /// A plain (unmapped) struct, described by its field table.
    Plain(&'static [PlainField]),
    /// Another mapped type; resolved lazily through the registry.
    Mapped(fn() -> Option<Arc<TypeShape>>),
}

impl FieldType {
    /// Scalar field type inferred from a Rust type.
    pub fn of<V: 'static>() -> Self {
        FieldType::Scalar(QueryAttributeType::of::<V>())
    }

    /// Query type of the field when used as the last path element.
    pub fn query_type(&self) -> QueryAttributeType {
        match self {
            FieldType::Scalar(query_type) => *query_type,
            FieldType::Plain(_) | FieldType::Mapped(_) => QueryAttributeType::String,
        }
    }
}

/// A field of a plain struct.
#[derive(Debug, Clone, Copy)]
pub struct PlainField {
    pub name: &'static str,
    pub field_type: FieldType,
}

impl PlainField {
    pub const fn new(name: &'static str, field_type: FieldType) -> Self {
        Self { name, field_type }
    }
}

/// Type-erased view of a mapped type's attribute bindings.
#[derive(Debug, Clone)]
pub struct TypeShape {
    pub type_name: &'static str,
    pub mapping_enabled: bool,
    pub fields: Vec<ShapeField>,
}

/// One attribute binding as seen by path resolution.
#[derive(Debug, Clone)]
pub struct ShapeField {
    pub field_name: String,
    pub wire_name: String,
    pub readable: bool,
    pub writable: bool,
    pub value_type: FieldType,
    pub element_type: Option<FieldType>,
}

impl TypeShape {
    /// Finds a field that has both an accessor and a mutator.
    pub fn accessible_field(&self, field_name: &str) -> Option<&ShapeField> {
        self.fields
            .iter()
            .find(|f| f.field_name == field_name && f.readable && f.writable)
    }
}
