//! Per-type attribute descriptors.
//!
//! Every mapped type hands out a hand-written descriptor table through
//! [`NgsiMapped::describe`]. The registry validates it once and caches it, and
//! the mappers dispatch on the kind-tagged [`AttributeBinding`]s it holds.
//!
//! ```ignore
//! impl NgsiMapped for MyPojo {
//!     fn describe() -> DescriptorBuilder<Self> {
//!         DescriptorBuilder::<Self>::new()
//!             .entity_types(["my-pojo"])
//!             .constructor(MyPojo::new)
//!             .id(|p| p.id.clone())
//!             .entity_type(|_| "my-pojo".to_string())
//!             .attribute(
//!                 AttributeBinding::<Self>::property::<String>("myName", "name")
//!                     .getter(|p| p.my_name.clone())
//!                     .setter(|p, v| p.my_name = Some(v)),
//!             )
//!     }
//! }
//! ```

mod binding;
mod field;
pub mod registry;

pub use binding::{
    AttributeBinding, ListBinding, RelationshipBinding, RelationshipListBinding, ValueBinding,
};
pub(crate) use binding::{Getter, Related, Setter, Target};
pub use field::{FieldType, PlainField, QueryAttributeType, ShapeField, TypeShape};
pub use registry::descriptor;

use crate::error::{BoxError, MappingError, MappingResult};
use crate::unmapped::UnmappedProperty;
use std::collections::HashSet;
use std::sync::Arc;

/// Kind of an attribute binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Property,
    PropertyList,
    GeoProperty,
    Relationship,
    RelationshipList,
    NotificationParams,
    EntityInfoList,
    PropertySet,
    GeoQuery,
}

impl AttributeKind {
    /// Kinds that only exist on subscriptions.
    pub fn is_subscription_kind(self) -> bool {
        matches!(
            self,
            AttributeKind::NotificationParams
                | AttributeKind::EntityInfoList
                | AttributeKind::PropertySet
                | AttributeKind::GeoQuery
        )
    }

    pub(crate) fn expected(self) -> &'static str {
        match self {
            AttributeKind::Property => "property",
            AttributeKind::PropertyList => "property list",
            AttributeKind::GeoProperty => "geo-property",
            AttributeKind::Relationship => "relationship",
            AttributeKind::RelationshipList => "relationship list",
            AttributeKind::NotificationParams => "notification parameter set",
            AttributeKind::EntityInfoList => "entity selector list",
            AttributeKind::PropertySet => "attribute set",
            AttributeKind::GeoQuery => "geo-query",
        }
    }
}

/// Marks a type as mappable and names the NGSI-LD types it accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingEnabled {
    pub entity_types: Vec<String>,
    pub subscription_types: Vec<String>,
}

impl MappingEnabled {
    pub fn accepts_entity_type(&self, entity_type: &str) -> bool {
        self.entity_types.iter().any(|t| t == entity_type)
    }

    pub fn accepts_subscription_type(&self, subscription_type: &str) -> bool {
        self.subscription_types.iter().any(|t| t == subscription_type)
    }
}

/// A domain type that can be mapped to and from NGSI-LD.
pub trait NgsiMapped: Sized + Send + 'static {
    /// Returns the unvalidated descriptor table of the type.
    fn describe() -> DescriptorBuilder<Self>;
}

type Constructor<T> = Box<dyn Fn(&str) -> MappingResult<T> + Send + Sync>;
type StringAccessor<T> = Box<dyn Fn(&T) -> String + Send + Sync>;
type OptionalStringAccessor<T> = Box<dyn Fn(&T) -> Option<String> + Send + Sync>;
type UnmappedGetter<T> = Box<dyn Fn(&T) -> Vec<UnmappedProperty> + Send + Sync>;
type UnmappedSetter<T> = Box<dyn Fn(&mut T, UnmappedProperty) + Send + Sync>;

pub(crate) struct UnmappedAccess<T> {
    pub getter: UnmappedGetter<T>,
    pub setter: UnmappedSetter<T>,
}

/// Builder for the descriptor table of a mapped type.
pub struct DescriptorBuilder<T> {
    marker: Option<MappingEnabled>,
    constructor: Option<Constructor<T>>,
    ids: Vec<StringAccessor<T>>,
    types: Vec<StringAccessor<T>>,
    relationship_object: Option<StringAccessor<T>>,
    dataset_id: Option<OptionalStringAccessor<T>>,
    unmapped: Option<UnmappedAccess<T>>,
    attributes: Vec<AttributeBinding<T>>,
}

impl<T: NgsiMapped> Default for DescriptorBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: NgsiMapped> DescriptorBuilder<T> {
    /// Starts an empty table. Without a call to [`Self::entity_types`] or
    /// [`Self::subscription_types`] the type is not mapping enabled.
    pub fn new() -> Self {
        Self {
            marker: None,
            constructor: None,
            ids: Vec::new(),
            types: Vec::new(),
            relationship_object: None,
            dataset_id: None,
            unmapped: None,
            attributes: Vec::new(),
        }
    }

    /// Enables mapping and accepts the given entity types.
    pub fn entity_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let marker = self.marker.get_or_insert_with(MappingEnabled::default);
        marker.entity_types.extend(types.into_iter().map(Into::into));
        self
    }

    /// Enables mapping and accepts the given subscription types.
    pub fn subscription_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let marker = self.marker.get_or_insert_with(MappingEnabled::default);
        marker.subscription_types.extend(types.into_iter().map(Into::into));
        self
    }

    /// The single-string-argument constructor, keyed by entity id.
    pub fn constructor<F>(mut self, construct: F) -> Self
    where
        F: Fn(&str) -> T + Send + Sync + 'static,
    {
        self.constructor = Some(Box::new(move |id: &str| Ok(construct(id))));
        self
    }

    /// A constructor that may reject the id.
    pub fn try_constructor<F>(mut self, construct: F) -> Self
    where
        F: Fn(&str) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.constructor = Some(Box::new(move |id: &str| {
            construct(id).map_err(|e| {
                MappingError::invocation(format!("constructor of {}", std::any::type_name::<T>()), e)
            })
        }));
        self
    }

    /// Accessor of the entity id.
    pub fn id<F>(mut self, get: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        self.ids.push(Box::new(get));
        self
    }

    /// Accessor of the entity type.
    pub fn entity_type<F>(mut self, get: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        self.types.push(Box::new(get));
        self
    }

    /// Accessor of the URI used as object when the type is the target of a relationship.
    pub fn relationship_object<F>(mut self, get: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        self.relationship_object = Some(Box::new(get));
        self
    }

    /// Accessor of the dataset id used when the type is the target of a relationship.
    pub fn dataset_id<F>(mut self, get: F) -> Self
    where
        F: Fn(&T) -> Option<String> + Send + Sync + 'static,
    {
        self.dataset_id = Some(Box::new(get));
        self
    }

    /// Accessor/mutator pair for free-form attributes without a binding.
    pub fn unmapped_properties<G, S>(mut self, get: G, set: S) -> Self
    where
        G: Fn(&T) -> Vec<UnmappedProperty> + Send + Sync + 'static,
        S: Fn(&mut T, UnmappedProperty) + Send + Sync + 'static,
    {
        self.unmapped = Some(UnmappedAccess {
            getter: Box::new(get),
            setter: Box::new(set),
        });
        self
    }

    /// Adds an attribute binding.
    pub fn attribute(mut self, binding: impl Into<AttributeBinding<T>>) -> Self {
        self.attributes.push(binding.into());
        self
    }

    /// Validates the table.
    pub fn build(self) -> MappingResult<TypeDescriptor<T>> {
        let type_name = std::any::type_name::<T>();
        let id = single(self.ids, type_name, "id")?;
        let entity_type = single(self.types, type_name, "type")?;

        let mut readers = HashSet::new();
        let mut writers = HashSet::new();
        for binding in &self.attributes {
            if binding.getter.is_some() && !readers.insert(binding.wire_name.as_str()) {
                return Err(MappingError::schema(
                    type_name,
                    format!("attribute {} has more than one accessor", binding.wire_name),
                ));
            }
            if binding.setter.is_some() && !writers.insert(binding.wire_name.as_str()) {
                return Err(MappingError::schema(
                    type_name,
                    format!("attribute {} has more than one mutator", binding.wire_name),
                ));
            }
        }

        let shape = Arc::new(TypeShape {
            type_name,
            mapping_enabled: self.marker.is_some(),
            fields: self
                .attributes
                .iter()
                .map(|binding| ShapeField {
                    field_name: binding.field_name.clone(),
                    wire_name: binding.wire_name.clone(),
                    readable: binding.getter.is_some(),
                    writable: binding.setter.is_some(),
                    value_type: binding.value_type,
                    element_type: binding.element_type,
                })
                .collect(),
        });

        Ok(TypeDescriptor {
            type_name,
            marker: self.marker,
            constructor: self.constructor,
            id,
            entity_type,
            relationship_object: self.relationship_object,
            dataset_id: self.dataset_id,
            unmapped: self.unmapped,
            attributes: self.attributes,
            shape,
        })
    }
}

fn single<A>(mut accessors: Vec<A>, type_name: &str, what: &str) -> MappingResult<A> {
    match accessors.len() {
        1 => Ok(accessors.remove(0)),
        n => Err(MappingError::schema(
            type_name,
            format!("declares {n} {what} accessors, exactly one is expected"),
        )),
    }
}

/// Validated descriptor table of a mapped type.
pub struct TypeDescriptor<T> {
    type_name: &'static str,
    marker: Option<MappingEnabled>,
    constructor: Option<Constructor<T>>,
    id: StringAccessor<T>,
    entity_type: StringAccessor<T>,
    relationship_object: Option<StringAccessor<T>>,
    dataset_id: Option<OptionalStringAccessor<T>>,
    unmapped: Option<UnmappedAccess<T>>,
    attributes: Vec<AttributeBinding<T>>,
    shape: Arc<TypeShape>,
}

impl<T> std::fmt::Debug for TypeDescriptor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("type_name", &self.type_name)
            .field("marker", &self.marker)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

impl<T> TypeDescriptor<T> {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn marker(&self) -> Option<&MappingEnabled> {
        self.marker.as_ref()
    }

    /// The marker, or `UnsupportedMapping` when the type is not mapping enabled.
    pub fn require_marker(&self) -> MappingResult<&MappingEnabled> {
        self.marker
            .as_ref()
            .ok_or_else(|| MappingError::UnsupportedMapping(self.type_name.to_string()))
    }

    /// Creates a fresh instance keyed by the given id.
    pub fn construct(&self, id: &str) -> MappingResult<T> {
        let construct = self.constructor.as_ref().ok_or_else(|| {
            MappingError::schema(self.type_name, "no single-string-argument constructor declared")
        })?;
        construct(id)
    }

    pub fn entity_id(&self, object: &T) -> String {
        (self.id)(object)
    }

    pub fn entity_type(&self, object: &T) -> String {
        (self.entity_type)(object)
    }

    pub(crate) fn relationship_object(&self, object: &T) -> Option<String> {
        self.relationship_object.as_ref().map(|get| get(object))
    }

    /// `None` when no accessor is declared, `Some(None)` when it yields nothing.
    pub(crate) fn dataset_id(&self, object: &T) -> Option<Option<String>> {
        self.dataset_id.as_ref().map(|get| get(object))
    }

    pub(crate) fn unmapped(&self) -> Option<&UnmappedAccess<T>> {
        self.unmapped.as_ref()
    }

    pub fn attributes(&self) -> &[AttributeBinding<T>] {
        &self.attributes
    }

    /// Bindings that carry an accessor.
    pub fn readable(&self) -> impl Iterator<Item = &AttributeBinding<T>> {
        self.attributes.iter().filter(|b| b.getter.is_some())
    }

    /// The binding whose mutator consumes the given wire name.
    pub fn setter_binding(&self, wire_name: &str) -> Option<&AttributeBinding<T>> {
        self.attributes
            .iter()
            .find(|b| b.setter.is_some() && b.wire_name == wire_name)
    }

    /// Looks a binding up by its domain field name.
    pub fn binding_by_field(&self, field_name: &str) -> Option<&AttributeBinding<T>> {
        self.attributes.iter().find(|b| b.field_name == field_name)
    }

    pub fn bindings_of(&self, kind: AttributeKind) -> impl Iterator<Item = &AttributeBinding<T>> {
        self.attributes.iter().filter(move |b| b.kind == kind)
    }

    pub fn shape(&self) -> Arc<TypeShape> {
        Arc::clone(&self.shape)
    }
}
