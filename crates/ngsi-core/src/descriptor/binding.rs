//! Attribute bindings: the kind-tagged accessor/mutator table entries of a mapped type.
//!
//! A binding is declared with typed closures and erased on the spot, so the
//! mappers only ever deal with `serde_json::Value`s, [`Relationship`]s, and
//! boxed related objects.

use super::field::{FieldType, TypeShape};
use super::{AttributeKind, NgsiMapped};
use crate::error::{MappingError, MappingResult};
use crate::inbound::{self, InboundMapper, Lineage};
use crate::model::{Entity, Relationship};
use crate::outbound;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::Arc;

/// A materialized related object, type-erased until its mutator downcasts it.
pub(crate) type Related = Box<dyn Any + Send>;

pub(crate) type ValueGetter<T> = Box<dyn Fn(&T) -> MappingResult<Option<Value>> + Send + Sync>;
pub(crate) type RelationshipGetter<T> =
    Box<dyn Fn(&T) -> MappingResult<Option<Relationship>> + Send + Sync>;
pub(crate) type RelationshipListGetter<T> =
    Box<dyn Fn(&T) -> MappingResult<Option<Vec<Relationship>>> + Send + Sync>;

pub(crate) type ValueSetter<T> = Box<dyn Fn(&mut T, Value) -> MappingResult<()> + Send + Sync>;
pub(crate) type ListSetter<T> = Box<dyn Fn(&mut T, Vec<Value>) -> MappingResult<()> + Send + Sync>;
pub(crate) type RelatedSetter<T> = Box<dyn Fn(&mut T, Related) -> MappingResult<()> + Send + Sync>;
pub(crate) type RelatedListSetter<T> =
    Box<dyn Fn(&mut T, Vec<Related>) -> MappingResult<()> + Send + Sync>;

pub(crate) enum Getter<T> {
    Value(ValueGetter<T>),
    Relationship(RelationshipGetter<T>),
    RelationshipList(RelationshipListGetter<T>),
}

pub(crate) enum Setter<T> {
    Value(ValueSetter<T>),
    List(ListSetter<T>),
    Related(RelatedSetter<T>),
    RelatedList(RelatedListSetter<T>),
}

/// Monomorphized entry points for the target type of a relationship.
#[derive(Clone, Copy)]
pub(crate) struct Target {
    pub type_name: &'static str,
    pub materialize:
        for<'a> fn(&'a InboundMapper, Entity, Lineage) -> BoxFuture<'a, MappingResult<Related>>,
    pub from_relationship: for<'a> fn(
        &'a InboundMapper,
        Relationship,
        Lineage,
    ) -> BoxFuture<'a, MappingResult<Related>>,
    pub id_only: fn(&str) -> MappingResult<Related>,
}

impl Target {
    fn of<R: NgsiMapped>() -> Self {
        Self {
            type_name: std::any::type_name::<R>(),
            materialize: inbound::materialize_related::<R>,
            from_relationship: inbound::related_from_relationship::<R>,
            id_only: inbound::related_id_only::<R>,
        }
    }
}

pub(crate) fn shape_of<R: NgsiMapped>() -> Option<Arc<TypeShape>> {
    super::registry::descriptor::<R>()
        .ok()
        .map(|descriptor| descriptor.shape())
}

/// One attribute of a mapped type.
pub struct AttributeBinding<T> {
    pub(crate) kind: AttributeKind,
    pub(crate) field_name: String,
    pub(crate) wire_name: String,
    pub(crate) from_properties: bool,
    pub(crate) embed_property: bool,
    pub(crate) value_type: FieldType,
    pub(crate) element_type: Option<FieldType>,
    pub(crate) target: Option<Target>,
    pub(crate) getter: Option<Getter<T>>,
    pub(crate) setter: Option<Setter<T>>,
}

impl<T> std::fmt::Debug for AttributeBinding<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeBinding")
            .field("kind", &self.kind)
            .field("field_name", &self.field_name)
            .field("wire_name", &self.wire_name)
            .field("from_properties", &self.from_properties)
            .field("embed_property", &self.embed_property)
            .field("readable", &self.getter.is_some())
            .field("writable", &self.setter.is_some())
            .finish()
    }
}

impl<T: NgsiMapped> AttributeBinding<T> {
    fn new(kind: AttributeKind, field_name: impl Into<String>, wire_name: impl Into<String>) -> Self {
        Self {
            kind,
            field_name: field_name.into(),
            wire_name: wire_name.into(),
            from_properties: false,
            embed_property: false,
            value_type: FieldType::Scalar(Default::default()),
            element_type: None,
            target: None,
            getter: None,
            setter: None,
        }
    }

    /// A single-valued property.
    pub fn property<V: 'static>(
        field_name: impl Into<String>,
        wire_name: impl Into<String>,
    ) -> ValueBinding<T, V> {
        ValueBinding::new(AttributeKind::Property, field_name, wire_name)
    }

    /// A geo-property; the value is a GeoJSON geometry.
    pub fn geo_property<V: 'static>(
        field_name: impl Into<String>,
        wire_name: impl Into<String>,
    ) -> ValueBinding<T, V> {
        ValueBinding::new(AttributeKind::GeoProperty, field_name, wire_name)
    }

    /// A list of property values.
    pub fn property_list<V: 'static>(
        field_name: impl Into<String>,
        wire_name: impl Into<String>,
    ) -> ListBinding<T, V> {
        ListBinding::new(AttributeKind::PropertyList, field_name, wire_name)
    }

    /// A relationship to another mapped type.
    pub fn relationship<R: NgsiMapped>(
        field_name: impl Into<String>,
        wire_name: impl Into<String>,
    ) -> RelationshipBinding<T, R> {
        RelationshipBinding::new(AttributeKind::Relationship, field_name, wire_name)
    }

    /// A list of relationships to another mapped type.
    pub fn relationship_list<R: NgsiMapped>(
        field_name: impl Into<String>,
        wire_name: impl Into<String>,
    ) -> RelationshipListBinding<T, R> {
        RelationshipListBinding::new(field_name, wire_name)
    }

    /// The geo-query of a subscription.
    pub fn geo_query<V: 'static>(
        field_name: impl Into<String>,
        wire_name: impl Into<String>,
    ) -> ValueBinding<T, V> {
        ValueBinding::new(AttributeKind::GeoQuery, field_name, wire_name)
    }

    /// The notification parameters of a subscription.
    pub fn notification_params<V: 'static>(
        field_name: impl Into<String>,
        wire_name: impl Into<String>,
    ) -> ValueBinding<T, V> {
        ValueBinding::new(AttributeKind::NotificationParams, field_name, wire_name)
    }

    /// A set-valued subscription member, such as the watched attributes.
    pub fn property_set<V: 'static>(
        field_name: impl Into<String>,
        wire_name: impl Into<String>,
    ) -> ValueBinding<T, V> {
        ValueBinding::new(AttributeKind::PropertySet, field_name, wire_name)
    }

    /// The entity selectors of a subscription.
    pub fn entity_info_list<V: 'static>(
        field_name: impl Into<String>,
        wire_name: impl Into<String>,
    ) -> ListBinding<T, V> {
        ListBinding::new(AttributeKind::EntityInfoList, field_name, wire_name)
    }

    pub fn kind(&self) -> AttributeKind {
        self.kind
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn wire_name(&self) -> &str {
        &self.wire_name
    }

    pub fn is_from_properties(&self) -> bool {
        self.from_properties
    }

    pub fn is_embedded(&self) -> bool {
        self.embed_property
    }

    pub(crate) fn target_name(&self) -> &'static str {
        self.target.map(|t| t.type_name).unwrap_or("unknown")
    }
}

fn coerce<V: DeserializeOwned>(kind: AttributeKind, wire_name: &str, value: Value) -> MappingResult<V> {
    serde_json::from_value(value).map_err(|e| MappingError::shape(wire_name, kind.expected(), e.to_string()))
}

fn to_wire<V: Serialize>(wire_name: &str, value: V) -> MappingResult<Option<Value>> {
    let value = serde_json::to_value(value).map_err(|e| {
        MappingError::Mapping(format!("attribute {wire_name} could not be serialized: {e}"))
    })?;
    Ok((!value.is_null()).then_some(value))
}

fn invocation_failed<T>(wire_name: &str, e: impl Display) -> MappingError {
    MappingError::invocation(
        format!("mutator of {} on {}", wire_name, std::any::type_name::<T>()),
        e,
    )
}

fn downcast<R: NgsiMapped>(wire_name: &str, related: Related) -> MappingResult<R> {
    related.downcast::<R>().map(|r| *r).map_err(|_| {
        MappingError::invocation(
            format!("mutator of {wire_name}"),
            format!("related object is not a {}", std::any::type_name::<R>()),
        )
    })
}

/// Typed builder for single-valued bindings.
pub struct ValueBinding<T, V> {
    inner: AttributeBinding<T>,
    _value: PhantomData<fn() -> V>,
}

impl<T: NgsiMapped, V: 'static> ValueBinding<T, V> {
    fn new(kind: AttributeKind, field_name: impl Into<String>, wire_name: impl Into<String>) -> Self {
        let mut inner = AttributeBinding::new(kind, field_name, wire_name);
        inner.value_type = FieldType::of::<V>();
        Self {
            inner,
            _value: PhantomData,
        }
    }

    /// Accessor used when mapping to NGSI-LD; `None` skips the attribute.
    pub fn getter<F>(mut self, get: F) -> Self
    where
        F: Fn(&T) -> Option<V> + Send + Sync + 'static,
        V: Serialize,
    {
        let wire_name = self.inner.wire_name.clone();
        self.inner.getter = Some(Getter::Value(Box::new(move |t: &T| match get(t) {
            Some(value) => to_wire(&wire_name, value),
            None => Ok(None),
        })));
        self
    }

    /// Mutator used when mapping from NGSI-LD.
    pub fn setter<F>(self, set: F) -> Self
    where
        F: Fn(&mut T, V) + Send + Sync + 'static,
        V: DeserializeOwned,
    {
        self.try_setter(move |t, v| {
            set(t, v);
            Ok::<(), std::convert::Infallible>(())
        })
    }

    /// Fallible mutator; an error fails the whole mapping call.
    pub fn try_setter<F, E>(mut self, set: F) -> Self
    where
        F: Fn(&mut T, V) -> Result<(), E> + Send + Sync + 'static,
        E: Display,
        V: DeserializeOwned,
    {
        let kind = self.inner.kind;
        let wire_name = self.inner.wire_name.clone();
        self.inner.setter = Some(Setter::Value(Box::new(move |t: &mut T, value: Value| {
            let value = coerce::<V>(kind, &wire_name, value)?;
            set(t, value).map_err(|e| invocation_failed::<T>(&wire_name, e))
        })));
        self
    }

    /// Embeds the attribute into relationships that point at the owning type.
    pub fn embed_property(mut self) -> Self {
        self.inner.embed_property = true;
        self
    }

    /// Overrides the inferred field type, e.g. for struct-valued properties.
    pub fn value_type(mut self, value_type: FieldType) -> Self {
        self.inner.value_type = value_type;
        self
    }
}

impl<T, V> From<ValueBinding<T, V>> for AttributeBinding<T> {
    fn from(binding: ValueBinding<T, V>) -> Self {
        binding.inner
    }
}

/// Typed builder for list-valued bindings.
pub struct ListBinding<T, V> {
    inner: AttributeBinding<T>,
    _value: PhantomData<fn() -> V>,
}

impl<T: NgsiMapped, V: 'static> ListBinding<T, V> {
    fn new(kind: AttributeKind, field_name: impl Into<String>, wire_name: impl Into<String>) -> Self {
        let mut inner = AttributeBinding::new(kind, field_name, wire_name);
        inner.value_type = FieldType::of::<Vec<V>>();
        inner.element_type = Some(FieldType::of::<V>());
        Self {
            inner,
            _value: PhantomData,
        }
    }

    /// Accessor used when mapping to NGSI-LD; `None` skips the attribute.
    pub fn getter<F>(mut self, get: F) -> Self
    where
        F: Fn(&T) -> Option<Vec<V>> + Send + Sync + 'static,
        V: Serialize,
    {
        let wire_name = self.inner.wire_name.clone();
        self.inner.getter = Some(Getter::Value(Box::new(move |t: &T| match get(t) {
            Some(values) => to_wire(&wire_name, values),
            None => Ok(None),
        })));
        self
    }

    /// Mutator used when mapping from NGSI-LD; elements are coerced one by one.
    pub fn setter<F>(self, set: F) -> Self
    where
        F: Fn(&mut T, Vec<V>) + Send + Sync + 'static,
        V: DeserializeOwned,
    {
        self.try_setter(move |t, v| {
            set(t, v);
            Ok::<(), std::convert::Infallible>(())
        })
    }

    /// Fallible mutator; an error fails the whole mapping call.
    pub fn try_setter<F, E>(mut self, set: F) -> Self
    where
        F: Fn(&mut T, Vec<V>) -> Result<(), E> + Send + Sync + 'static,
        E: Display,
        V: DeserializeOwned,
    {
        let kind = self.inner.kind;
        let wire_name = self.inner.wire_name.clone();
        self.inner.setter = Some(Setter::List(Box::new(move |t: &mut T, values: Vec<Value>| {
            let values = values
                .into_iter()
                .map(|value| coerce::<V>(kind, &wire_name, value))
                .collect::<MappingResult<Vec<V>>>()?;
            set(t, values).map_err(|e| invocation_failed::<T>(&wire_name, e))
        })));
        self
    }

    /// Overrides the inferred element type.
    pub fn element_type(mut self, element_type: FieldType) -> Self {
        self.inner.element_type = Some(element_type);
        self
    }
}

impl<T, V> From<ListBinding<T, V>> for AttributeBinding<T> {
    fn from(binding: ListBinding<T, V>) -> Self {
        binding.inner
    }
}

/// Typed builder for relationship bindings.
pub struct RelationshipBinding<T, R> {
    inner: AttributeBinding<T>,
    _target: PhantomData<fn() -> R>,
}

impl<T: NgsiMapped, R: NgsiMapped> RelationshipBinding<T, R> {
    fn new(kind: AttributeKind, field_name: impl Into<String>, wire_name: impl Into<String>) -> Self {
        let mut inner = AttributeBinding::new(kind, field_name, wire_name);
        inner.value_type = FieldType::Mapped(shape_of::<R>);
        inner.element_type = Some(FieldType::Mapped(shape_of::<R>));
        inner.target = Some(Target::of::<R>());
        Self {
            inner,
            _target: PhantomData,
        }
    }

    /// Accessor for the related object; `None` skips the attribute.
    pub fn getter<F>(mut self, get: F) -> Self
    where
        F: Fn(&T) -> Option<&R> + Send + Sync + 'static,
    {
        self.inner.getter = Some(Getter::Relationship(Box::new(move |t: &T| {
            get(t).map(outbound::relationship_of::<R>).transpose()
        })));
        self
    }

    /// Mutator receiving the materialized related object.
    pub fn setter<F>(self, set: F) -> Self
    where
        F: Fn(&mut T, R) + Send + Sync + 'static,
    {
        self.try_setter(move |t, r| {
            set(t, r);
            Ok::<(), std::convert::Infallible>(())
        })
    }

    /// Fallible mutator; an error fails the whole mapping call.
    pub fn try_setter<F, E>(mut self, set: F) -> Self
    where
        F: Fn(&mut T, R) -> Result<(), E> + Send + Sync + 'static,
        E: Display,
    {
        let wire_name = self.inner.wire_name.clone();
        self.inner.setter = Some(Setter::Related(Box::new(move |t: &mut T, related: Related| {
            let related = downcast::<R>(&wire_name, related)?;
            set(t, related).map_err(|e| invocation_failed::<T>(&wire_name, e))
        })));
        self
    }

    /// Builds the related object from the relationship's own properties
    /// instead of fetching the referenced entity.
    pub fn from_properties(mut self) -> Self {
        self.inner.from_properties = true;
        self
    }
}

impl<T, R> From<RelationshipBinding<T, R>> for AttributeBinding<T> {
    fn from(binding: RelationshipBinding<T, R>) -> Self {
        binding.inner
    }
}

/// Typed builder for relationship-list bindings.
pub struct RelationshipListBinding<T, R> {
    inner: AttributeBinding<T>,
    _target: PhantomData<fn() -> R>,
}

impl<T: NgsiMapped, R: NgsiMapped> RelationshipListBinding<T, R> {
    fn new(field_name: impl Into<String>, wire_name: impl Into<String>) -> Self {
        let RelationshipBinding { inner, .. } = RelationshipBinding::<T, R>::new(
            AttributeKind::RelationshipList,
            field_name,
            wire_name,
        );
        Self {
            inner,
            _target: PhantomData,
        }
    }

    /// Accessor for the related objects; `None` skips the attribute.
    pub fn getter<F>(mut self, get: F) -> Self
    where
        F: Fn(&T) -> Option<&[R]> + Send + Sync + 'static,
    {
        self.inner.getter = Some(Getter::RelationshipList(Box::new(move |t: &T| {
            get(t)
                .map(|related| {
                    related
                        .iter()
                        .map(outbound::relationship_of::<R>)
                        .collect::<MappingResult<Vec<_>>>()
                })
                .transpose()
        })));
        self
    }

    /// Mutator receiving the materialized related objects, in source order.
    pub fn setter<F>(self, set: F) -> Self
    where
        F: Fn(&mut T, Vec<R>) + Send + Sync + 'static,
    {
        self.try_setter(move |t, r| {
            set(t, r);
            Ok::<(), std::convert::Infallible>(())
        })
    }

    /// Fallible mutator; an error fails the whole mapping call.
    pub fn try_setter<F, E>(mut self, set: F) -> Self
    where
        F: Fn(&mut T, Vec<R>) -> Result<(), E> + Send + Sync + 'static,
        E: Display,
    {
        let wire_name = self.inner.wire_name.clone();
        self.inner.setter = Some(Setter::RelatedList(Box::new(move |t: &mut T, related: Vec<Related>| {
            let related = related
                .into_iter()
                .map(|r| downcast::<R>(&wire_name, r))
                .collect::<MappingResult<Vec<R>>>()?;
            set(t, related).map_err(|e| invocation_failed::<T>(&wire_name, e))
        })));
        self
    }

    /// Builds each related object from its relationship's own properties.
    pub fn from_properties(mut self) -> Self {
        self.inner.from_properties = true;
        self
    }
}

impl<T, R> From<RelationshipListBinding<T, R>> for AttributeBinding<T> {
    fn from(binding: RelationshipListBinding<T, R>) -> Self {
        binding.inner
    }
}
