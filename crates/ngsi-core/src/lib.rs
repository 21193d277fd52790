//! # ngsi-core
//!
//! Bidirectional mapping between domain objects and NGSI-LD entities.
//!
//! Domain types describe themselves once through [`NgsiMapped`]; the
//! [`OutboundMapper`] turns instances into entities, the [`InboundMapper`]
//! turns entities back into instances and resolves their relationships
//! through an [`EntityRepository`] with one batched fetch per nesting level.

pub mod cache;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod inbound;
pub mod model;
pub mod outbound;
pub mod path;
pub mod reserved;
pub mod subscription;
pub mod unmapped;

pub use cache::{CacheCodecError, CacheValue, PolymorphicCacheCodec};
pub use config::{load_mapping_config, ConfigError, MappingConfig, DEFAULT_CONTEXT};
pub use descriptor::{
    descriptor, AttributeBinding, AttributeKind, DescriptorBuilder, FieldType, MappingEnabled,
    NgsiMapped, PlainField, QueryAttributeType, TypeDescriptor,
};
pub use error::{BoxError, MappingError, MappingResult, RepositoryError};
pub use inbound::{EntityRepository, InboundMapper, RelationshipMap, RelationshipResolver};
pub use model::{AttributeValue, Entity, GeoProperty, Property, Relationship, Subscription};
pub use outbound::OutboundMapper;
pub use path::{AttributePathResolver, NgsiLdAttribute};
pub use reserved::ReservedWordCodec;
pub use subscription::SubscriptionMapper;
pub use unmapped::UnmappedProperty;
