//! NGSI-LD data model: entities, attribute values, and subscriptions.

mod entity;
mod subscription;
pub mod wire;

pub use entity::{
    AttributeValue, Entity, GeoProperty, Property, Relationship, CREATED_AT, DATASET_ID,
    INSTANCE_ID, LOCATION, MODIFIED_AT, OBSERVATION_SPACE, OBSERVED_AT, OPERATION_SPACE,
};
pub use subscription::{
    Subscription, ENTITIES, EXPIRES_AT, GEO_Q, NOTIFICATION, Q, SUBSCRIPTION_NAME,
    SUBSCRIPTION_TYPE, WATCHED_ATTRIBUTES,
};
pub use wire::WireError;
