//! Subscription to domain object mapping, and back.
//!
//! Subscriptions carry no relationships, so both directions are synchronous.
//! Only the well-known subscription members are mapped; each goes to the
//! binding registered under the member's JSON name.

use crate::config::MappingConfig;
use crate::descriptor::{descriptor, AttributeBinding, AttributeKind, Getter, NgsiMapped, Setter};
use crate::error::{MappingError, MappingResult};
use crate::model::{
    Subscription, CREATED_AT, ENTITIES, EXPIRES_AT, GEO_Q, MODIFIED_AT, NOTIFICATION, Q,
    SUBSCRIPTION_NAME, WATCHED_ATTRIBUTES,
};
use serde_json::{Map, Value};
use tracing::{instrument, warn};

/// Subscription members handed to bindings, in dispatch order.
const WELL_KNOWN_MEMBERS: [&str; 9] = [
    SUBSCRIPTION_NAME,
    CREATED_AT,
    MODIFIED_AT,
    EXPIRES_AT,
    Q,
    GEO_Q,
    ENTITIES,
    WATCHED_ATTRIBUTES,
    NOTIFICATION,
];

/// Maps NGSI-LD subscriptions to domain objects and back.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionMapper {
    config: MappingConfig,
}

impl SubscriptionMapper {
    pub fn new(config: MappingConfig) -> Self {
        Self { config }
    }

    /// Builds a `T` from the subscription.
    #[instrument(skip_all, fields(subscription_id = %subscription.id))]
    pub fn from_subscription<T: NgsiMapped>(&self, subscription: Subscription) -> MappingResult<T> {
        let descriptor = descriptor::<T>()?;
        let marker = descriptor.require_marker()?;
        if !marker.accepts_subscription_type(&subscription.subscription_type) {
            return Err(MappingError::TypeMismatch {
                actual: subscription.subscription_type,
                accepted: marker.subscription_types.clone(),
            });
        }

        let mut object = descriptor.construct(&subscription.id)?;
        let mut members = to_members(&subscription)?;

        for name in WELL_KNOWN_MEMBERS {
            let Some(value) = members.remove(name) else {
                continue;
            };
            let Some(binding) = descriptor.setter_binding(name) else {
                warn!(
                    member = name,
                    subscription_id = %subscription.id,
                    "Ignoring subscription member since there is no mapping configured"
                );
                continue;
            };
            apply_member(binding, &mut object, value)?;
        }

        Ok(object)
    }

    /// Builds the subscription representing `object`.
    #[instrument(skip_all, fields(target = std::any::type_name::<T>()))]
    pub fn to_subscription<T: NgsiMapped>(&self, object: &T) -> MappingResult<Subscription> {
        let descriptor = descriptor::<T>()?;
        descriptor.require_marker()?;

        let mut members = Map::new();
        members.insert("id".to_string(), Value::from(descriptor.entity_id(object)));
        members.insert("type".to_string(), Value::from(descriptor.entity_type(object)));

        for binding in descriptor.readable() {
            if !WELL_KNOWN_MEMBERS.contains(&binding.wire_name.as_str()) {
                continue;
            }
            if let Some(Getter::Value(get)) = &binding.getter {
                if let Some(value) = get(object)? {
                    members.insert(binding.wire_name.clone(), value);
                }
            }
        }

        let mut subscription: Subscription = serde_json::from_value(Value::Object(members))
            .map_err(|e| {
                MappingError::Mapping(format!(
                    "{} does not describe a valid subscription: {e}",
                    descriptor.type_name()
                ))
            })?;
        subscription.context = Some(self.config.context_url.clone());
        Ok(subscription)
    }
}

fn to_members(subscription: &Subscription) -> MappingResult<Map<String, Value>> {
    match serde_json::to_value(subscription) {
        Ok(Value::Object(members)) => Ok(members),
        Ok(other) => Err(MappingError::Mapping(format!(
            "subscription {} serialized to a non-object: {other}",
            subscription.id
        ))),
        Err(e) => Err(MappingError::Mapping(format!(
            "subscription {} could not be serialized: {e}",
            subscription.id
        ))),
    }
}

fn apply_member<T>(binding: &AttributeBinding<T>, object: &mut T, value: Value) -> MappingResult<()> {
    match (binding.kind, &binding.setter) {
        (AttributeKind::EntityInfoList, Some(Setter::List(set))) => match value {
            Value::Array(elements) => set(object, elements),
            other => Err(MappingError::shape(
                &binding.wire_name,
                binding.kind.expected(),
                format!("expected a list, got {other}"),
            )),
        },
        (
            AttributeKind::Property
            | AttributeKind::GeoQuery
            | AttributeKind::PropertySet
            | AttributeKind::NotificationParams,
            Some(Setter::Value(set)),
        ) => set(object, value),
        (kind, _) => Err(MappingError::schema(
            std::any::type_name::<T>(),
            format!(
                "subscription member {} cannot be mapped to a {}",
                binding.wire_name,
                kind.expected()
            ),
        )),
    }
}
