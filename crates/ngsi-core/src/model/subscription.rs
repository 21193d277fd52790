//! NGSI-LD subscription type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The only subscription type NGSI-LD defines.
pub const SUBSCRIPTION_TYPE: &str = "Subscription";

/// JSON names of the well-known subscription members.
pub const SUBSCRIPTION_NAME: &str = "subscriptionName";
pub const EXPIRES_AT: &str = "expiresAt";
pub const Q: &str = "q";
pub const GEO_Q: &str = "geoQ";
pub const ENTITIES: &str = "entities";
pub const WATCHED_ATTRIBUTES: &str = "watchedAttributes";
pub const NOTIFICATION: &str = "notification";

/// An NGSI-LD subscription.
///
/// The nested structures (`geoQ`, `entities`, `notification`) are kept as raw
/// JSON; the mapped domain type decides how to interpret them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    #[serde(rename = "type")]
    pub subscription_type: String,
    #[serde(rename = "@context", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_q: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub watched_attributes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<Value>,
}

impl Subscription {
    /// Creates an empty subscription with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subscription_type: SUBSCRIPTION_TYPE.to_string(),
            context: None,
            subscription_name: None,
            created_at: None,
            modified_at: None,
            expires_at: None,
            q: None,
            geo_q: None,
            entities: Vec::new(),
            watched_attributes: Vec::new(),
            notification: None,
        }
    }
}
