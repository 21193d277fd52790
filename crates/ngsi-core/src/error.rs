//! Mapping error types.

use thiserror::Error;

/// Errors raised by the external entity repository.
#[derive(Error, Debug, Clone)]
pub enum RepositoryError {
    /// The backing store could not be reached.
    #[error("Repository connection failed: {0}")]
    Connection(String),

    /// The store answered, but the answer could not be used.
    #[error("Repository query failed: {0}")]
    Query(String),
}

/// Errors that can occur while mapping between domain objects and NGSI-LD.
///
/// Every variant is terminal for the call that raised it: nothing is retried
/// and no partially constructed object is handed back.
#[derive(Error, Debug, Clone)]
pub enum MappingError {
    /// The type does not carry a mapping marker.
    #[error("Mapping is not enabled for {0}")]
    UnsupportedMapping(String),

    /// The entity or subscription type is not accepted by the target type.
    #[error("Entity and target type do not match - {actual} vs {accepted:?}")]
    TypeMismatch {
        actual: String,
        accepted: Vec<String>,
    },

    /// The static descriptor table of a type is inconsistent.
    #[error("Invalid descriptor for {type_name}: {message}")]
    Schema { type_name: String, message: String },

    /// A wire value does not have the shape its attribute kind requires.
    #[error("Attribute {attribute} is not a valid {expected}: {message}")]
    Shape {
        attribute: String,
        expected: &'static str,
        message: String,
    },

    /// Strict mode is active and a relationship target was not fetched.
    #[error("Was not able to resolve the relationship {0}")]
    RelationshipUnresolved(String),

    /// A constructor, accessor, or mutator of the domain type failed.
    #[error("Was not able to invoke {target}: {message}")]
    Invocation { target: String, message: String },

    /// The domain object produced values that cannot be mapped.
    #[error("Mapping failed: {0}")]
    Mapping(String),

    /// Fetching related entities failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl MappingError {
    pub(crate) fn schema(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        MappingError::Schema {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    pub(crate) fn shape(
        attribute: impl Into<String>,
        expected: &'static str,
        message: impl Into<String>,
    ) -> Self {
        MappingError::Shape {
            attribute: attribute.into(),
            expected,
            message: message.into(),
        }
    }

    pub(crate) fn invocation(target: impl Into<String>, message: impl ToString) -> Self {
        MappingError::Invocation {
            target: target.into(),
            message: message.to_string(),
        }
    }
}

/// Result type for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;

/// Boxed error returned by fallible constructors and mutators of domain types.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
