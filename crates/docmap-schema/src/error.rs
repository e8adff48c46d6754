//! Error types for schema declaration.

/// Configuration errors raised while building a model schema.
///
/// These are fatal: a schema that fails to build must never be registered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// A field declares both `required` and a default value.
    #[error("{model}.{field}: `required` and `default` are mutually exclusive")]
    RequiredWithDefault { model: String, field: String },

    /// A `ReferenceTo` field whose name does not end in `_id`.
    #[error("{model}.{field}: reference-to fields must have names ending with `_id`")]
    ReferenceNameMissingIdSuffix { model: String, field: String },

    /// A `ReferenceFrom` field that names no referencing types.
    #[error("{model}.{field}: reference-from fields need at least one referencing type")]
    EmptyReferenceTargets { model: String, field: String },

    /// A field name collides with a reserved document attribute.
    #[error("{model}.{field}: field name is reserved")]
    ReservedFieldName { model: String, field: String },

    /// The model's class name cannot be used as a type discriminator.
    #[error("invalid model name {name:?}: {reason}")]
    InvalidModelName { name: String, reason: String },

    /// The model's namespace is empty.
    #[error("{model}: namespace must not be empty")]
    EmptyNamespace { model: String },
}

/// Convenience alias for schema results.
pub type SchemaResult<T> = Result<T, SchemaError>;
