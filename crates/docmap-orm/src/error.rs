use docmap_schema::SchemaError;
use docmap_store::StoreError;
use docmap_types::Revision;

/// Errors raised by the mapping core.
#[derive(Debug, thiserror::Error)]
pub enum OrmError {
    /// A model declaration is malformed.
    #[error("configuration error: {0}")]
    Configuration(#[from] SchemaError),

    /// A property write or save violates a field constraint.
    #[error("invalid value for {class}.{field}: {reason}")]
    Validation {
        class: String,
        field: String,
        reason: String,
    },

    /// An immutable field would change.
    #[error("{class}.{field} is immutable")]
    Immutable { class: String, field: String },

    /// A unique field value is already claimed by another document.
    #[error("{class}.{field} must be unique: {value} is held by {existing}")]
    Unique {
        class: String,
        field: String,
        value: String,
        existing: String,
    },

    /// The local revision does not match storage.
    #[error("revision conflict on {key}: local {local:?}, stored {stored:?}")]
    Conflict {
        key: String,
        local: Option<Revision>,
        stored: Option<Revision>,
    },

    /// The name is neither reserved nor declared.
    #[error("{class} has no attribute {name:?}")]
    UnknownAttribute { class: String, name: String },

    /// A reference was read on a document with no database attached.
    #[error("{class}.{name} cannot be resolved without a database")]
    NoDatabase { class: String, name: String },

    /// A stored row names a model that was never registered.
    #[error("no class registered for type {type_name:?} in namespace {namespace:?}")]
    UnknownClass { namespace: String, type_name: String },

    /// Two different models claim the same `(namespace, type)`.
    #[error("type {type_name:?} is already registered in namespace {namespace:?}")]
    DuplicateClass { namespace: String, type_name: String },

    /// A write buffer was handed a second live instance for a key.
    #[error("write buffer already holds a different instance for key {0}")]
    BufferIdentity(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A value could not be converted to or from its stored form.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl OrmError {
    /// Returns `true` for revision conflicts raised locally or by the backend.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::Store(StoreError::Conflict { .. })
        )
    }
}

/// Result alias for mapping operations.
pub type OrmResult<T> = Result<T, OrmError>;
