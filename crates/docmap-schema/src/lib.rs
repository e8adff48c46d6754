//! Field descriptors and model schemas for docmap.
//!
//! A model is declared once, at startup, as an immutable [`ModelSchema`]:
//! the builder merges the fields inherited from base schemas with the
//! model's own declarations, validates them, and derives the lowercase type
//! discriminator. Documents consult the schema on every property access.
//!
//! # Key Types
//!
//! - [`Field`] -- Declarative descriptor for one property
//! - [`FieldKind`] -- The value shape a field accepts
//! - [`ModelSchema`] -- Merged field table plus model-level flags
//! - [`ObjectCodec`] -- Normalizer for nested value objects

pub mod codec;
pub mod error;
pub mod field;
pub mod format;
pub mod model;

pub use codec::{ObjectCodec, SerdeCodec};
pub use error::{SchemaError, SchemaResult};
pub use field::{DefaultValue, Field, FieldKind, ReferenceFrom, ReferenceTo};
pub use model::{ModelSchema, ModelSchemaBuilder};
