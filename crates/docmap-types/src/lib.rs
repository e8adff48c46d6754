//! Shared vocabulary for the docmap object-document mapper.
//!
//! Every other docmap crate depends on `docmap-types`. It holds the small,
//! backend-independent units the mapper and its storage adapters exchange.
//!
//! # Key Types
//!
//! - [`Revision`] -- Opaque optimistic-concurrency token
//! - [`DocumentRow`] -- Normalized `(key, rev, value)` unit returned by backends
//! - [`ViewDefinition`] -- A "by type" or "by field" secondary index description
//! - [`ViewKey`] -- Hashable, canonical form of an indexed JSON value

pub mod constants;
pub mod error;
pub mod revision;
pub mod row;
pub mod view;

pub use constants::{
    DEFAULT_NAMESPACE, NAMESPACE_PROPERTY, RESERVED_PROPERTY_NAMES, TYPE_PROPERTY,
};
pub use error::TypeError;
pub use revision::Revision;
pub use row::DocumentRow;
pub use view::{clean_view_name, ViewDefinition, ViewEmit, ViewKey, ALL_VIEW_NAME, RAW_DESIGN};

/// A JSON object: the shape of every stored document body.
pub type Properties = serde_json::Map<String, serde_json::Value>;
