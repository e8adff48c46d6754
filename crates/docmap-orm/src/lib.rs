//! The object-document mapping core of docmap.
//!
//! Models are declared as [`ModelSchema`](docmap_schema::ModelSchema)s,
//! paired with lifecycle hooks into [`ModelClass`]es and registered with a
//! [`ClassMapper`]. A [`Document`] is a runtime instance of a model: every
//! property read and write is mediated by the model's field table, and
//! `save`/`delete` run the optimistic-concurrency, uniqueness, immutability
//! and reference-cascade rules against any [`DocumentStore`].
//!
//! # Key Types
//!
//! - [`ClassMapper`] -- Registry of models plus generated view definitions
//! - [`Document`] -- Shared handle to one document instance
//! - [`Database`] -- A [`DocumentStore`] over a storage [`Backend`](docmap_store::Backend)
//! - [`DocumentHooks`] -- Per-model lifecycle callbacks
//!
//! # Property Access
//!
//! [`Document::get`] distinguishes three outcomes that must never be
//! conflated: an unknown attribute is an error, a declared-but-unset field
//! is [`Property::Unset`], and reference fields resolve to documents.

pub mod database;
pub mod document;
pub mod error;
pub mod hooks;
pub mod mapper;
pub mod traits;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use database::Database;
pub use document::{Document, Property, SaveOutcome};
pub use error::{OrmError, OrmResult};
pub use hooks::{DocumentHooks, NoHooks};
pub use mapper::{ClassMapper, ModelClass};
pub use traits::{DbHandle, DocumentStore};
