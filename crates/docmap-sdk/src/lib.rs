//! High-level docmap API.
//!
//! Re-exports every docmap subsystem behind one crate and adds the ambient
//! pieces an application needs to get started: TOML configuration
//! ([`DocmapConfig`]) and logging setup ([`init_tracing`]).
//!
//! ```no_run
//! use std::sync::Arc;
//! use docmap_sdk::{ClassMapper, DocmapConfig, Field, ModelClass, ModelSchema};
//!
//! # fn main() -> docmap_sdk::SdkResult<()> {
//! let config = DocmapConfig::load("docmap.toml")?;
//! docmap_sdk::init_tracing(&config.log)?;
//!
//! let person = ModelSchema::builder("Person")
//!     .namespace("example.com/people")
//!     .field("name", Field::string().required())
//!     .build()
//!     .map_err(docmap_sdk::OrmError::from)?;
//! let mapper = ClassMapper::new([ModelClass::new(person)])?;
//! let db = config.open(Arc::new(mapper))?;
//! # let _ = db;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod telemetry;

#[cfg(test)]
mod scenarios;

pub use config::{BackendKind, DocmapConfig, LogConfig};
pub use error::{SdkError, SdkResult};
pub use telemetry::init_tracing;

// Re-export key types
pub use docmap_buffer::{buffered, BufferViews, WriteBuffer};
pub use docmap_orm::{
    ClassMapper, Database, DbHandle, Document, DocumentHooks, DocumentStore, ModelClass, NoHooks,
    OrmError, OrmResult, Property, SaveOutcome,
};
pub use docmap_schema::{
    DefaultValue, Field, FieldKind, ModelSchema, ObjectCodec, ReferenceFrom, ReferenceTo,
    SchemaError, SerdeCodec,
};
pub use docmap_store::{Backend, ChangesPage, InMemoryBackend, NullBackend, StoreError};
pub use docmap_types::{DocumentRow, Properties, Revision, ViewDefinition, ViewKey};
