//! Document storage for docmap.
//!
//! This crate defines the narrow contract every document database must
//! satisfy for the mapper to use it: keyed get/set/delete with revision
//! preconditions, secondary-index queries over installed views, and an
//! optional changes feed. Wire clients for real databases live outside
//! this workspace and implement the same trait.
//!
//! # Storage Backends
//!
//! All backends implement the [`Backend`] trait:
//!
//! - [`InMemoryBackend`] -- `HashMap`-based store for tests and embedding
//! - [`NullBackend`] -- stores nothing; used under a write buffer
//!
//! # Design Rules
//!
//! 1. Bodies never carry backend bookkeeping (`_id`, `_rev`).
//! 2. A write that presents the wrong revision is a conflict, never a merge.
//! 3. View queries return rows sorted by key.
//! 4. All errors are propagated, never silently ignored.

pub mod error;
pub mod memory;
pub mod null;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryBackend;
pub use null::NullBackend;
pub use traits::{Backend, ChangesPage};
