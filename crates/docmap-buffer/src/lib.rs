//! Write buffering for docmap sessions.
//!
//! A [`WriteBuffer`] sits in front of any
//! [`DocumentStore`](docmap_orm::DocumentStore) and gives one scope of work
//! an identity cache (one live [`Document`](docmap_orm::Document) per key),
//! deferred writes, and in-memory [`BufferViews`] so buffered documents take
//! part in reference resolution and uniqueness checks before they are
//! written.
//!
//! # Key Types
//!
//! - [`WriteBuffer`] -- Identity-preserving cache with deferred writes
//! - [`BufferViews`] -- Incremental secondary indexes over buffered documents
//! - [`buffered`] -- Run a closure in a buffer and flush on success
//!
//! # Design Rules
//!
//! 1. Within a buffer, two reads of one key return the same instance.
//! 2. Only documents explicitly put are written at flush.
//! 3. Buffer indexes live for one buffer scope and are cleared at flush.

pub mod buffer;
pub mod views;

pub use buffer::{buffered, WriteBuffer};
pub use views::BufferViews;
