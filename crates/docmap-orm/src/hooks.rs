//! Per-model lifecycle callbacks.

use docmap_types::{DocumentRow, Properties};

use crate::document::Document;
use crate::error::OrmResult;
use crate::traits::DocumentStore;

/// Callbacks run around a document's persistence operations.
///
/// Every method defaults to a no-op. An error returned from a `pre_*` hook
/// aborts the operation before anything is written; an error from a `post_*`
/// hook is returned to the caller after the write has happened.
pub trait DocumentHooks: Send + Sync {
    fn pre_save_new(&self, _doc: &Document, _db: &dyn DocumentStore) -> OrmResult<()> {
        Ok(())
    }

    fn post_save_new(&self, _doc: &Document, _db: &dyn DocumentStore) -> OrmResult<()> {
        Ok(())
    }

    /// `old_properties` is the body currently in storage.
    fn pre_save_update(
        &self,
        _doc: &Document,
        _db: &dyn DocumentStore,
        _old_properties: &Properties,
    ) -> OrmResult<()> {
        Ok(())
    }

    fn post_save_update(&self, _doc: &Document, _db: &dyn DocumentStore) -> OrmResult<()> {
        Ok(())
    }

    fn pre_delete(&self, _doc: &Document, _db: &dyn DocumentStore) -> OrmResult<()> {
        Ok(())
    }

    fn post_delete(&self, _doc: &Document, _db: &dyn DocumentStore) -> OrmResult<()> {
        Ok(())
    }

    /// Called when `doc` is saved over a newer stored revision. Returning
    /// `true` approves overwriting `stored`; the hook may first merge
    /// `stored` into `doc`.
    fn resolve_conflict(
        &self,
        _doc: &Document,
        _db: &dyn DocumentStore,
        _stored: &DocumentRow,
    ) -> OrmResult<bool> {
        Ok(false)
    }
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl DocumentHooks for NoHooks {}
