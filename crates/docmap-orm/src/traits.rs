use std::sync::{Arc, Weak};

use serde_json::Value;

use docmap_types::{DocumentRow, Properties, Revision};

use crate::document::Document;
use crate::error::OrmResult;
use crate::mapper::ClassMapper;

/// The database a document resolves references against.
///
/// Sessions that own no documents hand out [`DbHandle::Shared`]. Caches that
/// hold their documents hand out [`DbHandle::Scoped`] so the documents do
/// not keep their cache alive; a scoped handle whose cache is gone behaves
/// like no handle at all.
#[derive(Clone)]
pub enum DbHandle {
    Shared(Arc<dyn DocumentStore>),
    Scoped(Weak<dyn DocumentStore>),
}

impl DbHandle {
    pub fn upgrade(&self) -> Option<Arc<dyn DocumentStore>> {
        match self {
            Self::Shared(store) => Some(Arc::clone(store)),
            Self::Scoped(store) => store.upgrade(),
        }
    }
}

impl std::fmt::Debug for DbHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shared(_) => f.write_str("DbHandle::Shared"),
            Self::Scoped(w) => write!(f, "DbHandle::Scoped(live: {})", w.strong_count() > 0),
        }
    }
}

/// Everything a [`Document`] needs from a database.
///
/// The `*_row` methods are the raw contract and never run document logic.
/// The object-level methods build documents through the store's
/// [`ClassMapper`] and attach them to [`DocumentStore::handle`].
pub trait DocumentStore: Send + Sync {
    /// The registry used to pick a class for each stored row.
    fn mapper(&self) -> &ClassMapper;

    /// Handle attached to documents loaded or saved through this store.
    fn handle(&self) -> DbHandle;

    fn get_row(&self, key: &str, type_name: Option<&str>) -> OrmResult<Option<DocumentRow>>;

    fn set_row(&self, key: &str, value: &Properties, rev: Option<&Revision>) -> OrmResult<DocumentRow>;

    fn delete_row(&self, key: &str, rev: Option<&Revision>, type_name: Option<&str>) -> OrmResult<()>;

    /// Load the document stored under `key`.
    fn get(&self, key: &str) -> OrmResult<Option<Document>>;

    /// Documents whose value in `view` equals `key`.
    fn query_view(&self, view: &str, key: &Value) -> OrmResult<Vec<Document>>;

    /// Persist `doc`.
    fn put(&self, doc: &Document) -> OrmResult<()>;

    /// Delete `doc`, running its hooks and reference cleanup.
    fn delete(&self, doc: &Document) -> OrmResult<()>;

    /// Delete the document stored under `key`, if any.
    fn delete_key(&self, key: &str) -> OrmResult<()>;

    /// Documents whose foreign key points at `key`, through the view
    /// generated for reference field `field` declared on `(namespace, owner_type)`.
    fn get_refs_from(
        &self,
        namespace: &str,
        owner_type: &str,
        field: &str,
        key: &str,
    ) -> OrmResult<Vec<Document>> {
        let view = ClassMapper::field_view_name(namespace, owner_type, field);
        self.query_view(&view, &Value::String(key.to_string()))
    }
}
