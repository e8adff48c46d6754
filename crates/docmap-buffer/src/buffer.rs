//! The identity-preserving write buffer.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use tracing::{debug, info};

use docmap_orm::{
    ClassMapper, Database, DbHandle, Document, DocumentStore, OrmError, OrmResult,
};
use docmap_store::{NullBackend, StoreError};
use docmap_types::{DocumentRow, Properties, Revision};

use crate::views::BufferViews;

struct BufferState {
    /// One live instance per key.
    store: IndexMap<String, Document>,
    /// Keys explicitly `put`, in put order.
    pending: IndexSet<String>,
    views: BufferViews,
}

struct BufferInner {
    db: Arc<dyn DocumentStore>,
    state: RwLock<BufferState>,
    this: Weak<BufferInner>,
}

/// A session-scoped cache in front of a [`DocumentStore`].
///
/// Within one buffer every read of a key yields the same [`Document`]
/// instance; newer revisions fetched from the underlying store are copied
/// into that instance rather than replacing it. Writes made with
/// [`DocumentStore::put`] are held until [`WriteBuffer::flush`], while
/// [`BufferViews`] answer view queries so buffered documents are visible to
/// reference lookups and uniqueness checks before they are written.
///
/// Documents read or put through the buffer hold only a weak handle to it.
/// Dropping the buffer without flushing discards pending writes.
#[derive(Clone)]
pub struct WriteBuffer {
    inner: Arc<BufferInner>,
}

impl WriteBuffer {
    /// A buffer over `db`.
    pub fn new(db: Arc<dyn DocumentStore>) -> Self {
        let views = BufferViews::for_mapper(db.mapper());
        let inner = Arc::new_cyclic(|this| BufferInner {
            db,
            state: RwLock::new(BufferState {
                store: IndexMap::new(),
                pending: IndexSet::new(),
                views,
            }),
            this: this.clone(),
        });
        Self { inner }
    }

    /// A purely in-memory session: a buffer over a database that stores
    /// nothing.
    pub fn in_memory(mapper: Arc<ClassMapper>) -> Self {
        Self::new(Arc::new(Database::new(Arc::new(NullBackend), mapper)))
    }

    /// The store writes are flushed to.
    pub fn underlying(&self) -> &Arc<dyn DocumentStore> {
        &self.inner.db
    }

    /// Number of cached documents.
    pub fn len(&self) -> usize {
        self.inner.state().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state().store.is_empty()
    }

    /// Returns `true` if `key` has been put and not yet flushed.
    pub fn is_pending(&self, key: &str) -> bool {
        self.inner.state().pending.contains(key)
    }

    /// Write every pending document to the underlying store in put order,
    /// then end the scope: indexes are cleared and cached documents are
    /// re-attached to the underlying store. Returns the number written.
    ///
    /// If a write fails, it and the writes after it stay pending.
    pub fn flush(&self) -> OrmResult<usize> {
        self.inner.flush()
    }
}

impl std::fmt::Debug for WriteBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state();
        f.debug_struct("WriteBuffer")
            .field("cached", &state.store.len())
            .field("pending", &state.pending.len())
            .field("views", &state.views)
            .finish()
    }
}

impl BufferInner {
    fn state(&self) -> RwLockReadGuard<'_, BufferState> {
        self.state.read().expect("lock poisoned")
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, BufferState> {
        self.state.write().expect("lock poisoned")
    }

    /// Merge a freshly fetched copy into the cache, returning the cached
    /// instance for its key. Pending instances are never overwritten, so a
    /// stale revision still surfaces as a conflict at flush.
    fn refresh_cache(&self, key: &str, fetched: Option<Document>) -> Option<Document> {
        let mut state = self.state_mut();
        let cached = state.store.get(key).cloned();
        match (cached, fetched) {
            (Some(cached), Some(_)) if state.pending.contains(key) => Some(cached),
            (Some(cached), Some(fetched)) => {
                if cached.refresh_from(&fetched) {
                    debug!(key = %key, rev = ?cached.rev(), "refreshed cached document");
                    state.views.index_obj(&cached);
                }
                Some(cached)
            }
            (Some(cached), None) => Some(cached),
            (None, Some(fetched)) => {
                fetched.attach(self.handle());
                state.views.index_obj(&fetched);
                state.store.insert(key.to_string(), fetched.clone());
                Some(fetched)
            }
            (None, None) => None,
        }
    }

    /// Drop `key` from the cache, the pending set and the indexes.
    fn evict(&self, key: &str) {
        let mut state = self.state_mut();
        state.store.shift_remove(key);
        state.views.remove_from_indexes(key);
        state.pending.shift_remove(key);
    }

    fn flush(&self) -> OrmResult<usize> {
        let pending: Vec<(String, Document)> = {
            let mut state = self.state_mut();
            let keys: Vec<String> = state.pending.drain(..).collect();
            keys.into_iter()
                .filter_map(|key| state.store.get(&key).cloned().map(|doc| (key, doc)))
                .collect()
        };

        for (written, (key, doc)) in pending.iter().enumerate() {
            doc.attach(self.db.handle());
            if let Err(err) = self.db.put(doc) {
                let mut state = self.state_mut();
                for (key, doc) in &pending[written..] {
                    doc.attach(self.handle());
                    state.pending.insert(key.clone());
                }
                debug!(key = %key, error = %err, "flush stopped");
                return Err(err);
            }
        }

        let mut state = self.state_mut();
        state.views.clear_indexes();
        let handle = self.db.handle();
        for doc in state.store.values() {
            doc.attach(handle.clone());
        }
        state.store.clear();
        info!(written = pending.len(), "flushed write buffer");
        Ok(pending.len())
    }
}

impl DocumentStore for BufferInner {
    fn mapper(&self) -> &ClassMapper {
        self.db.mapper()
    }

    fn handle(&self) -> DbHandle {
        let this: Weak<dyn DocumentStore> = self.this.clone();
        DbHandle::Scoped(this)
    }

    fn get_row(&self, key: &str, type_name: Option<&str>) -> OrmResult<Option<DocumentRow>> {
        self.db.get_row(key, type_name)
    }

    /// Writes through, then re-indexes the cached instance.
    fn set_row(&self, key: &str, value: &Properties, rev: Option<&Revision>) -> OrmResult<DocumentRow> {
        let row = self.db.set_row(key, value, rev)?;
        let mut state = self.state_mut();
        if let Some(cached) = state.store.get(key).cloned() {
            state.views.index_obj(&cached);
        }
        Ok(row)
    }

    /// Deletes in the underlying store, then evicts. A key that was only
    /// ever buffered has nothing to delete there. On failure the cache and
    /// pending set are left as they were.
    fn delete_row(&self, key: &str, rev: Option<&Revision>, type_name: Option<&str>) -> OrmResult<()> {
        let was_pending = self.state().pending.contains(key);
        match self.db.delete_row(key, rev, type_name) {
            Ok(()) => {}
            Err(OrmError::Store(StoreError::NotFound(_))) if was_pending => {}
            Err(err) => return Err(err),
        }
        self.evict(key);
        Ok(())
    }

    fn get(&self, key: &str) -> OrmResult<Option<Document>> {
        {
            let state = self.state();
            if state.pending.contains(key) {
                return Ok(state.store.get(key).cloned());
            }
        }
        let fetched = self.db.get(key)?;
        Ok(self.refresh_cache(key, fetched))
    }

    fn query_view(&self, view: &str, key: &Value) -> OrmResult<Vec<Document>> {
        for doc in self.db.query_view(view, key)? {
            let doc_key = doc.key();
            self.refresh_cache(&doc_key, Some(doc));
        }
        Ok(self.state().views.query_view(view, key))
    }

    fn put(&self, doc: &Document) -> OrmResult<()> {
        let key = doc.key();
        let mut state = self.state_mut();
        if let Some(cached) = state.store.get(&key) {
            if !cached.same_instance(doc) {
                return Err(OrmError::BufferIdentity(key));
            }
        }
        doc.attach(self.handle());
        state.views.index_obj(doc);
        state.store.insert(key.clone(), doc.clone());
        state.pending.insert(key.clone());
        debug!(key = %key, pending = state.pending.len(), "buffered document");
        Ok(())
    }

    fn delete(&self, doc: &Document) -> OrmResult<()> {
        doc.delete(self)
    }

    fn delete_key(&self, key: &str) -> OrmResult<()> {
        match self.get(key)? {
            Some(doc) => doc.delete(self),
            None => Ok(()),
        }
    }
}

impl DocumentStore for WriteBuffer {
    fn mapper(&self) -> &ClassMapper {
        self.inner.mapper()
    }

    fn handle(&self) -> DbHandle {
        self.inner.handle()
    }

    fn get_row(&self, key: &str, type_name: Option<&str>) -> OrmResult<Option<DocumentRow>> {
        self.inner.get_row(key, type_name)
    }

    fn set_row(&self, key: &str, value: &Properties, rev: Option<&Revision>) -> OrmResult<DocumentRow> {
        self.inner.set_row(key, value, rev)
    }

    fn delete_row(&self, key: &str, rev: Option<&Revision>, type_name: Option<&str>) -> OrmResult<()> {
        self.inner.delete_row(key, rev, type_name)
    }

    fn get(&self, key: &str) -> OrmResult<Option<Document>> {
        self.inner.get(key)
    }

    fn query_view(&self, view: &str, key: &Value) -> OrmResult<Vec<Document>> {
        self.inner.query_view(view, key)
    }

    fn put(&self, doc: &Document) -> OrmResult<()> {
        self.inner.put(doc)
    }

    fn delete(&self, doc: &Document) -> OrmResult<()> {
        self.inner.delete(doc)
    }

    fn delete_key(&self, key: &str) -> OrmResult<()> {
        self.inner.delete_key(key)
    }
}

/// Run `f` against a fresh buffer over `db`, flushing if it succeeds.
pub fn buffered<S, T, F>(db: &S, f: F) -> OrmResult<T>
where
    S: DocumentStore + Clone + 'static,
    F: FnOnce(&WriteBuffer) -> OrmResult<T>,
{
    let buffer = WriteBuffer::new(Arc::new(db.clone()));
    let out = f(&buffer)?;
    buffer.flush()?;
    Ok(out)
}
