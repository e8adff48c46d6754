use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde_json::Value;
use tracing::debug;

use docmap_types::{DocumentRow, Properties, Revision, ViewDefinition, ViewKey};

use crate::error::{StoreError, StoreResult};
use crate::traits::{Backend, ChangesPage};

/// In-memory, HashMap-based document store.
///
/// Intended for tests and embedding. Revisions are minted as
/// `<generation>-<digest>` and survive deletion, so a document recreated
/// under a deleted key never reuses an old revision. Views are evaluated by
/// scanning, which is fine for the working-set sizes this backend targets.
pub struct InMemoryBackend {
    read_only: bool,
    inner: RwLock<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    docs: HashMap<String, DocumentRow>,
    tombstones: HashMap<String, u64>,
    views: HashMap<String, ViewDefinition>,
    seq: u64,
    changes: BTreeMap<u64, String>,
    last_change: HashMap<String, u64>,
}

impl MemoryState {
    fn record_change(&mut self, key: &str) -> u64 {
        self.seq += 1;
        if let Some(previous) = self.last_change.insert(key.to_string(), self.seq) {
            self.changes.remove(&previous);
        }
        self.changes.insert(self.seq, key.to_string());
        self.seq
    }

    fn next_generation(&self, key: &str) -> u64 {
        let current = match self.docs.get(key) {
            Some(row) => row.rev.as_ref().and_then(Revision::generation).unwrap_or(0),
            None => self.tombstones.get(key).copied().unwrap_or(0),
        };
        current + 1
    }
}

impl InMemoryBackend {
    /// Create a new empty, writable store.
    pub fn new() -> Self {
        Self {
            read_only: false,
            inner: RwLock::new(MemoryState::default()),
        }
    }

    /// Reject every write with [`StoreError::ReadOnly`].
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Number of live documents.
    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").docs.len()
    }

    /// Returns `true` if no live documents are stored.
    pub fn is_empty(&self) -> bool {
        self.inner.read().expect("lock poisoned").docs.is_empty()
    }

    /// Sorted keys of all live documents.
    pub fn keys(&self) -> Vec<String> {
        let state = self.inner.read().expect("lock poisoned");
        let mut keys: Vec<String> = state.docs.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Sorted `design/name` of every installed view.
    pub fn view_names(&self) -> Vec<String> {
        let state = self.inner.read().expect("lock poisoned");
        let mut names: Vec<String> = state.views.keys().cloned().collect();
        names.sort();
        names
    }

    /// Current update sequence.
    pub fn update_seq(&self) -> u64 {
        self.inner.read().expect("lock poisoned").seq
    }

    /// Every live document as a CouchDB-style body (`_id`/`_rev` inline),
    /// sorted by key.
    pub fn export(&self) -> Vec<Value> {
        let state = self.inner.read().expect("lock poisoned");
        let mut rows: Vec<&DocumentRow> = state.docs.values().collect();
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        rows.into_iter().map(DocumentRow::to_couchdb_json).collect()
    }

    /// Load CouchDB-style bodies, replacing any live document under the same
    /// key. Stored revisions are kept; bodies without one get a fresh
    /// revision. Nothing is written unless every body decodes.
    pub fn import(&self, docs: impl IntoIterator<Item = Value>) -> StoreResult<usize> {
        self.check_writable()?;
        let rows = docs
            .into_iter()
            .map(DocumentRow::from_couchdb_json)
            .collect::<Result<Vec<_>, _>>()?;

        let mut state = self.inner.write().expect("lock poisoned");
        for mut row in rows.iter().cloned() {
            if row.rev.is_none() {
                let body = serde_json::to_vec(&row.value)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                row.rev = Some(Revision::derive(state.next_generation(&row.key), &body));
            }
            state.tombstones.remove(&row.key);
            let key = row.key.clone();
            state.docs.insert(key.clone(), row);
            state.record_change(&key);
        }
        debug!(count = rows.len(), seq = state.seq, "documents imported");
        Ok(rows.len())
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for InMemoryBackend {
    fn database_type(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &str, _type_name: Option<&str>) -> StoreResult<Option<DocumentRow>> {
        let state = self.inner.read().expect("lock poisoned");
        Ok(state.docs.get(key).cloned())
    }

    fn set(&self, key: &str, value: &Properties, rev: Option<&Revision>) -> StoreResult<DocumentRow> {
        self.check_writable()?;
        let body = serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut state = self.inner.write().expect("lock poisoned");
        let stored = state.docs.get(key).and_then(|row| row.rev.clone());
        let exists = state.docs.contains_key(key);
        let accepted = if exists {
            rev.is_some() && rev == stored.as_ref()
        } else {
            rev.is_none()
        };
        if !accepted {
            return Err(StoreError::Conflict {
                key: key.to_string(),
                expected: rev.cloned(),
                actual: stored,
            });
        }

        let generation = state.next_generation(key);
        let row = DocumentRow::new(key, Some(Revision::derive(generation, &body)), value.clone());
        state.docs.insert(key.to_string(), row.clone());
        state.tombstones.remove(key);
        let seq = state.record_change(key);
        debug!(key, generation, seq, "document stored");
        Ok(row)
    }

    fn delete(&self, key: &str, rev: Option<&Revision>, _type_name: Option<&str>) -> StoreResult<()> {
        self.check_writable()?;
        let mut state = self.inner.write().expect("lock poisoned");
        let Some(row) = state.docs.get(key) else {
            return Err(StoreError::NotFound(key.to_string()));
        };
        if let Some(rev) = rev {
            if row.rev.as_ref() != Some(rev) {
                return Err(StoreError::Conflict {
                    key: key.to_string(),
                    expected: Some(rev.clone()),
                    actual: row.rev.clone(),
                });
            }
        }
        let generation = row.rev.as_ref().and_then(Revision::generation).unwrap_or(0);
        state.docs.remove(key);
        state.tombstones.insert(key.to_string(), generation + 1);
        let seq = state.record_change(key);
        debug!(key, seq, "document deleted");
        Ok(())
    }

    fn query_view(&self, view: &str, key: &Value) -> StoreResult<Vec<DocumentRow>> {
        let state = self.inner.read().expect("lock poisoned");
        let definition = state
            .views
            .get(view)
            .ok_or_else(|| StoreError::UnknownView(view.to_string()))?;
        let wanted = ViewKey::from_value(key);
        let mut rows: Vec<DocumentRow> = state
            .docs
            .values()
            .filter(|row| definition.emit_key(&row.value).as_ref() == Some(&wanted))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(rows)
    }

    fn update_views(&self, views: &[ViewDefinition]) -> StoreResult<()> {
        let mut state = self.inner.write().expect("lock poisoned");
        for view in views {
            state.views.insert(view.full_name(), view.clone());
        }
        debug!(count = views.len(), "views installed");
        Ok(())
    }

    fn changes(&self, since: Option<u64>, limit: Option<usize>) -> StoreResult<ChangesPage> {
        let state = self.inner.read().expect("lock poisoned");
        let start = since.map_or(0, |s| s.saturating_add(1));
        let limit = limit.unwrap_or(usize::MAX);

        let mut page = ChangesPage {
            last_seq: state.seq.max(since.unwrap_or(0)),
            rows: Vec::new(),
        };
        let mut taken = 0;
        for (seq, key) in state.changes.range(start..) {
            if taken == limit {
                break;
            }
            taken += 1;
            page.last_seq = *seq;
            if let Some(row) = state.docs.get(key) {
                page.rows.push(row.clone());
            }
        }
        if taken < limit {
            page.last_seq = state.seq.max(since.unwrap_or(0));
        }
        Ok(page)
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("document_count", &self.len())
            .field("read_only", &self.read_only)
            .finish()
    }
}
