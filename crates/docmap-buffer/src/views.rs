//! In-memory emulation of the backend's secondary-index views.
//!
//! Each view keeps a forward index (`emitted key -> document key -> doc`)
//! and a reverse index (`document key -> emitted key`). Re-indexing a
//! document compares its freshly emitted key against the reverse index and
//! moves the document between buckets only when the key changed.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use docmap_orm::{ClassMapper, Document};
use docmap_types::{clean_view_name, ViewDefinition, ViewKey};

type Bucket = IndexMap<String, Document>;

/// Secondary indexes over buffered documents, one per view definition.
#[derive(Default)]
pub struct BufferViews {
    /// Definitions keyed by their flattened name.
    views: IndexMap<String, ViewDefinition>,
    indexes: HashMap<String, HashMap<ViewKey, Bucket>>,
    reverse_indexes: HashMap<String, HashMap<String, ViewKey>>,
}

impl BufferViews {
    pub fn new(views: impl IntoIterator<Item = ViewDefinition>) -> Self {
        Self {
            views: views
                .into_iter()
                .map(|view| (view.index_name(), view))
                .collect(),
            ..Self::default()
        }
    }

    /// Indexes for every view the mapper generates.
    pub fn for_mapper(mapper: &ClassMapper) -> Self {
        Self::new(mapper.view_definitions())
    }

    /// Flattened names of all known views.
    pub fn view_names(&self) -> impl Iterator<Item = &str> {
        self.views.keys().map(String::as_str)
    }

    /// Flattened names of the views currently holding at least one document.
    pub fn index_names(&self) -> Vec<&str> {
        self.views
            .keys()
            .filter(|name| self.reverse_indexes.get(*name).is_some_and(|r| !r.is_empty()))
            .map(String::as_str)
            .collect()
    }

    /// (Re-)index `doc` under every view.
    pub fn index_obj(&mut self, doc: &Document) {
        let key = doc.key();
        let properties = doc.raw_properties();
        for (name, view) in &self.views {
            let emitted = view.emit_key(&properties);
            let reverse = self.reverse_indexes.entry(name.clone()).or_default();
            let index = self.indexes.entry(name.clone()).or_default();

            if let Some(previous) = reverse.get(&key).cloned() {
                if Some(&previous) == emitted.as_ref() {
                    // Same bucket; keep the instance current.
                    if let Some(bucket) = index.get_mut(&previous) {
                        bucket.insert(key.clone(), doc.clone());
                    }
                    continue;
                }
                if let Some(bucket) = index.get_mut(&previous) {
                    bucket.shift_remove(&key);
                    if bucket.is_empty() {
                        index.remove(&previous);
                    }
                }
                reverse.remove(&key);
                debug!(view = %name, key = %key, from = previous.as_str(), "unindexed stale key");
            }

            if let Some(emitted) = emitted {
                index
                    .entry(emitted.clone())
                    .or_default()
                    .insert(key.clone(), doc.clone());
                reverse.insert(key.clone(), emitted);
            }
        }
    }

    /// Documents under `key` in `view`, which may be given as `design/name`
    /// or already flattened. Unknown views and keys yield nothing.
    pub fn query_view(&self, view: &str, key: &Value) -> Vec<Document> {
        self.indexes
            .get(&clean_view_name(view))
            .and_then(|index| index.get(&ViewKey::from_value(key)))
            .map(|bucket| bucket.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop the document stored under `doc_key` from every view.
    pub fn remove_from_indexes(&mut self, doc_key: &str) {
        for (name, reverse) in &mut self.reverse_indexes {
            let Some(previous) = reverse.remove(doc_key) else {
                continue;
            };
            if let Some(index) = self.indexes.get_mut(name) {
                if let Some(bucket) = index.get_mut(&previous) {
                    bucket.shift_remove(doc_key);
                    if bucket.is_empty() {
                        index.remove(&previous);
                    }
                }
            }
        }
    }

    /// Forget every indexed document. View definitions are kept.
    pub fn clear_indexes(&mut self) {
        self.indexes.clear();
        self.reverse_indexes.clear();
    }
}

impl std::fmt::Debug for BufferViews {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferViews")
            .field("views", &self.views.len())
            .field("indexed", &self.index_names())
            .finish()
    }
}
