use serde::{Deserialize, Serialize};
use serde_json::Value;

use docmap_types::{DocumentRow, Properties, Revision, ViewDefinition};

use crate::error::{StoreError, StoreResult};

/// One page of the changes feed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangesPage {
    /// Cursor to pass as `since` for the next page.
    pub last_seq: u64,
    /// Live documents changed in this page. Deletions advance the cursor
    /// but carry no row.
    pub rows: Vec<DocumentRow>,
}

/// The capability contract the mapper consumes.
///
/// All implementations must satisfy these invariants:
/// - `set` on an existing key succeeds only when `rev` equals the stored
///   revision; `set` on a missing key succeeds only when `rev` is `None`.
/// - `delete` with `Some(rev)` is preconditioned the same way; `None`
///   deletes unconditionally.
/// - Every successful write returns the stored row with its new revision.
/// - `query_view` accepts the `design/name` form of a view name.
pub trait Backend: Send + Sync {
    /// Short name identifying the backend kind (`"memory"`, `"null"`, ...).
    fn database_type(&self) -> &'static str;

    /// Fetch a stored document. `type_name` is a routing hint for backends
    /// that keep one collection per type.
    ///
    /// Returns `Ok(None)` if the document does not exist.
    fn get(&self, key: &str, type_name: Option<&str>) -> StoreResult<Option<DocumentRow>>;

    /// Persist a document body under `key`, preconditioned on `rev`.
    fn set(&self, key: &str, value: &Properties, rev: Option<&Revision>) -> StoreResult<DocumentRow>;

    /// Remove a document, preconditioned on `rev` when given.
    fn delete(&self, key: &str, rev: Option<&Revision>, type_name: Option<&str>) -> StoreResult<()>;

    /// Rows whose indexed value for `view` equals `key`.
    fn query_view(&self, view: &str, key: &Value) -> StoreResult<Vec<DocumentRow>>;

    /// Install or replace view definitions.
    fn update_views(&self, views: &[ViewDefinition]) -> StoreResult<()>;

    /// Incremental feed of changes after `since`.
    ///
    /// Default implementation reports the operation as unsupported.
    fn changes(&self, since: Option<u64>, limit: Option<usize>) -> StoreResult<ChangesPage> {
        let _ = (since, limit);
        Err(StoreError::Unsupported {
            backend: self.database_type(),
            operation: "changes",
        })
    }
}
