use serde_json::Value;

use docmap_types::{DocumentRow, Properties, Revision, ViewDefinition};

use crate::error::StoreResult;
use crate::traits::{Backend, ChangesPage};

/// A backend that stores nothing.
///
/// Writes succeed and echo the row back unchanged, reads miss, and views
/// are always empty. Running a write buffer over it gives a purely
/// in-memory document session.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

impl NullBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for NullBackend {
    fn database_type(&self) -> &'static str {
        "null"
    }

    fn get(&self, _key: &str, _type_name: Option<&str>) -> StoreResult<Option<DocumentRow>> {
        Ok(None)
    }

    fn set(&self, key: &str, value: &Properties, rev: Option<&Revision>) -> StoreResult<DocumentRow> {
        Ok(DocumentRow::new(key, rev.cloned(), value.clone()))
    }

    fn delete(&self, _key: &str, _rev: Option<&Revision>, _type_name: Option<&str>) -> StoreResult<()> {
        Ok(())
    }

    fn query_view(&self, _view: &str, _key: &Value) -> StoreResult<Vec<DocumentRow>> {
        Ok(Vec::new())
    }

    fn update_views(&self, _views: &[ViewDefinition]) -> StoreResult<()> {
        Ok(())
    }

    fn changes(&self, since: Option<u64>, _limit: Option<usize>) -> StoreResult<ChangesPage> {
        Ok(ChangesPage {
            last_seq: since.unwrap_or(0),
            rows: Vec::new(),
        })
    }
}
