//! A [`DocumentStore`] over a storage [`Backend`].

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use docmap_store::{Backend, InMemoryBackend};
use docmap_types::{DocumentRow, Properties, Revision, ALL_VIEW_NAME, RAW_DESIGN};

use crate::document::{Document, SaveOutcome};
use crate::error::{OrmError, OrmResult};
use crate::mapper::{ClassMapper, ModelClass};
use crate::traits::{DbHandle, DocumentStore};

/// A database session: a backend plus the class registry used to turn its
/// rows into documents.
///
/// Cloning is cheap and clones share the backend.
#[derive(Clone)]
pub struct Database {
    backend: Arc<dyn Backend>,
    mapper: Arc<ClassMapper>,
}

impl Database {
    pub fn new(backend: Arc<dyn Backend>, mapper: Arc<ClassMapper>) -> Self {
        Self { backend, mapper }
    }

    /// A fresh in-memory database with the mapper's views installed.
    pub fn in_memory(mapper: Arc<ClassMapper>) -> OrmResult<Self> {
        let db = Self::new(Arc::new(InMemoryBackend::new()), mapper);
        db.update_designs()?;
        Ok(db)
    }

    /// Install every view the mapper generates.
    pub fn update_designs(&self) -> OrmResult<()> {
        let views = self.mapper.view_definitions();
        self.backend.update_views(&views)?;
        info!(
            backend = self.backend.database_type(),
            views = views.len(),
            "installed view definitions"
        );
        Ok(())
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn mapper(&self) -> &Arc<ClassMapper> {
        &self.mapper
    }

    pub fn database_type(&self) -> &'static str {
        self.backend.database_type()
    }

    pub fn save(&self, doc: &Document) -> OrmResult<SaveOutcome> {
        doc.save(self)
    }

    /// Build a `class` document from `properties` and save it.
    pub fn create(&self, class: &ModelClass, properties: Properties) -> OrmResult<Document> {
        let doc = Document::create(class, None, properties)?;
        doc.save(self)?;
        Ok(doc)
    }

    /// Every stored document of `class` or one of its subclasses.
    ///
    /// The by-type view is keyed on the bare type name, so rows from other
    /// namespaces are skipped before they are loaded.
    pub fn all(&self, class: &ModelClass) -> OrmResult<Vec<Document>> {
        let view = format!("{RAW_DESIGN}/{ALL_VIEW_NAME}");
        let mut docs = Vec::new();
        for type_name in self
            .mapper
            .get_all_subclass_names(class.namespace(), class.type_name())
        {
            for row in self.backend.query_view(&view, &Value::String(type_name))? {
                let matches = self.mapper.class_for_row(&row).is_ok_and(|found| {
                    found
                        .schema()
                        .is_subclass_of(class.namespace(), class.type_name())
                });
                if matches {
                    docs.push(self.load(row)?);
                }
            }
        }
        Ok(docs)
    }

    /// The single document of `class` whose unique `field` equals `value`.
    ///
    /// More than one match means storage already violates the constraint
    /// and is reported as [`OrmError::Unique`].
    pub fn get_unique_instance(
        &self,
        class: &ModelClass,
        field: &str,
        value: &Value,
    ) -> OrmResult<Option<Document>> {
        let schema = class.schema();
        if !schema.field(field).is_some_and(|f| f.is_unique()) {
            return Err(OrmError::Validation {
                class: schema.class_name().to_string(),
                field: field.to_string(),
                reason: "not a unique field".into(),
            });
        }
        let (namespace, owner) = schema
            .field_owner(field)
            .unwrap_or((schema.namespace(), schema.type_name()));
        let view = ClassMapper::field_view_name(namespace, owner, field);
        let mut found = self.query_view(&view, value)?;
        match found.len() {
            0 => Ok(None),
            1 => Ok(found.pop()),
            _ => Err(OrmError::Unique {
                class: schema.class_name().to_string(),
                field: field.to_string(),
                value: value.to_string(),
                existing: found[1].key(),
            }),
        }
    }

    /// Typed documents changed after sequence `since`, with the sequence to
    /// resume from. Deletions and untyped rows are skipped.
    pub fn changes(&self, since: Option<u64>, limit: Option<usize>) -> OrmResult<(u64, Vec<Document>)> {
        let page = self.backend.changes(since, limit)?;
        let docs = page
            .rows
            .into_iter()
            .filter(|row| row.type_name().is_some())
            .map(|row| self.load(row))
            .collect::<OrmResult<Vec<_>>>()?;
        debug!(last_seq = page.last_seq, count = docs.len(), "read changes");
        Ok((page.last_seq, docs))
    }

    fn load(&self, row: DocumentRow) -> OrmResult<Document> {
        Document::from_row(&self.mapper, row, Some(self.handle()))
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("backend", &self.backend.database_type())
            .field("classes", &self.mapper.classes().count())
            .finish()
    }
}

impl DocumentStore for Database {
    fn mapper(&self) -> &ClassMapper {
        &self.mapper
    }

    fn handle(&self) -> DbHandle {
        DbHandle::Shared(Arc::new(self.clone()))
    }

    fn get_row(&self, key: &str, type_name: Option<&str>) -> OrmResult<Option<DocumentRow>> {
        Ok(self.backend.get(key, type_name)?)
    }

    fn set_row(&self, key: &str, value: &Properties, rev: Option<&Revision>) -> OrmResult<DocumentRow> {
        Ok(self.backend.set(key, value, rev)?)
    }

    fn delete_row(&self, key: &str, rev: Option<&Revision>, type_name: Option<&str>) -> OrmResult<()> {
        Ok(self.backend.delete(key, rev, type_name)?)
    }

    fn get(&self, key: &str) -> OrmResult<Option<Document>> {
        self.backend
            .get(key, None)?
            .map(|row| self.load(row))
            .transpose()
    }

    fn query_view(&self, view: &str, key: &Value) -> OrmResult<Vec<Document>> {
        self.backend
            .query_view(view, key)?
            .into_iter()
            .map(|row| self.load(row))
            .collect()
    }

    fn put(&self, doc: &Document) -> OrmResult<()> {
        doc.save(self).map(drop)
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
