//! The model registry.
//!
//! A [`ClassMapper`] is built once at startup and shared read-only
//! afterwards. Registration precomputes, for every `(namespace, type)`, the
//! set of registered types derived from it, so polymorphic reference and
//! uniqueness views cover every concrete subclass without scanning at query
//! time.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{json, Value};
use tracing::{debug, info};

use docmap_schema::ModelSchema;
use docmap_types::{clean_view_name, DocumentRow, ViewDefinition};

use crate::error::{OrmError, OrmResult};
use crate::hooks::{DocumentHooks, NoHooks};

/// A registered model: its schema plus its lifecycle hooks.
#[derive(Clone)]
pub struct ModelClass {
    schema: Arc<ModelSchema>,
    hooks: Arc<dyn DocumentHooks>,
}

impl ModelClass {
    pub fn new(schema: Arc<ModelSchema>) -> Self {
        Self::with_hooks(schema, NoHooks)
    }

    pub fn with_hooks(schema: Arc<ModelSchema>, hooks: impl DocumentHooks + 'static) -> Self {
        Self {
            schema,
            hooks: Arc::new(hooks),
        }
    }

    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    pub fn hooks(&self) -> &dyn DocumentHooks {
        self.hooks.as_ref()
    }

    pub fn class_name(&self) -> &str {
        self.schema.class_name()
    }

    pub fn type_name(&self) -> &str {
        self.schema.type_name()
    }

    pub fn namespace(&self) -> &str {
        self.schema.namespace()
    }
}

impl std::fmt::Debug for ModelClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelClass")
            .field("namespace", &self.namespace())
            .field("type", &self.type_name())
            .finish()
    }
}

type ClassKey = (String, String);

/// Registry mapping `(namespace, type)` to model classes.
#[derive(Debug, Default)]
pub struct ClassMapper {
    classes: IndexMap<ClassKey, ModelClass>,
    subclasses: HashMap<ClassKey, Vec<String>>,
    extra_views: Vec<ViewDefinition>,
}

impl ClassMapper {
    /// Register every class in `classes`.
    pub fn new(classes: impl IntoIterator<Item = ModelClass>) -> OrmResult<Self> {
        let mut mapper = Self::default();
        for class in classes {
            mapper.insert(class)?;
        }
        mapper.compute_subclass_closure();
        info!(classes = mapper.classes.len(), "class mapper built");
        Ok(mapper)
    }

    /// Register one more class.
    ///
    /// Re-registering the same schema is a no-op; a different schema under
    /// an existing `(namespace, type)` is rejected.
    pub fn register(&mut self, class: ModelClass) -> OrmResult<()> {
        self.insert(class)?;
        self.compute_subclass_closure();
        Ok(())
    }

    /// Views installed alongside the generated ones.
    pub fn with_extra_views(mut self, views: impl IntoIterator<Item = ViewDefinition>) -> Self {
        self.extra_views.extend(views);
        self
    }

    fn insert(&mut self, class: ModelClass) -> OrmResult<()> {
        let key = (class.namespace().to_string(), class.type_name().to_string());
        if let Some(existing) = self.classes.get(&key) {
            if Arc::ptr_eq(existing.schema(), class.schema()) {
                return Ok(());
            }
            return Err(OrmError::DuplicateClass {
                namespace: key.0,
                type_name: key.1,
            });
        }
        debug!(namespace = %key.0, type_name = %key.1, "registered class");
        self.classes.insert(key, class);
        Ok(())
    }

    fn compute_subclass_closure(&mut self) {
        self.subclasses = self
            .classes
            .keys()
            .map(|(ns, t)| {
                let names = self
                    .classes
                    .values()
                    .filter(|c| c.schema().is_subclass_of(ns, t))
                    .map(|c| c.type_name().to_string())
                    .collect();
                ((ns.clone(), t.clone()), names)
            })
            .collect();
    }

    /// O(1) lookup. `None` for unknown types.
    pub fn get_class(&self, type_name: &str, namespace: &str) -> Option<&ModelClass> {
        self.classes
            .get(&(namespace.to_string(), type_name.to_string()))
    }

    /// The class a stored row deserializes into.
    pub fn class_for_row(&self, row: &DocumentRow) -> OrmResult<&ModelClass> {
        let type_name = row.type_name().unwrap_or_default();
        let namespace = row.namespace().unwrap_or_default();
        self.get_class(type_name, namespace)
            .ok_or_else(|| OrmError::UnknownClass {
                namespace: namespace.to_string(),
                type_name: type_name.to_string(),
            })
    }

    /// Registered classes in registration order.
    pub fn classes(&self) -> impl Iterator<Item = &ModelClass> {
        self.classes.values()
    }

    /// Distinct namespaces in registration order.
    pub fn namespaces(&self) -> Vec<&str> {
        let mut namespaces: Vec<&str> = Vec::new();
        for (ns, _) in self.classes.keys() {
            if !namespaces.contains(&ns.as_str()) {
                namespaces.push(ns);
            }
        }
        namespaces
    }

    /// Type names of `(namespace, type_name)` and every registered subclass.
    ///
    /// Falls back to `[type_name]` for unregistered types.
    pub fn get_all_subclass_names(&self, namespace: &str, type_name: &str) -> Vec<String> {
        self.subclasses
            .get(&(namespace.to_string(), type_name.to_string()))
            .cloned()
            .unwrap_or_else(|| vec![type_name.to_string()])
    }

    /// Classes flagged as granting access, for the access-control compiler.
    pub fn access_classes(&self) -> Vec<&ModelClass> {
        self.classes
            .values()
            .filter(|c| c.schema().grants_access())
            .collect()
    }

    /// `design/name` of the view generated for `field` declared on
    /// `(namespace, owner_type)`.
    pub fn field_view_name(namespace: &str, owner_type: &str, field: &str) -> String {
        format!("{}/{owner_type}_{field}", clean_view_name(namespace))
    }

    /// Every view the mapper needs: the by-type view, one foreign-key view
    /// per declared reference-from field, one view per declared unique field,
    /// then any extra views.
    pub fn view_definitions(&self) -> Vec<ViewDefinition> {
        let mut views: IndexMap<String, ViewDefinition> = IndexMap::new();
        let all = ViewDefinition::all_by_type();
        views.insert(all.full_name(), all);

        for class in self.classes.values() {
            let schema = class.schema();
            let design = clean_view_name(schema.namespace());
            for (name, field) in schema.cls_fields() {
                let view_name = format!("{}_{name}", schema.type_name());
                if let Some(reference) = field.as_reference_from() {
                    let mut types: Vec<String> = Vec::new();
                    for refcls in &reference.refcls {
                        for t in self.get_all_subclass_names(&reference.refns, refcls) {
                            if !types.contains(&t) {
                                types.push(t);
                            }
                        }
                    }
                    let view = ViewDefinition::by_field(
                        design.clone(),
                        view_name,
                        reference.refns.clone(),
                        types,
                        reference.fkey.clone(),
                    );
                    views.insert(view.full_name(), view);
                } else if field.is_unique() {
                    let view = ViewDefinition::by_field(
                        design.clone(),
                        view_name,
                        schema.namespace(),
                        self.get_all_subclass_names(schema.namespace(), schema.type_name()),
                        name.clone(),
                    );
                    views.insert(view.full_name(), view);
                }
            }
        }

        for view in &self.extra_views {
            views.insert(view.full_name(), view.clone());
        }
        views.into_values().collect()
    }

    /// The view definitions grouped into CouchDB-style design documents.
    pub fn design_documents(&self) -> Vec<Value> {
        let mut designs: IndexMap<String, serde_json::Map<String, Value>> = IndexMap::new();
        for view in self.view_definitions() {
            designs
                .entry(view.design.clone())
                .or_default()
                .insert(view.name.clone(), json!({ "map": view.map_source() }));
        }
        designs
            .into_iter()
            .map(|(design, views)| json!({ "_id": format!("_design/{design}"), "views": views }))
            .collect()
    }
}
