//! Model schemas: the merged, validated field table of one document class.
//!
//! [`ModelSchemaBuilder`] runs once per model at startup. It overlays the
//! field tables of the model's bases in declaration order, then the
//! model's own fields (which win ties), validates the result and freezes it
//! behind an `Arc`. Subclasses extend an already-built base schema, so the
//! inheritance chain is always built bottom-up.

use std::sync::Arc;

use indexmap::IndexMap;

use docmap_types::{DEFAULT_NAMESPACE, NAMESPACE_PROPERTY, RESERVED_PROPERTY_NAMES, TYPE_PROPERTY};

use crate::error::{SchemaError, SchemaResult};
use crate::field::{Field, ReferenceFrom, ReferenceTo};

/// The immutable schema of one document class.
#[derive(Debug)]
pub struct ModelSchema {
    class_name: String,
    type_name: String,
    namespace: String,
    fields: IndexMap<String, Field>,
    cls_fields: IndexMap<String, Field>,
    field_owners: IndexMap<String, (String, String)>,
    ancestors: Vec<(String, String)>,
    use_rev: bool,
    additional_properties: bool,
    grants_access: bool,
}

impl ModelSchema {
    /// Start declaring a model named `class_name`.
    pub fn builder(class_name: impl Into<String>) -> ModelSchemaBuilder {
        ModelSchemaBuilder::new(class_name)
    }

    /// The declared class name, e.g. `JackRussell`.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// The lowercase type discriminator, e.g. `jackrussell`.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Every field, inherited ones included.
    pub fn fields(&self) -> &IndexMap<String, Field> {
        &self.fields
    }

    /// Only the fields declared directly on this model.
    pub fn cls_fields(&self) -> &IndexMap<String, Field> {
        &self.cls_fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// `(namespace, type)` of the model that declared `name`: itself or an
    /// ancestor.
    pub fn field_owner(&self, name: &str) -> Option<(&str, &str)> {
        self.field_owners
            .get(name)
            .map(|(ns, t)| (ns.as_str(), t.as_str()))
    }

    /// `(namespace, type)` of every ancestor, nearest first.
    pub fn ancestors(&self) -> &[(String, String)] {
        &self.ancestors
    }

    /// Returns `true` if this model is `(namespace, type_name)` or derives from it.
    pub fn is_subclass_of(&self, namespace: &str, type_name: &str) -> bool {
        (self.namespace == namespace && self.type_name == type_name)
            || self
                .ancestors
                .iter()
                .any(|(ns, t)| ns == namespace && t == type_name)
    }

    /// Whether updates carry a revision precondition.
    pub fn use_rev(&self) -> bool {
        self.use_rev
    }

    /// Whether undeclared properties may be stored.
    pub fn additional_properties(&self) -> bool {
        self.additional_properties
    }

    /// Whether the model is visible to the access-control compiler.
    pub fn grants_access(&self) -> bool {
        self.grants_access
    }

    /// Declared `ReferenceTo` fields as `(field name, reference)`.
    pub fn reference_to_fields(&self) -> impl Iterator<Item = (&str, &ReferenceTo)> {
        self.fields
            .iter()
            .filter_map(|(name, field)| field.as_reference_to().map(|r| (name.as_str(), r)))
    }

    /// Declared `ReferenceFrom` fields as `(field name, reference)`.
    pub fn reference_from_fields(&self) -> impl Iterator<Item = (&str, &ReferenceFrom)> {
        self.fields
            .iter()
            .filter_map(|(name, field)| field.as_reference_from().map(|r| (name.as_str(), r)))
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields
            .iter()
            .filter(|(_, field)| field.is_unique())
            .map(|(name, field)| (name.as_str(), field))
    }

    pub fn required_fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields
            .iter()
            .filter(|(_, field)| field.is_required())
            .map(|(name, field)| (name.as_str(), field))
    }

    /// The `ReferenceTo` field stored under `<name>_id`, if any.
    pub fn reference_alias(&self, name: &str) -> Option<(String, &ReferenceTo)> {
        let stored = format!("{name}_id");
        let reference = self.fields.get(&stored)?.as_reference_to()?;
        Some((stored, reference))
    }
}

/// Builder for [`ModelSchema`].
pub struct ModelSchemaBuilder {
    class_name: String,
    namespace: Option<String>,
    bases: Vec<Arc<ModelSchema>>,
    fields: IndexMap<String, Field>,
    use_rev: Option<bool>,
    additional_properties: Option<bool>,
    grants_access: Option<bool>,
}

impl ModelSchemaBuilder {
    fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            namespace: None,
            bases: Vec::new(),
            fields: IndexMap::new(),
            use_rev: None,
            additional_properties: None,
            grants_access: None,
        }
    }

    /// Defaults to the first base's namespace, then [`DEFAULT_NAMESPACE`].
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Inherit from `base`. May be called more than once; later bases
    /// override earlier ones.
    pub fn extends(mut self, base: &Arc<ModelSchema>) -> Self {
        self.bases.push(Arc::clone(base));
        self
    }

    /// Declare a field. Redeclaring a name replaces the earlier declaration.
    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    pub fn use_rev(mut self, use_rev: bool) -> Self {
        self.use_rev = Some(use_rev);
        self
    }

    pub fn additional_properties(mut self, allowed: bool) -> Self {
        self.additional_properties = Some(allowed);
        self
    }

    pub fn grants_access(mut self, grants: bool) -> Self {
        self.grants_access = Some(grants);
        self
    }

    /// Merge, validate and freeze the schema.
    pub fn build(self) -> SchemaResult<Arc<ModelSchema>> {
        validate_model_name(&self.class_name)?;
        let type_name = self.class_name.to_lowercase();
        let first_base = self.bases.first();

        let namespace = self
            .namespace
            .or_else(|| first_base.map(|b| b.namespace.clone()))
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        if namespace.is_empty() {
            return Err(SchemaError::EmptyNamespace {
                model: self.class_name,
            });
        }

        let mut fields = IndexMap::new();
        let mut field_owners = IndexMap::new();
        let mut ancestors = Vec::new();
        for base in &self.bases {
            for (name, field) in &base.fields {
                fields.insert(name.clone(), field.clone());
                let owner = base
                    .field_owners
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| (base.namespace.clone(), base.type_name.clone()));
                field_owners.insert(name.clone(), owner);
            }
            let lineage = std::iter::once((base.namespace.clone(), base.type_name.clone()))
                .chain(base.ancestors.iter().cloned());
            for ancestor in lineage {
                if !ancestors.contains(&ancestor) {
                    ancestors.push(ancestor);
                }
            }
        }

        for (name, field) in &self.fields {
            if is_reserved(name) {
                return Err(SchemaError::ReservedFieldName {
                    model: self.class_name.clone(),
                    field: name.clone(),
                });
            }
            field.check(&self.class_name, name)?;
            fields.insert(name.clone(), field.clone());
            field_owners.insert(name.clone(), (namespace.clone(), type_name.clone()));
        }

        Ok(Arc::new(ModelSchema {
            use_rev: self
                .use_rev
                .or_else(|| first_base.map(|b| b.use_rev))
                .unwrap_or(true),
            additional_properties: self
                .additional_properties
                .or_else(|| first_base.map(|b| b.additional_properties))
                .unwrap_or(false),
            grants_access: self
                .grants_access
                .or_else(|| first_base.map(|b| b.grants_access))
                .unwrap_or(false),
            class_name: self.class_name,
            type_name,
            namespace,
            fields,
            cls_fields: self.fields,
            field_owners,
            ancestors,
        }))
    }
}

fn is_reserved(name: &str) -> bool {
    name == NAMESPACE_PROPERTY || name == TYPE_PROPERTY || RESERVED_PROPERTY_NAMES.contains(&name)
}

/// Model names become type discriminators and view-name fragments, so they
/// must be plain identifiers.
fn validate_model_name(name: &str) -> SchemaResult<()> {
    let invalid = |reason: &str| SchemaError::InvalidModelName {
        name: name.to_string(),
        reason: reason.into(),
    };

    let Some(first) = name.chars().next() else {
        return Err(invalid("model name must not be empty"));
    };
    if !first.is_ascii_alphabetic() {
        return Err(invalid("must start with an ASCII letter"));
    }
    if let Some(ch) = name.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
        return Err(invalid(&format!("contains forbidden character: {ch:?}")));
    }
    Ok(())
}
