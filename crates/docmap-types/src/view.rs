//! Secondary-index ("view") descriptions shared by the mapper, the storage
//! backends, and the write buffer.
//!
//! Only two index shapes exist: the catch-all "by type" view and
//! "by field" views restricted to a set of type discriminators within one
//! namespace (used for foreign keys and unique fields). A [`ViewDefinition`]
//! can both evaluate itself against a document body and render the
//! equivalent JavaScript map function for backends with materialized views.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{NAMESPACE_PROPERTY, TYPE_PROPERTY};
use crate::Properties;

/// Design document holding the catch-all "by type" view.
pub const RAW_DESIGN: &str = "raw";

/// Name of the catch-all "by type" view inside [`RAW_DESIGN`].
pub const ALL_VIEW_NAME: &str = "all";

/// What a view emits as its index key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewEmit {
    /// The document's type discriminator, for every document.
    TypeName,
    /// The named property of documents matching the view's namespace and
    /// type list.
    Field(String),
}

/// A named secondary index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewDefinition {
    /// Design document the view belongs to.
    pub design: String,
    /// View name within the design document.
    pub name: String,
    /// Namespace filter (ignored by [`ViewEmit::TypeName`]).
    pub namespace: Option<String>,
    /// Type discriminators the view accepts (ignored by [`ViewEmit::TypeName`]).
    pub types: Vec<String>,
    pub emit: ViewEmit,
}

impl ViewDefinition {
    /// The catch-all `raw/all` view keyed by type discriminator.
    pub fn all_by_type() -> Self {
        Self {
            design: RAW_DESIGN.to_string(),
            name: ALL_VIEW_NAME.to_string(),
            namespace: None,
            types: Vec::new(),
            emit: ViewEmit::TypeName,
        }
    }

    /// A view keyed by `field` over documents of `types` in `namespace`.
    pub fn by_field(
        design: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
        types: Vec<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            design: design.into(),
            name: name.into(),
            namespace: Some(namespace.into()),
            types,
            emit: ViewEmit::Field(field.into()),
        }
    }

    /// `design/name`, the form callers use to query a view.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.design, self.name)
    }

    /// The flattened identifier used by in-memory indexes.
    pub fn index_name(&self) -> String {
        clean_view_name(&self.full_name())
    }

    /// Evaluate the view against a document body.
    ///
    /// Returns `None` when the document is not part of the view or the
    /// emitted value is absent or null.
    pub fn emit_key(&self, doc: &Properties) -> Option<ViewKey> {
        match &self.emit {
            ViewEmit::TypeName => doc
                .get(TYPE_PROPERTY)
                .filter(|v| !v.is_null())
                .map(ViewKey::from_value),
            ViewEmit::Field(field) => {
                let type_name = doc.get(TYPE_PROPERTY)?.as_str()?;
                if !self.types.iter().any(|t| t == type_name) {
                    return None;
                }
                let namespace = doc.get(NAMESPACE_PROPERTY)?.as_str()?;
                if self.namespace.as_deref() != Some(namespace) {
                    return None;
                }
                doc.get(field)
                    .filter(|v| !v.is_null())
                    .map(ViewKey::from_value)
            }
        }
    }

    /// JavaScript map function equivalent to [`ViewDefinition::emit_key`].
    pub fn map_source(&self) -> String {
        match &self.emit {
            ViewEmit::TypeName => "function(doc) {emit(doc.type, doc);}".to_string(),
            ViewEmit::Field(field) => {
                let resources = self
                    .types
                    .iter()
                    .map(|t| format!("'{t}'"))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "function(doc) {{\n    var resources = [{resources}];\n    \
                     if (resources.indexOf(doc.type) != -1 && doc.namespace == \"{ns}\"){{\n        \
                     emit(doc.{field}, doc);\n    }}\n}}",
                    ns = self.namespace.as_deref().unwrap_or_default(),
                )
            }
        }
    }
}

/// Flatten a view name into an identifier (`/`, `.`, `-` and `:` become `_`).
pub fn clean_view_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '.' | '-' | ':' => '_',
            other => other,
        })
        .collect()
}

/// Canonical, hashable form of an indexed JSON value.
///
/// Two values produce the same key exactly when they serialize to the same
/// canonical JSON text (object members are ordered by name).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewKey(String);

impl ViewKey {
    pub fn from_value(value: &Value) -> Self {
        Self(value.to_string())
    }

    /// The canonical JSON text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ViewKey {
    fn from(key: &str) -> Self {
        Self::from_value(&Value::String(key.to_string()))
    }
}

impl From<&Value> for ViewKey {
    fn from(value: &Value) -> Self {
        Self::from_value(value)
    }
}

impl fmt::Debug for ViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ViewKey({})", self.0)
    }
}

impl fmt::Display for ViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Properties {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn dogs_by_owner() -> ViewDefinition {
        ViewDefinition::by_field(
            "example_com_zoo",
            "person_dogs",
            "example.com/zoo",
            vec!["dog".into(), "jackrussell".into()],
            "owner_id",
        )
    }

    #[test]
    fn clean_view_name_flattens_separators() {
        assert_eq!(
            clean_view_name("glowinthedark.co.uk/test/person_dogs"),
            "glowinthedark_co_uk_test_person_dogs"
        );
        assert_eq!(clean_view_name("a-b:c"), "a_b_c");
    }

    #[test]
    fn full_and_index_names() {
        let view = dogs_by_owner();
        assert_eq!(view.full_name(), "example_com_zoo/person_dogs");
        assert_eq!(view.index_name(), "example_com_zoo_person_dogs");
        assert_eq!(ViewDefinition::all_by_type().index_name(), "raw_all");
    }

    #[test]
    fn by_type_emits_type_for_every_namespace() {
        let view = ViewDefinition::all_by_type();
        let key = view.emit_key(&doc(json!({"type": "dog", "namespace": "other"})));
        assert_eq!(key, Some(ViewKey::from("dog")));
    }

    #[test]
    fn by_field_filters_type_and_namespace() {
        let view = dogs_by_owner();
        let matching = doc(json!({"type": "jackrussell", "namespace": "example.com/zoo", "owner_id": "p1"}));
        assert_eq!(view.emit_key(&matching), Some(ViewKey::from("p1")));

        let wrong_type = doc(json!({"type": "cat", "namespace": "example.com/zoo", "owner_id": "p1"}));
        assert_eq!(view.emit_key(&wrong_type), None);

        let wrong_ns = doc(json!({"type": "dog", "namespace": "elsewhere", "owner_id": "p1"}));
        assert_eq!(view.emit_key(&wrong_ns), None);
    }

    #[test]
    fn absent_and_null_values_are_not_indexed() {
        let view = dogs_by_owner();
        let absent = doc(json!({"type": "dog", "namespace": "example.com/zoo"}));
        let null = doc(json!({"type": "dog", "namespace": "example.com/zoo", "owner_id": null}));
        assert_eq!(view.emit_key(&absent), None);
        assert_eq!(view.emit_key(&null), None);
    }

    #[test]
    fn view_keys_are_canonical() {
        let a = ViewKey::from_value(&json!({"b": 1, "a": [1, 2]}));
        let b = ViewKey::from_value(&json!({"a": [1, 2], "b": 1}));
        assert_eq!(a, b);
        assert_ne!(ViewKey::from_value(&json!(1)), ViewKey::from("1"));
    }

    #[test]
    fn map_source_mentions_types_namespace_and_field() {
        let source = dogs_by_owner().map_source();
        assert!(source.contains("['dog', 'jackrussell']"));
        assert!(source.contains("doc.namespace == \"example.com/zoo\""));
        assert!(source.contains("emit(doc.owner_id, doc);"));
        assert_eq!(
            ViewDefinition::all_by_type().map_source(),
            "function(doc) {emit(doc.type, doc);}"
        );
    }
}
