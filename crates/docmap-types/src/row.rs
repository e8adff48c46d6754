use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{NAMESPACE_PROPERTY, TYPE_PROPERTY};
use crate::error::TypeError;
use crate::revision::Revision;
use crate::Properties;

/// The minimal normalized unit the mapper operates on: a stored document's
/// key, its current revision, and its body.
///
/// Backends translate their own wire formats into rows; the body never
/// carries backend bookkeeping such as `_id` or `_rev`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentRow {
    pub key: String,
    pub rev: Option<Revision>,
    pub value: Properties,
}

impl DocumentRow {
    pub fn new(key: impl Into<String>, rev: Option<Revision>, value: Properties) -> Self {
        Self {
            key: key.into(),
            rev,
            value,
        }
    }

    /// Build a row from a CouchDB-style document (`_id`/`_rev` inline).
    pub fn from_couchdb_json(doc: Value) -> Result<Self, TypeError> {
        let mut value = into_object(doc)?;
        let key = match value.remove("_id") {
            Some(Value::String(key)) => key,
            Some(_) => {
                return Err(TypeError::WrongType {
                    field: "_id",
                    expected: "string",
                })
            }
            None => return Err(TypeError::MissingField("_id")),
        };
        let rev = take_revision(&mut value, "_rev")?;
        Ok(Self { key, rev, value })
    }

    /// The CouchDB-style document for this row.
    pub fn to_couchdb_json(&self) -> Value {
        let mut doc = self.value.clone();
        doc.insert("_id".into(), Value::String(self.key.clone()));
        if let Some(rev) = &self.rev {
            doc.insert("_rev".into(), Value::String(rev.to_string()));
        }
        Value::Object(doc)
    }

    /// The type discriminator stored in the body.
    pub fn type_name(&self) -> Option<&str> {
        self.value.get(TYPE_PROPERTY).and_then(Value::as_str)
    }

    /// The namespace discriminator stored in the body.
    pub fn namespace(&self) -> Option<&str> {
        self.value.get(NAMESPACE_PROPERTY).and_then(Value::as_str)
    }
}

fn into_object(value: Value) -> Result<Properties, TypeError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(TypeError::NotAnObject(other.to_string())),
    }
}

fn take_revision(value: &mut Properties, field: &'static str) -> Result<Option<Revision>, TypeError> {
    match value.remove(field) {
        Some(Value::String(rev)) => Ok(Some(Revision::new(rev))),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(TypeError::WrongType {
            field,
            expected: "string",
        }),
    }
}
