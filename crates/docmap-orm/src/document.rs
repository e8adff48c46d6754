//! Runtime document instances.
//!
//! A [`Document`] is a cheap, cloneable handle: clones share one underlying
//! instance, which is what lets a write buffer hand every caller the same
//! live object for a key and refresh it in place. Locks are never held while
//! calling out to a database or a hook, so hooks may freely read and save
//! other documents (or this one).

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use docmap_schema::{format, Field, FieldKind, ModelSchema};
use docmap_types::{DocumentRow, Properties, Revision, NAMESPACE_PROPERTY, TYPE_PROPERTY};

use crate::error::{OrmError, OrmResult};
use crate::mapper::{ClassMapper, ModelClass};
use crate::traits::{DbHandle, DocumentStore};

/// The result of reading a property through [`Document::get`].
pub enum Property {
    /// A stored value.
    Value(Value),
    /// A declared field with no value.
    Unset,
    /// A resolved reference-to field.
    Reference(Option<Document>),
    /// A resolved reference-from collection.
    References(Vec<Document>),
}

impl Property {
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// The stored value, treating an explicit null like an unset field.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(Value::Null) => None,
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_document(self) -> Option<Document> {
        match self {
            Self::Reference(doc) => doc,
            _ => None,
        }
    }

    pub fn into_documents(self) -> Vec<Document> {
        match self {
            Self::References(docs) => docs,
            Self::Reference(Some(doc)) => vec![doc],
            _ => Vec::new(),
        }
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Unset => f.write_str("Unset"),
            Self::Reference(doc) => f
                .debug_tuple("Reference")
                .field(&doc.as_ref().map(Document::key))
                .finish(),
            Self::References(docs) => f
                .debug_tuple("References")
                .field(&docs.iter().map(Document::key).collect::<Vec<_>>())
                .finish(),
        }
    }
}

/// What [`Document::save`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    New,
    Updated,
}

struct DocumentState {
    class: ModelClass,
    key: String,
    rev: Option<Revision>,
    properties: Properties,
    /// Fields currently holding their declared default rather than a
    /// value that was assigned or loaded.
    defaulted: HashSet<String>,
    db: Option<DbHandle>,
}

/// Shared handle to one document instance.
#[derive(Clone)]
pub struct Document {
    inner: Arc<RwLock<DocumentState>>,
}

impl Document {
    // ---------------------------------------------------------------
    // Construction
    // ---------------------------------------------------------------

    /// A new in-memory document with a generated `<type>_<uuid>` key and
    /// every declared default applied.
    pub fn new(class: &ModelClass) -> Self {
        Self::blank(class, generate_key(class.type_name()))
    }

    /// Like [`Document::new`], with an explicit key.
    pub fn with_key(class: &ModelClass, key: impl Into<String>) -> Self {
        Self::blank(class, key.into())
    }

    /// A new document populated from `properties`, each assigned through
    /// the same validation as [`Document::set`].
    pub fn create(class: &ModelClass, key: Option<String>, properties: Properties) -> OrmResult<Self> {
        let key = key.unwrap_or_else(|| generate_key(class.type_name()));
        let doc = Self::blank(class, key);
        for (name, value) in properties {
            doc.set(&name, value)?;
        }
        Ok(doc)
    }

    /// Rebuild a stored row as an instance of the class registered for its
    /// type discriminator.
    pub fn from_row(mapper: &ClassMapper, row: DocumentRow, db: Option<DbHandle>) -> OrmResult<Self> {
        let class = mapper.class_for_row(&row)?.clone();
        let doc = Self::create(&class, Some(row.key), row.value)?;
        {
            let mut state = doc.state_mut();
            state.rev = row.rev;
            state.db = db;
        }
        Ok(doc)
    }

    /// Inverse of [`Document::to_json`].
    pub fn from_json(mapper: &ClassMapper, value: &Value, db: Option<DbHandle>) -> OrmResult<Self> {
        let malformed = |what: &str| OrmError::Serialization(format!("document JSON: {what}"));
        let key = value
            .get("key")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("missing key"))?;
        let rev = value.get("rev").and_then(Value::as_str).map(Revision::new);
        let mut properties = value
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| malformed("missing properties"))?;
        for discriminator in [TYPE_PROPERTY, NAMESPACE_PROPERTY] {
            let found = value
                .get(discriminator)
                .cloned()
                .ok_or_else(|| malformed(discriminator))?;
            properties.insert(discriminator.to_string(), found);
        }
        Self::from_row(mapper, DocumentRow::new(key, rev, properties), db)
    }

    fn blank(class: &ModelClass, key: String) -> Self {
        let schema = class.schema();
        let mut properties = Properties::new();
        properties.insert(TYPE_PROPERTY.into(), Value::String(schema.type_name().into()));
        properties.insert(NAMESPACE_PROPERTY.into(), Value::String(schema.namespace().into()));
        let mut defaulted = HashSet::new();
        for (name, field) in schema.fields() {
            if field.is_virtual() {
                continue;
            }
            if let Some(default) = field.get_default() {
                properties.insert(name.clone(), default);
                defaulted.insert(name.clone());
            }
        }
        Self {
            inner: Arc::new(RwLock::new(DocumentState {
                class: class.clone(),
                key,
                rev: None,
                properties,
                defaulted,
                db: None,
            })),
        }
    }

    fn state(&self) -> RwLockReadGuard<'_, DocumentState> {
        self.inner.read().expect("lock poisoned")
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, DocumentState> {
        self.inner.write().expect("lock poisoned")
    }

    // ---------------------------------------------------------------
    // Identity
    // ---------------------------------------------------------------

    pub fn key(&self) -> String {
        self.state().key.clone()
    }

    pub fn rev(&self) -> Option<Revision> {
        self.state().rev.clone()
    }

    pub fn class(&self) -> ModelClass {
        self.state().class.clone()
    }

    pub fn schema(&self) -> Arc<ModelSchema> {
        Arc::clone(self.state().class.schema())
    }

    pub fn type_name(&self) -> String {
        self.state().class.type_name().to_string()
    }

    pub fn namespace(&self) -> String {
        self.state().class.namespace().to_string()
    }

    /// Returns `true` if both handles point at the same instance.
    pub fn same_instance(&self, other: &Document) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ---------------------------------------------------------------
    // Database handle
    // ---------------------------------------------------------------

    pub fn attach(&self, db: DbHandle) {
        self.state_mut().db = Some(db);
    }

    pub fn detach(&self) {
        self.state_mut().db = None;
    }

    /// The attached database, if any and still alive.
    pub fn db(&self) -> Option<Arc<dyn DocumentStore>> {
        self.state().db.as_ref().and_then(DbHandle::upgrade)
    }

    fn require_db(&self, name: &str) -> OrmResult<Arc<dyn DocumentStore>> {
        self.db().ok_or_else(|| OrmError::NoDatabase {
            class: self.schema().class_name().to_string(),
            name: name.to_string(),
        })
    }

    // ---------------------------------------------------------------
    // Property access
    // ---------------------------------------------------------------

    /// Body properties without the type and namespace discriminators.
    pub fn properties(&self) -> Properties {
        let mut properties = self.raw_properties();
        properties.remove(TYPE_PROPERTY);
        properties.remove(NAMESPACE_PROPERTY);
        properties
    }

    /// The full stored body.
    pub fn raw_properties(&self) -> Properties {
        self.state().properties.clone()
    }

    /// Read a property.
    ///
    /// Dispatch order: reserved names, reference-from collections,
    /// reference-to aliases (`owner` for `owner_id`), stored values, then
    /// declared-but-unset fields. Anything else is
    /// [`OrmError::UnknownAttribute`].
    pub fn get(&self, name: &str) -> OrmResult<Property> {
        if let Some(value) = self.reserved(name) {
            return Ok(Property::Value(value));
        }
        let schema = self.schema();

        if schema.field(name).is_some_and(Field::is_virtual) {
            let db = self.require_db(name)?;
            let (namespace, owner) = schema
                .field_owner(name)
                .unwrap_or((schema.namespace(), schema.type_name()));
            return db
                .get_refs_from(namespace, owner, name, &self.key())
                .map(Property::References);
        }

        if let Some((stored, _)) = schema.reference_alias(name) {
            let target = self
                .state()
                .properties
                .get(&stored)
                .and_then(Value::as_str)
                .map(str::to_string);
            return match target {
                Some(target) => Ok(Property::Reference(self.require_db(name)?.get(&target)?)),
                None => Ok(Property::Reference(None)),
            };
        }

        if let Some(value) = self.state().properties.get(name) {
            return Ok(Property::Value(value.clone()));
        }
        if schema.has_field(name) {
            return Ok(Property::Unset);
        }
        Err(OrmError::UnknownAttribute {
            class: schema.class_name().to_string(),
            name: name.to_string(),
        })
    }

    fn reserved(&self, name: &str) -> Option<Value> {
        let state = self.state();
        match name {
            "key" | "_id" => Some(Value::String(state.key.clone())),
            "rev" | "_rev" => Some(
                state
                    .rev
                    .as_ref()
                    .map_or(Value::Null, |rev| Value::String(rev.to_string())),
            ),
            "_properties" => Some(Value::Object(state.properties.clone())),
            "_db" => Some(Value::Bool(
                state.db.as_ref().and_then(DbHandle::upgrade).is_some(),
            )),
            _ => None,
        }
    }

    /// The stored value of `name`, `None` when unset or null.
    pub fn get_value(&self, name: &str) -> OrmResult<Option<Value>> {
        Ok(self.get(name)?.into_value())
    }

    pub fn get_str(&self, name: &str) -> OrmResult<Option<String>> {
        Ok(self
            .get_value(name)?
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    /// A date-time field, parsed from its stored ISO-8601 form.
    pub fn get_datetime(&self, name: &str) -> OrmResult<Option<DateTime<Utc>>> {
        let Some(value) = self.get_value(name)? else {
            return Ok(None);
        };
        value
            .as_str()
            .and_then(format::parse_datetime)
            .map(Some)
            .ok_or_else(|| self.serialization(name, "not an ISO-8601 date-time"))
    }

    /// A bytes field, decoded from its stored base64 form.
    pub fn get_bytes(&self, name: &str) -> OrmResult<Option<Vec<u8>>> {
        let Some(value) = self.get_value(name)? else {
            return Ok(None);
        };
        value
            .as_str()
            .and_then(format::decode_bytes)
            .map(Some)
            .ok_or_else(|| self.serialization(name, "not base64"))
    }

    pub fn get_decimal(&self, name: &str) -> OrmResult<Option<Decimal>> {
        let Some(value) = self.get_value(name)? else {
            return Ok(None);
        };
        value
            .as_str()
            .and_then(format::parse_decimal)
            .map(Some)
            .ok_or_else(|| self.serialization(name, "not a decimal"))
    }

    pub fn get_fraction(&self, name: &str) -> OrmResult<Option<format::Fraction>> {
        let Some(value) = self.get_value(name)? else {
            return Ok(None);
        };
        value
            .as_str()
            .and_then(format::parse_fraction)
            .map(Some)
            .ok_or_else(|| self.serialization(name, "not a fraction"))
    }

    /// A coordinate field, range-checked.
    pub fn get_lat_long(&self, name: &str) -> OrmResult<Option<format::LatLong>> {
        let Some(value) = self.get_value(name)? else {
            return Ok(None);
        };
        format::parse_lat_long(&value)
            .map(Some)
            .ok_or_else(|| self.serialization(name, "not a [latitude, longitude] pair"))
    }

    /// An object field, decoded into `T`.
    pub fn get_object<T: DeserializeOwned>(&self, name: &str) -> OrmResult<Option<T>> {
        let Some(value) = self.get_value(name)? else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| self.serialization(name, &e.to_string()))
    }

    /// The document a reference-to field points at.
    pub fn get_reference(&self, name: &str) -> OrmResult<Option<Document>> {
        Ok(self.get(name)?.into_document())
    }

    /// The documents of a reference-from collection.
    pub fn get_references(&self, name: &str) -> OrmResult<Vec<Document>> {
        Ok(self.get(name)?.into_documents())
    }

    fn serialization(&self, name: &str, reason: &str) -> OrmError {
        OrmError::Serialization(format!(
            "{}.{name}: {reason}",
            self.schema().class_name()
        ))
    }

    /// Write a property.
    ///
    /// `key` and `rev` set the document's identity. Assigning to `owner`
    /// where `owner_id` is a reference-to field stores the given key under
    /// `owner_id`. Declared fields are type-checked, nested objects are
    /// normalized, and immutable fields that already hold a value reject a
    /// different one.
    pub fn set(&self, name: &str, value: Value) -> OrmResult<()> {
        let schema = self.schema();
        match name {
            "key" | "_id" => {
                let Value::String(key) = value else {
                    return Err(validation(&schema, name, "key must be a string"));
                };
                self.state_mut().key = key;
                return Ok(());
            }
            "rev" | "_rev" => {
                let rev = match value {
                    Value::String(rev) => Some(Revision::new(rev)),
                    Value::Null => None,
                    _ => return Err(validation(&schema, name, "rev must be a string")),
                };
                self.state_mut().rev = rev;
                return Ok(());
            }
            "_db" | "_properties" => {
                return Err(validation(&schema, name, "reserved name"));
            }
            TYPE_PROPERTY | NAMESPACE_PROPERTY => {
                if self.state().properties.get(name) == Some(&value) {
                    return Ok(());
                }
                return Err(validation(&schema, name, "discriminators cannot change"));
            }
            _ => {}
        }

        if let Some((stored, _)) = schema.reference_alias(name) {
            return self.assign(&schema, &stored, value);
        }
        self.assign(&schema, name, value)
    }

    /// Point a reference-to field (by alias or stored name) at `target`.
    pub fn set_reference(&self, name: &str, target: Option<&Document>) -> OrmResult<()> {
        let schema = self.schema();
        let stored = match schema.reference_alias(name) {
            Some((stored, _)) => stored,
            None if schema.field(name).and_then(Field::as_reference_to).is_some() => name.to_string(),
            None => return Err(validation(&schema, name, "not a reference field")),
        };
        let value = target.map_or(Value::Null, |doc| Value::String(doc.key()));
        self.assign(&schema, &stored, value)
    }

    /// Remove a property's value.
    pub fn unset(&self, name: &str) -> OrmResult<()> {
        let schema = self.schema();
        let name = match schema.reference_alias(name) {
            Some((stored, _)) => stored,
            None => name.to_string(),
        };
        if name == TYPE_PROPERTY || name == NAMESPACE_PROPERTY {
            return Err(validation(&schema, &name, "discriminators cannot change"));
        }
        let mut state = self.state_mut();
        if !schema.has_field(&name) && !state.properties.contains_key(&name) {
            return Err(OrmError::UnknownAttribute {
                class: schema.class_name().to_string(),
                name,
            });
        }
        if schema.field(&name).is_some_and(Field::is_immutable)
            && !state.defaulted.contains(&name)
            && state.properties.get(&name).is_some_and(|v| !v.is_null())
        {
            return Err(OrmError::Immutable {
                class: schema.class_name().to_string(),
                field: name,
            });
        }
        state.defaulted.remove(&name);
        state.properties.remove(&name);
        Ok(())
    }

    fn assign(&self, schema: &ModelSchema, name: &str, value: Value) -> OrmResult<()> {
        let field = schema.field(name);
        let value = match field {
            Some(field) if field.is_virtual() => {
                return Err(validation(schema, name, "reference-from fields are computed"));
            }
            Some(field) => field
                .coerce(value)
                .map_err(|reason| validation(schema, name, &reason))?,
            None if schema.additional_properties() => value,
            None => return Err(validation(schema, name, "no such property")),
        };

        let mut state = self.state_mut();
        if field.is_some_and(Field::is_immutable) && !state.defaulted.contains(name) {
            if let Some(existing) = state.properties.get(name).filter(|v| !v.is_null()) {
                if *existing != value {
                    return Err(OrmError::Immutable {
                        class: schema.class_name().to_string(),
                        field: name.to_string(),
                    });
                }
            }
        }
        state.defaulted.remove(name);
        state.properties.insert(name.to_string(), value);
        Ok(())
    }

    /// Remove a foreign key without immutability checks.
    fn clear_reference(&self, name: &str) {
        let mut state = self.state_mut();
        state.properties.remove(name);
        state.defaulted.remove(name);
    }

    // ---------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------

    /// Create or update this document in `db`.
    ///
    /// A missing row is created after the `pre_save_new` hook and the
    /// uniqueness check. An existing row is updated only if immutable fields
    /// keep their stored values and, for revision-tracked models, the local
    /// revision matches storage or `resolve_conflict` approves the write.
    pub fn save(&self, db: &dyn DocumentStore) -> OrmResult<SaveOutcome> {
        let class = self.class();
        let schema = class.schema();
        let hooks = class.hooks();
        self.attach(db.handle());
        self.check_required(schema)?;

        let key = self.key();
        match db.get_row(&key, Some(schema.type_name()))? {
            None => {
                hooks.pre_save_new(self, db)?;
                self.check_unique(db, schema)?;
                let row = db.set_row(&key, &self.raw_properties(), None)?;
                self.state_mut().rev = row.rev;
                debug!(key = %key, type_name = schema.type_name(), "created document");
                hooks.post_save_new(self, db)?;
                Ok(SaveOutcome::New)
            }
            Some(stored) => {
                self.check_immutable_against(schema, &stored.value)?;
                if schema.use_rev() {
                    let local = self.rev();
                    if local != stored.rev && !hooks.resolve_conflict(self, db, &stored)? {
                        return Err(OrmError::Conflict {
                            key,
                            local,
                            stored: stored.rev,
                        });
                    }
                }
                hooks.pre_save_update(self, db, &stored.value)?;
                self.check_unique(db, schema)?;
                let row = db.set_row(&key, &self.raw_properties(), stored.rev.as_ref())?;
                self.state_mut().rev = row.rev;
                debug!(key = %key, type_name = schema.type_name(), "updated document");
                hooks.post_save_update(self, db)?;
                Ok(SaveOutcome::Updated)
            }
        }
    }

    /// Apply `properties` and save. On failure the previous property values
    /// are restored.
    pub fn update(&self, db: &dyn DocumentStore, properties: Properties) -> OrmResult<SaveOutcome> {
        let (saved_properties, saved_defaulted) = {
            let state = self.state();
            (state.properties.clone(), state.defaulted.clone())
        };
        let result = properties
            .into_iter()
            .try_for_each(|(name, value)| self.set(&name, value))
            .and_then(|()| self.save(db));
        if result.is_err() {
            let mut state = self.state_mut();
            state.properties = saved_properties;
            state.defaulted = saved_defaulted;
        }
        result
    }

    /// Delete this document, then cascade or orphan its references.
    ///
    /// Cascading reference-to fields delete their target; cascading
    /// reference-from fields delete every referencing document; other
    /// reference-from fields clear the referencing documents' foreign key
    /// and re-save them. Referencing documents are loaded in full.
    pub fn delete(&self, db: &dyn DocumentStore) -> OrmResult<()> {
        let class = self.class();
        let schema = class.schema();
        class.hooks().pre_delete(self, db)?;

        let key = self.key();
        let rev = if schema.use_rev() { self.rev() } else { None };
        db.delete_row(&key, rev.as_ref(), Some(schema.type_name()))?;
        debug!(key = %key, type_name = schema.type_name(), "deleted document");

        class.hooks().post_delete(self, db)?;
        self.delete_references(db, schema)
    }

    fn delete_references(&self, db: &dyn DocumentStore, schema: &ModelSchema) -> OrmResult<()> {
        let key = self.key();
        for (name, field) in schema.fields() {
            match field.kind() {
                FieldKind::ReferenceTo(reference) if reference.cascade_delete => {
                    let target = self
                        .state()
                        .properties
                        .get(name)
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    let Some(target) = target else { continue };
                    match db.get(&target)? {
                        Some(doc) => doc.delete(db)?,
                        None => warn!(key = %key, target = %target, "cascade target already gone"),
                    }
                }
                FieldKind::ReferenceFrom(reference) => {
                    let (namespace, owner) = schema
                        .field_owner(name)
                        .unwrap_or((schema.namespace(), schema.type_name()));
                    let referencing = db.get_refs_from(namespace, owner, name, &key)?;
                    debug!(
                        key = %key,
                        field = %name,
                        count = referencing.len(),
                        cascade = reference.cascade_delete,
                        "resolving references"
                    );
                    for doc in referencing {
                        if reference.cascade_delete {
                            doc.delete(db)?;
                        } else {
                            doc.clear_reference(&reference.fkey);
                            doc.save(db)?;
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn check_required(&self, schema: &ModelSchema) -> OrmResult<()> {
        let state = self.state();
        for (name, _) in schema.required_fields() {
            if state.properties.get(name).map_or(true, Value::is_null) {
                return Err(validation(schema, name, "required"));
            }
        }
        Ok(())
    }

    fn check_immutable_against(&self, schema: &ModelSchema, stored: &Properties) -> OrmResult<()> {
        let state = self.state();
        for (name, field) in schema.fields() {
            if !field.is_immutable() {
                continue;
            }
            let Some(old) = stored.get(name).filter(|v| !v.is_null()) else {
                continue;
            };
            if state.properties.get(name).unwrap_or(&Value::Null) != old {
                return Err(OrmError::Immutable {
                    class: schema.class_name().to_string(),
                    field: name.clone(),
                });
            }
        }
        Ok(())
    }

    fn check_unique(&self, db: &dyn DocumentStore, schema: &ModelSchema) -> OrmResult<()> {
        let key = self.key();
        for (name, _) in schema.unique_fields() {
            let value = match self.state().properties.get(name) {
                Some(value) if !value.is_null() => value.clone(),
                _ => continue,
            };
            let (namespace, owner) = schema
                .field_owner(name)
                .unwrap_or((schema.namespace(), schema.type_name()));
            let view = ClassMapper::field_view_name(namespace, owner, name);
            if let Some(other) = db
                .query_view(&view, &value)?
                .into_iter()
                .find(|doc| doc.key() != key)
            {
                return Err(OrmError::Unique {
                    class: schema.class_name().to_string(),
                    field: name.to_string(),
                    value: value.to_string(),
                    existing: other.key(),
                });
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Cache support
    // ---------------------------------------------------------------

    /// Copy `other`'s revision and body into this instance if the revisions
    /// differ. Returns `true` if anything changed.
    pub fn refresh_from(&self, other: &Document) -> bool {
        if self.same_instance(other) {
            return false;
        }
        let (rev, properties) = {
            let state = other.state();
            (state.rev.clone(), state.properties.clone())
        };
        let mut state = self.state_mut();
        if state.rev == rev {
            return false;
        }
        state.rev = rev;
        state.properties = properties;
        state.defaulted.clear();
        true
    }

    // ---------------------------------------------------------------
    // Serialization
    // ---------------------------------------------------------------

    /// `{"key", "rev"?, "type", "namespace", "properties"}`.
    pub fn to_json(&self) -> Value {
        let state = self.state();
        let mut properties = state.properties.clone();
        let type_name = properties.remove(TYPE_PROPERTY).unwrap_or(Value::Null);
        let namespace = properties.remove(NAMESPACE_PROPERTY).unwrap_or(Value::Null);
        let mut out = json!({
            "key": state.key,
            "type": type_name,
            "namespace": namespace,
            "properties": properties,
        });
        if let Some(rev) = &state.rev {
            out["rev"] = Value::String(rev.to_string());
        }
        out
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        if self.same_instance(other) {
            return true;
        }
        let a = self.state();
        let b = other.state();
        a.key == b.key && a.properties == b.properties
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("Document")
            .field("type", &state.class.type_name())
            .field("key", &state.key)
            .field("rev", &state.rev)
            .field("properties", &state.properties)
            .finish()
    }
}

fn generate_key(type_name: &str) -> String {
    format!("{type_name}_{}", Uuid::new_v4())
}

fn validation(schema: &ModelSchema, field: &str, reason: &str) -> OrmError {
    OrmError::Validation {
        class: schema.class_name().to_string(),
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use docmap_schema::SerdeCodec;

    use crate::database::Database;
    use crate::fixtures::{self, Weapons, NAMESPACE};
    use crate::hooks::DocumentHooks;

    fn props(value: Value) -> Properties {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    // ---------------------------------------------------------------
    // Construction and attribute mediation
    // ---------------------------------------------------------------

    #[test]
    fn new_documents_get_generated_keys_and_discriminators() {
        let zoo = fixtures::zoo();
        let dog = Document::new(&zoo.dog);
        assert!(dog.key().starts_with("dog_"));
        assert_eq!(dog.rev(), None);
        let raw = dog.raw_properties();
        assert_eq!(raw["type"], "dog");
        assert_eq!(raw["namespace"], NAMESPACE);
        assert!(!dog.properties().contains_key("type"));
    }

    #[test]
    fn defaults_are_applied_and_not_shared() {
        let zoo = fixtures::zoo();
        let a = Document::new(&zoo.dog);
        let b = Document::new(&zoo.dog);
        assert_eq!(a.get_value("channels").unwrap(), Some(json!(["callbacks"])));
        a.set("channels", json!(["a"])).unwrap();
        assert_eq!(b.get_value("channels").unwrap(), Some(json!(["callbacks"])));
    }

    #[test]
    fn unknown_declared_and_reserved_reads() {
        let zoo = fixtures::zoo();
        let cat = Document::with_key(&zoo.cat, "cat_1");
        assert!(cat.get("name").unwrap().is_unset());
        assert_eq!(cat.get_value("key").unwrap(), Some(json!("cat_1")));
        assert_eq!(cat.get_value("rev").unwrap(), None);
        assert!(matches!(
            cat.get("wings"),
            Err(OrmError::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn writes_to_undeclared_properties_fail_unless_allowed() {
        let zoo = fixtures::zoo();
        let cat = Document::new(&zoo.cat);
        assert!(matches!(
            cat.set("wings", json!(2)),
            Err(OrmError::Validation { .. })
        ));
        let dog = Document::new(&zoo.dog);
        dog.set("wings", json!(2)).unwrap();
        assert_eq!(dog.get_value("wings").unwrap(), Some(json!(2)));
    }

    #[test]
    fn wrong_types_are_rejected_at_assignment() {
        let zoo = fixtures::zoo();
        let cat = Document::new(&zoo.cat);
        assert!(cat.set("legs", json!("four")).is_err());
        assert!(cat.set("email", json!("not-an-email")).is_err());
        cat.set("email", json!("paul@glowinthedark.co.uk")).unwrap();
    }

    #[test]
    fn discriminators_cannot_change() {
        let zoo = fixtures::zoo();
        let dog = Document::new(&zoo.dog);
        dog.set("type", json!("dog")).unwrap();
        assert!(dog.set("type", json!("cat")).is_err());
        assert!(dog.set("namespace", json!("elsewhere")).is_err());
        let err = Document::create(&zoo.dog, None, props(json!({"namespace": "elsewhere"})));
        assert!(err.is_err());
    }

    #[test]
    fn immutable_fields_can_be_set_once() {
        let zoo = fixtures::zoo();
        let cat = Document::new(&zoo.cat);
        cat.set("colour", json!("tabby")).unwrap();
        cat.set("colour", json!("tabby")).unwrap();
        assert!(matches!(
            cat.set("colour", json!("black")),
            Err(OrmError::Immutable { .. })
        ));
        assert!(cat.unset("colour").is_err());
    }

    #[test]
    fn immutable_defaults_can_be_overridden_once() {
        let zoo = fixtures::zoo();
        let cat = Document::new(&zoo.cat);
        assert_eq!(cat.get_value("tail").unwrap(), Some(json!(true)));
        cat.set("tail", json!(false)).unwrap();
        assert!(cat.set("tail", json!(true)).is_err());
    }

    #[test]
    fn reference_alias_stores_key() {
        let zoo = fixtures::zoo();
        let person = Document::with_key(&zoo.person, "person_1");
        let dog = Document::new(&zoo.dog);
        dog.set_reference("owner", Some(&person)).unwrap();
        assert_eq!(dog.get_value("owner_id").unwrap(), Some(json!("person_1")));
        dog.set("owner", json!("person_2")).unwrap();
        assert_eq!(dog.get_value("owner_id").unwrap(), Some(json!("person_2")));
        assert!(dog.set("owner", json!(7)).is_err());
    }

    #[test]
    fn references_need_a_database() {
        let zoo = fixtures::zoo();
        let person = Document::new(&zoo.person);
        assert!(matches!(
            person.get("dogs"),
            Err(OrmError::NoDatabase { .. })
        ));
        let dog = Document::new(&zoo.dog);
        assert!(dog.get_reference("owner").unwrap().is_none());
        dog.set("owner_id", json!("person_1")).unwrap();
        assert!(matches!(dog.get("owner"), Err(OrmError::NoDatabase { .. })));
    }

    #[test]
    fn reference_from_fields_cannot_be_assigned() {
        let zoo = fixtures::zoo();
        let person = Document::new(&zoo.person);
        assert!(person.set("dogs", json!([])).is_err());
    }

    #[test]
    fn object_fields_round_trip() {
        let zoo = fixtures::zoo();
        let monster = Document::new(&zoo.monster);
        let weapons = Weapons {
            wings: true,
            fire: false,
            claws: 3,
        };
        monster
            .set("weapons", SerdeCodec::<Weapons>::encode(&weapons).unwrap())
            .unwrap();
        assert_eq!(monster.get_object::<Weapons>("weapons").unwrap(), Some(weapons));
        assert!(monster.set("weapons", json!({"wings": "yes"})).is_err());
    }

    #[test]
    fn json_round_trip() {
        let zoo = fixtures::zoo();
        let dog = Document::create(&zoo.dog, Some("dog_1".into()), props(json!({"name": "fly"}))).unwrap();
        dog.set("rev", json!("1-abc")).unwrap();
        let value = dog.to_json();
        assert_eq!(value["properties"]["name"], "fly");
        assert_eq!(value["rev"], "1-abc");
        let back = Document::from_json(&zoo.mapper, &value, None).unwrap();
        assert_eq!(back, dog);
        assert_eq!(back.rev(), dog.rev());
    }

    // ---------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------

    #[test]
    fn save_then_get_round_trips() {
        let (zoo, db) = fixtures::zoo_database();
        let dog = Document::new(&zoo.dog);
        dog.set("name", json!("woofer")).unwrap();
        assert_eq!(dog.save(&db).unwrap(), SaveOutcome::New);
        assert!(dog.rev().is_some());

        let fetched = db.get(&dog.key()).unwrap().unwrap();
        assert_eq!(fetched, dog);
        assert_eq!(fetched.rev(), dog.rev());
        assert_eq!(fetched.get_str("name").unwrap().as_deref(), Some("woofer"));
        assert!(!fetched.same_instance(&dog));

        dog.set("name", json!("fly")).unwrap();
        assert_eq!(dog.save(&db).unwrap(), SaveOutcome::Updated);
    }

    #[test]
    fn stale_copies_conflict() {
        let (zoo, db) = fixtures::zoo_database();
        let dog = Document::new(&zoo.dog);
        dog.save(&db).unwrap();
        let stale = db.get(&dog.key()).unwrap().unwrap();

        dog.set("name", json!("fly")).unwrap();
        dog.save(&db).unwrap();

        stale.set("name", json!("shep")).unwrap();
        let err = stale.save(&db).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(
            db.get(&dog.key()).unwrap().unwrap().get_str("name").unwrap().as_deref(),
            Some("fly")
        );
    }

    #[test]
    fn fresh_instance_over_existing_key_conflicts() {
        let (zoo, db) = fixtures::zoo_database();
        Document::with_key(&zoo.dog, "dog_1").save(&db).unwrap();
        let err = Document::with_key(&zoo.dog, "dog_1").save(&db).unwrap_err();
        assert!(matches!(err, OrmError::Conflict { .. }));
    }

    #[test]
    fn models_without_revisions_are_last_writer_wins() {
        let (zoo, db) = fixtures::zoo_database();
        let monkey = Document::with_key(&zoo.monkey, "monkey_1");
        monkey.save(&db).unwrap();
        let other = Document::with_key(&zoo.monkey, "monkey_1");
        other.set("name", json!("bubbles")).unwrap();
        assert_eq!(other.save(&db).unwrap(), SaveOutcome::Updated);
        assert_eq!(
            db.get("monkey_1").unwrap().unwrap().get_str("name").unwrap().as_deref(),
            Some("bubbles")
        );
    }

    #[test]
    fn immutable_fields_are_checked_against_storage() {
        let (zoo, db) = fixtures::zoo_database();
        let monkey = Document::with_key(&zoo.monkey, "monkey_1");
        monkey.set("colour", json!("brown")).unwrap();
        monkey.save(&db).unwrap();

        let other = Document::with_key(&zoo.monkey, "monkey_1");
        other.set("colour", json!("pink")).unwrap();
        assert!(matches!(other.save(&db), Err(OrmError::Immutable { .. })));
    }

    #[test]
    fn required_fields_are_checked_at_save() {
        let (zoo, db) = fixtures::zoo_database();
        let cat = Document::new(&zoo.cat);
        cat.set("legs", json!(4)).unwrap();
        let err = cat.save(&db).unwrap_err();
        assert!(matches!(err, OrmError::Validation { ref field, .. } if field == "owner_id"));
    }

    #[test]
    fn unique_values_are_enforced_and_released_on_delete() {
        let (zoo, db) = fixtures::zoo_database();
        let first = Document::new(&zoo.dog);
        first.set("kennel_club_membership", json!("123")).unwrap();
        first.save(&db).unwrap();

        let second = Document::new(&zoo.jack_russell);
        second.set("kennel_club_membership", json!("123")).unwrap();
        assert!(matches!(second.save(&db), Err(OrmError::Unique { .. })));

        first.delete(&db).unwrap();
        assert_eq!(second.save(&db).unwrap(), SaveOutcome::New);
        // re-saving the holder itself is fine
        assert_eq!(second.save(&db).unwrap(), SaveOutcome::Updated);
    }

    #[test]
    fn update_restores_on_failure() {
        let (zoo, db) = fixtures::zoo_database();
        let cat = fixtures::cat(&db, "whiskers");
        cat.update(&db, props(json!({"name": "tom", "colour": "ginger"})))
            .unwrap();
        let result = cat.update(&db, props(json!({"name": "felix", "colour": "black"})));
        assert!(matches!(result, Err(OrmError::Immutable { .. })));
        assert_eq!(cat.get_str("name").unwrap().as_deref(), Some("tom"));
        let stored = db.get(&cat.key()).unwrap().unwrap();
        assert_eq!(stored.get_str("name").unwrap().as_deref(), Some("tom"));
        assert_eq!(stored.type_name(), zoo.cat.type_name());
    }

    // ---------------------------------------------------------------
    // References and cascades
    // ---------------------------------------------------------------

    #[test]
    fn references_resolve_both_ways() {
        let (zoo, db) = fixtures::zoo_database();
        let person = Document::new(&zoo.person);
        person.save(&db).unwrap();
        let dog = Document::new(&zoo.dog);
        dog.set_reference("owner", Some(&person)).unwrap();
        dog.save(&db).unwrap();

        let dogs = person.get_references("dogs").unwrap();
        assert_eq!(dogs, vec![dog.clone()]);
        assert_eq!(dog.get_reference("owner").unwrap(), Some(person.clone()));
    }

    #[test]
    fn reference_from_covers_subclasses_and_inherited_owners() {
        let (zoo, db) = fixtures::zoo_database();
        let monarch = Document::new(&zoo.monarch);
        monarch.save(&db).unwrap();
        let jr = Document::new(&zoo.jack_russell);
        jr.set("owner_id", json!(monarch.key())).unwrap();
        jr.save(&db).unwrap();
        let cat = fixtures::owned_cat(&db, "tiddles", &monarch);

        assert_eq!(monarch.get_references("dogs").unwrap(), vec![jr.clone()]);
        let animals = monarch.get_references("animals").unwrap();
        assert_eq!(animals.len(), 2);
        assert!(animals.contains(&cat));
    }

    #[test]
    fn cascading_reference_from_deletes_children() {
        let (zoo, db) = fixtures::zoo_database();
        let person = Document::new(&zoo.person);
        person.save(&db).unwrap();
        let cat = fixtures::owned_cat(&db, "tiddles", &person);
        let dog = Document::new(&zoo.dog);
        dog.set_reference("owner", Some(&person)).unwrap();
        dog.save(&db).unwrap();

        person.delete(&db).unwrap();
        assert!(db.get(&person.key()).unwrap().is_none());
        assert!(db.get(&cat.key()).unwrap().is_none());

        let orphan = db.get(&dog.key()).unwrap().unwrap();
        assert!(orphan.get("owner_id").unwrap().is_unset());
    }

    #[test]
    fn cascading_reference_to_deletes_target() {
        let (zoo, db) = fixtures::zoo_database();
        let person = Document::new(&zoo.person);
        person.save(&db).unwrap();
        let dog = Document::new(&zoo.dog);
        dog.set_reference("owner", Some(&person)).unwrap();
        dog.save(&db).unwrap();

        dog.delete(&db).unwrap();
        assert!(db.get(&dog.key()).unwrap().is_none());
        assert!(db.get(&person.key()).unwrap().is_none());
    }

    // ---------------------------------------------------------------
    // Hooks
    // ---------------------------------------------------------------

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        approve_conflicts: bool,
    }

    impl Recorder {
        fn record(&self, name: &str) {
            self.calls.lock().expect("lock poisoned").push(name.to_string());
        }
    }

    impl DocumentHooks for Arc<Recorder> {
        fn pre_save_new(&self, _doc: &Document, _db: &dyn DocumentStore) -> OrmResult<()> {
            self.record("pre_save_new");
            Ok(())
        }
        fn post_save_new(&self, _doc: &Document, _db: &dyn DocumentStore) -> OrmResult<()> {
            self.record("post_save_new");
            Ok(())
        }
        fn pre_save_update(
            &self,
            _doc: &Document,
            _db: &dyn DocumentStore,
            old: &Properties,
        ) -> OrmResult<()> {
            self.record(&format!("pre_save_update:{}", old["name"]));
            Ok(())
        }
        fn post_save_update(&self, _doc: &Document, _db: &dyn DocumentStore) -> OrmResult<()> {
            self.record("post_save_update");
            Ok(())
        }
        fn pre_delete(&self, _doc: &Document, _db: &dyn DocumentStore) -> OrmResult<()> {
            self.record("pre_delete");
            Ok(())
        }
        fn post_delete(&self, _doc: &Document, _db: &dyn DocumentStore) -> OrmResult<()> {
            self.record("post_delete");
            Ok(())
        }
        fn resolve_conflict(
            &self,
            _doc: &Document,
            _db: &dyn DocumentStore,
            _stored: &DocumentRow,
        ) -> OrmResult<bool> {
            self.record("resolve_conflict");
            Ok(self.approve_conflicts)
        }
    }

    fn hooked(recorder: &Arc<Recorder>) -> (ModelClass, Database) {
        let schema = docmap_schema::ModelSchema::builder("Parrot")
            .namespace(NAMESPACE)
            .field("name", Field::string())
            .build()
            .unwrap();
        let class = ModelClass::with_hooks(schema, Arc::clone(recorder));
        let mapper = ClassMapper::new([class.clone()]).unwrap();
        (class, Database::in_memory(Arc::new(mapper)).unwrap())
    }

    #[test]
    fn hooks_run_in_order() {
        let recorder = Arc::new(Recorder::default());
        let (class, db) = hooked(&recorder);
        let parrot = Document::new(&class);
        parrot.set("name", json!("polly")).unwrap();
        parrot.save(&db).unwrap();
        parrot.save(&db).unwrap();
        parrot.delete(&db).unwrap();
        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec![
                "pre_save_new",
                "post_save_new",
                "pre_save_update:\"polly\"",
                "post_save_update",
                "pre_delete",
                "post_delete"
            ]
        );
    }

    #[test]
    fn conflict_hook_can_approve_writes() {
        let recorder = Arc::new(Recorder {
            approve_conflicts: true,
            ..Recorder::default()
        });
        let (class, db) = hooked(&recorder);
        Document::with_key(&class, "parrot_1").save(&db).unwrap();
        let other = Document::with_key(&class, "parrot_1");
        other.set("name", json!("polly")).unwrap();
        assert_eq!(other.save(&db).unwrap(), SaveOutcome::Updated);
        assert!(recorder
            .calls
            .lock()
            .unwrap()
            .contains(&"resolve_conflict".to_string()));
    }
}
