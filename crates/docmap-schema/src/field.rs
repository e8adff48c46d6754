//! Declarative field descriptors.
//!
//! A [`Field`] describes one property of a model: the value shape it
//! accepts, whether it is required, immutable or unique, and its default.
//! Descriptors are shared by every document of the owning model and carry
//! no per-document state.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::codec::ObjectCodec;
use crate::error::{SchemaError, SchemaResult};
use crate::format;

/// A stored foreign key (`<name>_id`) pointing at another document's key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceTo {
    pub refns: String,
    pub refcls: String,
    pub cascade_delete: bool,
}

/// A virtual collection: every document of `refcls` (in `refns`) whose
/// `fkey` property holds this document's key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceFrom {
    pub refns: String,
    pub refcls: Vec<String>,
    pub fkey: String,
    pub cascade_delete: bool,
}

/// The value shape accepted by a field.
#[derive(Clone)]
pub enum FieldKind {
    Bool,
    Number,
    String,
    /// A string constrained to email addresses.
    Email,
    /// A UTC ISO-8601 string.
    DateTime,
    /// Base64-encoded bytes.
    Bytes,
    /// A `[latitude, longitude]` pair in degrees.
    LatLong,
    /// An exact decimal stored as a string.
    Decimal,
    /// An exact ratio stored as an `"n/d"` string.
    Fraction,
    Dict,
    /// A homogeneous list, optionally of nested value objects.
    List(Option<Arc<dyn ObjectCodec>>),
    /// A nested value object.
    Object(Arc<dyn ObjectCodec>),
    ReferenceTo(ReferenceTo),
    ReferenceFrom(ReferenceFrom),
}

impl FieldKind {
    /// Short name used in descriptions and errors.
    pub fn name(&self) -> &str {
        match self {
            Self::Bool => "bool",
            Self::Number => "number",
            Self::String => "string",
            Self::Email => "email",
            Self::DateTime => "datetime",
            Self::Bytes => "bytes",
            Self::LatLong => "latlong",
            Self::Decimal => "decimal",
            Self::Fraction => "fraction",
            Self::Dict => "dict",
            Self::List(_) => "list",
            Self::Object(codec) => codec.type_name(),
            Self::ReferenceTo(_) => "reference-to",
            Self::ReferenceFrom(_) => "reference-from",
        }
    }
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReferenceTo(r) => f.debug_tuple("ReferenceTo").field(r).finish(),
            Self::ReferenceFrom(r) => f.debug_tuple("ReferenceFrom").field(r).finish(),
            Self::List(Some(codec)) => write!(f, "List({})", codec.type_name()),
            Self::Object(codec) => write!(f, "Object({})", codec.type_name()),
            other => f.write_str(other.name()),
        }
    }
}

/// A field's default: a literal (cloned per document) or a factory closure.
#[derive(Clone)]
pub enum DefaultValue {
    Value(Value),
    Factory(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// Descriptor for one declared property.
#[derive(Clone, Debug)]
pub struct Field {
    kind: FieldKind,
    required: bool,
    immutable: bool,
    unique: bool,
    default: Option<DefaultValue>,
}

impl Field {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            required: false,
            immutable: false,
            unique: false,
            default: None,
        }
    }

    pub fn bool() -> Self {
        Self::new(FieldKind::Bool)
    }

    pub fn number() -> Self {
        Self::new(FieldKind::Number)
    }

    pub fn string() -> Self {
        Self::new(FieldKind::String)
    }

    pub fn email() -> Self {
        Self::new(FieldKind::Email)
    }

    pub fn datetime() -> Self {
        Self::new(FieldKind::DateTime)
    }

    pub fn bytes() -> Self {
        Self::new(FieldKind::Bytes)
    }

    pub fn lat_long() -> Self {
        Self::new(FieldKind::LatLong)
    }

    pub fn decimal() -> Self {
        Self::new(FieldKind::Decimal)
    }

    pub fn fraction() -> Self {
        Self::new(FieldKind::Fraction)
    }

    pub fn dict() -> Self {
        Self::new(FieldKind::Dict)
    }

    pub fn list() -> Self {
        Self::new(FieldKind::List(None))
    }

    /// A list whose items are nested value objects.
    pub fn list_of(item: Arc<dyn ObjectCodec>) -> Self {
        Self::new(FieldKind::List(Some(item)))
    }

    pub fn object(codec: Arc<dyn ObjectCodec>) -> Self {
        Self::new(FieldKind::Object(codec))
    }

    /// A stored foreign key to a document of `refcls` in `refns`.
    pub fn reference_to(refns: impl Into<String>, refcls: impl Into<String>) -> Self {
        Self::new(FieldKind::ReferenceTo(ReferenceTo {
            refns: refns.into(),
            refcls: refcls.into(),
            cascade_delete: false,
        }))
    }

    /// A virtual collection of `refcls` documents whose `fkey` points here.
    pub fn reference_from(
        refns: impl Into<String>,
        refcls: impl Into<String>,
        fkey: impl Into<String>,
    ) -> Self {
        Self::reference_from_any(refns, [refcls.into()], fkey)
    }

    /// Like [`Field::reference_from`], over several referencing types.
    pub fn reference_from_any<I, S>(refns: impl Into<String>, refcls: I, fkey: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(FieldKind::ReferenceFrom(ReferenceFrom {
            refns: refns.into(),
            refcls: refcls.into_iter().map(Into::into).collect(),
            fkey: fkey.into(),
            cascade_delete: false,
        }))
    }

    // ---------------------------------------------------------------
    // Options
    // ---------------------------------------------------------------

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Once a non-null value is present it may not change.
    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    /// At most one live document per namespace, type and value.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default(mut self, value: Value) -> Self {
        self.default = Some(DefaultValue::Value(value));
        self
    }

    pub fn default_with<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Factory(Arc::new(factory)));
        self
    }

    /// Use the nested object type's own default. No-op for other kinds.
    pub fn default_object(mut self) -> Self {
        if let FieldKind::Object(codec) = &self.kind {
            let codec = Arc::clone(codec);
            self.default = Some(DefaultValue::Factory(Arc::new(move || {
                codec.default_json().unwrap_or(Value::Null)
            })));
        }
        self
    }

    /// Delete the referenced (or referencing) documents along with the owner.
    /// No-op for non-reference kinds.
    pub fn cascade_delete(mut self) -> Self {
        match &mut self.kind {
            FieldKind::ReferenceTo(r) => r.cascade_delete = true,
            FieldKind::ReferenceFrom(r) => r.cascade_delete = true,
            _ => {}
        }
        self
    }

    // ---------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn as_reference_to(&self) -> Option<&ReferenceTo> {
        match &self.kind {
            FieldKind::ReferenceTo(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_reference_from(&self) -> Option<&ReferenceFrom> {
        match &self.kind {
            FieldKind::ReferenceFrom(r) => Some(r),
            _ => None,
        }
    }

    /// Computed fields are never persisted.
    pub fn is_virtual(&self) -> bool {
        matches!(self.kind, FieldKind::ReferenceFrom(_))
    }

    /// A fresh copy of the default value.
    pub fn get_default(&self) -> Option<Value> {
        match &self.default {
            Some(DefaultValue::Value(v)) => Some(v.clone()),
            Some(DefaultValue::Factory(make)) => Some(make()),
            None => None,
        }
    }

    /// Returns `true` if `value` has an acceptable shape. Null is always
    /// acceptable; `required` is enforced separately at save time.
    pub fn is_correct_type(&self, value: &Value) -> bool {
        match (&self.kind, value) {
            (_, Value::Null) => true,
            (FieldKind::Bool, Value::Bool(_)) => true,
            (FieldKind::Number, Value::Number(_)) => true,
            (FieldKind::String, Value::String(_)) => true,
            (FieldKind::Email, Value::String(s)) => format::is_email(s),
            (FieldKind::DateTime, Value::String(s)) => format::parse_datetime(s).is_some(),
            (FieldKind::Bytes, Value::String(s)) => format::decode_bytes(s).is_some(),
            (FieldKind::LatLong, Value::Array(_)) => format::parse_lat_long(value).is_some(),
            (FieldKind::Decimal, Value::String(s)) => format::parse_decimal(s).is_some(),
            (FieldKind::Fraction, Value::String(s)) => format::parse_fraction(s).is_some(),
            (FieldKind::Dict, Value::Object(_)) => true,
            (FieldKind::List(_), Value::Array(_)) => true,
            (FieldKind::Object(_), Value::Object(_)) => true,
            (FieldKind::ReferenceTo(_), Value::String(_)) => true,
            _ => false,
        }
    }

    /// Validate `value` and bring nested objects into canonical form.
    pub fn coerce(&self, value: Value) -> Result<Value, String> {
        if !self.is_correct_type(&value) {
            return Err(format!("expected {}, got {value}", self.kind.name()));
        }
        match (&self.kind, value) {
            (_, Value::Null) => Ok(Value::Null),
            (FieldKind::Object(codec), value) => codec.normalize(value),
            (FieldKind::LatLong, value) => format::parse_lat_long(&value)
                .map(format::LatLong::to_value)
                .ok_or_else(|| format!("expected latlong, got {value}")),
            (FieldKind::Decimal, Value::String(s)) => format::parse_decimal(&s)
                .map(|d| Value::String(d.to_string()))
                .ok_or_else(|| format!("expected decimal, got {s}")),
            (FieldKind::Fraction, Value::String(s)) => format::parse_fraction(&s)
                .map(|f| Value::String(f.to_string()))
                .ok_or_else(|| format!("expected fraction, got {s}")),
            (FieldKind::List(Some(codec)), Value::Array(items)) => items
                .into_iter()
                .map(|item| codec.normalize(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            (_, value) => Ok(value),
        }
    }

    /// Human-readable summary, e.g. `ns:zoo resource:person required`.
    pub fn describe(&self) -> String {
        let mut attrs = Vec::new();
        match &self.kind {
            FieldKind::ReferenceTo(r) => {
                attrs.push(format!("ns:{}", r.refns));
                attrs.push(format!("resource:{}", r.refcls));
            }
            FieldKind::ReferenceFrom(r) => {
                attrs.push(format!("ns:{}", r.refns));
                attrs.push(format!("resource:{}", r.refcls.join(",")));
                attrs.push(format!("key:{}", r.fkey));
            }
            kind => attrs.push(kind.name().to_string()),
        }
        if self.required {
            attrs.push("required".into());
        }
        if self.immutable {
            attrs.push("immutable".into());
        }
        if self.unique {
            attrs.push("unique".into());
        }
        attrs.join(" ")
    }

    pub(crate) fn check(&self, model: &str, name: &str) -> SchemaResult<()> {
        if self.required && self.default.is_some() {
            return Err(SchemaError::RequiredWithDefault {
                model: model.to_string(),
                field: name.to_string(),
            });
        }
        match &self.kind {
            FieldKind::ReferenceTo(_) if !name.ends_with("_id") => {
                Err(SchemaError::ReferenceNameMissingIdSuffix {
                    model: model.to_string(),
                    field: name.to_string(),
                })
            }
            FieldKind::ReferenceFrom(r) if r.refcls.is_empty() => {
                Err(SchemaError::EmptyReferenceTargets {
                    model: model.to_string(),
                    field: name.to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}
