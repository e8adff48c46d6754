//! Nested value objects held by object and list fields.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Converts a nested value object to and from its stored JSON form.
///
/// Assigning to an object field runs the assigned JSON through
/// [`ObjectCodec::normalize`], so malformed nested values are rejected at the
/// point of assignment and stored values are always in canonical form.
pub trait ObjectCodec: Send + Sync {
    /// Name used in validation errors.
    fn type_name(&self) -> &str;

    /// Validate `value` and return its canonical stored form.
    fn normalize(&self, value: Value) -> Result<Value, String>;

    /// A fresh default value, if the object type has one.
    fn default_json(&self) -> Option<Value> {
        None
    }
}

/// [`ObjectCodec`] for any serde round-trippable Rust type.
pub struct SerdeCodec<T> {
    name: &'static str,
    default: Option<fn() -> Value>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SerdeCodec<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    pub fn new() -> Self {
        Self {
            name: short_type_name::<T>(),
            default: None,
            _marker: PhantomData,
        }
    }

    /// Shared handle suitable for a field declaration.
    pub fn shared() -> Arc<dyn ObjectCodec> {
        Arc::new(Self::new())
    }

    /// Decode a stored value into `T`.
    pub fn decode(value: &Value) -> Result<T, String> {
        T::deserialize(value).map_err(|e| e.to_string())
    }

    /// Encode `T` into its stored form.
    pub fn encode(object: &T) -> Result<Value, String> {
        serde_json::to_value(object).map_err(|e| e.to_string())
    }
}

impl<T> SerdeCodec<T>
where
    T: Serialize + DeserializeOwned + Default + 'static,
{
    /// Like [`SerdeCodec::shared`], with `T::default()` as the default value.
    pub fn shared_with_default() -> Arc<dyn ObjectCodec> {
        Arc::new(Self {
            default: Some(|| serde_json::to_value(T::default()).unwrap_or(Value::Null)),
            ..Self::new()
        })
    }
}

impl<T> Default for SerdeCodec<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ObjectCodec for SerdeCodec<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn type_name(&self) -> &str {
        self.name
    }

    fn normalize(&self, value: Value) -> Result<Value, String> {
        let object = Self::decode(&value)?;
        Self::encode(&object)
    }

    fn default_json(&self) -> Option<Value> {
        self.default.map(|make| make())
    }
}

impl<T> fmt::Debug for SerdeCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerdeCodec").field("type", &self.name).finish()
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}
