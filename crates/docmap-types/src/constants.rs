//! Property names and defaults shared by every layer.

/// Property holding the namespace discriminator on every stored document.
pub const NAMESPACE_PROPERTY: &str = "namespace";

/// Property holding the lowercase type discriminator on every stored document.
pub const TYPE_PROPERTY: &str = "type";

/// Namespace used by models that never declare one.
pub const DEFAULT_NAMESPACE: &str = "genericbase";

/// Names that bypass field mediation on a document and can never be declared
/// as fields.
pub const RESERVED_PROPERTY_NAMES: &[&str] = &["key", "rev", "_id", "_rev", "_db", "_properties"];
