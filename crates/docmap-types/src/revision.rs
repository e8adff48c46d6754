use std::fmt;

use serde::{Deserialize, Serialize};

/// Optimistic-concurrency token attached to a stored document.
///
/// The mapper treats revisions as opaque strings and only ever compares them
/// for equality. Backends that mint their own revisions (see
/// [`Revision::derive`]) use the `<generation>-<digest>` layout, where the
/// digest is a domain-separated BLAKE3 hash of the stored body.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    /// Wrap an existing revision string (as returned by a backend).
    pub fn new(rev: impl Into<String>) -> Self {
        Self(rev.into())
    }

    /// Mint the revision for the `generation`-th write of `body`.
    pub fn derive(generation: u64, body: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"docmap-rev-v1:");
        hasher.update(body);
        let digest = hasher.finalize().to_hex();
        Self(format!("{generation}-{}", &digest.as_str()[..16]))
    }

    /// The raw revision string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The generation prefix, if the revision follows the
    /// `<generation>-<digest>` layout.
    pub fn generation(&self) -> Option<u64> {
        let (generation, _) = self.0.split_once('-')?;
        generation.parse().ok()
    }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Revision({})", self.0)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Revision {
    fn from(rev: &str) -> Self {
        Self::new(rev)
    }
}

impl From<String> for Revision {
    fn from(rev: String) -> Self {
        Self(rev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic() {
        let r1 = Revision::derive(1, b"{\"name\":\"woofer\"}");
        let r2 = Revision::derive(1, b"{\"name\":\"woofer\"}");
        assert_eq!(r1, r2);
    }

    #[test]
    fn generation_changes_revision() {
        let r1 = Revision::derive(1, b"body");
        let r2 = Revision::derive(2, b"body");
        assert_ne!(r1, r2);
        assert_eq!(r1.generation(), Some(1));
        assert_eq!(r2.generation(), Some(2));
    }

    #[test]
    fn digest_is_sixteen_hex_chars() {
        let rev = Revision::derive(12, b"body");
        let (_, digest) = rev.as_str().split_once('-').unwrap();
        assert_eq!(digest.len(), 16);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn opaque_revisions_have_no_generation() {
        assert_eq!(Revision::new("abc").generation(), None);
        assert_eq!(Revision::new("x-y").generation(), None);
    }

    #[test]
    fn serde_is_transparent() {
        let rev = Revision::new("3-deadbeef");
        let json = serde_json::to_string(&rev).unwrap();
        assert_eq!(json, "\"3-deadbeef\"");
        let parsed: Revision = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, rev);
    }
}
