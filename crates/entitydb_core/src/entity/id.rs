//! Entity identifier.

use std::fmt;
use uuid::Uuid;

/// Maximum length, in bytes, an [`EntityId`] may occupy once encoded into
/// the fixed-width index-entry ID field (see `entitydb_codec::ID_WIDTH`).
pub const MAX_ID_LEN: usize = entitydb_codec::ID_WIDTH;

/// Opaque, globally unique identifier for an entity.
///
/// IDs are immutable once assigned and are never reused after deletion
/// (spec §3: "Never reused after deletion"). The default constructor
/// produces a UUIDv4 in hyphenated textual form, which fits comfortably
/// within the 36-byte ID field the on-disk index entry reserves; callers
/// may also supply their own string ID, as long as it fits.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(String);

impl EntityId {
    /// Generates a new random entity ID (UUIDv4, hyphenated).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps an existing string as an entity ID without validation.
    ///
    /// Prefer [`EntityId::parse`] at ingress boundaries, which rejects IDs
    /// too long to round-trip through the index-entry encoding.
    #[must_use]
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parses a caller-supplied ID, rejecting empty strings or strings
    /// that would not fit in the on-disk index entry's ID field.
    ///
    /// # Errors
    ///
    /// Returns `Err` with a description if `id` is empty or too long.
    pub fn parse(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.is_empty() {
            return Err("entity id must not be empty".to_string());
        }
        if id.len() > MAX_ID_LEN {
            return Err(format!(
                "entity id {} bytes exceeds max {MAX_ID_LEN}",
                id.len()
            ));
        }
        Ok(Self(id))
    }

    /// Borrows the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_unique() {
        let id1 = EntityId::new();
        let id2 = EntityId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn parse_rejects_empty() {
        assert!(EntityId::parse("").is_err());
    }

    #[test]
    fn parse_rejects_overlong() {
        let long = "x".repeat(MAX_ID_LEN + 1);
        assert!(EntityId::parse(long).is_err());
    }

    #[test]
    fn parse_accepts_custom_id() {
        let id = EntityId::parse("u_admin").unwrap();
        assert_eq!(id.as_str(), "u_admin");
    }

    #[test]
    fn ordering_and_display() {
        let a = EntityId::from_string("a");
        let b = EntityId::from_string("b");
        assert!(a < b);
        assert_eq!(format!("{a}"), "a");
    }
}
