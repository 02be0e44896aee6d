//! Entity types: the sole storage unit (spec §3).

mod id;
mod tag;

pub use id::{EntityId, MAX_ID_LEN};
pub use tag::{ReservedPrefix, Tag, MAX_TAG_LEN};

use crate::error::CoreResult;

/// Caller-supplied entity, as passed to `Create`/`Update`.
///
/// `tags` are raw bodies or already-persisted `"<nanos>|<body>"` strings
/// (see [`Tag::normalize`]); the repository normalizes them at write time
/// using the current wall-clock nanosecond for any body lacking a prefix.
#[derive(Debug, Clone)]
pub struct NewEntity {
    /// The entity's identifier.
    pub id: EntityId,
    /// Tag bodies (or already-prefixed tags) to persist.
    pub tags: Vec<String>,
    /// Opaque content blob. `None` means no content field was ever set.
    pub content: Option<Vec<u8>>,
}

impl NewEntity {
    /// Builds a new-entity request with a fresh random ID.
    #[must_use]
    pub fn new(tags: Vec<String>, content: Option<Vec<u8>>) -> Self {
        Self {
            id: EntityId::new(),
            tags,
            content,
        }
    }

    /// Builds a new-entity request with an explicit ID.
    #[must_use]
    pub fn with_id(id: EntityId, tags: Vec<String>, content: Option<Vec<u8>>) -> Self {
        Self { id, tags, content }
    }
}

/// A fully materialized entity, as returned by `GetByID`/`ListByTag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    /// Opaque, globally unique identifier.
    pub id: EntityId,
    /// The full, ordered history of temporal tags ever recorded for this
    /// entity (duplicate bodies at different timestamps are preserved).
    pub tags: Vec<Tag>,
    /// Opaque content blob. `None` distinguishes "no content" from an
    /// explicit empty blob (`Some(vec![])`).
    pub content: Option<Vec<u8>>,
    /// Nanosecond timestamp of creation.
    pub created_at: i64,
    /// Nanosecond timestamp of the most recent mutation.
    pub updated_at: i64,
}

impl Entity {
    /// Computes the *current tag-body set* at time `at_nanos` (spec §3
    /// "Derived views"): for each distinct body, the most recent
    /// `<nanos>|body` with `nanos <= at_nanos`, excluded if that latest
    /// record is a [`Tag::removal_marker`] — i.e. "include B iff ... no
    /// later record marks it removed".
    #[must_use]
    pub fn tag_bodies_at(&self, at_nanos: i64) -> Vec<&str> {
        use std::collections::HashMap;
        let mut latest: HashMap<&str, (i64, bool)> = HashMap::new();
        for tag in &self.tags {
            if tag.nanos > at_nanos {
                continue;
            }
            let body = tag.marked_body();
            let removed = tag.is_removal_marker();
            latest
                .entry(body)
                .and_modify(|(n, r)| {
                    if tag.nanos >= *n {
                        *n = tag.nanos;
                        *r = removed;
                    }
                })
                .or_insert((tag.nanos, removed));
        }
        let mut bodies: Vec<&str> = latest
            .into_iter()
            .filter(|(_, (_, removed))| !removed)
            .map(|(body, _)| body)
            .collect();
        bodies.sort_unstable();
        bodies
    }

    /// Returns `true` if this entity currently (as of `updated_at`) carries
    /// the given tag body.
    #[must_use]
    pub fn has_current_tag(&self, body: &str) -> bool {
        self.tag_bodies_at(self.updated_at).iter().any(|b| *b == body)
    }

    /// Returns the current values for every tag under a given prefix,
    /// e.g. `rbac:role:` -> `["admin", "editor"]`. Used by the security
    /// primitives and the relationship view.
    #[must_use]
    pub fn current_suffixes(&self, prefix: &str) -> Vec<String> {
        self.tag_bodies_at(self.updated_at)
            .into_iter()
            .filter_map(|b| b.strip_prefix(prefix).map(str::to_string))
            .collect()
    }

    /// Validates the invariants spec §3 requires of a fully built entity:
    /// `UpdatedAt >= CreatedAt`; all per-tag timestamps >= `CreatedAt`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::CoreError::Invalid`] on violation.
    pub fn validate(&self) -> CoreResult<()> {
        use crate::error::CoreError;
        if self.updated_at < self.created_at {
            return Err(CoreError::invalid("updated_at precedes created_at"));
        }
        if let Some(bad) = self.tags.iter().find(|t| t.nanos < self.created_at) {
            return Err(CoreError::invalid(format!(
                "tag {:?} predates created_at",
                bad.body
            )));
        }
        Ok(())
    }
}
