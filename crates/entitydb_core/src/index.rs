//! The in-memory tag index: a body index for current-state lookups plus a
//! temporal index for time-travel reconstructions (spec §4.5).

use crate::entity::{Entity, EntityId, Tag};
use std::collections::{HashMap, HashSet};

/// Inverted index from tag body to every entity currently carrying it,
/// plus the per-entity temporal history needed for "at time T" queries.
///
/// Posting sets are copy-on-write: `ListByTag` clones the set under a
/// brief read lock rather than holding the lock across materialization
/// (spec §5: "Posting sets are copy-on-write to minimize reader stalls").
/// The caller (`Repository`) is responsible for the actual `RwLock`; this
/// type is the protected payload.
#[derive(Debug, Default, Clone)]
pub struct TagIndex {
    body_index: HashMap<String, HashSet<EntityId>>,
    temporal_index: HashMap<EntityId, Vec<Tag>>,
}

/// A structural discrepancy surfaced by [`TagIndex::verify_health`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexDiscrepancy {
    /// The body index lists `id` under `body`, but the entity's current
    /// tag-body set (per its temporal history) does not contain `body`.
    DanglingPosting {
        /// The offending tag body.
        body: String,
        /// The entity incorrectly listed.
        id: EntityId,
    },
    /// The entity currently carries `body`, but the body index has no
    /// posting for it.
    MissingPosting {
        /// The tag body that should be indexed.
        body: String,
        /// The entity missing from the posting list.
        id: EntityId,
    },
    /// An entity appears in the temporal index with no corresponding live
    /// entity (orphaned after a delete that didn't clean up correctly).
    OrphanEntry {
        /// The orphaned entity ID.
        id: EntityId,
    },
    /// The directory lists `id` as live, but its payload could not be
    /// read back and decoded (spec §8 scenario 5: corruption is isolated
    /// to the affected entity, and surfaces here rather than aborting the
    /// whole health check).
    UnreadablePayload {
        /// The entity whose payload failed to decode.
        id: EntityId,
    },
}

impl TagIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every entity ID currently carrying `body` (spec §4.5
    /// `ListByTag`). Order is unspecified.
    #[must_use]
    pub fn list_by_tag(&self, body: &str) -> Vec<EntityId> {
        self.body_index
            .get(body)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns every distinct tag body currently indexed, for prefix scans
    /// (spec §4.5: "callers that need high throughput must pass the exact
    /// body", but a prefix scan is still offered for the rarer case).
    pub fn scan_prefix(&self, prefix: &str) -> Vec<String> {
        self.body_index
            .keys()
            .filter(|body| body.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Returns the full temporal tag history recorded for `id`, if any.
    #[must_use]
    pub fn history(&self, id: &EntityId) -> Option<&[Tag]> {
        self.temporal_index.get(id).map(Vec::as_slice)
    }

    /// Records (or re-records) an entity's full tag history and updates
    /// the body index to reflect its *current* tag-body set. Called after
    /// every `Create`/`Update`.
    pub fn put(&mut self, id: EntityId, tags: Vec<Tag>) {
        self.remove_postings(&id);
        let current: HashSet<String> = current_bodies(&tags);
        for body in current {
            self.body_index.entry(body).or_default().insert(id.clone());
        }
        self.temporal_index.insert(id, tags);
    }

    /// Removes an entity from the body index (called on `Delete`). The
    /// temporal history is retained — spec leaves the exact behavior of
    /// temporal queries against a tombstoned entity as an open question
    /// (resolved in `DESIGN.md`: history stays queryable, current-state
    /// lookups do not).
    pub fn tombstone(&mut self, id: &EntityId) {
        self.remove_postings(id);
    }

    /// Fully removes an entity from both structures (used by `compact`
    /// once a tombstone has aged past the retention watermark).
    pub fn purge(&mut self, id: &EntityId) {
        self.remove_postings(id);
        self.temporal_index.remove(id);
    }

    fn remove_postings(&mut self, id: &EntityId) {
        if let Some(old_tags) = self.temporal_index.get(id) {
            for body in current_bodies(old_tags) {
                if let Some(set) = self.body_index.get_mut(&body) {
                    set.remove(id);
                    if set.is_empty() {
                        self.body_index.remove(&body);
                    }
                }
            }
        }
    }

    /// Number of entities with recorded history (live or tombstoned).
    #[must_use]
    pub fn len(&self) -> usize {
        self.temporal_index.len()
    }

    /// Returns `true` if no entity has ever been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.temporal_index.is_empty()
    }

    /// Rebuilds the index from scratch given a full set of live entities
    /// (spec §4.5 `ReindexTags`: "rebuilds both structures by scanning
    /// every payload").
    pub fn rebuild<'a>(entities: impl Iterator<Item = &'a Entity>) -> Self {
        let mut index = Self::new();
        for entity in entities {
            index.put(entity.id.clone(), entity.tags.clone());
        }
        index
    }

    /// Cross-checks the index against a source-of-truth set of live
    /// entities, returning every discrepancy found (spec §4.6
    /// `VerifyIndexHealth`, expanded per `SPEC_FULL.md` §4 into a
    /// structured list rather than a bare pass/fail).
    pub fn verify_health<'a>(
        &self,
        live_entities: impl Iterator<Item = &'a Entity>,
    ) -> Vec<IndexDiscrepancy> {
        let mut discrepancies = Vec::new();
        let mut seen_ids: HashSet<EntityId> = HashSet::new();

        for entity in live_entities {
            seen_ids.insert(entity.id.clone());
            let current = current_bodies(&entity.tags);

            for body in &current {
                let indexed = self
                    .body_index
                    .get(body)
                    .is_some_and(|set| set.contains(&entity.id));
                if !indexed {
                    discrepancies.push(IndexDiscrepancy::MissingPosting {
                        body: body.clone(),
                        id: entity.id.clone(),
                    });
                }
            }

            for (body, set) in &self.body_index {
                if set.contains(&entity.id) && !current.contains(body) {
                    discrepancies.push(IndexDiscrepancy::DanglingPosting {
                        body: body.clone(),
                        id: entity.id.clone(),
                    });
                }
            }
        }

        for (body, set) in &self.body_index {
            for id in set {
                if !seen_ids.contains(id) {
                    discrepancies.push(IndexDiscrepancy::DanglingPosting {
                        body: body.clone(),
                        id: id.clone(),
                    });
                }
            }
        }

        discrepancies
    }
}

/// The current tag-body set per spec §3: for each distinct body, the
/// latest record wins, and a removal marker counts as "latest" like any
/// other record — it just excludes the body instead of confirming it.
fn current_bodies(tags: &[Tag]) -> HashSet<String> {
    let mut latest: HashMap<&str, (i64, bool)> = HashMap::new();
    for tag in tags {
        let (body, removed) = (tag.marked_body(), tag.is_removal_marker());
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
    latest
        .into_iter()
        .filter(|(_, (_, removed))| !removed)
        .map(|(body, _)| body.to_string())
        .collect()
}
