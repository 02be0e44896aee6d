//! Lazy, chainable body-intersection queries (spec §4.6 `Query()`).

use crate::entity::{Entity, EntityId};
use crate::error::CoreResult;
use crate::repository::Repository;
use std::collections::HashSet;

/// Builds a query over the tag index by intersecting the candidate ID
/// sets for every tag body added, materializing nothing until
/// [`QueryBuilder::execute`] is called.
pub struct QueryBuilder<'a> {
    repo: &'a Repository,
    bodies: Vec<String>,
}

impl<'a> QueryBuilder<'a> {
    pub(crate) fn new(repo: &'a Repository) -> Self {
        Self {
            repo,
            bodies: Vec::new(),
        }
    }

    /// Adds a tag body every result must currently carry.
    #[must_use]
    pub fn with_tag(mut self, body: impl Into<String>) -> Self {
        self.bodies.push(body.into());
        self
    }

    /// Returns the IDs matching every body added so far, without fetching
    /// payloads. An empty query (no `with_tag` calls) matches nothing —
    /// spec §4.6 describes `Query()` as a filterable sequence, not an
    /// implicit "everything".
    #[must_use]
    pub fn matching_ids(&self) -> Vec<EntityId> {
        let mut bodies = self.bodies.iter();
        let Some(first) = bodies.next() else {
            return Vec::new();
        };
        let mut acc: HashSet<EntityId> = self.repo.list_ids_by_tag(first).into_iter().collect();
        for body in bodies {
            if acc.is_empty() {
                break;
            }
            let next: HashSet<EntityId> = self.repo.list_ids_by_tag(body).into_iter().collect();
            acc.retain(|id| next.contains(id));
        }
        acc.into_iter().collect()
    }

    /// Materializes every entity matching every body added. An entity that
    /// fails to decode is skipped, matching [`Repository::list_by_tag`]'s
    /// single-entity isolation rather than failing the whole query.
    ///
    /// # Errors
    ///
    /// Never returns an error itself; reserved for future backends whose
    /// ID enumeration can fail independently of individual reads.
    pub fn execute(&self) -> CoreResult<Vec<Entity>> {
        let ids = self.matching_ids();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Ok(entity) = self.repo.get_by_id(&id) {
                out.push(entity);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::entity::NewEntity;
    use entitydb_storage::{InMemoryBackend, StorageBackend};

    fn open() -> Repository {
        let backend: Box<dyn StorageBackend> = Box::new(InMemoryBackend::new());
        Repository::open_with_backend(Config::default(), backend).unwrap()
    }

    #[test]
    fn empty_query_matches_nothing() {
        let repo = open();
        repo.create(NewEntity::new(vec!["type:demo".into()], None)).unwrap();
        assert!(repo.query().execute().unwrap().is_empty());
    }

    #[test]
    fn single_tag_matches_all_with_it() {
        let repo = open();
        repo.create(NewEntity::new(vec!["type:user".into()], None)).unwrap();
        repo.create(NewEntity::new(vec!["type:user".into()], None)).unwrap();
        repo.create(NewEntity::new(vec!["type:role".into()], None)).unwrap();

        assert_eq!(repo.query().with_tag("type:user").execute().unwrap().len(), 2);
    }

    #[test]
    fn intersection_narrows_to_entities_with_every_tag() {
        let repo = open();
        let matching = repo
            .create(NewEntity::new(vec!["type:user".into(), "status:active".into()], None))
            .unwrap();
        repo.create(NewEntity::new(vec!["type:user".into(), "status:inactive".into()], None))
            .unwrap();

        let results = repo
            .query()
            .with_tag("type:user")
            .with_tag("status:active")
            .execute()
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, matching.id);
    }

    #[test]
    fn intersection_with_no_overlap_is_empty() {
        let repo = open();
        repo.create(NewEntity::new(vec!["type:user".into()], None)).unwrap();
        repo.create(NewEntity::new(vec!["type:role".into()], None)).unwrap();

        let results = repo.query().with_tag("type:user").with_tag("type:role").execute().unwrap();
        assert!(results.is_empty());
    }
}
