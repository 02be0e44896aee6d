//! Relationships as tagged entities (spec §3 "Relationship (virtual)",
//! §4.6 relationship wrappers).
//!
//! There is no separate edge table: a relationship is an ordinary entity
//! carrying `type:relationship`, `_source:<id>`, `_target:<id>`, and
//! `_relationship:<kind>` tags. This module is a read-through view over
//! that shape plus thin `Repository` wrappers that translate edge
//! operations into entity operations (spec §9 "Relationships as tagged
//! entities vs. typed edges": preserve the former, expose the latter).

use crate::entity::{Entity, EntityId, NewEntity};
use crate::error::{CoreError, CoreResult};
use crate::repository::Repository;

/// Tag body marking an entity as a relationship.
pub const TAG_TYPE_RELATIONSHIP: &str = "type:relationship";

const SOURCE_PREFIX: &str = "_source:";
const TARGET_PREFIX: &str = "_target:";
const KIND_PREFIX: &str = "_relationship:";

/// A directed, typed edge between two entities, materialized from a
/// relationship-shaped [`Entity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// The relationship entity's own ID.
    pub id: EntityId,
    /// The edge's source entity.
    pub source: EntityId,
    /// The edge's target entity.
    pub target: EntityId,
    /// The edge kind (e.g. `has_credential`, `has_permission`).
    pub kind: String,
}

impl Relationship {
    /// Interprets an [`Entity`] as a relationship.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Corrupt`] if the entity lacks `type:relationship`
    /// or any of the `_source:`/`_target:`/`_relationship:` tags.
    pub fn from_entity(entity: &Entity) -> CoreResult<Self> {
        if !entity.has_current_tag(TAG_TYPE_RELATIONSHIP) {
            return Err(CoreError::corrupt(
                "type",
                format!("entity {} is not tagged type:relationship", entity.id),
            ));
        }
        let source = first_suffix(entity, SOURCE_PREFIX, "_source")?;
        let target = first_suffix(entity, TARGET_PREFIX, "_target")?;
        let kind = first_suffix(entity, KIND_PREFIX, "_relationship")?;
        Ok(Self {
            id: entity.id.clone(),
            source: EntityId::from_string(source),
            target: EntityId::from_string(target),
            kind,
        })
    }
}

fn first_suffix(entity: &Entity, prefix: &str, field: &'static str) -> CoreResult<String> {
    entity
        .current_suffixes(prefix)
        .into_iter()
        .next()
        .ok_or_else(|| CoreError::corrupt(field, format!("relationship missing {prefix} tag")))
}

fn relationship_tags(source: &EntityId, target: &EntityId, kind: &str) -> Vec<String> {
    vec![
        TAG_TYPE_RELATIONSHIP.to_string(),
        format!("{SOURCE_PREFIX}{source}"),
        format!("{TARGET_PREFIX}{target}"),
        format!("{KIND_PREFIX}{kind}"),
    ]
}

impl Repository {
    /// Creates a relationship entity with a fresh random ID (spec §4.6
    /// `CreateRelationship`).
    ///
    /// # Errors
    ///
    /// Propagates any [`Repository::create`] error.
    pub fn create_relationship(
        &self,
        source: &EntityId,
        target: &EntityId,
        kind: &str,
    ) -> CoreResult<Relationship> {
        let entity = self.create(NewEntity::new(relationship_tags(source, target, kind), None))?;
        Relationship::from_entity(&entity)
    }

    /// Creates a relationship entity with a caller-supplied ID.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IDExists`] if `id` already names a live entity,
    /// or propagates any other [`Repository::create`] error.
    pub fn create_relationship_with_id(
        &self,
        id: EntityId,
        source: &EntityId,
        target: &EntityId,
        kind: &str,
    ) -> CoreResult<Relationship> {
        let entity = self.create(NewEntity::with_id(id, relationship_tags(source, target, kind), None))?;
        Relationship::from_entity(&entity)
    }

    /// Fetches a single relationship by its own entity ID (spec §4.6
    /// `GetRelationshipByID`).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no live entity has this ID, or
    /// [`CoreError::Corrupt`] if it exists but is not relationship-shaped.
    pub fn get_relationship_by_id(&self, id: &EntityId) -> CoreResult<Relationship> {
        let entity = self.get_by_id(id)?;
        Relationship::from_entity(&entity)
    }

    /// Returns every live relationship whose source is `id` (spec §4.6
    /// `GetRelationshipsBySource`). Relationship-shaped entities that fail
    /// to parse are skipped rather than failing the whole call, matching
    /// [`Repository::list_by_tag`]'s single-entity isolation.
    ///
    /// # Errors
    ///
    /// Propagates any error from the underlying `ListByTag`.
    pub fn get_relationships_by_source(&self, id: &EntityId) -> CoreResult<Vec<Relationship>> {
        let entities = self.list_by_tag(&format!("{SOURCE_PREFIX}{id}"))?;
        Ok(entities.iter().filter_map(|e| Relationship::from_entity(e).ok()).collect())
    }

    /// Returns every live relationship whose target is `id`.
    ///
    /// # Errors
    ///
    /// Propagates any error from the underlying `ListByTag`.
    pub fn get_relationships_by_target(&self, id: &EntityId) -> CoreResult<Vec<Relationship>> {
        let entities = self.list_by_tag(&format!("{TARGET_PREFIX}{id}"))?;
        Ok(entities.iter().filter_map(|e| Relationship::from_entity(e).ok()).collect())
    }

    /// Returns every live relationship of `kind` whose source is `id`.
    ///
    /// # Errors
    ///
    /// Propagates any error from [`Repository::get_relationships_by_source`].
    pub fn get_relationships_by_source_and_kind(
        &self,
        id: &EntityId,
        kind: &str,
    ) -> CoreResult<Vec<Relationship>> {
        Ok(self
            .get_relationships_by_source(id)?
            .into_iter()
            .filter(|r| r.kind == kind)
            .collect())
    }

    /// Deletes a relationship (spec §4.6 `DeleteRelationship`).
    ///
    /// This is an ordinary tombstoning delete, same as any other entity
    /// (`DESIGN.md` resolves the spec §9 open question of whether deletion
    /// should also special-case removing the `_source:`/`_target:`
    /// postings: it does not — the normal delete path already drops the
    /// entity from every posting list it was indexed under, relationship
    /// tags included).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no live relationship has this ID.
    pub fn delete_relationship(&self, id: &EntityId) -> CoreResult<()> {
        self.delete(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use entitydb_storage::{InMemoryBackend, StorageBackend};

    fn open() -> Repository {
        let backend: Box<dyn StorageBackend> = Box::new(InMemoryBackend::new());
        Repository::open_with_backend(Config::default(), backend).unwrap()
    }

    #[test]
    fn create_and_fetch_by_source() {
        let repo = open();
        let e1 = repo.create(NewEntity::new(vec!["type:demo".into()], None)).unwrap();
        let e2 = repo.create(NewEntity::new(vec!["type:demo".into()], None)).unwrap();

        let rel = repo.create_relationship(&e1.id, &e2.id, "has_credential").unwrap();
        assert_eq!(rel.source, e1.id);
        assert_eq!(rel.target, e2.id);

        let by_source = repo.get_relationships_by_source(&e1.id).unwrap();
        assert_eq!(by_source.len(), 1);
        assert_eq!(by_source[0].id, rel.id);
    }

    #[test]
    fn round_trip_with_explicit_id() {
        let repo = open();
        let e1 = repo.create(NewEntity::new(vec!["type:demo".into()], None)).unwrap();
        let e2 = repo.create(NewEntity::new(vec!["type:demo".into()], None)).unwrap();
        let rel_id = EntityId::from_string("r1");

        repo.create_relationship_with_id(rel_id.clone(), &e1.id, &e2.id, "has_permission")
            .unwrap();

        let fetched = repo.get_relationship_by_id(&rel_id).unwrap();
        assert_eq!(fetched.kind, "has_permission");
        assert_eq!(fetched.source, e1.id);
    }

    #[test]
    fn delete_removes_from_source_listing() {
        let repo = open();
        let e1 = repo.create(NewEntity::new(vec!["type:demo".into()], None)).unwrap();
        let e2 = repo.create(NewEntity::new(vec!["type:demo".into()], None)).unwrap();
        let rel = repo.create_relationship(&e1.id, &e2.id, "has_credential").unwrap();

        repo.delete_relationship(&rel.id).unwrap();

        assert!(repo.get_relationships_by_source(&e1.id).unwrap().is_empty());
        assert!(matches!(
            repo.get_relationship_by_id(&rel.id).unwrap_err(),
            CoreError::NotFound { .. }
        ));
    }

    #[test]
    fn filters_by_kind() {
        let repo = open();
        let e1 = repo.create(NewEntity::new(vec!["type:demo".into()], None)).unwrap();
        let e2 = repo.create(NewEntity::new(vec!["type:demo".into()], None)).unwrap();
        let e3 = repo.create(NewEntity::new(vec!["type:demo".into()], None)).unwrap();

        repo.create_relationship(&e1.id, &e2.id, "has_credential").unwrap();
        repo.create_relationship(&e1.id, &e3.id, "has_permission").unwrap();

        let creds = repo.get_relationships_by_source_and_kind(&e1.id, "has_credential").unwrap();
        assert_eq!(creds.len(), 1);
        assert_eq!(creds[0].target, e2.id);
    }
}
