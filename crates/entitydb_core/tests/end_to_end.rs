//! End-to-end scenarios exercising the full `Repository` surface through
//! its public API, one test per scenario.

use entitydb_core::{Config, EntityId, NewEntity, Repository};
use tempfile::tempdir;

fn config(dir: &std::path::Path) -> Config {
    Config::new().data_path(dir)
}

#[test]
fn create_reopen_get() {
    let dir = tempdir().unwrap();
    {
        let repo = Repository::open(config(dir.path())).unwrap();
        repo.create(NewEntity::with_id(
            EntityId::from_string("e1"),
            vec!["type:demo".into(), "k:v".into()],
            Some(b"hi".to_vec()),
        ))
        .unwrap();
        repo.close().unwrap();
    }

    let repo = Repository::open(config(dir.path())).unwrap();
    let fetched = repo.get_by_id(&EntityId::from_string("e1")).unwrap();
    assert_eq!(fetched.content, Some(b"hi".to_vec()));

    let by_tag = repo.list_by_tag("k:v").unwrap();
    assert_eq!(by_tag.len(), 1);
    assert_eq!(by_tag[0].id, fetched.id);
}

#[test]
fn update_preserves_history() {
    let dir = tempdir().unwrap();
    let repo = Repository::open(config(dir.path())).unwrap();
    let id = EntityId::from_string("e2");

    let created = repo
        .create(NewEntity::with_id(id.clone(), vec!["status:todo".into()], None))
        .unwrap();
    let original_created_at = created.created_at;

    repo.update(NewEntity::with_id(id.clone(), vec!["status:done".into()], None))
        .unwrap();

    assert!(repo.list_by_tag("status:todo").unwrap().is_empty());
    let done = repo.list_by_tag("status:done").unwrap();
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].id, id);

    let updated = repo.get_by_id(&id).unwrap();
    assert_eq!(updated.tag_bodies_at(original_created_at), vec!["status:todo"]);
}

#[test]
fn credential_authentication() {
    let dir = tempdir().unwrap();
    let repo = Repository::open(config(dir.path())).unwrap();

    let user = repo.create_user("admin", &[]).unwrap();
    repo.create_credential(&user.id, "admin").unwrap();

    let authenticated = repo.authenticate("admin", "admin").unwrap();
    assert_eq!(authenticated.id, user.id);
    assert!(repo.authenticate("admin", "wrong").is_err());
}

#[test]
fn crash_between_wal_and_index_is_recovered_on_reopen() {
    let dir = tempdir().unwrap();
    let id = EntityId::from_string("e4");
    {
        // Never checkpointed or closed: only the WAL append on disk
        // stands for this entity, exactly like a crash right after the
        // writer's fsync but before any index snapshot is taken.
        let repo = Repository::open(config(dir.path())).unwrap();
        repo.create(NewEntity::with_id(id.clone(), vec!["type:demo".into()], None))
            .unwrap();
    }

    let repo = Repository::open(config(dir.path())).unwrap();
    let recovered = repo.get_by_id(&id).unwrap();
    assert_eq!(recovered.id, id);
    assert_eq!(repo.list_by_tag("type:demo").unwrap().len(), 1);
}

#[test]
fn corruption_is_isolated_to_the_affected_entity() {
    let dir = tempdir().unwrap();
    let path = config(dir.path()).database_path();
    let healthy_id = EntityId::from_string("healthy");
    let corrupt_id = EntityId::from_string("corrupt");
    let marker: &[u8] = b"corruption-target-payload-marker";

    {
        let repo = Repository::open(config(dir.path())).unwrap();
        repo.create(NewEntity::with_id(healthy_id.clone(), vec!["type:demo".into()], Some(b"fine".to_vec())))
            .unwrap();
        repo.create(NewEntity::with_id(
            corrupt_id.clone(),
            vec!["type:demo".into()],
            Some(marker.to_vec()),
        ))
        .unwrap();
        repo.checkpoint().unwrap();
        repo.close().unwrap();
    }

    // Flip a byte in the content CRC trailer that immediately follows the
    // marker bytes in the on-disk `EntityRecord` encoding.
    let mut bytes = std::fs::read(&path).unwrap();
    let marker_at = bytes
        .windows(marker.len())
        .position(|w| w == marker)
        .expect("marker bytes not found in database file");
    let crc_byte = marker_at + marker.len();
    bytes[crc_byte] ^= 0xFF;
    std::fs::write(&path, &bytes).unwrap();

    let repo = Repository::open(config(dir.path())).unwrap();
    assert!(repo.get_by_id(&corrupt_id).is_err());
    let healthy = repo.get_by_id(&healthy_id).unwrap();
    assert_eq!(healthy.content, Some(b"fine".to_vec()));

    let discrepancies = repo.verify_index_health().unwrap();
    assert!(discrepancies
        .iter()
        .any(|d| matches!(d, entitydb_core::IndexDiscrepancy::UnreadablePayload { id } if *id == corrupt_id)));
}

#[test]
fn relationship_round_trip() {
    let dir = tempdir().unwrap();
    let repo = Repository::open(config(dir.path())).unwrap();

    let e1 = repo.create(NewEntity::with_id(EntityId::from_string("e1"), vec!["type:demo".into()], None)).unwrap();
    let e2 = repo.create(NewEntity::with_id(EntityId::from_string("e2"), vec!["type:demo".into()], None)).unwrap();

    let r1 = repo
        .create_relationship_with_id(EntityId::from_string("r1"), &e1.id, &e2.id, "has_credential")
        .unwrap();

    let by_source = repo.get_relationships_by_source(&e1.id).unwrap();
    assert_eq!(by_source.len(), 1);
    assert_eq!(by_source[0].id, r1.id);

    repo.delete_relationship(&r1.id).unwrap();
    assert!(repo.get_relationships_by_source(&e1.id).unwrap().is_empty());
}
