//! The repository: the facade composing reader, writer, tag index, and
//! cache into the `Create`/`GetByID`/`Update`/`Delete`/`ListByTag` contract
//! (spec §4.6), plus checkpoint/compaction and crash recovery (spec §4.2).

use crate::cache::EntityCache;
use crate::config::Config;
use crate::entity::{Entity, EntityId, NewEntity, Tag};
use crate::error::{CoreError, CoreResult};
use crate::index::{IndexDiscrepancy, TagIndex};
use crate::migration;
use crate::query::QueryBuilder;
use crate::reader::Reader;
use crate::wal::{self, WalOp};
use crate::writer::{assemble_entity, Writer};
use entitydb_codec::{FileHeader, IndexEntry, FLAG_TOMBSTONE, HEADER_SIZE, INDEX_ENTRY_SIZE};
use entitydb_storage::{FileBackend, StorageBackend};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

/// Synthetic body for the removal-marker tag `compact` uses to carry an
/// entity's original `created_at` forward through history collapse. Never
/// visible as a current tag — removal markers are always excluded from
/// `tag_bodies_at`/`ListByTag` — so this never collides with real data.
const RETAINED_CREATED_AT_BODY: &str = "_retained:created_at";

pub(crate) fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

struct RepoState {
    directory: HashMap<EntityId, IndexEntry>,
    tags: TagIndex,
}

/// The entity repository: a single open database.
///
/// Internally a `Repository` is a read-mostly directory (`EntityId ->
/// IndexEntry`) plus a `TagIndex`, both behind one `RwLock` so readers
/// never block each other, and a single `Mutex<()>` write-serialization
/// lock honoring spec §5's single-writer model. Reads resolve entirely
/// from the in-memory index and the shared backend; nothing here blocks
/// on the writer except at the instant the index itself is updated.
pub struct Repository {
    backend: Arc<RwLock<Box<dyn StorageBackend>>>,
    reader: Reader,
    writer: Writer,
    state: RwLock<RepoState>,
    cache: Mutex<EntityCache>,
    write_lock: Mutex<()>,
    config: Config,
    clock: AtomicI64,
    last_checkpoint_end: AtomicU64,
    closed: AtomicBool,
    /// Process-wide advisory lock on the database file, held for as long
    /// as the repository is open (spec §5: "single writer" enforced
    /// across processes, not just within one).
    flock: Option<File>,
}

impl Repository {
    /// Opens (or creates) the unified `.edb` file at `config.database_path()`.
    ///
    /// If a legacy split-file database (`<stem>.ebf`/`.wal`/`.idx`) is
    /// found where the unified file would go, it is converted in place
    /// first (`SPEC_FULL.md` §4 / spec §6: "accepted for one major
    /// version ... converted on first open").
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Busy`] if another process already holds the
    /// file's advisory lock, or any I/O/codec error encountered while
    /// opening, migrating, or recovering.
    pub fn open(config: Config) -> CoreResult<Self> {
        std::fs::create_dir_all(&config.data_path)?;
        let path = config.database_path();

        if !path.exists() {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("entities");
            let layout = migration::LegacyLayout::for_stem(&config.data_path, stem);
            if layout.is_present() {
                info!(stem, "legacy split-file database detected; converting to unified format");
                migration::convert(&layout, &path)?;
            }
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        lock_file.try_lock_exclusive().map_err(|_| CoreError::Busy)?;

        let backend: Box<dyn StorageBackend> = Box::new(FileBackend::open(&path)?);
        let mut repo = Self::open_with_backend(config, backend)?;
        repo.flock = Some(lock_file);
        Ok(repo)
    }

    /// Opens a repository over an arbitrary [`StorageBackend`] — the path
    /// every test and `Repository::open` itself funnels through.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read, the header fails
    /// to decode and the fallback full-WAL-scan rebuild also fails, or a
    /// mid-log WAL record fails validation during replay.
    pub fn open_with_backend(config: Config, backend: Box<dyn StorageBackend>) -> CoreResult<Self> {
        let shared = Arc::new(RwLock::new(backend));
        let reader = Reader::new(shared.clone());
        let writer = Writer::new(shared.clone());

        let size = reader.size()?;
        let now = now_nanos();

        let (directory, last_checkpoint_end) = if size == 0 {
            let header = FileHeader::new_empty(now);
            {
                let mut guard = shared.write();
                guard.append(&header.encode())?;
                guard.flush()?;
                guard.sync()?;
            }
            (HashMap::new(), u64::from(HEADER_SIZE as u32))
        } else {
            Self::recover(&shared, &reader, size)?
        };

        let mut tags = TagIndex::new();
        for (id, entry) in &directory {
            match reader.read_record(entry.offset, entry.size) {
                Ok(record) => {
                    let parsed: CoreResult<Vec<Tag>> =
                        record.tags.iter().map(|t| Tag::from_persisted(t)).collect();
                    match parsed {
                        Ok(parsed_tags) => {
                            tags.put(id.clone(), parsed_tags);
                            if entry.is_tombstoned() {
                                tags.tombstone(id);
                            }
                        }
                        Err(err) => {
                            warn!(%id, %err, "skipping tag index entry: malformed persisted tag");
                        }
                    }
                }
                Err(err) => {
                    warn!(%id, %err, "skipping tag index entry: payload failed to decode");
                }
            }
        }

        info!(entities = directory.len(), "repository opened");

        Ok(Self {
            backend: shared,
            reader,
            writer,
            state: RwLock::new(RepoState { directory, tags }),
            cache: Mutex::new(EntityCache::new(config.cache_capacity, config.cache_ttl)),
            write_lock: Mutex::new(()),
            clock: AtomicI64::new(now),
            last_checkpoint_end: AtomicU64::new(last_checkpoint_end),
            closed: AtomicBool::new(false),
            flock: None,
            config,
        })
    }

    /// Recovers the entity directory from an existing, non-empty backend:
    /// the header's entity-index snapshot (if present and valid) plus a
    /// WAL replay of everything written since. Falls back to a full WAL
    /// scan from the start of the record region if the header or its
    /// snapshot fails to decode — a corrupt header does not imply a
    /// corrupt payload region, only that we can't trust its pointers.
    fn recover(
        shared: &Arc<RwLock<Box<dyn StorageBackend>>>,
        reader: &Reader,
        size: u64,
    ) -> CoreResult<(HashMap<EntityId, IndexEntry>, u64)> {
        let header_bytes = reader.read_at(0, HEADER_SIZE)?;
        let header = match FileHeader::decode(&header_bytes) {
            Ok(h) => h,
            Err(err) => {
                warn!(%err, "file header failed to decode; rebuilding index from a full WAL scan");
                let directory = Self::full_rebuild(shared, size)?;
                return Ok((directory, u64::from(HEADER_SIZE as u32)));
            }
        };

        let mut directory = if header.entity_index_size > 0 {
            match Self::load_snapshot(reader, header.entity_index_offset, header.entity_index_size) {
                Ok(dir) => dir,
                Err(err) => {
                    warn!(%err, "entity index snapshot failed validation; rebuilding from a full WAL scan");
                    let directory = Self::full_rebuild(shared, size)?;
                    return Ok((directory, u64::from(HEADER_SIZE as u32)));
                }
            }
        } else {
            HashMap::new()
        };

        let replay_start = if header.entity_index_size > 0 {
            header.entity_index_offset + header.entity_index_size
        } else {
            u64::from(HEADER_SIZE as u32)
        };
        let entries = wal::scan(shared.read().as_ref(), replay_start, size)?;
        Self::replay_into(&mut directory, entries);
        Ok((directory, replay_start))
    }

    fn full_rebuild(
        shared: &Arc<RwLock<Box<dyn StorageBackend>>>,
        size: u64,
    ) -> CoreResult<HashMap<EntityId, IndexEntry>> {
        let entries = wal::scan(shared.read().as_ref(), u64::from(HEADER_SIZE as u32), size)?;
        let mut directory = HashMap::new();
        Self::replay_into(&mut directory, entries);
        Ok(directory)
    }

    fn load_snapshot(
        reader: &Reader,
        offset: u64,
        size: u64,
    ) -> CoreResult<HashMap<EntityId, IndexEntry>> {
        let size_usize = usize::try_from(size)
            .map_err(|_| CoreError::corrupt("entity_index", "snapshot size overflows usize"))?;
        let bytes = reader.read_at(offset, size_usize)?;
        if bytes.len() % INDEX_ENTRY_SIZE != 0 {
            return Err(CoreError::corrupt(
                "entity_index",
                "snapshot size is not a multiple of the entry width",
            ));
        }
        let mut directory = HashMap::new();
        for chunk in bytes.chunks_exact(INDEX_ENTRY_SIZE) {
            let entry = IndexEntry::decode(chunk)?;
            directory.insert(EntityId::from_string(entry.id.clone()), entry);
        }
        Ok(directory)
    }

    fn replay_into(directory: &mut HashMap<EntityId, IndexEntry>, entries: Vec<wal::WalEntry>) {
        for entry in entries {
            match entry.record.op {
                WalOp::Create | WalOp::Update => {
                    let payload_len = entry
                        .record
                        .payload
                        .as_ref()
                        .map_or(0, |p| u32::try_from(p.len()).unwrap_or(u32::MAX));
                    directory.insert(
                        entry.record.id.clone(),
                        IndexEntry {
                            id: entry.record.id.as_str().to_string(),
                            offset: entry.payload_offset,
                            size: payload_len,
                            flags: 0,
                        },
                    );
                }
                WalOp::Delete => {
                    if let Some(existing) = directory.get_mut(&entry.record.id) {
                        existing.flags |= FLAG_TOMBSTONE;
                    }
                }
            }
        }
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CoreError::Closed);
        }
        Ok(())
    }

    /// Produces a non-decreasing nanosecond timestamp even when the wall
    /// clock doesn't advance between two calls in quick succession (spec
    /// §3 invariant: entity timestamps are monotonic).
    fn next_nanos(&self) -> i64 {
        let wall = now_nanos();
        loop {
            let prev = self.clock.load(Ordering::SeqCst);
            let next = wall.max(prev + 1);
            if self
                .clock
                .compare_exchange_weak(prev, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return next;
            }
        }
    }

    /// Reads and decodes an entity's payload, retrying once before
    /// surfacing a [`CoreError::Corrupt`]. There is exactly one canonical
    /// copy of a live payload in this format (the WAL *is* the record
    /// store), so "recovery" here only rules out a torn read racing a
    /// concurrent write; a genuinely corrupt payload still surfaces as
    /// `Corrupt` on the second attempt (documented in `DESIGN.md`).
    fn materialize(&self, id: &EntityId, entry: &IndexEntry) -> CoreResult<Entity> {
        let record = self
            .reader
            .read_record(entry.offset, entry.size)
            .or_else(|_| self.reader.read_record(entry.offset, entry.size))?;

        let tags: Vec<Tag> = record
            .tags
            .iter()
            .map(|t| Tag::from_persisted(t))
            .collect::<CoreResult<_>>()?;
        let created_at = tags.iter().map(|t| t.nanos).min().unwrap_or(record.modified_nanos);

        Ok(Entity {
            id: id.clone(),
            tags,
            content: record.content,
            created_at,
            updated_at: record.modified_nanos,
        })
    }

    /// Creates a new entity (spec §4.6 `Create`).
    ///
    /// IDs are never reused after deletion (spec §3): a tombstoned
    /// directory entry still blocks `Create` from reassigning its ID to a
    /// new, unrelated entity.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IDExists`] if any directory entry — live or
    /// tombstoned — already has this ID, [`CoreError::Invalid`] if a tag
    /// exceeds the length limit, or an I/O/storage error if the write
    /// fails.
    pub fn create(&self, new_entity: NewEntity) -> CoreResult<Entity> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock();

        {
            let state = self.state.read();
            if state.directory.contains_key(&new_entity.id) {
                return Err(CoreError::id_exists(new_entity.id.as_str()));
            }
        }

        let now = self.next_nanos();
        let tags: Vec<Tag> = new_entity
            .tags
            .iter()
            .map(|raw| Tag::normalize(raw, now))
            .collect::<CoreResult<_>>()?;

        let outcome = self
            .writer
            .write_upsert(&new_entity.id, WalOp::Create, now, &tags, new_entity.content.clone())?;
        let entry = IndexEntry {
            id: new_entity.id.as_str().to_string(),
            offset: outcome.entry.payload_offset,
            size: outcome.payload_len,
            flags: 0,
        };

        {
            let mut state = self.state.write();
            state.tags.put(new_entity.id.clone(), tags.clone());
            state.directory.insert(new_entity.id.clone(), entry);
        }

        let entity = assemble_entity(new_entity.id.clone(), tags, new_entity.content, now, now);
        self.cache.lock().put(entity.clone());

        self.maybe_checkpoint()?;
        Ok(entity)
    }

    /// Replaces an entity's current tag-body set and content with a full
    /// snapshot (spec §4.4 `Update`: "full entity snapshot").
    ///
    /// History is never rewritten: every previously-current body the new
    /// snapshot doesn't repeat gets a [`Tag::removal_marker`] appended at
    /// the update's timestamp, so `ListByTag` stops returning the entity
    /// for that body while its temporal history still shows the body was
    /// once current (spec §3, §8 scenario 2).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no live entity has this ID,
    /// [`CoreError::Invalid`] if a new tag exceeds the length limit, or an
    /// I/O/storage error if the write fails.
    pub fn update(&self, new_entity: NewEntity) -> CoreResult<Entity> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock();

        let existing = self.get_by_id(&new_entity.id)?;
        let now = self.next_nanos().max(existing.updated_at + 1);

        let old_current: HashSet<&str> = existing.tag_bodies_at(existing.updated_at).into_iter().collect();
        let normalized: Vec<Tag> = new_entity
            .tags
            .iter()
            .map(|raw| Tag::normalize(raw, now))
            .collect::<CoreResult<_>>()?;
        let new_bodies: HashSet<&str> = normalized.iter().map(|t| t.body.as_str()).collect();

        let removed: Vec<Tag> = old_current
            .iter()
            .filter(|body| !new_bodies.contains(*body))
            .map(|body| Tag::removal_marker(now, body))
            .collect();

        let mut full_tags = existing.tags.clone();
        full_tags.extend(normalized);
        full_tags.extend(removed);

        let outcome = self.writer.write_upsert(
            &new_entity.id,
            WalOp::Update,
            now,
            &full_tags,
            new_entity.content.clone(),
        )?;
        let entry = IndexEntry {
            id: new_entity.id.as_str().to_string(),
            offset: outcome.entry.payload_offset,
            size: outcome.payload_len,
            flags: 0,
        };

        {
            let mut state = self.state.write();
            state.tags.put(new_entity.id.clone(), full_tags.clone());
            state.directory.insert(new_entity.id.clone(), entry);
        }

        let entity = assemble_entity(
            new_entity.id.clone(),
            full_tags,
            new_entity.content,
            existing.created_at,
            now,
        );
        self.cache.lock().put(entity.clone());

        self.maybe_checkpoint()?;
        Ok(entity)
    }

    /// Tombstones an entity (spec §4.6 `Delete`). The temporal history and
    /// payload remain on disk; only the live directory entry and the body
    /// index are updated.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no live entity has this ID, or
    /// an I/O/storage error if the write fails.
    pub fn delete(&self, id: &EntityId) -> CoreResult<()> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock();

        {
            let state = self.state.read();
            match state.directory.get(id) {
                Some(entry) if !entry.is_tombstoned() => {}
                _ => return Err(CoreError::not_found(id.as_str())),
            }
        }

        self.writer.write_delete(id)?;

        {
            let mut state = self.state.write();
            if let Some(entry) = state.directory.get_mut(id) {
                entry.flags |= FLAG_TOMBSTONE;
            }
            state.tags.tombstone(id);
        }
        self.cache.lock().invalidate(id);

        self.maybe_checkpoint()?;
        Ok(())
    }

    /// Fetches a single entity by ID, checking the cache first.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no live entity has this ID, or
    /// [`CoreError::Corrupt`] if the payload fails to decode on retry.
    pub fn get_by_id(&self, id: &EntityId) -> CoreResult<Entity> {
        self.ensure_open()?;
        if let Some(entity) = self.cache.lock().get(id) {
            return Ok(entity);
        }

        let entry = {
            let state = self.state.read();
            state.directory.get(id).cloned()
        };
        let entry = match entry {
            Some(e) if !e.is_tombstoned() => e,
            _ => return Err(CoreError::not_found(id.as_str())),
        };

        let entity = self.materialize(id, &entry)?;
        self.cache.lock().put(entity.clone());
        Ok(entity)
    }

    /// Returns every live entity currently carrying `body` (spec §4.6
    /// `ListByTag`). An entity that fails to materialize (corruption
    /// isolated to that one payload, spec §8 scenario 5) is logged and
    /// skipped rather than failing the whole call.
    ///
    /// # Errors
    ///
    /// Only propagates an error if the tag index itself cannot be read,
    /// which cannot currently happen — reserved for future backends.
    pub fn list_by_tag(&self, body: &str) -> CoreResult<Vec<Entity>> {
        self.ensure_open()?;
        let ids = self.state.read().tags.list_by_tag(body);
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_by_id(&id) {
                Ok(entity) => out.push(entity),
                Err(err) => {
                    error!(%id, %err, "skipping unreadable entity while listing by tag");
                }
            }
        }
        Ok(out)
    }

    /// Returns every entity ID currently carrying `body`, without
    /// materializing them. Used by [`QueryBuilder`] to intersect
    /// candidate sets before paying for any reads.
    #[must_use]
    pub fn list_ids_by_tag(&self, body: &str) -> Vec<EntityId> {
        self.state.read().tags.list_by_tag(body)
    }

    /// Starts a lazily-evaluated, chainable body-intersection query (spec
    /// §4.6 `Query() -> QueryBuilder`).
    #[must_use]
    pub fn query(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(self)
    }

    /// Rebuilds the tag index from scratch by re-reading every live
    /// entity's payload (spec §4.6 `ReindexTags`).
    ///
    /// # Errors
    ///
    /// Never returns an error itself; unreadable entities are logged and
    /// left out of the rebuilt index, same as `ListByTag`.
    pub fn reindex_tags(&self) -> CoreResult<()> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock();

        let live: Vec<(EntityId, IndexEntry)> = {
            let state = self.state.read();
            state.directory.iter().map(|(id, e)| (id.clone(), e.clone())).collect()
        };

        let mut tags = TagIndex::new();
        for (id, entry) in &live {
            if let Ok(record) = self.reader.read_record(entry.offset, entry.size) {
                if let Ok(parsed) = record
                    .tags
                    .iter()
                    .map(|t| Tag::from_persisted(t))
                    .collect::<CoreResult<Vec<_>>>()
                {
                    tags.put(id.clone(), parsed);
                    if entry.is_tombstoned() {
                        tags.tombstone(id);
                    }
                }
            }
        }

        self.state.write().tags = tags;
        self.cache.lock().clear();
        info!("tag index rebuilt");
        Ok(())
    }

    /// Cross-checks the tag index against every live entity's actual
    /// payload (spec §4.6 `VerifyIndexHealth`).
    ///
    /// # Errors
    ///
    /// Never returns an error; an unreadable payload is itself reported
    /// as an [`IndexDiscrepancy::UnreadablePayload`] rather than aborting.
    pub fn verify_index_health(&self) -> CoreResult<Vec<IndexDiscrepancy>> {
        self.ensure_open()?;
        let state = self.state.read();

        let mut discrepancies = Vec::new();
        let mut live_entities = Vec::new();
        for (id, entry) in &state.directory {
            if entry.is_tombstoned() {
                continue;
            }
            match self.materialize(id, entry) {
                Ok(entity) => live_entities.push(entity),
                Err(_) => discrepancies.push(IndexDiscrepancy::UnreadablePayload { id: id.clone() }),
            }
        }
        discrepancies.extend(state.tags.verify_health(live_entities.iter()));
        Ok(discrepancies)
    }

    /// Flushes the in-memory directory to a fresh entity-index snapshot
    /// appended to the backend, then rewrites the header in place to
    /// point at it (spec §4.2 `Checkpoint`).
    ///
    /// Deliberately does not truncate the WAL region: every directory
    /// entry's offset points directly into the WAL's own append log
    /// rather than a separate payload store (`wal/record.rs`), so
    /// truncating it would destroy live data still referenced by the
    /// snapshot this checkpoint just wrote. `DESIGN.md`'s "File growth and
    /// compaction" section records this as a deliberate deviation from
    /// spec.md's two-region, truncate-on-checkpoint file layout, and what
    /// bounds growth instead.
    ///
    /// # Errors
    ///
    /// Returns an I/O/storage or codec error if the snapshot or header
    /// write fails.
    pub fn checkpoint(&self) -> CoreResult<()> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock();
        self.checkpoint_locked()
    }

    /// Checkpoint body; assumes the caller already holds `write_lock`.
    fn checkpoint_locked(&self) -> CoreResult<()> {
        let (snapshot_bytes, live_count) = {
            let state = self.state.read();
            let mut buf = Vec::with_capacity(state.directory.len() * INDEX_ENTRY_SIZE);
            let mut live = 0u64;
            for entry in state.directory.values() {
                buf.extend_from_slice(&entry.encode()?);
                if !entry.is_tombstoned() {
                    live += 1;
                }
            }
            (buf, live)
        };

        let mut backend = self.backend.write();
        let snapshot_offset = backend.append(&snapshot_bytes)?;
        backend.flush()?;
        backend.sync()?;
        let file_size = backend.size()?;

        let header = FileHeader {
            version: entitydb_codec::FORMAT_VERSION,
            file_size,
            tag_dict_offset: 0,
            tag_dict_size: 0,
            entity_index_offset: snapshot_offset,
            entity_index_size: snapshot_bytes.len() as u64,
            entity_count: live_count,
            last_modified_nanos: now_nanos(),
        };
        backend.write_at(0, &header.encode())?;
        backend.sync()?;
        drop(backend);

        self.last_checkpoint_end.store(file_size, Ordering::SeqCst);
        debug!(entities = live_count, bytes = snapshot_bytes.len(), "checkpoint complete");
        Ok(())
    }

    /// Checkpoints automatically once the WAL region since the last
    /// checkpoint has grown past `config.wal_size_threshold` (spec §4.2:
    /// "Checkpoint is triggered by WAL size threshold or by `Close`").
    /// Assumes the caller already holds `write_lock`.
    fn maybe_checkpoint(&self) -> CoreResult<()> {
        let tail = self.reader.size()?;
        let last = self.last_checkpoint_end.load(Ordering::SeqCst);
        if tail.saturating_sub(last) >= self.config.wal_size_threshold {
            self.checkpoint_locked()?;
        }
        Ok(())
    }

    /// Purges tombstoned entities from the live directory and collapses
    /// every remaining entity's tag history down to just its current
    /// bodies, each re-appended as a fresh record, followed by a
    /// checkpoint. Each entity's original `created_at` survives the
    /// collapse via a retained removal-marker tag (see
    /// `RETAINED_CREATED_AT_BODY`).
    ///
    /// This reclaims *logical* space — dead history and deleted entities
    /// stop being replayed or scanned — but does not shrink the
    /// underlying file: the rewritten records are appended after the old
    /// ones rather than in place of them, so the old bytes remain
    /// unreachable but present until the whole file is eventually
    /// recreated. This is a real scope limitation, documented in
    /// `DESIGN.md`'s "File growth and compaction" section alongside why
    /// `checkpoint` itself never truncates the WAL.
    ///
    /// # Errors
    ///
    /// Returns an error if any live entity's payload can't be re-read, or
    /// if the rewrite or checkpoint fails.
    pub fn compact(&self) -> CoreResult<()> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock();

        let live: Vec<(EntityId, Entity)> = {
            let state = self.state.read();
            state
                .directory
                .iter()
                .filter(|(_, e)| !e.is_tombstoned())
                .filter_map(|(id, entry)| self.materialize(id, entry).ok().map(|e| (id.clone(), e)))
                .collect()
        };

        let mut new_directory = HashMap::new();
        let mut new_tags = TagIndex::new();

        for (id, entity) in live {
            let now = self.next_nanos();
            let mut collapsed: Vec<Tag> = entity
                .tag_bodies_at(entity.updated_at)
                .into_iter()
                .map(|body| Tag::new(now, body))
                .collect();
            // `materialize` derives `created_at` as the minimum tag nanos
            // (repository.rs:321). Collapsing every current body down to
            // `now` would otherwise make the original creation time
            // unrecoverable, so a removal-marker tag — already excluded
            // from every current-view computation — carries the original
            // `created_at` forward without becoming a visible body.
            collapsed.push(Tag::removal_marker(entity.created_at, RETAINED_CREATED_AT_BODY));

            let outcome =
                self.writer
                    .write_upsert(&id, WalOp::Update, now, &collapsed, entity.content.clone())?;
            new_directory.insert(
                id.clone(),
                IndexEntry {
                    id: id.as_str().to_string(),
                    offset: outcome.entry.payload_offset,
                    size: outcome.payload_len,
                    flags: 0,
                },
            );
            new_tags.put(id, collapsed);
        }

        {
            let mut state = self.state.write();
            state.directory = new_directory;
            state.tags = new_tags;
        }
        self.cache.lock().clear();

        self.checkpoint_locked()?;
        info!("compaction complete: tombstones purged, tag history collapsed");
        Ok(())
    }

    /// Checkpoints and releases the process-wide file lock. Safe to call
    /// more than once; later calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns an error if the final checkpoint fails.
    pub fn close(&self) -> CoreResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _guard = self.write_lock.lock();
        self.checkpoint_locked()?;
        if let Some(lock_file) = &self.flock {
            let _ = FileExt::unlock(lock_file);
        }
        Ok(())
    }

    /// Read-only access to the reader, for modules in this crate that
    /// need raw payload access (relationships, security primitives go
    /// through [`Repository::get_by_id`] instead; this exists for
    /// `migration`/`backup` tooling that operates below the entity view).
    pub(crate) fn reader(&self) -> &Reader {
        &self.reader
    }
}
