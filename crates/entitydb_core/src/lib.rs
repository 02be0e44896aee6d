//! # EntityDB Core
//!
//! The engine behind a tag-indexed, temporal entity store: every record is
//! an opaque ID, an append-only history of `"<nanos>|<body>"` tags, and an
//! optional content blob, all persisted in one unified `.edb` file. There
//! are no collections, no schemas, and no separate edge or user tables —
//! relationships and security primitives are just entities whose tags
//! follow a shape convention ([`relationship`], [`security`]).
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                       Repository                          │
//! │   Create / GetByID / Update / Delete / ListByTag / Query   │
//! │   checkpoint, compact, verify_index_health                 │
//! └───────┬──────────────┬───────────────┬─────────────┬──────┘
//!         │              │               │             │
//! ┌───────▼──────┐ ┌─────▼──────┐ ┌──────▼─────┐ ┌─────▼──────┐
//! │  TagIndex    │ │ EntityCache│ │   Reader    │ │   Writer   │
//! │ (body +      │ │ (bounded   │ │ (random-    │ │ (WAL       │
//! │  temporal)   │ │  LRU, TTL) │ │  access)    │ │  append)   │
//! └──────────────┘ └────────────┘ └──────┬──────┘ └──────┬─────┘
//!                                        │               │
//!                              ┌─────────▼───────────────▼─────┐
//!                              │   entitydb_storage::StorageBackend │
//!                              │   (File, InMemory)                 │
//!                              └─────────────────────────────────────┘
//! ```
//!
//! Entity payloads and index entries are encoded by `entitydb_codec`; this
//! crate owns everything above the byte layer: the WAL envelope and replay
//! rules, crash recovery, the tag index, caching, and the repository
//! facade.
//!
//! ## Key invariants
//!
//! - **Single writer, many readers**: one [`parking_lot::Mutex`] serializes
//!   mutations; reads never block on it.
//! - **WAL-first**: every mutation is appended and fsynced before the
//!   in-memory index is updated or the call returns.
//! - **Crash recovery**: reopening replays whatever WAL tail follows the
//!   last checkpoint's entity-index snapshot.
//! - **History is append-only**: `Update` never deletes a tag, it appends a
//!   [`entity::Tag::removal_marker`] for bodies that were dropped, so
//!   `tag_bodies_at` can still answer "what did this entity look like at
//!   time T".
//!
//! ## Example
//!
//! ```no_run
//! use entitydb_core::{Config, NewEntity, Repository};
//!
//! let repo = Repository::open(Config::new().data_path("./data"))?;
//! let created = repo.create(NewEntity::new(vec!["type:user".into()], None))?;
//! let fetched = repo.get_by_id(&created.id)?;
//! # Ok::<(), entitydb_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backup;
mod cache;
mod config;
mod entity;
mod error;
mod index;
mod migration;
mod query;
mod reader;
mod relationship;
mod repository;
mod security;
mod wal;
mod writer;

pub use backup::{backup, restore, BackupMetadata};
pub use cache::EntityCache;
pub use config::{Config, HttpConfig, LogLevel, DEFAULT_DATABASE_FILENAME};
pub use entity::{Entity, EntityId, NewEntity, ReservedPrefix, Tag};
pub use error::{CoreError, CoreResult};
pub use index::{IndexDiscrepancy, TagIndex};
pub use migration::{convert as migrate_legacy_layout, LegacyLayout};
pub use query::QueryBuilder;
pub use relationship::{Relationship, TAG_TYPE_RELATIONSHIP};
pub use repository::Repository;
pub use security::{
    RELATIONSHIP_HAS_CREDENTIAL, RELATIONSHIP_HAS_PERMISSION, TAG_STATUS_ACTIVE,
    TAG_TYPE_CREDENTIAL, TAG_TYPE_PERMISSION, TAG_TYPE_ROLE, TAG_TYPE_SESSION, TAG_TYPE_USER,
};
