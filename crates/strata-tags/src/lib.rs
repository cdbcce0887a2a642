//! strata-tags — the entity tag store.
//!
//! Tags are `(entity_type, entity_id, key, value)` quadruples. The set of
//! tags recorded for an `(entity_type, entity_id)` pair is the only record
//! that the entity exists: the record is created by the first insert and
//! removed together with its last tag.
//!
//! # Backends
//!
//! - [`MemoryTagStore`]: process-local, for tests and sandbox mode
//! - [`RedbTagStore`]: persistent, one redb row per entity holding a JSON
//!   key/value map, keyed by `{entity_type}/{entity_id}`
//!
//! Both apply inserts as a conditional write (create the record if absent,
//! otherwise patch the single key) inside one serialized critical section,
//! so concurrent writers targeting the same entity never clobber each
//! other's keys.

pub mod error;
pub mod memory;
pub mod redb_store;
pub mod store;
pub mod tables;

pub use error::{TagError, TagResult};
pub use memory::MemoryTagStore;
pub use redb_store::RedbTagStore;
pub use store::{Consistency, ReadConsistency, TagRecord, TagStore};
