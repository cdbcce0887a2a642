//! redb table definitions for the tag store.

use redb::TableDefinition;

/// Tag records keyed by `{entity_type}/{entity_id}`; values are JSON
/// [`TagRecord`](crate::TagRecord)s.
pub const TAGS: TableDefinition<&str, &[u8]> = TableDefinition::new("tags");
