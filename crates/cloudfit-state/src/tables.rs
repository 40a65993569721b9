//! redb table definitions for the cloudfit state store.

use redb::TableDefinition;

/// Resource state records keyed by resource id, JSON-serialized.
pub const RESOURCES: TableDefinition<&str, &[u8]> = TableDefinition::new("resources");
