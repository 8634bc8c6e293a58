//! redb table definitions for the transition event log.

use redb::TableDefinition;

/// Transition events keyed by a monotonically increasing sequence number.
pub const EVENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("events");
