//! redb table definitions for the FoodGrid state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Donations keyed by `{donation_id}`.
pub const DONATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("donations");

/// Agencies keyed by `{agency_id}`.
pub const AGENCIES: TableDefinition<&str, &[u8]> = TableDefinition::new("agencies");

/// Requirements keyed by `{agency_id}:{food_type}`.
pub const REQUIREMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("requirements");
