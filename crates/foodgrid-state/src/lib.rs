//! foodgrid-state — embedded state store for FoodGrid.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! state management for donations, agencies, and agency requirements.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Requirements use the composite key `{agency_id}:{food_type}` so a second
//! write for the same pair overwrites the first instead of adding a row.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks. The scheduler only sees it through
//! the [`PersistenceGateway`] trait.

pub mod error;
pub mod gateway;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use gateway::PersistenceGateway;
pub use store::StateStore;
pub use types::*;
