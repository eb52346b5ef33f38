//! foodgrid-placement — candidate ranking for donations.
//!
//! This crate decides the order in which agencies are offered a donation.
//! It holds no state; the scheduler feeds it the donation, the candidate
//! agencies and a requirements lookup.
//!
//! # Components
//!
//! - **`geo`** — Ellipsoidal distance between two coordinates
//! - **`needs`** — Requirement overlap score
//! - **`ranker`** — Composite-key ordering (priority, distance, needs)

pub mod geo;
pub mod needs;
pub mod ranker;

pub use geo::{GeoError, distance_km, haversine_km, validate};
pub use needs::{AgencyNeeds, needs_score};
pub use ranker::{AgencyScore, NeedsLookup, rank, rank_agencies};
