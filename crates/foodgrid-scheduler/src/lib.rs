//! foodgrid-scheduler — donation allocation and offer timing.
//!
//! Turns a `Ready` donation (from `foodgrid-state`) into a ranked queue of
//! agencies (from `foodgrid-placement`) and walks it. The scheduler:
//!
//! - Offers each donation to the head of its queue
//! - Moves the offer on when the head rejects or stays silent too long
//! - Persists every status change through a `PersistenceGateway`
//! - Rebuilds queues from persisted state after a restart
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//!   ├── PersistenceGateway (read pending donations, write transitions)
//!   ├── RequirementCache (agency → food type → quantity)
//!   ├── OfferNotifier (tell the head agency about its offer)
//!   └── Per-donation slot
//!       ├── OfferQueue (ranked agencies + head deadline)
//!       └── Offer task (deadline check every poll interval)
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod notify;
pub mod queue;
pub mod recovery;
pub mod scheduler;

pub use cache::RequirementCache;
pub use config::{DEFAULT_OFFER_WINDOW, DEFAULT_POLL_INTERVAL, MAX_DURATION, SchedulerConfig};
pub use error::{SchedulerError, SchedulerResult};
pub use notify::{LogNotifier, OfferNotifier};
pub use queue::{Advance, DeadlineOverflow, OfferQueue};
pub use recovery::RecoveryReport;
pub use scheduler::{Allocation, OfferSnapshot, Scheduler};
