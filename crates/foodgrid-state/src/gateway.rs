//! Persistence boundary used by the allocation scheduler.

use crate::error::StateResult;
use crate::types::{Agency, Donation, Requirement};

/// Storage abstraction so the scheduler can be exercised in isolation.
///
/// The persisted donation record is authoritative; everything the scheduler
/// keeps in memory is derived from what these calls return.
pub trait PersistenceGateway: Send + Sync {
    /// Donations whose status is `Ready` or `Allocated`.
    fn load_pending_donations(&self) -> StateResult<Vec<Donation>>;
    fn load_agencies(&self) -> StateResult<Vec<Agency>>;
    fn load_requirements(&self) -> StateResult<Vec<Requirement>>;
    fn load_donation(&self, id: &str) -> StateResult<Option<Donation>>;
    fn save_donation(&self, donation: &Donation) -> StateResult<()>;
}
