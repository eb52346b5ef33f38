//! Scheduler error types.

use foodgrid_placement::GeoError;
use foodgrid_state::DonationStatus;
use thiserror::Error;

use crate::queue::DeadlineOverflow;

/// Errors that can occur during allocation operations.
///
/// An agency that is not at the head of a queue is not an error: `accept`
/// and `reject` report it by returning `false`.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("donation not found: {0}")]
    DonationNotFound(String),

    #[error("donation {donation_id} cannot be allocated from status {status}")]
    InvalidStateTransition {
        donation_id: String,
        status: DonationStatus,
    },

    #[error(transparent)]
    InvalidLocation(#[from] GeoError),

    #[error("invalid scheduler config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    DeadlineOverflow(#[from] DeadlineOverflow),

    #[error("state store error: {0}")]
    State(#[from] foodgrid_state::StateError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
