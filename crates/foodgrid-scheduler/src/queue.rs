//! Offer queue: the ranked agencies still eligible for one donation.
//!
//! Only the head holds an offer. The queue is consumed from the front and
//! carries the deadline of the head's offer.

use std::collections::VecDeque;
use std::time::Duration;

use foodgrid_state::AgencyId;
use thiserror::Error;
use tokio::time::Instant;

/// The deadline `now + window` is not representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("offer deadline out of range for window {window:?}")]
pub struct DeadlineOverflow {
    pub window: Duration,
}

fn deadline_after(now: Instant, window: Duration) -> Result<Instant, DeadlineOverflow> {
    now.checked_add(window).ok_or(DeadlineOverflow { window })
}

/// Result of dropping the head of a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// A new head now holds the offer.
    Next(AgencyId),
    /// No candidates remain.
    Exhausted,
}

/// Ordered agency IDs with the current head's deadline.
#[derive(Debug, Clone)]
pub struct OfferQueue {
    agencies: VecDeque<AgencyId>,
    deadline: Instant,
}

impl OfferQueue {
    /// Start a queue from a ranking. Returns `None` for an empty ranking.
    pub fn new(
        ranked: Vec<AgencyId>,
        now: Instant,
        window: Duration,
    ) -> Result<Option<Self>, DeadlineOverflow> {
        if ranked.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self {
            agencies: ranked.into(),
            deadline: deadline_after(now, window)?,
        }))
    }

    pub fn head(&self) -> Option<&AgencyId> {
        self.agencies.front()
    }

    pub fn is_head(&self, agency_id: &str) -> bool {
        self.head().is_some_and(|head| head == agency_id)
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    pub fn len(&self) -> usize {
        self.agencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agencies.is_empty()
    }

    /// Agencies in offer order, head first.
    pub fn agencies(&self) -> Vec<AgencyId> {
        self.agencies.iter().cloned().collect()
    }

    /// Drop the head. A new head gets a fresh window starting at `now`.
    ///
    /// On overflow the queue is left unchanged.
    pub fn advance(&mut self, now: Instant, window: Duration) -> Result<Advance, DeadlineOverflow> {
        let deadline = deadline_after(now, window)?;
        self.agencies.pop_front();
        Ok(match self.agencies.front() {
            Some(next) => {
                self.deadline = deadline;
                Advance::Next(next.clone())
            }
            None => Advance::Exhausted,
        })
    }
}
