//! Restart recovery.
//!
//! Offer queues and timers live only in memory. On startup the requirement
//! cache is rebuilt from persisted rows and every pending donation is
//! ranked again against the current agencies. A donation that was
//! `Allocated` before the restart is treated as `Ready` and gets a fresh
//! queue and window.

use tracing::{info, warn};

use foodgrid_state::*;

use crate::error::SchedulerResult;
use crate::scheduler::{Allocation, Scheduler};

/// Summary of a recovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RecoveryReport {
    pub requirements_loaded: usize,
    pub donations_found: usize,
    /// Donations that now hold an offer.
    pub offered: usize,
    /// Donations left `Ready` with no candidate agency.
    pub unallocated: usize,
    /// Donations that could not be re-allocated.
    pub failed: usize,
}

impl<G> Scheduler<G>
where
    G: PersistenceGateway + 'static,
{
    /// Rebuild in-memory state from the gateway.
    ///
    /// Failing to load requirements, donations or agencies is fatal. A single
    /// donation failing to re-allocate is logged and counted.
    pub async fn recover(&self) -> SchedulerResult<RecoveryReport> {
        let mut report = RecoveryReport::default();

        let requirements = self.gateway().load_requirements()?;
        for requirement in &requirements {
            self.update_requirement(requirement).await;
        }
        report.requirements_loaded = requirements.len();

        let donations = self.gateway().load_pending_donations()?;
        let agencies = self.gateway().load_agencies()?;
        report.donations_found = donations.len();

        info!(
            requirements = requirements.len(),
            donations = donations.len(),
            agencies = agencies.len(),
            "recovering allocation state"
        );

        for mut donation in donations {
            if self.is_active(&donation.id).await {
                continue;
            }

            let was_allocated = donation.status == DonationStatus::Allocated;
            if was_allocated {
                donation.status = DonationStatus::Ready;
                donation.agency_id = None;
            }

            let donation_id = donation.id.clone();
            match self.allocate(donation.clone(), &agencies).await {
                Ok(Allocation::Offered { .. }) => report.offered += 1,
                Ok(Allocation::NoCandidates) => {
                    report.unallocated += 1;
                    if was_allocated {
                        if let Err(e) = self.gateway().save_donation(&donation) {
                            warn!(%donation_id, error = %e, "failed to reset donation to ready");
                            report.failed += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!(%donation_id, error = %e, "failed to recover donation");
                    report.failed += 1;
                }
            }
        }

        info!(
            offered = report.offered,
            unallocated = report.unallocated,
            failed = report.failed,
            "recovery complete"
        );
        Ok(report)
    }
}
