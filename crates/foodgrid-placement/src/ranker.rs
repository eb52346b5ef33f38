//! Agency ranking for a single donation.
//!
//! Candidates are ordered by a composite key, ascending:
//! - **Priority**: priority agencies first
//! - **Distance**: closer to the donation first
//! - **Needs**: larger needs score first
//!
//! Remaining ties keep the candidates' input order (the sort is stable), so
//! the ranking is a pure function of its inputs.

use std::cmp::Ordering;
use std::collections::HashMap;

use foodgrid_state::{Agency, AgencyId, Donation};
use tracing::{debug, warn};

use crate::geo::{self, GeoError};
use crate::needs::{AgencyNeeds, needs_score};

/// Source of per-agency requirements used for the needs score.
pub trait NeedsLookup {
    /// Requirements for an agency; empty when the agency declared none.
    fn needs_for(&self, agency_id: &str) -> AgencyNeeds;
}

impl NeedsLookup for HashMap<AgencyId, AgencyNeeds> {
    fn needs_for(&self, agency_id: &str) -> AgencyNeeds {
        self.get(agency_id).cloned().unwrap_or_default()
    }
}

/// Scored candidate for one donation.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AgencyScore {
    pub agency_id: AgencyId,
    pub priority: bool,
    pub distance_km: f64,
    pub needs: u32,
}

impl AgencyScore {
    /// Composite key comparison; `Less` means `self` is offered first.
    fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.distance_km.total_cmp(&other.distance_km))
            .then_with(|| other.needs.cmp(&self.needs))
    }
}

/// Score every candidate and return them best first.
///
/// Fails when the donation location is invalid. Agencies with an invalid
/// location cannot be scored and are left out of the result.
pub fn rank_agencies<N: NeedsLookup + ?Sized>(
    donation: &Donation,
    agencies: &[Agency],
    needs: &N,
) -> Result<Vec<AgencyScore>, GeoError> {
    geo::validate(&donation.location)?;

    let mut scores = Vec::with_capacity(agencies.len());
    for agency in agencies {
        let distance_km = match geo::distance_km(&agency.location, &donation.location) {
            Ok(d) => d,
            Err(e) => {
                warn!(agency_id = %agency.id, error = %e, "skipping agency with invalid location");
                continue;
            }
        };
        let agency_needs = needs.needs_for(&agency.id);
        scores.push(AgencyScore {
            agency_id: agency.id.clone(),
            priority: agency.priority_flag,
            distance_km,
            needs: needs_score(&agency_needs, donation.food_type, donation.quantity),
        });
    }

    scores.sort_by(AgencyScore::rank_cmp);

    debug!(
        donation_id = %donation.id,
        candidates = agencies.len(),
        ranked = scores.len(),
        "agencies ranked"
    );
    Ok(scores)
}

/// Ranked agency IDs for a donation, best first.
pub fn rank<N: NeedsLookup + ?Sized>(
    donation: &Donation,
    agencies: &[Agency],
    needs: &N,
) -> Result<Vec<AgencyId>, GeoError> {
    Ok(rank_agencies(donation, agencies, needs)?
        .into_iter()
        .map(|score| score.agency_id)
        .collect())
}
