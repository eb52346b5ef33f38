//! Requirement cache: process-wide view of agency requirements.
//!
//! Mirrors the persisted requirement rows as
//! `agency_id → (food_type → quantity)`. It is rebuilt at startup by the
//! recovery pass and afterwards only changes through explicit calls, so it
//! is exactly as current as its callers keep it.

use std::collections::HashMap;
use std::sync::Arc;

use foodgrid_placement::AgencyNeeds;
use foodgrid_state::{AgencyId, FoodType, Requirement};
use tokio::sync::RwLock;
use tracing::debug;

/// Shared, cloneable requirement cache.
#[derive(Clone, Default)]
pub struct RequirementCache {
    inner: Arc<RwLock<HashMap<AgencyId, AgencyNeeds>>>,
}

impl RequirementCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for `(agency, food type)`.
    pub async fn update(&self, requirement: &Requirement) {
        let mut map = self.inner.write().await;
        map.entry(requirement.agency_id.clone())
            .or_default()
            .insert(requirement.food_type, requirement.quantity);
        debug!(
            agency_id = %requirement.agency_id,
            food_type = %requirement.food_type,
            quantity = requirement.quantity,
            "requirement cached"
        );
    }

    /// Drop the entry for `(agency, food type)`. Returns true if it existed.
    ///
    /// Deleting a requirement row does not reach the cache on its own; the
    /// deleting caller has to invoke this.
    pub async fn remove(&self, agency_id: &str, food_type: FoodType) -> bool {
        let mut map = self.inner.write().await;
        let Some(needs) = map.get_mut(agency_id) else {
            return false;
        };
        let existed = needs.remove(&food_type).is_some();
        if needs.is_empty() {
            map.remove(agency_id);
        }
        existed
    }

    /// Requirements for an agency. Unknown agencies yield an empty map.
    pub async fn get(&self, agency_id: &str) -> AgencyNeeds {
        let map = self.inner.read().await;
        map.get(agency_id).cloned().unwrap_or_default()
    }

    /// Point-in-time copy for a ranking pass.
    pub async fn snapshot(&self) -> HashMap<AgencyId, AgencyNeeds> {
        self.inner.read().await.clone()
    }

    /// Number of agencies with at least one cached requirement.
    pub async fn agency_count(&self) -> usize {
        self.inner.read().await.len()
    }
}
