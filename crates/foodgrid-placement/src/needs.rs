//! Needs score: how much of an agency's declared requirement a donation covers.

use std::collections::HashMap;

use foodgrid_state::FoodType;

/// Per-food-type required quantities for one agency.
pub type AgencyNeeds = HashMap<FoodType, u32>;

/// `min(required, offered)` for the donation's food type, or 0 when the
/// agency declared no requirement for it. Surplus beyond the requirement
/// earns nothing.
pub fn needs_score(needs: &AgencyNeeds, food_type: FoodType, quantity: u32) -> u32 {
    needs
        .get(&food_type)
        .map_or(0, |required| (*required).min(quantity))
}
