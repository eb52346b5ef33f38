//! Domain types for the FoodGrid state store.
//!
//! These types represent the persisted state of donations, agencies and
//! agency requirements. All types are serializable to/from JSON for storage
//! in redb tables.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unique identifier for a donation.
pub type DonationId = String;

/// Unique identifier for a receiving agency.
pub type AgencyId = String;

/// Unique identifier for a requirement row.
pub type RequirementId = String;

// ── Location ──────────────────────────────────────────────────────

/// A (latitude, longitude) pair in decimal degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

// ── Food type ─────────────────────────────────────────────────────

/// Dietary category of a donation or requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FoodType {
    #[serde(rename = "Halal")]
    Halal,
    #[serde(rename = "Non-Halal")]
    NonHalal,
    #[serde(rename = "Vegetarian")]
    Vegetarian,
    #[serde(rename = "Vegan")]
    Vegan,
    #[serde(rename = "Non-Beef")]
    NonBeef,
}

impl FoodType {
    pub const ALL: [FoodType; 5] = [
        FoodType::Halal,
        FoodType::NonHalal,
        FoodType::Vegetarian,
        FoodType::Vegan,
        FoodType::NonBeef,
    ];

    /// Stable label, identical to the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            FoodType::Halal => "Halal",
            FoodType::NonHalal => "Non-Halal",
            FoodType::Vegetarian => "Vegetarian",
            FoodType::Vegan => "Vegan",
            FoodType::NonBeef => "Non-Beef",
        }
    }
}

impl fmt::Display for FoodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known [`FoodType`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown food type: {0}")]
pub struct UnknownFoodType(pub String);

impl FromStr for FoodType {
    type Err = UnknownFoodType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FoodType::ALL
            .into_iter()
            .find(|ft| ft.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownFoodType(s.to_string()))
    }
}

// ── Donation ──────────────────────────────────────────────────────

/// Lifecycle status of a donation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DonationStatus {
    /// Unallocated and eligible for (re)queueing.
    Ready,
    /// An offer is outstanding to the head-of-queue agency.
    Allocated,
    /// An agency committed to the donation.
    Accepted,
    /// Physically retrieved. Set outside the scheduler.
    Collected,
}

impl DonationStatus {
    /// Whether recovery should re-run allocation for this status.
    pub fn is_pending(&self) -> bool {
        matches!(self, DonationStatus::Ready | DonationStatus::Allocated)
    }
}

impl fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DonationStatus::Ready => "Ready",
            DonationStatus::Allocated => "Allocated",
            DonationStatus::Accepted => "Accepted",
            DonationStatus::Collected => "Collected",
        };
        f.write_str(label)
    }
}

/// A pledged unit of food awaiting placement with a receiving agency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Donation {
    pub id: DonationId,
    pub donor_id: String,
    pub food_type: FoodType,
    pub quantity: u32,
    pub location: GeoPoint,
    pub status: DonationStatus,
    /// Agency currently holding the offer (or that accepted it).
    #[serde(default)]
    pub agency_id: Option<AgencyId>,
    /// Unix timestamp (seconds) when the donation was pledged.
    pub created_at: u64,
    /// Unix timestamp (seconds) after which the food should not be collected.
    #[serde(default)]
    pub expires_at: Option<u64>,
}

// ── Agency ────────────────────────────────────────────────────────

/// A receiving organization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agency {
    pub id: AgencyId,
    pub name: String,
    /// Priority agencies are offered donations first.
    #[serde(default)]
    pub priority_flag: bool,
    pub location: GeoPoint,
}

// ── Requirement ───────────────────────────────────────────────────

/// An agency's declared need for one food type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Requirement {
    pub id: RequirementId,
    pub agency_id: AgencyId,
    pub food_type: FoodType,
    pub quantity: u32,
}

impl Requirement {
    /// Build the composite key for the requirements table.
    pub fn table_key(&self) -> String {
        requirement_key(&self.agency_id, self.food_type)
    }
}

/// Composite requirements-table key for an (agency, food type) pair.
pub fn requirement_key(agency_id: &str, food_type: FoodType) -> String {
    format!("{agency_id}:{food_type}")
}
