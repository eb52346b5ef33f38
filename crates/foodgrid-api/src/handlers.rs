//! REST API handlers.
//!
//! Records are read and written through `StateStore`; every allocation
//! transition goes through the scheduler.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};

use foodgrid_placement::validate;
use foodgrid_scheduler::{Allocation, SchedulerError};
use foodgrid_state::*;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn internal_error(e: &StateError) -> Response {
    error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
}

fn scheduler_error(e: &SchedulerError) -> Response {
    let status = match e {
        SchedulerError::DonationNotFound(_) => StatusCode::NOT_FOUND,
        SchedulerError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
        SchedulerError::InvalidLocation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SchedulerError::State(_)
        | SchedulerError::InvalidConfig(_)
        | SchedulerError::DeadlineOverflow(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(&e.to_string(), status).into_response()
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ── Donations ──────────────────────────────────────────────────

/// Donation registration body. New donations always start `Ready`.
#[derive(serde::Deserialize)]
pub struct NewDonation {
    pub id: DonationId,
    pub donor_id: String,
    pub food_type: FoodType,
    pub quantity: u32,
    pub location: GeoPoint,
    #[serde(default)]
    pub expires_at: Option<u64>,
}

/// Donation record after an allocation attempt.
#[derive(serde::Serialize)]
pub struct AllocationResult {
    pub donation: Donation,
    pub allocation: Allocation,
}

/// Offer a stored `Ready` donation and return the record as persisted.
async fn allocate_stored(
    state: &ApiState,
    donation: Donation,
) -> Result<AllocationResult, Response> {
    let agencies = state.store.list_agencies().map_err(|e| internal_error(&e))?;
    let allocation = state
        .scheduler
        .allocate(donation.clone(), &agencies)
        .await
        .map_err(|e| scheduler_error(&e))?;

    let donation = match state.store.get_donation(&donation.id) {
        Ok(Some(stored)) => stored,
        Ok(None) => donation,
        Err(e) => return Err(internal_error(&e)),
    };
    Ok(AllocationResult {
        donation,
        allocation,
    })
}

/// GET /api/v1/donations
pub async fn list_donations(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_donations() {
        Ok(donations) => ApiResponse::ok(donations).into_response(),
        Err(e) => internal_error(&e),
    }
}

/// POST /api/v1/donations
pub async fn create_donation(
    State(state): State<ApiState>,
    Json(req): Json<NewDonation>,
) -> impl IntoResponse {
    if let Err(e) = validate(&req.location) {
        return error_response(&e.to_string(), StatusCode::UNPROCESSABLE_ENTITY).into_response();
    }
    let donation = Donation {
        id: req.id,
        donor_id: req.donor_id,
        food_type: req.food_type,
        quantity: req.quantity,
        location: req.location,
        status: DonationStatus::Ready,
        agency_id: None,
        created_at: epoch_secs(),
        expires_at: req.expires_at,
    };
    match state.store.insert_donation(&donation) {
        Ok(true) => {}
        Ok(false) => {
            return error_response("donation already exists", StatusCode::CONFLICT).into_response();
        }
        Err(e) => return internal_error(&e),
    }

    match allocate_stored(&state, donation).await {
        Ok(result) => {
            info!(
                donation_id = %result.donation.id,
                status = %result.donation.status,
                "donation registered"
            );
            (StatusCode::CREATED, ApiResponse::ok(result)).into_response()
        }
        Err(resp) => resp,
    }
}

/// POST /api/v1/donations/{id}/allocate
///
/// Re-queue a stored `Ready` donation, e.g. after every agency declined it.
pub async fn allocate_donation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let donation = match state.store.get_donation(&id) {
        Ok(Some(donation)) => donation,
        Ok(None) => return error_response("donation not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => return internal_error(&e),
    };

    match allocate_stored(&state, donation).await {
        Ok(result) => ApiResponse::ok(result).into_response(),
        Err(resp) => resp,
    }
}

/// DELETE /api/v1/donations/{id}
///
/// A live offer queue is cancelled before the record is removed.
pub async fn delete_donation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if state.scheduler.cancel(&id).await {
        info!(donation_id = %id, "live offer cancelled for deleted donation");
    }
    match state.store.delete_donation(&id) {
        Ok(true) => ApiResponse::ok("deleted").into_response(),
        Ok(false) => error_response("donation not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => internal_error(&e),
    }
}

/// GET /api/v1/donations/{id}
pub async fn get_donation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_donation(&id) {
        Ok(Some(donation)) => ApiResponse::ok(donation).into_response(),
        Ok(None) => error_response("donation not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => internal_error(&e),
    }
}

/// GET /api/v1/donations/{id}/offer
pub async fn get_offer(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.scheduler.offer(&id).await {
        Some(offer) => ApiResponse::ok(offer).into_response(),
        None => error_response("no live offer for donation", StatusCode::NOT_FOUND).into_response(),
    }
}

/// Accept/reject body: the agency answering the offer.
#[derive(serde::Deserialize)]
pub struct OfferAnswer {
    pub agency_id: AgencyId,
}

/// Outcome of an accept or reject call.
#[derive(serde::Serialize)]
pub struct AnswerResult {
    pub donation_id: DonationId,
    pub agency_id: AgencyId,
    /// False when the agency did not hold the offer.
    pub applied: bool,
}

/// POST /api/v1/donations/{id}/accept
pub async fn accept_offer(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<OfferAnswer>,
) -> impl IntoResponse {
    match state.scheduler.accept(&id, &req.agency_id).await {
        Ok(applied) => ApiResponse::ok(AnswerResult {
            donation_id: id,
            agency_id: req.agency_id,
            applied,
        })
        .into_response(),
        Err(e) => scheduler_error(&e),
    }
}

/// POST /api/v1/donations/{id}/reject
pub async fn reject_offer(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<OfferAnswer>,
) -> impl IntoResponse {
    match state.scheduler.reject(&id, &req.agency_id).await {
        Ok(applied) => ApiResponse::ok(AnswerResult {
            donation_id: id,
            agency_id: req.agency_id,
            applied,
        })
        .into_response(),
        Err(e) => scheduler_error(&e),
    }
}

// ── Agencies ───────────────────────────────────────────────────

/// Agency body; the ID comes from the path.
#[derive(serde::Deserialize)]
pub struct AgencyBody {
    pub name: String,
    #[serde(default)]
    pub priority_flag: bool,
    pub location: GeoPoint,
}

/// PUT /api/v1/agencies/{id}
pub async fn put_agency(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<AgencyBody>,
) -> impl IntoResponse {
    if let Err(e) = validate(&req.location) {
        return error_response(&e.to_string(), StatusCode::UNPROCESSABLE_ENTITY).into_response();
    }
    let agency = Agency {
        id,
        name: req.name,
        priority_flag: req.priority_flag,
        location: req.location,
    };
    match state.store.put_agency(&agency) {
        Ok(()) => ApiResponse::ok(agency).into_response(),
        Err(e) => internal_error(&e),
    }
}

/// GET /api/v1/agencies/{id}
pub async fn get_agency(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_agency(&id) {
        Ok(Some(agency)) => ApiResponse::ok(agency).into_response(),
        Ok(None) => error_response("agency not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => internal_error(&e),
    }
}

/// DELETE /api/v1/agencies/{id}
///
/// The agency's requirements go with it.
pub async fn delete_agency(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let requirements = match state.store.list_requirements_for_agency(&id) {
        Ok(rows) => rows,
        Err(e) => return internal_error(&e),
    };
    for row in &requirements {
        if let Err(e) = state.store.delete_requirement(&row.agency_id, row.food_type) {
            return internal_error(&e);
        }
        state
            .scheduler
            .remove_requirement(&row.agency_id, row.food_type)
            .await;
    }

    match state.store.delete_agency(&id) {
        Ok(true) => {
            info!(agency_id = %id, requirements = requirements.len(), "agency deleted");
            ApiResponse::ok("deleted").into_response()
        }
        Ok(false) => error_response("agency not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => internal_error(&e),
    }
}

/// GET /api/v1/agencies/{id}/requirements
pub async fn list_agency_requirements(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.list_requirements_for_agency(&id) {
        Ok(rows) => ApiResponse::ok(rows).into_response(),
        Err(e) => internal_error(&e),
    }
}

// ── Requirements ───────────────────────────────────────────────

/// GET /api/v1/requirements
pub async fn list_requirements(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_requirements() {
        Ok(rows) => ApiResponse::ok(rows).into_response(),
        Err(e) => internal_error(&e),
    }
}

/// GET /api/v1/requirements/{agency_id}/{food_type}
pub async fn get_requirement(
    State(state): State<ApiState>,
    Path((agency_id, food_type)): Path<(String, String)>,
) -> impl IntoResponse {
    let food_type: FoodType = match food_type.parse() {
        Ok(food_type) => food_type,
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response();
        }
    };
    match state.store.get_requirement(&agency_id, food_type) {
        Ok(Some(row)) => ApiResponse::ok(row).into_response(),
        Ok(None) => error_response("requirement not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => internal_error(&e),
    }
}

/// Requirement body. One row exists per `(agency_id, food_type)`.
#[derive(serde::Deserialize)]
pub struct RequirementBody {
    pub agency_id: AgencyId,
    pub food_type: FoodType,
    pub quantity: u32,
}

/// PUT /api/v1/requirements
pub async fn put_requirement(
    State(state): State<ApiState>,
    Json(req): Json<RequirementBody>,
) -> impl IntoResponse {
    match state.store.get_agency(&req.agency_id) {
        Ok(Some(_)) => {}
        Ok(None) => return error_response("agency not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => return internal_error(&e),
    }

    let requirement = Requirement {
        id: requirement_key(&req.agency_id, req.food_type),
        agency_id: req.agency_id,
        food_type: req.food_type,
        quantity: req.quantity,
    };
    match state.store.upsert_requirement(&requirement) {
        Ok(stored) => {
            state.scheduler.update_requirement(&stored).await;
            ApiResponse::ok(stored).into_response()
        }
        Err(e) => internal_error(&e),
    }
}

/// DELETE /api/v1/requirements/{agency_id}/{food_type}
pub async fn delete_requirement(
    State(state): State<ApiState>,
    Path((agency_id, food_type)): Path<(String, String)>,
) -> impl IntoResponse {
    let food_type: FoodType = match food_type.parse() {
        Ok(food_type) => food_type,
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response();
        }
    };

    match state.store.delete_requirement(&agency_id, food_type) {
        Ok(true) => {
            if !state.scheduler.remove_requirement(&agency_id, food_type).await {
                warn!(%agency_id, %food_type, "deleted requirement was not cached");
            }
            ApiResponse::ok("deleted").into_response()
        }
        Ok(false) => error_response("requirement not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => internal_error(&e),
    }
}

// ── Health ─────────────────────────────────────────────────────

/// GET /healthz
pub async fn healthz(State(state): State<ApiState>) -> impl IntoResponse {
    let active_offers = state.scheduler.active_donations().await.len();
    ApiResponse::ok(serde_json::json!({
        "status": "ok",
        "active_offers": active_offers,
    }))
}
