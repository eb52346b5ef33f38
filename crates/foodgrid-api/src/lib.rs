//! foodgrid-api — REST API for FoodGrid.
//!
//! A thin adapter over the allocation scheduler and the state store. All
//! allocation decisions are made by `foodgrid-scheduler`.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/donations` | List all donations |
//! | POST | `/api/v1/donations` | Register a donation and allocate it |
//! | GET | `/api/v1/donations/{id}` | Get a donation record |
//! | DELETE | `/api/v1/donations/{id}` | Cancel any live offer and delete |
//! | POST | `/api/v1/donations/{id}/allocate` | Re-queue a `Ready` donation |
//! | GET | `/api/v1/donations/{id}/offer` | Get the live offer queue |
//! | POST | `/api/v1/donations/{id}/accept` | Accept as head agency |
//! | POST | `/api/v1/donations/{id}/reject` | Reject as head agency |
//! | GET | `/api/v1/agencies/{id}` | Get an agency |
//! | PUT | `/api/v1/agencies/{id}` | Create or update an agency |
//! | DELETE | `/api/v1/agencies/{id}` | Delete an agency and its requirements |
//! | GET | `/api/v1/agencies/{id}/requirements` | List one agency's requirements |
//! | GET | `/api/v1/requirements` | List all requirements |
//! | PUT | `/api/v1/requirements` | Create or update a requirement |
//! | GET | `/api/v1/requirements/{agency_id}/{food_type}` | Get a requirement |
//! | DELETE | `/api/v1/requirements/{agency_id}/{food_type}` | Delete a requirement |
//! | GET | `/healthz` | Liveness and active offer count |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use foodgrid_scheduler::Scheduler;
use foodgrid_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub scheduler: Arc<Scheduler<StateStore>>,
}

/// Build the complete API router.
pub fn build_router(store: StateStore, scheduler: Arc<Scheduler<StateStore>>) -> Router {
    let api_state = ApiState { store, scheduler };

    let api_routes = Router::new()
        .route("/donations", get(handlers::list_donations).post(handlers::create_donation))
        .route("/donations/{id}", get(handlers::get_donation).delete(handlers::delete_donation))
        .route("/donations/{id}/allocate", post(handlers::allocate_donation))
        .route("/donations/{id}/offer", get(handlers::get_offer))
        .route("/donations/{id}/accept", post(handlers::accept_offer))
        .route("/donations/{id}/reject", post(handlers::reject_offer))
        .route(
            "/agencies/{id}",
            get(handlers::get_agency)
                .put(handlers::put_agency)
                .delete(handlers::delete_agency),
        )
        .route("/agencies/{id}/requirements", get(handlers::list_agency_requirements))
        .route(
            "/requirements",
            get(handlers::list_requirements).put(handlers::put_requirement),
        )
        .route(
            "/requirements/{agency_id}/{food_type}",
            get(handlers::get_requirement).delete(handlers::delete_requirement),
        )
        .with_state(api_state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz).with_state(api_state))
}
