pub mod events;
pub mod health;
pub mod orders;
pub mod records;
pub mod sweep;

use crate::distribution::Distributor;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub distributor: Distributor,
}

impl AppState {
    pub fn new(distributor: Distributor) -> Self {
        Self { distributor }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/events/transfer", post(events::transfer))
        .route("/v1/events/swap", post(events::swap))
        .route("/v1/events/vesting", post(events::vesting))
        .route("/v1/events/signup", post(events::signup))
        .route("/v1/events/referral", post(events::referral))
        .route("/v1/events/link", post(events::link))
        .route("/v1/events/isolated", post(events::isolated))
        .route("/v1/events/conversion", post(events::conversion))
        .route("/v1/orders/:quote_id", get(orders::get_order))
        .route("/v1/records/:id", get(records::get_record))
        .route("/v1/sweep", post(sweep::run_sweep))
        .layer(cors)
        .with_state(state)
}
