//! Read-only HTTP surface over resolved contract state.

pub mod error;
pub mod routes;

use crate::chain::ChainDataSource;
use crate::service::ContractReadService;
use crate::validator::ContractValidator;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Shared handles every handler receives.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ContractReadService>,
    pub validator: ContractValidator,
    pub chain: Arc<dyn ChainDataSource>,
}

impl AppState {
    pub fn new(
        service: Arc<ContractReadService>,
        validator: ContractValidator,
        chain: Arc<dyn ChainDataSource>,
    ) -> Self {
        Self {
            service,
            validator,
            chain,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthcheck", get(routes::healthcheck))
        .route("/v1/contract/:contract_tx_id", get(routes::contract))
        .route(
            "/v1/contract/:contract_tx_id/interactions",
            get(routes::interactions),
        )
        .route(
            "/v1/contract/:contract_tx_id/interactions/:address",
            get(routes::address_interactions),
        )
        .route("/v1/contract/:contract_tx_id/records", get(routes::records))
        .route(
            "/v1/contract/:contract_tx_id/records/:name",
            get(routes::record),
        )
        .route(
            "/v1/contract/:contract_tx_id/balances/:address",
            get(routes::balance),
        )
        .route(
            "/v1/contract/:contract_tx_id/reserved/:name",
            get(routes::reserved),
        )
        // any other top-level state field
        .route("/v1/contract/:contract_tx_id/:field", get(routes::field))
        .route(
            "/v1/wallet/:address/contracts",
            get(routes::wallet_contracts),
        )
        .route(
            "/v1/wallet/:address/contract/:contract_tx_id",
            get(routes::wallet_interactions),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
