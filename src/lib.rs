pub mod accrual;
pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod ports;
pub mod services;
pub mod validation;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::ports::LedgerStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/user/orders",
            post(handlers::orders::upload_order).get(handlers::orders::list_orders),
        )
        .route("/api/user/balance", get(handlers::withdrawals::get_balance))
        .route(
            "/api/user/balance/withdraw",
            post(handlers::withdrawals::withdraw),
        )
        .route(
            "/api/user/withdrawals",
            get(handlers::withdrawals::list_withdrawals),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
