//! Route modules for the page image server

pub mod health;
pub mod pdf;

use axum::{routing::get, Router};

use crate::state::AppState;

/// Application router with state attached
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/health", get(health::health_check))
        .nest("/api/v1/pdf", pdf::router())
        .with_state(state)
}
