// ============================
// kabuport-backend-lib/src/router.rs
// ============================
//! HTTP router with the request gate in front of every route.
use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::handlers::{self, auth, dashboard, portfolios, stocks, transactions};
use crate::middleware::request_gate;
use crate::AppState;

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/login", post(auth::login))
        .route("/signup", post(auth::signup))
        .route("/reset-password", post(auth::reset_password))
        .route("/logout", post(auth::logout))
        .route("/dashboard", get(dashboard::show))
        .route("/portfolios", get(portfolios::index).post(portfolios::create))
        .route(
            "/portfolios/{id}",
            get(portfolios::show)
                .patch(portfolios::update)
                .delete(portfolios::delete),
        )
        .route("/transactions", get(transactions::index).post(transactions::create))
        .route("/transactions/{id}", delete(transactions::delete))
        .route("/stocks/{code}", get(stocks::show))
        .fallback(handlers::not_found)
        // the gate also wraps the fallback, so unknown paths are protected
        .layer(middleware::from_fn_with_state(state.clone(), request_gate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
