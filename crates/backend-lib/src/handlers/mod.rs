// ============================
// crates/backend-lib/src/handlers/mod.rs
// ============================
//! HTTP handlers behind the request gate.

pub mod auth;
pub mod dashboard;
pub mod portfolios;
pub mod stocks;
pub mod transactions;

use axum::{
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use kabuport_common::ActionState;
use serde_json::{json, Value};

use crate::error::AppError;

/// Form submission outcome as JSON
pub(crate) fn action(status: StatusCode, state: ActionState) -> Response {
    (status, Json(state)).into_response()
}

/// `GET /`
pub async fn index() -> Json<Value> {
    Json(json!({
        "name": "kabuport",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(uri.path().to_string())
}
