//! Public stock detail.
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use kabuport_common::StockDetail;

use crate::data::stock::stock_detail;
use crate::error::AppError;
use crate::validation::validate_stock_code;
use crate::AppState;

/// `GET /stocks/{code}` through the shared anonymous data handle
pub async fn show(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<StockDetail>, AppError> {
    let code = validate_stock_code(&code).map_err(|e| AppError::NotFound(e.to_string()))?;
    stock_detail(state.data.anon(), code)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("stock {code}")))
}
