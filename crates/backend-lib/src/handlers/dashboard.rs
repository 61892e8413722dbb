//! Signed-in dashboard.
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use kabuport_common::Dashboard;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::data::portfolio;
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub portfolio: Option<Uuid>,
}

/// `GET /dashboard`
pub async fn show(
    State(state): State<Arc<AppState>>,
    CurrentUser(session): CurrentUser,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<Dashboard>, AppError> {
    let db = state.data.for_user(&session.access_token);
    let dashboard = portfolio::dashboard(&db, &session.user, query.portfolio).await?;
    Ok(Json(dashboard))
}
