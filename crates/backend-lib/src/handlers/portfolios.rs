//! Portfolio listing, detail and management.
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    Form, Json,
};
use kabuport_common::{ActionState, Portfolio, PortfolioDetail};
use uuid::Uuid;

use super::action;
use crate::auth::CurrentUser;
use crate::data::portfolio;
use crate::error::AppError;
use crate::validation::PortfolioForm;
use crate::AppState;

/// `GET /portfolios`
pub async fn index(
    State(state): State<Arc<AppState>>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<Vec<Portfolio>>, AppError> {
    let db = state.data.for_user(&session.access_token);
    Ok(Json(portfolio::list_portfolios(&db, session.user.id).await?))
}

/// `GET /portfolios/{id}`
pub async fn show(
    State(state): State<Arc<AppState>>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PortfolioDetail>, AppError> {
    let db = state.data.for_user(&session.access_token);
    portfolio::portfolio_detail(&db, session.user.id, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("portfolio {id}")))
}

/// `POST /portfolios`
pub async fn create(
    State(state): State<Arc<AppState>>,
    CurrentUser(session): CurrentUser,
    Form(form): Form<PortfolioForm>,
) -> Result<Response, AppError> {
    let input = match form.validate() {
        Ok(input) => input,
        Err(e) => return Ok(action(StatusCode::BAD_REQUEST, ActionState::error(e.to_string()))),
    };

    let db = state.data.for_user(&session.access_token);
    match portfolio::create_portfolio(&db, session.user.id, &input).await {
        Ok(()) => Ok(action(StatusCode::CREATED, ActionState::success("Portfolio created"))),
        Err(e) if e.is_unique_violation() => Ok(action(
            StatusCode::CONFLICT,
            ActionState::error("A portfolio with the same name already exists"),
        )),
        Err(e) => {
            tracing::warn!(error = %e, "portfolio create failed");
            Ok(action(
                StatusCode::BAD_GATEWAY,
                ActionState::error("Failed to create the portfolio"),
            ))
        },
    }
}

/// `PATCH /portfolios/{id}`
pub async fn update(
    State(state): State<Arc<AppState>>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<Uuid>,
    Form(form): Form<PortfolioForm>,
) -> Result<Response, AppError> {
    let input = match form.validate() {
        Ok(input) => input,
        Err(e) => return Ok(action(StatusCode::BAD_REQUEST, ActionState::error(e.to_string()))),
    };

    let db = state.data.for_user(&session.access_token);
    match portfolio::update_portfolio(&db, session.user.id, id, &input).await {
        Ok(true) => Ok(action(StatusCode::OK, ActionState::success("Portfolio updated"))),
        Ok(false) => Err(AppError::NotFound(format!("portfolio {id}"))),
        Err(e) if e.is_unique_violation() => Ok(action(
            StatusCode::CONFLICT,
            ActionState::error("A portfolio with the same name already exists"),
        )),
        Err(e) => {
            tracing::warn!(error = %e, portfolio = %id, "portfolio update failed");
            Ok(action(
                StatusCode::BAD_GATEWAY,
                ActionState::error("Failed to update the portfolio"),
            ))
        },
    }
}

/// `DELETE /portfolios/{id}`
pub async fn delete(
    State(state): State<Arc<AppState>>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let db = state.data.for_user(&session.access_token);
    match portfolio::delete_portfolio(&db, session.user.id, id).await {
        Ok(true) => Ok(action(StatusCode::OK, ActionState::success("Portfolio deleted"))),
        Ok(false) => Err(AppError::NotFound(format!("portfolio {id}"))),
        Err(e) => {
            tracing::warn!(error = %e, portfolio = %id, "portfolio delete failed");
            Ok(action(
                StatusCode::BAD_GATEWAY,
                ActionState::error("Failed to delete the portfolio"),
            ))
        },
    }
}
