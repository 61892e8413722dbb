//! Trade history.
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use kabuport_common::{ActionState, TransactionRecord};

use super::action;
use crate::auth::CurrentUser;
use crate::data::transaction;
use crate::error::AppError;
use crate::validation::TransactionForm;
use crate::AppState;

const TRANSACTIONS_PATH: &str = "/transactions";

/// `GET /transactions`
pub async fn index(
    State(state): State<Arc<AppState>>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<Vec<TransactionRecord>>, AppError> {
    let db = state.data.for_user(&session.access_token);
    Ok(Json(transaction::list_transactions(&db, session.user.id).await?))
}

/// `POST /transactions`: record a trade, then 303 back to the listing
pub async fn create(
    State(state): State<Arc<AppState>>,
    CurrentUser(session): CurrentUser,
    Form(form): Form<TransactionForm>,
) -> Result<Response, AppError> {
    let trade = match form.validate() {
        Ok(trade) => trade,
        Err(e) => return Ok(action(StatusCode::BAD_REQUEST, ActionState::error(e.to_string()))),
    };

    let db = state.data.for_user(&session.access_token);
    match transaction::create_transaction(&db, session.user.id, &trade).await {
        Ok(()) => Ok(Redirect::to(TRANSACTIONS_PATH).into_response()),
        Err(e) => {
            tracing::warn!(error = %e, code = %trade.local_code, "transaction create failed");
            Ok(action(
                StatusCode::BAD_GATEWAY,
                ActionState::error("Failed to record the transaction"),
            ))
        },
    }
}

/// `DELETE /transactions/{id}`
pub async fn delete(
    State(state): State<Arc<AppState>>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let db = state.data.for_user(&session.access_token);
    match transaction::delete_transaction(&db, session.user.id, id).await {
        Ok(true) => Ok(action(StatusCode::OK, ActionState::success("Transaction deleted"))),
        Ok(false) => Err(AppError::NotFound(format!("transaction {id}"))),
        Err(e) => {
            tracing::warn!(error = %e, transaction = id, "transaction delete failed");
            Ok(action(
                StatusCode::BAD_GATEWAY,
                ActionState::error("Failed to delete the transaction"),
            ))
        },
    }
}
