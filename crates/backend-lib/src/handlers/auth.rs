// ============================
// crates/backend-lib/src/handlers/auth.rs
// ============================
//! Auth form handlers: login, signup, password reset, logout.
use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use axum_extra::extract::cookie::CookieJar;
use kabuport_common::ActionState;

use super::action;
use crate::error::AppError;
use crate::middleware::gate::append_set_cookies;
use crate::validation::{LoginForm, ResetPasswordForm, SignupForm};
use crate::AppState;

/// `POST /login`: password grant, then 303 to the home path with session cookies
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    if let Err(e) = form.validate() {
        return Ok(action(StatusCode::BAD_REQUEST, ActionState::error(e.to_string())));
    }

    match state
        .auth
        .sign_in_with_password(
            &CookieJar::from_headers(&headers),
            form.email.trim(),
            &form.password,
        )
        .await
    {
        Ok(cookies) => {
            tracing::info!("user signed in");
            let mut response = Redirect::to(state.routes.home_path()).into_response();
            append_set_cookies(response.headers_mut(), &cookies);
            Ok(response)
        },
        Err(e) if e.is_rejection() => Ok(action(
            StatusCode::UNAUTHORIZED,
            ActionState::error("Incorrect email address or password"),
        )),
        Err(e) => Err(e.into()),
    }
}

/// `POST /signup`: account creation; the user confirms by email
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SignupForm>,
) -> Result<Response, AppError> {
    if let Err(e) = form.validate() {
        return Ok(action(StatusCode::BAD_REQUEST, ActionState::error(e.to_string())));
    }

    match state.auth.sign_up(form.email.trim(), &form.password).await {
        Ok(()) => Ok(action(
            StatusCode::OK,
            ActionState::success("Confirmation email sent. Please check your inbox."),
        )),
        Err(e) if e.is_rejection() => {
            tracing::debug!(error = %e, "signup rejected");
            Ok(action(
                StatusCode::UNPROCESSABLE_ENTITY,
                ActionState::error("Failed to create the account"),
            ))
        },
        Err(e) => Err(e.into()),
    }
}

/// `POST /reset-password`: send a recovery link pointing at `/auth/callback`
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ResetPasswordForm>,
) -> Result<Response, AppError> {
    if let Err(e) = form.validate() {
        return Ok(action(StatusCode::BAD_REQUEST, ActionState::error(e.to_string())));
    }

    match state.auth.reset_password_for_email(form.email.trim()).await {
        Ok(()) => Ok(action(
            StatusCode::OK,
            ActionState::success("Password reset email sent."),
        )),
        Err(e) if e.is_rejection() => {
            tracing::debug!(error = %e, "password reset rejected");
            Ok(action(
                StatusCode::UNPROCESSABLE_ENTITY,
                ActionState::error("Failed to send the password reset email"),
            ))
        },
        Err(e) => Err(e.into()),
    }
}

/// `POST /logout`: revoke, clear cookies, 303 to the login path
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let jar = CookieJar::from_headers(&headers);
    let removals = state.auth.sign_out(&jar).await?;
    let mut response = Redirect::to(state.routes.login_path()).into_response();
    append_set_cookies(response.headers_mut(), &removals);
    Ok(response)
}
