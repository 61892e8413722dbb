//! Per-request "who is signed in" lookup.
//!
//! The gate stores what it resolved as a [`ResolvedUser`] request extension.
//! Handlers take [`CurrentUser`], which reuses that value and only asks the
//! auth service itself when the gate did not (public paths). The result is
//! written back into the extensions so one request never resolves twice.
use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::VerifiedSession;
use crate::error::AppError;
use crate::middleware::gate::verify_session;
use crate::AppState;

/// Session the gate resolved for this request, if it looked one up
#[derive(Debug, Clone)]
pub struct ResolvedUser(pub Option<VerifiedSession>);

/// Extractor for handlers that require a signed-in user
#[derive(Debug, Clone)]
pub struct CurrentUser(pub VerifiedSession);

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(ResolvedUser(resolved)) = parts.extensions.get::<ResolvedUser>() {
            return resolved.clone().map(CurrentUser).ok_or(AppError::Unauthenticated);
        }

        let timeout = state.settings.gate.verify_timeout();
        let resolution = verify_session(state.auth.as_ref(), &parts.headers, timeout).await?;
        // cookies rewritten here cannot reach the client; the gate owns that
        parts
            .extensions
            .insert(ResolvedUser(resolution.session.clone()));
        resolution
            .session
            .map(CurrentUser)
            .ok_or(AppError::Unauthenticated)
    }
}
