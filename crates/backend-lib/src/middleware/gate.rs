// crates/backend-lib/src/middleware/gate.rs

//! Request gate: the per-request access-control decision.
//!
//! Every request except static assets is classified against the
//! [`RouteTable`]. Protected paths need a verified user or are sent to the
//! login path; signed-in users hitting login/signup are sent home. Cookies the
//! auth service rewrites while verifying are relayed on every outcome unless
//! the handler set the same cookie itself.
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{
        header::{COOKIE, HOST, LOCATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode, Uri,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use metrics::counter;
use url::Url;

use crate::auth::session::is_removal;
use crate::auth::{AuthError, AuthService, Resolution, ResolvedUser};
use crate::config::GateSettings;
use crate::metrics::{GATE_AUTH_FAILURE, GATE_DECISION};
use crate::routes::{RouteClass, RouteTable};
use crate::AppState;

/// What the gate has to do before it can decide
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePlan {
    /// Static asset; pass straight through
    Bypass,
    /// Public path that needs no lookup
    Public,
    /// Login/signup: look up, send signed-in users home
    PreAuth,
    /// Needs a verified user
    Protected,
}

/// Terminal outcome of one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Pass,
    RedirectLogin,
    RedirectHome,
}

impl GatePlan {
    pub fn for_path(routes: &RouteTable, path: &str) -> Self {
        match routes.classify(path) {
            RouteClass::StaticAsset => GatePlan::Bypass,
            class if class.is_public() && routes.is_preauth(path) => GatePlan::PreAuth,
            class if class.is_public() => GatePlan::Public,
            _ => GatePlan::Protected,
        }
    }

    pub fn needs_lookup(self) -> bool {
        matches!(self, GatePlan::PreAuth | GatePlan::Protected)
    }

    /// Decide given whether a valid user was resolved
    pub fn decide(self, authenticated: bool) -> GateOutcome {
        match (self, authenticated) {
            (GatePlan::PreAuth, true) => GateOutcome::RedirectHome,
            (GatePlan::Protected, false) => GateOutcome::RedirectLogin,
            _ => GateOutcome::Pass,
        }
    }
}

impl GateOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            GateOutcome::Pass => "pass",
            GateOutcome::RedirectLogin => "redirect_login",
            GateOutcome::RedirectHome => "redirect_home",
        }
    }
}

/// Ask the auth service about `headers`' cookies, bounded by `timeout`
pub async fn verify_session(
    auth: &dyn AuthService,
    headers: &HeaderMap,
    timeout: Duration,
) -> Result<Resolution, AuthError> {
    let jar = CookieJar::from_headers(headers);
    tokio::time::timeout(timeout, auth.resolve_user(&jar))
        .await
        .map_err(|_| AuthError::Timeout)?
}

/// Gate middleware; install with `axum::middleware::from_fn_with_state`
pub async fn request_gate(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    let plan = GatePlan::for_path(&state.routes, &path);

    if plan == GatePlan::Bypass {
        counter!(GATE_DECISION, "outcome" => "static").increment(1);
        return next.run(request).await;
    }

    let resolution = if plan.needs_lookup() {
        let timeout = state.settings.gate.verify_timeout();
        match verify_session(state.auth.as_ref(), request.headers(), timeout).await {
            Ok(resolution) => resolution,
            Err(e) => {
                // fail closed: an unreachable auth service means no user
                tracing::warn!(path = %path, error = %e, "session verification failed");
                counter!(GATE_AUTH_FAILURE).increment(1);
                Resolution::anonymous()
            },
        }
    } else {
        Resolution::anonymous()
    };

    let outcome = plan.decide(resolution.is_authenticated());
    counter!(GATE_DECISION, "outcome" => outcome.as_str()).increment(1);
    tracing::debug!(path = %path, outcome = outcome.as_str(), "gate decision");

    let mut response = match outcome {
        GateOutcome::Pass => {
            if !resolution.cookies.is_empty() {
                forward_cookies(request.headers_mut(), &resolution.cookies);
            }
            if plan.needs_lookup() {
                request
                    .extensions_mut()
                    .insert(ResolvedUser(resolution.session.clone()));
            }
            next.run(request).await
        },
        GateOutcome::RedirectLogin => {
            redirect(request.headers(), request.uri(), &state.settings.gate, state.routes.login_path())
        },
        GateOutcome::RedirectHome => {
            redirect(request.headers(), request.uri(), &state.settings.gate, state.routes.home_path())
        },
    };

    relay_cookies(response.headers_mut(), &resolution.cookies);
    response
}

/// Append the gate's rewritten cookies unless the handler already wrote that
/// cookie, or another chunk of it; the handler's value is newer
fn relay_cookies(headers: &mut HeaderMap, cookies: &[Cookie<'static>]) {
    let written: Vec<String> = headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| Cookie::parse(v).ok())
        .map(|c| cookie_family(c.name()).to_string())
        .collect();
    let pending: Vec<Cookie<'static>> = cookies
        .iter()
        .filter(|c| !written.iter().any(|w| w == cookie_family(c.name())))
        .cloned()
        .collect();
    append_set_cookies(headers, &pending);
}

/// `sb-x-auth-token.3` and `sb-x-auth-token` belong to the same session
fn cookie_family(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((base, index)) if !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) => base,
        _ => name,
    }
}

/// Append one `Set-Cookie` per rewritten cookie, verbatim
pub fn append_set_cookies(headers: &mut HeaderMap, cookies: &[Cookie<'static>]) {
    for cookie in cookies {
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            },
            Err(e) => tracing::warn!(cookie = cookie.name(), error = %e, "dropping unencodable cookie"),
        }
    }
}

/// Apply rewritten cookies to the inbound `Cookie` header so handlers see them
fn forward_cookies(headers: &mut HeaderMap, cookies: &[Cookie<'static>]) {
    let mut jar = CookieJar::from_headers(headers);
    for cookie in cookies {
        jar = if is_removal(cookie) {
            jar.remove(Cookie::new(cookie.name().to_string(), ""))
        } else {
            jar.add(Cookie::new(cookie.name().to_string(), cookie.value().to_string()))
        };
    }

    let header = jar
        .iter()
        .map(|c| format!("{}={}", c.name(), c.value()))
        .collect::<Vec<_>>()
        .join("; ");
    headers.remove(COOKIE);
    if header.is_empty() {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(&header) {
        headers.insert(COOKIE, value);
    }
}

/// 307 to `path` on the request's own origin, keeping the query string
fn redirect(headers: &HeaderMap, uri: &Uri, gate: &GateSettings, path: &str) -> Response {
    let location = absolute_location(headers, uri, gate, path).unwrap_or_else(|| path.to_string());
    match HeaderValue::from_str(&location) {
        Ok(value) => (StatusCode::TEMPORARY_REDIRECT, [(LOCATION, value)]).into_response(),
        Err(_) => (
            StatusCode::TEMPORARY_REDIRECT,
            [(LOCATION, HeaderValue::from_static("/"))],
        )
            .into_response(),
    }
}

fn absolute_location(headers: &HeaderMap, uri: &Uri, gate: &GateSettings, path: &str) -> Option<String> {
    let scheme = forwarded(headers, gate, "x-forwarded-proto")
        .or_else(|| uri.scheme_str())
        .unwrap_or(&gate.default_scheme);
    let host = forwarded(headers, gate, "x-forwarded-host")
        .or_else(|| headers.get(HOST).and_then(|v| v.to_str().ok()))
        .or_else(|| uri.authority().map(|a| a.as_str()))?;

    let mut url = Url::parse(&format!("{scheme}://{host}")).ok()?;
    // a Host header carrying a path or credentials is not an origin
    if url.path() != "/" || !url.username().is_empty() {
        return None;
    }
    url.set_path(path);
    url.set_query(uri.query());
    Some(url.to_string())
}

/// First value of a proxy header, only when proxies are trusted
fn forwarded<'a>(headers: &'a HeaderMap, gate: &GateSettings, name: &str) -> Option<&'a str> {
    if !gate.trust_forwarded_headers {
        return None;
    }
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
