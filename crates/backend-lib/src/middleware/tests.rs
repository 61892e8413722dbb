use super::*;
use crate::auth::{AuthError, AuthService, CurrentUser, Resolution, VerifiedSession};
use crate::config::Settings;
use crate::AppState;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{
        header::{COOKIE, LOCATION, SET_COOKIE},
        HeaderMap, Request, StatusCode,
    },
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use kabuport_common::AuthUser;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

#[derive(Default)]
struct MockAuth {
    resolution: Resolution,
    fail: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockAuth {
    fn anonymous() -> Self {
        Self::default()
    }

    fn signed_in() -> Self {
        Self {
            resolution: Resolution {
                session: Some(session()),
                cookies: Vec::new(),
            },
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthService for MockAuth {
    async fn resolve_user(&self, _cookies: &CookieJar) -> Result<Resolution, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(AuthError::Status {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        Ok(self.resolution.clone())
    }

    async fn sign_in_with_password(
        &self,
        _cookies: &CookieJar,
        _email: &str,
        _password: &str,
    ) -> Result<Vec<Cookie<'static>>, AuthError> {
        Err(AuthError::NotConfigured)
    }

    async fn sign_up(&self, _email: &str, _password: &str) -> Result<(), AuthError> {
        Err(AuthError::NotConfigured)
    }

    async fn reset_password_for_email(&self, _email: &str) -> Result<(), AuthError> {
        Err(AuthError::NotConfigured)
    }

    async fn sign_out(&self, _cookies: &CookieJar) -> Result<Vec<Cookie<'static>>, AuthError> {
        Ok(Vec::new())
    }
}

fn session() -> VerifiedSession {
    VerifiedSession {
        user: AuthUser {
            id: Uuid::nil(),
            email: Some("investor@example.jp".to_string()),
        },
        access_token: "access-token".to_string(),
    }
}

/// Echoes the cookie header the handler received
async fn echo_cookies(headers: HeaderMap) -> String {
    headers
        .get(COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Writes its own session cookie, as the login handler does
async fn issue_session() -> impl IntoResponse {
    ([(SET_COOKIE, "sb-test-auth-token=base64-from-handler; Path=/")], "ok")
}

async fn whoami(CurrentUser(session): CurrentUser) -> String {
    session.user.email.unwrap_or_default()
}

fn app_with(auth: Arc<MockAuth>, settings: Settings) -> Router {
    let state = Arc::new(AppState::with_auth(settings, auth).unwrap());
    Router::new()
        .route("/", get(echo_cookies))
        .route("/whoami", get(whoami))
        .route("/login", get(echo_cookies).post(issue_session))
        .route("/session", get(issue_session))
        .route("/stocks/{code}/owner", get(whoami))
        .route("/{*rest}", get(echo_cookies))
        .layer(axum::middleware::from_fn_with_state(state.clone(), request_gate))
        .with_state(state)
}

fn app(auth: Arc<MockAuth>) -> Router {
    app_with(auth, Settings::default())
}

fn get_request(path: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header("host", "localhost:3000")
        .body(Body::empty())
        .unwrap()
}

fn location(response: &axum::response::Response) -> &str {
    response.headers().get(LOCATION).unwrap().to_str().unwrap()
}

#[tokio::test]
async fn test_static_assets_skip_auth() {
    let auth = Arc::new(MockAuth::anonymous());
    let app = app(auth.clone());

    for path in ["/_next/static/chunk.js", "/_next/image", "/favicon.ico"] {
        let response = app.clone().oneshot(get_request(path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{path}");
    }
    assert_eq!(auth.calls(), 0);
}

#[tokio::test]
async fn test_public_paths_pass_regardless_of_auth_state() {
    for auth in [MockAuth::anonymous(), MockAuth::signed_in()] {
        let auth = Arc::new(auth);
        let app = app(auth.clone());
        for path in ["/", "/reset-password", "/auth/callback", "/stocks/7203"] {
            let response = app.clone().oneshot(get_request(path)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{path}");
            assert!(response.headers().get(LOCATION).is_none());
        }
        // public non-entry paths never trigger verification
        assert_eq!(auth.calls(), 0);
    }
}

#[tokio::test]
async fn test_protected_without_user_redirects_to_login() {
    let auth = Arc::new(MockAuth::anonymous());
    let response = app(auth.clone())
        .oneshot(get_request("/dashboard"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "http://localhost:3000/login");
    assert_eq!(auth.calls(), 1);
}

#[tokio::test]
async fn test_login_with_user_redirects_home() {
    for path in ["/login", "/signup"] {
        let auth = Arc::new(MockAuth::signed_in());
        let response = app(auth).oneshot(get_request(path)).await.unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&response), "http://localhost:3000/dashboard");
    }
}

#[tokio::test]
async fn test_login_without_user_passes() {
    let auth = Arc::new(MockAuth::anonymous());
    let response = app(auth.clone())
        .oneshot(get_request("/signup"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(auth.calls(), 1);
}

#[tokio::test]
async fn test_refreshed_cookies_are_relayed_verbatim() {
    let refreshed = Cookie::build(("sb-test-auth-token", "base64-fresh"))
        .path("/")
        .same_site(axum_extra::extract::cookie::SameSite::Lax)
        .max_age(cookie::time::Duration::days(400))
        .build();
    let auth = Arc::new(MockAuth {
        resolution: Resolution {
            session: Some(session()),
            cookies: vec![refreshed.clone()],
        },
        ..MockAuth::default()
    });

    let request = Request::builder()
        .uri("/transactions")
        .header("host", "localhost:3000")
        .header(COOKIE, "sb-test-auth-token=base64-stale; theme=dark")
        .body(Body::empty())
        .unwrap();
    let response = app(auth).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let set_cookies: Vec<_> = response.headers().get_all(SET_COOKIE).iter().collect();
    assert_eq!(set_cookies.len(), 1);
    assert_eq!(set_cookies[0].to_str().unwrap(), refreshed.to_string());

    // the handler saw the refreshed value, not the stale one
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let seen = String::from_utf8(body.to_vec()).unwrap();
    assert!(seen.contains("sb-test-auth-token=base64-fresh"));
    assert!(seen.contains("theme=dark"));
    assert!(!seen.contains("stale"));
}

#[tokio::test]
async fn test_redirect_to_login_carries_cookie_removals() {
    let removal = Cookie::build(("sb-test-auth-token", "")).path("/").removal().build();
    let auth = Arc::new(MockAuth {
        resolution: Resolution {
            session: None,
            cookies: vec![removal.clone()],
        },
        ..MockAuth::default()
    });

    let response = app(auth).oneshot(get_request("/portfolios")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers().get(SET_COOKIE).unwrap().to_str().unwrap(),
        removal.to_string()
    );
}

#[tokio::test]
async fn test_gate_is_idempotent() {
    let auth = Arc::new(MockAuth::anonymous());
    let app = app(auth);

    let first = app.clone().oneshot(get_request("/transactions/new")).await.unwrap();
    let second = app.oneshot(get_request("/transactions/new")).await.unwrap();

    assert_eq!(first.status(), second.status());
    assert_eq!(location(&first), location(&second));
}

#[tokio::test]
async fn test_auth_failure_fails_closed() {
    let auth = Arc::new(MockAuth {
        fail: true,
        ..MockAuth::signed_in()
    });
    let app = app(auth);

    let response = app.clone().oneshot(get_request("/dashboard")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "http://localhost:3000/login");

    // entry paths stay reachable during an outage
    let response = app.oneshot(get_request("/login")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_auth_timeout_fails_closed() {
    let mut settings = Settings::default();
    settings.gate.verify_timeout_ms = 20;
    let auth = Arc::new(MockAuth {
        delay: Some(Duration::from_millis(500)),
        ..MockAuth::signed_in()
    });

    let response = app_with(auth, settings)
        .oneshot(get_request("/dashboard"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "http://localhost:3000/login");
}

#[tokio::test]
async fn test_handlers_reuse_the_gate_resolution() {
    let auth = Arc::new(MockAuth::signed_in());
    let response = app(auth.clone())
        .oneshot(get_request("/whoami"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"investor@example.jp");
    assert_eq!(auth.calls(), 1);
}

#[tokio::test]
async fn test_current_user_on_public_path_resolves_lazily() {
    let auth = Arc::new(MockAuth::anonymous());
    let response = app(auth.clone())
        .oneshot(get_request("/stocks/7203/owner"))
        .await
        .unwrap();

    // the gate let it through; the handler's own lookup found nobody
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(auth.calls(), 1);
}

#[tokio::test]
async fn test_redirect_preserves_query_and_host() {
    let auth = Arc::new(MockAuth::anonymous());
    let request = Request::builder()
        .uri("/portfolios/123?tab=holdings")
        .header("host", "kabu.example.jp")
        .body(Body::empty())
        .unwrap();

    let response = app(auth).oneshot(request).await.unwrap();
    assert_eq!(location(&response), "http://kabu.example.jp/login?tab=holdings");
}

fn session_set_cookies(response: &axum::response::Response) -> Vec<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .filter(|v| v.starts_with("sb-test-auth-token="))
        .collect()
}

#[tokio::test]
async fn test_handler_cookie_beats_gate_removal() {
    let removal = Cookie::build(("sb-test-auth-token", "")).path("/").removal().build();
    let auth = Arc::new(MockAuth {
        resolution: Resolution {
            session: None,
            cookies: vec![removal],
        },
        ..MockAuth::default()
    });

    let request = Request::builder()
        .method("POST")
        .uri("/login")
        .header("host", "localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app(auth).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        session_set_cookies(&response),
        vec!["sb-test-auth-token=base64-from-handler; Path=/".to_string()]
    );
}

#[tokio::test]
async fn test_handler_cookie_beats_gate_refresh() {
    let refreshed = Cookie::build(("sb-test-auth-token", "base64-refreshed")).path("/").build();
    let auth = Arc::new(MockAuth {
        resolution: Resolution {
            session: Some(session()),
            cookies: vec![refreshed],
        },
        ..MockAuth::default()
    });

    let response = app(auth).oneshot(get_request("/session")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookies = session_set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    assert!(!cookies[0].contains("refreshed"));
}
