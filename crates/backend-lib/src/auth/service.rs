use async_trait::async_trait;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use kabuport_common::AuthUser;
use thiserror::Error;

/// A session the auth service confirmed for this request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSession {
    pub user: AuthUser,
    /// Access token for user-scoped data calls
    pub access_token: String,
}

/// Outcome of one "who is this?" lookup
///
/// `cookies` holds every cookie the service rewrote while verifying
/// (refreshed session chunks, removals of stale ones). They must reach the
/// client unchanged whatever the caller decides.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub session: Option<VerifiedSession>,
    pub cookies: Vec<Cookie<'static>>,
}

impl Resolution {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }
}

/// Failures talking to the auth service
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("auth service is not configured")]
    NotConfigured,

    #[error("auth service request failed: {0}")]
    Transport(reqwest::Error),

    #[error("auth service timed out")]
    Timeout,

    #[error("auth service returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid login credentials")]
    InvalidCredentials,

    #[error("malformed auth service response: {0}")]
    Decode(String),
}

impl AuthError {
    /// The service answered and said no, as opposed to being unreachable
    pub fn is_rejection(&self) -> bool {
        match self {
            AuthError::InvalidCredentials => true,
            AuthError::Status { status, .. } => (400..500).contains(status) && *status != 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AuthError::Timeout
        } else if e.is_decode() {
            AuthError::Decode(e.to_string())
        } else {
            AuthError::Transport(e)
        }
    }
}

#[async_trait]
pub trait AuthService: Send + Sync {
    /// Resolve the current user from request cookies, refreshing the session if needed
    async fn resolve_user(&self, cookies: &CookieJar) -> Result<Resolution, AuthError>;

    /// Password grant; returns the session cookies to set
    async fn sign_in_with_password(
        &self,
        cookies: &CookieJar,
        email: &str,
        password: &str,
    ) -> Result<Vec<Cookie<'static>>, AuthError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<(), AuthError>;

    async fn reset_password_for_email(&self, email: &str) -> Result<(), AuthError>;

    /// Revoke the session; returns removal cookies for the client
    async fn sign_out(&self, cookies: &CookieJar) -> Result<Vec<Cookie<'static>>, AuthError>;
}
