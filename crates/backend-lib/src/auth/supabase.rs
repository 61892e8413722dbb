// ============================
// kabuport-backend-lib/src/auth/supabase.rs
// ============================
//! [`AuthService`] backed by a GoTrue-compatible HTTP auth API.
use async_trait::async_trait;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use kabuport_common::AuthUser;
use metrics::counter;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;

use super::session::{clear_session, read_session, write_session, StoredSession};
use super::{AuthError, AuthService, Resolution, VerifiedSession};
use crate::config::SupabaseSettings;
use crate::metrics::AUTH_REFRESH;

/// GoTrue client bound to one project
#[derive(Clone)]
pub struct SupabaseAuth {
    http: Client,
    auth_url: String,
    anon_key: String,
    cookie_name: String,
    site_url: String,
    refresh_margin_secs: i64,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl SupabaseAuth {
    pub fn new(http: Client, settings: &SupabaseSettings) -> Self {
        Self {
            http,
            auth_url: format!("{}/auth/v1", settings.url.trim_end_matches('/')),
            anon_key: settings.anon_key.clone(),
            cookie_name: settings.session_cookie_name(),
            site_url: settings.site_url.trim_end_matches('/').to_string(),
            refresh_margin_secs: i64::try_from(settings.refresh_margin().as_secs())
                .unwrap_or(i64::MAX),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    fn ensure_configured(&self) -> Result<(), AuthError> {
        // `auth_url` is just "/auth/v1" when no project url was configured
        if self.auth_url.starts_with('/') || self.anon_key.is_empty() {
            return Err(AuthError::NotConfigured);
        }
        Ok(())
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("apikey", &self.anon_key)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<StoredSession, AuthError> {
        let response = self
            .request(self.http.post(format!("{}/token", self.auth_url)))
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        let session: StoredSession = check(response).await?.json().await?;
        counter!(AUTH_REFRESH).increment(1);
        Ok(session.with_issue_time(now()))
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser, AuthError> {
        let response = self
            .request(self.http.get(format!("{}/user", self.auth_url)))
            .bearer_auth(access_token)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }
}

#[async_trait]
impl AuthService for SupabaseAuth {
    async fn resolve_user(&self, cookies: &CookieJar) -> Result<Resolution, AuthError> {
        let Some(mut session) = read_session(cookies, &self.cookie_name) else {
            return Ok(Resolution::anonymous());
        };
        self.ensure_configured()?;

        let mut rewritten = Vec::new();
        if session.expires_within(now(), self.refresh_margin_secs) {
            match self.refresh(&session.refresh_token).await {
                Ok(fresh) => {
                    rewritten = write_session(cookies, &self.cookie_name, &fresh)
                        .map_err(|e| AuthError::Decode(e.to_string()))?;
                    session = fresh;
                },
                Err(e) if e.is_rejection() => {
                    tracing::debug!(error = %e, "refresh token rejected, clearing session");
                    return Ok(Resolution {
                        session: None,
                        cookies: clear_session(cookies, &self.cookie_name),
                    });
                },
                Err(e) => return Err(e),
            }
        }

        match self.get_user(&session.access_token).await {
            Ok(user) => Ok(Resolution {
                session: Some(VerifiedSession {
                    user,
                    access_token: session.access_token,
                }),
                cookies: rewritten,
            }),
            Err(e) if e.is_rejection() => Ok(Resolution {
                session: None,
                cookies: rewritten,
            }),
            Err(e) => Err(e),
        }
    }

    async fn sign_in_with_password(
        &self,
        cookies: &CookieJar,
        email: &str,
        password: &str,
    ) -> Result<Vec<Cookie<'static>>, AuthError> {
        self.ensure_configured()?;
        let response = self
            .request(self.http.post(format!("{}/token", self.auth_url)))
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let session: StoredSession = match check(response).await {
            Ok(r) => r.json().await?,
            Err(AuthError::Status { status: 400, .. }) => return Err(AuthError::InvalidCredentials),
            Err(e) => return Err(e),
        };
        let session = session.with_issue_time(now());
        write_session(cookies, &self.cookie_name, &session)
            .map_err(|e| AuthError::Decode(e.to_string()))
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<(), AuthError> {
        self.ensure_configured()?;
        let response = self
            .request(self.http.post(format!("{}/signup", self.auth_url)))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        check(response).await.map(|_| ())
    }

    async fn reset_password_for_email(&self, email: &str) -> Result<(), AuthError> {
        self.ensure_configured()?;
        let redirect_to = format!("{}/auth/callback", self.site_url);
        let response = self
            .request(self.http.post(format!("{}/recover", self.auth_url)))
            .query(&[("redirect_to", redirect_to.as_str())])
            .json(&json!({ "email": email }))
            .send()
            .await?;
        check(response).await.map(|_| ())
    }

    async fn sign_out(&self, cookies: &CookieJar) -> Result<Vec<Cookie<'static>>, AuthError> {
        let removals = clear_session(cookies, &self.cookie_name);
        let Some(session) = read_session(cookies, &self.cookie_name) else {
            return Ok(removals);
        };
        self.ensure_configured()?;

        let result = self
            .request(self.http.post(format!("{}/logout", self.auth_url)))
            .query(&[("scope", "local")])
            .bearer_auth(&session.access_token)
            .send()
            .await;
        match result.map_err(AuthError::from) {
            Ok(response) => match check(response).await {
                Ok(_) => {},
                // already revoked or expired
                Err(e) if e.is_rejection() => {},
                Err(e) => tracing::warn!(error = %e, "remote sign-out failed, clearing cookies anyway"),
            },
            Err(e) => tracing::warn!(error = %e, "remote sign-out failed, clearing cookies anyway"),
        }
        Ok(removals)
    }
}

/// Map non-2xx responses to [`AuthError::Status`]
async fn check(response: Response) -> Result<Response, AuthError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|b| b.msg.or(b.message).or(b.error_description).or(b.error))
        .unwrap_or(text);
    Err(AuthError::Status {
        status: status.as_u16(),
        message,
    })
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
