// ============================
// kabuport-backend-lib/src/auth/session.rs
// ============================
//! Session cookie codec.
//!
//! The session is a JSON document stored as `base64-<base64url(json)>` in the
//! `sb-<ref>-auth-token` cookie. Values longer than [`MAX_CHUNK_SIZE`] are
//! split over `<name>.0`, `<name>.1`, ... cookies.
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};

/// Largest value written into a single cookie
pub const MAX_CHUNK_SIZE: usize = 3180;

const BASE64_PREFIX: &str = "base64-";
// Browsers cap cookie lifetime at 400 days
const COOKIE_MAX_AGE_DAYS: i64 = 400;

/// Token pair plus metadata as issued by the auth service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    /// Unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<serde_json::Value>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl StoredSession {
    /// Fill `expires_at` from `expires_in` when the issuer omitted it
    pub fn with_issue_time(mut self, now: i64) -> Self {
        if self.expires_at.is_none() {
            self.expires_at = self.expires_in.map(|secs| now.saturating_add(secs));
        }
        self
    }

    /// True when the access token expires within `margin_secs` of `now`
    pub fn expires_within(&self, now: i64, margin_secs: i64) -> bool {
        // the value comes from a client cookie, so it may be anything
        self.expires_at.is_some_and(|at| at.saturating_sub(now) <= margin_secs)
    }
}

/// Serialize a session into its cookie value
pub fn encode_session(session: &StoredSession) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(session)?;
    Ok(format!("{BASE64_PREFIX}{}", URL_SAFE_NO_PAD.encode(json)))
}

/// Parse a cookie value; `None` for anything malformed
pub fn decode_session(value: &str) -> Option<StoredSession> {
    match value.strip_prefix(BASE64_PREFIX) {
        Some(encoded) => {
            let bytes = URL_SAFE_NO_PAD.decode(encoded.trim_end_matches('=')).ok()?;
            serde_json::from_slice(&bytes).ok()
        },
        None => serde_json::from_str(value).ok(),
    }
}

/// Read the session from either the single or the chunked cookie form
pub fn read_session(jar: &CookieJar, name: &str) -> Option<StoredSession> {
    if let Some(cookie) = jar.get(name) {
        return decode_session(cookie.value());
    }

    let mut value = String::new();
    let mut index = 0;
    while let Some(chunk) = jar.get(&chunk_name(name, index)) {
        value.push_str(chunk.value());
        index += 1;
    }
    if index == 0 {
        return None;
    }
    decode_session(&value)
}

/// Cookies that store `session`, plus removals for whatever layout they replace
pub fn write_session(
    jar: &CookieJar,
    name: &str,
    session: &StoredSession,
) -> Result<Vec<Cookie<'static>>, serde_json::Error> {
    let value = encode_session(session)?;
    let chunks = split_chunks(&value);
    let mut cookies = Vec::with_capacity(chunks.len() + 1);

    if chunks.len() == 1 {
        cookies.push(session_cookie(name.to_string(), value));
        cookies.extend(existing_chunks(jar, name).into_iter().map(removal_cookie));
    } else {
        for (i, chunk) in chunks.iter().enumerate() {
            cookies.push(session_cookie(chunk_name(name, i), (*chunk).to_string()));
        }
        if jar.get(name).is_some() {
            cookies.push(removal_cookie(name.to_string()));
        }
        cookies.extend(
            existing_chunks(jar, name)
                .into_iter()
                .filter(|n| chunk_index(name, n).is_some_and(|i| i >= chunks.len()))
                .map(removal_cookie),
        );
    }
    Ok(cookies)
}

/// Removal cookies for every part of the session present in `jar`
pub fn clear_session(jar: &CookieJar, name: &str) -> Vec<Cookie<'static>> {
    let mut cookies = Vec::new();
    if jar.get(name).is_some() {
        cookies.push(removal_cookie(name.to_string()));
    }
    cookies.extend(existing_chunks(jar, name).into_iter().map(removal_cookie));
    cookies
}

/// A removal cookie carries an empty value
pub fn is_removal(cookie: &Cookie<'_>) -> bool {
    cookie.value().is_empty()
}

fn session_cookie(name: String, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .same_site(SameSite::Lax)
        .max_age(cookie::time::Duration::days(COOKIE_MAX_AGE_DAYS))
        .build()
}

fn removal_cookie(name: String) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .same_site(SameSite::Lax)
        .removal()
        .build()
}

fn chunk_name(name: &str, index: usize) -> String {
    format!("{name}.{index}")
}

fn chunk_index(name: &str, candidate: &str) -> Option<usize> {
    candidate
        .strip_prefix(name)?
        .strip_prefix('.')?
        .parse()
        .ok()
}

/// Chunk cookie names present in `jar`, in index order
fn existing_chunks(jar: &CookieJar, name: &str) -> Vec<String> {
    let mut chunks: Vec<(usize, String)> = jar
        .iter()
        .filter_map(|c| chunk_index(name, c.name()).map(|i| (i, c.name().to_string())))
        .collect();
    chunks.sort_by_key(|(index, _)| *index);
    chunks.into_iter().map(|(_, name)| name).collect()
}

fn split_chunks(value: &str) -> Vec<&str> {
    // base64url output is ASCII, so byte offsets are char boundaries
    value
        .as_bytes()
        .chunks(MAX_CHUNK_SIZE)
        .map(|c| std::str::from_utf8(c).unwrap_or_default())
        .collect()
}
