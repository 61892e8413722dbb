// ============================
// kabuport-backend-lib/src/config.rs
// ============================
//! Configuration management.
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Environment variable prefix; `__` separates nested keys
pub const ENV_PREFIX: &str = "KABUPORT_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Listener and logging
    pub server: ServerSettings,
    /// Managed auth + data backend
    pub supabase: SupabaseSettings,
    /// Request gate routing policy
    pub gate: GateSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Log level used when `RUST_LOG` is unset
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupabaseSettings {
    /// Project base URL, e.g. `https://abcd.supabase.co`
    pub url: String,
    /// Public anon key sent as `apikey` on every call
    pub anon_key: String,
    /// Project ref used in the session cookie name; derived from `url` when unset
    pub project_ref: Option<String>,
    /// Public site URL, used for email redirect links
    pub site_url: String,
    /// Per-request HTTP timeout
    pub request_timeout_ms: u64,
    /// Sessions expiring within this window are refreshed eagerly
    pub refresh_margin_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    /// Paths that are public on exact match
    pub public_exact: Vec<String>,
    /// Path prefixes whose sub-paths are public
    pub public_prefixes: Vec<String>,
    /// Maximum number of segments allowed after a public prefix (unlimited when unset)
    pub public_prefix_max_segments: Option<usize>,
    /// Immutable asset prefixes that bypass the gate
    pub static_prefixes: Vec<String>,
    /// Immutable asset paths that bypass the gate
    pub static_exact: Vec<String>,
    /// Pre-authentication entry paths; signed-in users are sent home from these
    pub preauth_paths: Vec<String>,
    pub login_path: String,
    pub home_path: String,
    /// Upper bound on one session verification
    pub verify_timeout_ms: u64,
    /// Honour `X-Forwarded-Proto` / `X-Forwarded-Host` when building redirects
    pub trust_forwarded_headers: bool,
    /// Scheme used for redirects when no trusted forwarded header says otherwise
    pub default_scheme: String,
}

/// Configuration validation errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("path {0:?} must start with '/'")]
    InvalidPath(String),

    #[error("invalid supabase url: {0}")]
    InvalidUrl(String),

    #[error("supabase.anon_key is required when supabase.url is set")]
    MissingAnonKey,

    #[error("unsupported scheme: {0}")]
    InvalidScheme(String),
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            log_level: "info".to_string(),
        }
    }
}

impl Default for SupabaseSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: String::new(),
            project_ref: None,
            site_url: "http://localhost:3000".to_string(),
            request_timeout_ms: 5_000,
            refresh_margin_secs: 60,
        }
    }
}

impl Default for GateSettings {
    fn default() -> Self {
        let paths = |items: &[&str]| items.iter().map(|s| (*s).to_string()).collect();
        Self {
            public_exact: paths(&["/login", "/signup", "/reset-password", "/auth/callback", "/"]),
            public_prefixes: paths(&["/stocks/"]),
            public_prefix_max_segments: None,
            static_prefixes: paths(&["/_next/static", "/_next/image"]),
            static_exact: paths(&["/favicon.ico"]),
            preauth_paths: paths(&["/login", "/signup"]),
            login_path: "/login".to_string(),
            home_path: "/dashboard".to_string(),
            verify_timeout_ms: 3_000,
            trust_forwarded_headers: false,
            default_scheme: "http".to_string(),
        }
    }
}

impl Settings {
    /// Default layering: built-in defaults, then `config.{toml,yaml,json}`, then env
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"))
            .merge(Yaml::file("config.yaml"))
            .merge(Json::file("config.json"))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and validate settings from the working directory and environment
    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment())
    }

    /// Load settings from an explicit file; the environment still overrides it
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let base = Figment::from(Serialized::defaults(Settings::default()));
        let figment = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => base.merge(Yaml::file(path)),
            Some("json") => base.merge(Json::file(path)),
            _ => base.merge(Toml::file(path)),
        };
        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let settings: Settings = figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.server.log_level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.server.log_level.clone()));
        }
        if self.supabase.request_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration("supabase.request_timeout_ms"));
        }
        if self.gate.verify_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration("gate.verify_timeout_ms"));
        }
        if !self.supabase.url.is_empty() {
            self.supabase.base_url()?;
            if self.supabase.anon_key.is_empty() {
                return Err(ConfigError::MissingAnonKey);
            }
        }
        if !matches!(self.gate.default_scheme.as_str(), "http" | "https") {
            return Err(ConfigError::InvalidScheme(self.gate.default_scheme.clone()));
        }

        let gate = &self.gate;
        let all_paths = gate
            .public_exact
            .iter()
            .chain(&gate.public_prefixes)
            .chain(&gate.static_prefixes)
            .chain(&gate.static_exact)
            .chain(&gate.preauth_paths)
            .chain([&gate.login_path, &gate.home_path]);
        for path in all_paths {
            if !path.starts_with('/') {
                return Err(ConfigError::InvalidPath(path.clone()));
            }
        }
        Ok(())
    }
}

impl SupabaseSettings {
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.url).map_err(|e| ConfigError::InvalidUrl(format!("{}: {e}", self.url)))
    }

    /// Project ref, falling back to the first label of the url host
    pub fn project_ref(&self) -> String {
        if let Some(r) = &self.project_ref {
            return r.clone();
        }
        self.base_url()
            .ok()
            .and_then(|u| u.host_str().map(|h| h.split('.').next().unwrap_or(h).to_string()))
            .unwrap_or_else(|| "local".to_string())
    }

    /// Name of the (possibly chunked) session cookie
    pub fn session_cookie_name(&self) -> String {
        format!("sb-{}-auth-token", self.project_ref())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }
}

impl GateSettings {
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }
}
