// ============================
// kabuport-backend-lib/src/lib.rs
// ============================
//! Core backend-lib functionality for the `kabuport` edge server: the request
//! gate, the auth and data service clients, and the HTTP handlers behind them.

pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod validation;

use std::sync::Arc;

use crate::auth::{AuthService, SupabaseAuth};
use crate::config::Settings;
use crate::data::DataClients;
use crate::error::AppError;
use crate::routes::RouteTable;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Settings the process started with
    pub settings: Arc<Settings>,
    /// Gate route policy
    pub routes: Arc<RouteTable>,
    /// Authentication service
    pub auth: Arc<dyn AuthService>,
    /// Data service handles
    pub data: Arc<DataClients>,
}

impl AppState {
    /// Create a new application state talking to the configured backend
    pub fn new(settings: Settings) -> Result<Self, AppError> {
        let http = http_client(&settings)?;
        let auth = Arc::new(SupabaseAuth::new(http.clone(), &settings.supabase));
        Ok(Self::assemble(settings, auth, http))
    }

    /// Create a new application state with a custom auth service
    pub fn with_auth(settings: Settings, auth: Arc<dyn AuthService>) -> Result<Self, AppError> {
        let http = http_client(&settings)?;
        Ok(Self::assemble(settings, auth, http))
    }

    /// Create a new application state from the default configuration sources
    pub fn new_default() -> anyhow::Result<Self> {
        let settings = Settings::load()?;
        Self::new(settings).map_err(|e| anyhow::anyhow!("{}", e))
    }

    fn assemble(settings: Settings, auth: Arc<dyn AuthService>, http: reqwest::Client) -> Self {
        let routes = Arc::new(RouteTable::from_settings(&settings.gate));
        let data = Arc::new(DataClients::new(http, settings.supabase.clone()));
        Self {
            settings: Arc::new(settings),
            routes,
            auth,
            data,
        }
    }
}

fn http_client(settings: &Settings) -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .timeout(settings.supabase.request_timeout())
        .user_agent(concat!("kabuport/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {e}")))
}
