// ============================
// kabuport-backend-lib/src/data/mod.rs
// ============================
//! PostgREST-style data access.
//!
//! [`DataClients`] hands out two kinds of handle: one shared anonymous handle
//! built on first use, and cheap per-user handles that carry the caller's
//! access token so row-level security applies.

pub mod portfolio;
pub mod stock;
pub mod transaction;

use metrics::counter;
use once_cell::sync::OnceCell;
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::SupabaseSettings;
use crate::metrics::DATA_FAILURE;

/// Failures talking to the data service
#[derive(Error, Debug)]
pub enum DataError {
    #[error("data service is not configured")]
    NotConfigured,

    #[error("data service request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("data service returned {status}: {message}")]
    Status {
        status: u16,
        /// Postgres SQLSTATE, when the database raised the error
        code: Option<String>,
        message: String,
    },
}

impl DataError {
    /// A unique constraint rejected the write (SQLSTATE 23505)
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DataError::Status { code: Some(code), .. } if code == "23505")
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// Query client for one schema-qualified REST endpoint
#[derive(Clone, Debug)]
pub struct PostgrestClient {
    http: Client,
    rest_url: String,
    anon_key: String,
    bearer: String,
}

impl PostgrestClient {
    pub fn anonymous(http: Client, settings: &SupabaseSettings) -> Self {
        Self {
            http,
            rest_url: format!("{}/rest/v1", settings.url.trim_end_matches('/')),
            anon_key: settings.anon_key.clone(),
            bearer: settings.anon_key.clone(),
        }
    }

    /// Same endpoint, authorised as the holder of `access_token`
    pub fn with_token(&self, access_token: &str) -> Self {
        Self {
            bearer: access_token.to_string(),
            ..self.clone()
        }
    }

    fn ensure_configured(&self) -> Result<(), DataError> {
        if self.rest_url.starts_with('/') || self.anon_key.is_empty() {
            return Err(DataError::NotConfigured);
        }
        Ok(())
    }

    fn authorise(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.bearer)
    }

    /// `GET /rest/v1/<table>` with PostgREST filter/order/limit query pairs
    pub async fn select<T: DeserializeOwned>(
        &self,
        schema: &str,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, DataError> {
        self.ensure_configured()?;
        let response = self
            .authorise(self.http.get(format!("{}/{table}", self.rest_url)))
            .header("Accept-Profile", schema)
            .query(query)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// `POST /rest/v1/rpc/<function>`
    pub async fn rpc<T: DeserializeOwned>(
        &self,
        schema: &str,
        function: &str,
        args: &Value,
    ) -> Result<T, DataError> {
        self.ensure_configured()?;
        let response = self
            .authorise(self.http.post(format!("{}/rpc/{function}", self.rest_url)))
            .header("Content-Profile", schema)
            .json(args)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// `POST /rest/v1/<table>`; the inserted row is not returned
    pub async fn insert<B: Serialize + ?Sized>(
        &self,
        schema: &str,
        table: &str,
        row: &B,
    ) -> Result<(), DataError> {
        self.ensure_configured()?;
        let response = self
            .authorise(self.http.post(format!("{}/{table}", self.rest_url)))
            .header("Content-Profile", schema)
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await?;
        check(response).await.map(|_| ())
    }

    /// Insert, or merge into the row that conflicts on `on_conflict`
    pub async fn upsert<B: Serialize + ?Sized>(
        &self,
        schema: &str,
        table: &str,
        row: &B,
        on_conflict: &str,
    ) -> Result<(), DataError> {
        self.ensure_configured()?;
        let response = self
            .authorise(self.http.post(format!("{}/{table}", self.rest_url)))
            .header("Content-Profile", schema)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .query(&[("on_conflict", on_conflict)])
            .json(row)
            .send()
            .await?;
        check(response).await.map(|_| ())
    }

    /// `PATCH /rest/v1/<table>` filtered by `filters`; returns the rows changed
    pub async fn update<B: Serialize + ?Sized>(
        &self,
        schema: &str,
        table: &str,
        filters: &[(&str, String)],
        changes: &B,
    ) -> Result<usize, DataError> {
        self.ensure_configured()?;
        let response = self
            .authorise(self.http.patch(format!("{}/{table}", self.rest_url)))
            .header("Content-Profile", schema)
            .header("Prefer", "return=representation")
            .query(filters)
            .json(changes)
            .send()
            .await?;
        let rows: Vec<Value> = check(response).await?.json().await?;
        Ok(rows.len())
    }

    /// `DELETE /rest/v1/<table>` filtered by `filters`; returns the rows removed
    pub async fn delete(
        &self,
        schema: &str,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<usize, DataError> {
        self.ensure_configured()?;
        let response = self
            .authorise(self.http.delete(format!("{}/{table}", self.rest_url)))
            .header("Content-Profile", schema)
            .header("Prefer", "return=representation")
            .query(filters)
            .send()
            .await?;
        let rows: Vec<Value> = check(response).await?.json().await?;
        Ok(rows.len())
    }
}

/// Factory for data handles, shared process-wide through `AppState`
#[derive(Debug)]
pub struct DataClients {
    http: Client,
    settings: SupabaseSettings,
    anon: OnceCell<PostgrestClient>,
}

impl DataClients {
    pub fn new(http: Client, settings: SupabaseSettings) -> Self {
        Self {
            http,
            settings,
            anon: OnceCell::new(),
        }
    }

    /// Shared anonymous handle, constructed on first use
    pub fn anon(&self) -> &PostgrestClient {
        self.anon.get_or_init(|| {
            tracing::debug!("initialising anonymous data client");
            PostgrestClient::anonymous(self.http.clone(), &self.settings)
        })
    }

    /// Handle scoped to a signed-in user
    pub fn for_user(&self, access_token: &str) -> PostgrestClient {
        self.anon().with_token(access_token)
    }
}

async fn check(response: Response) -> Result<Response, DataError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    counter!(DATA_FAILURE).increment(1);
    let body = serde_json::from_str::<ErrorBody>(&text).ok();
    let (code, message) = match body {
        Some(body) => (body.code, body.message.unwrap_or(text)),
        None => (None, text),
    };
    Err(DataError::Status {
        status: status.as_u16(),
        code,
        message,
    })
}
