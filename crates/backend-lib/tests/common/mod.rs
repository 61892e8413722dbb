//! Test utilities: an in-process stand-in for the auth + REST backend.
//!
//! The stub speaks just enough of the GoTrue and PostgREST wire formats for
//! the clients under test. It listens on an ephemeral port; keep the returned
//! handle alive for the duration of the test.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use kabuport_backend_lib::auth::session::encode_session;
use kabuport_backend_lib::auth::StoredSession;
use kabuport_backend_lib::config::Settings;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const ANON_KEY: &str = "anon-key";
pub const VALID_ACCESS: &str = "valid-access";
pub const FRESH_ACCESS: &str = "fresh-access";
pub const GOOD_REFRESH: &str = "good-refresh";
pub const USER_ID: &str = "7f1c2a9e-3b4d-4e5f-8a6b-0c1d2e3f4a5b";
pub const PORTFOLIO_ID: &str = "0b6f3c1e-9a2d-4c7b-8e5f-1a2b3c4d5e6f";
pub const EMAIL: &str = "investor@example.jp";
pub const PASSWORD: &str = "correct horse";
/// Name the stub treats as already taken
pub const TAKEN_PORTFOLIO_NAME: &str = "Main";
pub const TRANSACTION_ID: i64 = 42;

/// `METHOD table` for every write the stub accepted
pub type WriteLog = Arc<Mutex<Vec<String>>>;

/// Running stub backend
pub struct StubBackend {
    pub addr: SocketAddr,
    writes: WriteLog,
    handle: JoinHandle<()>,
}

impl Drop for StubBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl StubBackend {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let writes = WriteLog::default();
        let app = router(writes.clone());
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, writes, handle }
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Settings pointing both clients at this stub
    pub fn settings(&self) -> Settings {
        let mut settings = Settings::default();
        settings.supabase.url = self.url();
        settings.supabase.anon_key = ANON_KEY.to_string();
        settings.supabase.project_ref = Some("test".to_string());
        settings.supabase.request_timeout_ms = 2_000;
        settings.gate.verify_timeout_ms = 2_000;
        settings
    }
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn stored_session(access: &str, refresh: &str, expires_at: i64) -> StoredSession {
    StoredSession {
        access_token: access.to_string(),
        refresh_token: refresh.to_string(),
        token_type: "bearer".to_string(),
        expires_in: Some(3600),
        expires_at: Some(expires_at),
        user: Some(user_json()),
    }
}

/// `Cookie` header value carrying `session` in the unchunked layout
pub fn cookie_header(session: &StoredSession) -> String {
    format!("sb-test-auth-token={}", encode_session(session).unwrap())
}

fn user_json() -> Value {
    json!({
        "id": USER_ID,
        "aud": "authenticated",
        "role": "authenticated",
        "email": EMAIL,
    })
}

fn session_json(access: &str) -> Value {
    json!({
        "access_token": access,
        "token_type": "bearer",
        "expires_in": 3600,
        "expires_at": now() + 3600,
        "refresh_token": "rotated-refresh",
        "user": user_json(),
    })
}

fn portfolio_json() -> Value {
    json!({
        "id": PORTFOLIO_ID,
        "name": TAKEN_PORTFOLIO_NAME,
        "account_type": "specific",
        "description": null,
    })
}

fn transaction_json() -> Value {
    json!({
        "id": TRANSACTION_ID,
        "trade_date": "2024-06-03",
        "local_code": "72030",
        "trade_type": "buy",
        "quantity": 100,
        "unit_price": 3000.0,
        "commission": 0,
        "portfolios": { "name": TAKEN_PORTFOLIO_NAME },
    })
}

fn router(writes: WriteLog) -> Router {
    Router::new()
        .route("/auth/v1/token", post(token))
        .route("/auth/v1/user", get(user))
        .route("/auth/v1/logout", post(logout))
        .route("/auth/v1/signup", post(signup))
        .route("/auth/v1/recover", post(recover))
        .route("/rest/v1/rpc/{function}", post(rpc))
        .route(
            "/rest/v1/{table}",
            get(select).post(insert).patch(modify).delete(remove),
        )
        .with_state(writes)
}

fn has_apikey(headers: &HeaderMap) -> bool {
    headers.get("apikey").and_then(|v| v.to_str().ok()) == Some(ANON_KEY)
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn error(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

async fn token(
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    if !has_apikey(&headers) {
        return error(StatusCode::UNAUTHORIZED, json!({ "message": "No API key found" }));
    }
    match query.get("grant_type").map(String::as_str) {
        Some("refresh_token") if body["refresh_token"] == GOOD_REFRESH => {
            Json(session_json(FRESH_ACCESS)).into_response()
        },
        Some("password") if body["email"] == EMAIL && body["password"] == PASSWORD => {
            Json(session_json(VALID_ACCESS)).into_response()
        },
        _ => error(
            StatusCode::BAD_REQUEST,
            json!({ "error": "invalid_grant", "error_description": "Invalid Refresh Token" }),
        ),
    }
}

async fn user(headers: HeaderMap) -> Response {
    match bearer(&headers) {
        Some(VALID_ACCESS | FRESH_ACCESS) if has_apikey(&headers) => Json(user_json()).into_response(),
        _ => error(StatusCode::UNAUTHORIZED, json!({ "msg": "invalid JWT" })),
    }
}

async fn logout() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn signup(Json(body): Json<Value>) -> Response {
    if body["email"] == EMAIL {
        return error(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "msg": "User already registered" }),
        );
    }
    Json(user_json()).into_response()
}

async fn recover(Query(query): Query<HashMap<String, String>>) -> Response {
    if query.get("redirect_to").is_some_and(|r| r.ends_with("/auth/callback")) {
        Json(json!({})).into_response()
    } else {
        error(StatusCode::BAD_REQUEST, json!({ "msg": "missing redirect" }))
    }
}

async fn select(
    Path(table): Path<String>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !has_apikey(&headers) {
        return error(StatusCode::UNAUTHORIZED, json!({ "message": "No API key found" }));
    }
    let code = query.get("local_code").map(String::as_str);
    let rows = match (table.as_str(), code) {
        ("equity_master", Some("eq.7203" | "eq.72030")) => json!([{
            "local_code": "7203",
            "company_name": "トヨタ自動車",
            "sector17_name": "自動車・輸送機",
            "market_segment": "プライム"
        }]),
        ("equity_bar_daily", Some("eq.7203")) => json!([
            { "trade_date": "2024-06-04", "open": 3300.0, "high": 3350.0, "low": 3290.0,
              "close": 3340.0, "adj_close": 3340.0, "volume": 21000000 },
            { "trade_date": "2024-06-03", "open": 3250.0, "high": 3310.0, "low": 3240.0,
              "close": 3300.0, "adj_close": 3300.0, "volume": 18000000 }
        ]),
        ("financial_disclosure", Some("eq.7203")) => json!([
            { "per": 9.8, "pbr": 1.3, "roe": 13.1, "dividend_yield": 2.4 }
        ]),
        ("user_settings", _) if bearer(&headers) == Some(VALID_ACCESS) => json!([
            { "default_portfolio_id": PORTFOLIO_ID }
        ]),
        ("portfolios", _) if bearer(&headers) == Some(VALID_ACCESS) => {
            match query.get("id").map(String::as_str) {
                None => json!([portfolio_json()]),
                Some(id) if id == format!("eq.{PORTFOLIO_ID}") => json!([portfolio_json()]),
                Some(_) => json!([]),
            }
        },
        ("transactions", _) if bearer(&headers) == Some(VALID_ACCESS) => {
            json!([transaction_json()])
        },
        _ => json!([]),
    };
    Json(rows).into_response()
}

async fn rpc(Path(function): Path<String>, headers: HeaderMap, Json(args): Json<Value>) -> Response {
    if headers.get("content-profile").and_then(|v| v.to_str().ok()) != Some("portfolio") {
        return error(StatusCode::NOT_ACCEPTABLE, json!({ "message": "wrong schema" }));
    }
    if args["p_portfolio_id"] != PORTFOLIO_ID {
        return Json(json!([])).into_response();
    }
    let rows = match function.as_str() {
        "fn_portfolio_summary" => json!([{
            "total_market_value": 334000.0, "total_cost": 300000.0,
            "unrealized_pnl": 34000.0, "unrealized_pnl_pct": 11.33,
            "daily_change": 4000.0, "daily_change_pct": 1.21
        }]),
        "fn_holdings_summary" => json!([{
            "local_code": "7203", "company_name": "トヨタ自動車",
            "sector17_name": "自動車・輸送機", "total_quantity": 100,
            "avg_cost": 3000.0, "latest_close": 3340.0,
            "unrealized_pnl": 34000.0, "unrealized_pnl_pct": 11.33
        }]),
        "fn_sector_allocation" => json!([{
            "sector17_name": "自動車・輸送機", "market_value": 334000.0, "allocation_pct": 100.0
        }]),
        _ => return error(StatusCode::NOT_FOUND, json!({ "message": "unknown function" })),
    };
    Json(rows).into_response()
}

/// Writes must come from the signed-in user against the portfolio schema
fn check_write(headers: &HeaderMap) -> Result<(), Response> {
    if !has_apikey(headers) || bearer(headers) != Some(VALID_ACCESS) {
        return Err(error(StatusCode::UNAUTHORIZED, json!({ "message": "JWT expired" })));
    }
    if headers.get("content-profile").and_then(|v| v.to_str().ok()) != Some("portfolio") {
        return Err(error(StatusCode::NOT_ACCEPTABLE, json!({ "message": "wrong schema" })));
    }
    Ok(())
}

/// Rows addressed by `id=eq.<id>&user_id=eq.<USER_ID>`
fn owned_row(table: &str, query: &HashMap<String, String>) -> Option<Value> {
    if query.get("user_id") != Some(&format!("eq.{USER_ID}")) {
        return None;
    }
    let id = query.get("id")?;
    match table {
        "portfolios" if *id == format!("eq.{PORTFOLIO_ID}") => Some(portfolio_json()),
        "transactions" if *id == format!("eq.{TRANSACTION_ID}") => Some(transaction_json()),
        _ => None,
    }
}

async fn insert(
    State(writes): State<WriteLog>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(row): Json<Value>,
) -> Response {
    if let Err(response) = check_write(&headers) {
        return response;
    }
    if row["user_id"] != USER_ID {
        return error(
            StatusCode::FORBIDDEN,
            json!({ "code": "42501", "message": "new row violates row-level security policy" }),
        );
    }
    match table.as_str() {
        "portfolios" if row["name"] == TAKEN_PORTFOLIO_NAME => {
            return error(
                StatusCode::CONFLICT,
                json!({
                    "code": "23505",
                    "message": "duplicate key value violates unique constraint \"portfolios_user_id_name_key\""
                }),
            );
        },
        "user_settings" => {
            let merges = headers
                .get("prefer")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|p| p.contains("resolution=merge-duplicates"));
            if !merges || query.get("on_conflict").map(String::as_str) != Some("user_id") {
                return error(StatusCode::CONFLICT, json!({ "code": "23505", "message": "duplicate" }));
            }
        },
        _ => {},
    }
    writes.lock().unwrap().push(format!("POST {table}"));
    StatusCode::CREATED.into_response()
}

async fn modify(
    State(writes): State<WriteLog>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(changes): Json<Value>,
) -> Response {
    if let Err(response) = check_write(&headers) {
        return response;
    }
    let Some(mut row) = owned_row(&table, &query) else {
        return Json(json!([])).into_response();
    };
    if let (Some(row), Some(changes)) = (row.as_object_mut(), changes.as_object()) {
        row.extend(changes.clone());
    }
    writes.lock().unwrap().push(format!("PATCH {table}"));
    Json(json!([row])).into_response()
}

async fn remove(
    State(writes): State<WriteLog>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if let Err(response) = check_write(&headers) {
        return response;
    }
    let Some(row) = owned_row(&table, &query) else {
        return Json(json!([])).into_response();
    };
    writes.lock().unwrap().push(format!("DELETE {table}"));
    Json(json!([row])).into_response()
}
