// ================
// common/src/lib.rs
// ================
//! Common types shared between the `kabuport` edge server and its clients.
//! This module defines the identity, market-data and portfolio payloads
//! exchanged with the managed auth and data services.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a signed-in user as reported by the auth service
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    /// Auth service user id
    pub id: Uuid,
    /// Primary email address, when the account has one
    #[serde(default)]
    pub email: Option<String>,
}

/// Result of a form submission
///
/// Exactly one of `error` and `success` is set by the server.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<String>,
}

impl ActionState {
    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            error: Some(msg.into()),
            success: None,
        }
    }

    pub fn success(msg: impl Into<String>) -> Self {
        Self {
            error: None,
            success: Some(msg.into()),
        }
    }
}

/// Listed equity master record
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StockMaster {
    /// Exchange local code (e.g. "7203")
    pub local_code: String,
    pub company_name: String,
    pub sector17_name: Option<String>,
    pub market_segment: Option<String>,
}

/// One daily OHLCV bar
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StockPrice {
    /// ISO date (`YYYY-MM-DD`)
    pub trade_date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
    pub volume: f64,
}

/// Latest disclosed valuation ratios
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FinancialData {
    pub per: Option<f64>,
    pub pbr: Option<f64>,
    pub roe: Option<f64>,
    pub dividend_yield: Option<f64>,
}

/// Scheduled earnings announcement
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EarningsEvent {
    pub local_code: String,
    pub announcement_date: String,
    pub fiscal_year_end: Option<String>,
}

/// Everything the public stock detail view shows
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StockDetail {
    pub master: StockMaster,
    /// Daily bars, oldest first
    pub prices: Vec<StockPrice>,
    pub financials: Option<FinancialData>,
    pub earnings: Vec<EarningsEvent>,
}

/// Portfolio totals computed by `fn_portfolio_summary`
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PortfolioSummary {
    pub total_market_value: Option<f64>,
    pub total_cost: Option<f64>,
    pub unrealized_pnl: Option<f64>,
    pub unrealized_pnl_pct: Option<f64>,
    pub daily_change: Option<f64>,
    pub daily_change_pct: Option<f64>,
}

/// One row of `fn_holdings_summary`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HoldingItem {
    pub local_code: String,
    pub company_name: Option<String>,
    pub sector17_name: Option<String>,
    pub total_quantity: Option<f64>,
    pub avg_cost: Option<f64>,
    pub latest_close: Option<f64>,
    pub unrealized_pnl: Option<f64>,
    pub unrealized_pnl_pct: Option<f64>,
}

/// One row of `fn_sector_allocation`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SectorAllocation {
    pub sector17_name: String,
    pub market_value: f64,
    pub allocation_pct: f64,
}

/// Dashboard payload for the signed-in user
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub user: AuthUser,
    /// `None` when the user has no portfolio yet
    pub portfolio_id: Option<Uuid>,
    pub summary: Option<PortfolioSummary>,
    pub holdings: Vec<HoldingItem>,
    pub allocation: Vec<SectorAllocation>,
}

/// Brokerage account a portfolio is held in
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    /// NISA growth allowance
    NisaGrowth,
    /// NISA regular-saving allowance
    NisaSaving,
    /// Specified (tax-withholding) account
    Specific,
    General,
}

impl AccountType {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountType::NisaGrowth => "nisa_growth",
            AccountType::NisaSaving => "nisa_saving",
            AccountType::Specific => "specific",
            AccountType::General => "general",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "nisa_growth" => Some(AccountType::NisaGrowth),
            "nisa_saving" => Some(AccountType::NisaSaving),
            "specific" => Some(AccountType::Specific),
            "general" => Some(AccountType::General),
            _ => None,
        }
    }
}

/// A named group of holdings owned by one user
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub account_type: Option<AccountType>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeType {
    Buy,
    Sell,
}

impl TradeType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "buy" => Some(TradeType::Buy),
            "sell" => Some(TradeType::Sell),
            _ => None,
        }
    }
}

/// Portfolio name embedded in a transaction listing
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PortfolioRef {
    pub name: String,
}

/// One recorded trade
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub id: i64,
    /// ISO date (`YYYY-MM-DD`)
    pub trade_date: String,
    pub local_code: String,
    pub trade_type: TradeType,
    pub quantity: i64,
    pub unit_price: f64,
    #[serde(default)]
    pub commission: Option<f64>,
    /// Owning portfolio, when the listing embeds it
    #[serde(default, rename = "portfolios", skip_serializing_if = "Option::is_none")]
    pub portfolio: Option<PortfolioRef>,
}

/// Portfolio page: the portfolio and its most recent trades
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PortfolioDetail {
    pub portfolio: Portfolio,
    pub recent_transactions: Vec<TransactionRecord>,
}
