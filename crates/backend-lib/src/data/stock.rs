//! Public market data for the stock detail view.
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use kabuport_common::{EarningsEvent, FinancialData, StockDetail, StockMaster, StockPrice};

use super::{DataError, PostgrestClient};

const SCHEMA: &str = "jquants_core";
/// Daily bars shown on the chart
pub const PRICE_HISTORY_LIMIT: usize = 250;
const EARNINGS_LIMIT: usize = 5;
const JST_OFFSET_SECS: i32 = 9 * 3600;

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

pub async fn stock_master(db: &PostgrestClient, code: &str) -> Result<Option<StockMaster>, DataError> {
    let rows: Vec<StockMaster> = db
        .select(
            SCHEMA,
            "equity_master",
            &[
                ("select", "local_code,company_name,sector17_name,market_segment".to_string()),
                ("local_code", eq(code)),
                ("is_current", eq("true")),
                ("limit", "1".to_string()),
            ],
        )
        .await?;
    Ok(rows.into_iter().next())
}

/// Most recent bars, returned oldest first
pub async fn stock_prices(
    db: &PostgrestClient,
    code: &str,
    limit: usize,
) -> Result<Vec<StockPrice>, DataError> {
    let mut rows: Vec<StockPrice> = db
        .select(
            SCHEMA,
            "equity_bar_daily",
            &[
                ("select", "trade_date,open,high,low,close,adj_close,volume".to_string()),
                ("local_code", eq(code)),
                ("order", "trade_date.desc".to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await?;
    rows.reverse();
    Ok(rows)
}

pub async fn latest_financials(db: &PostgrestClient, code: &str) -> Result<Option<FinancialData>, DataError> {
    let rows: Vec<FinancialData> = db
        .select(
            SCHEMA,
            "financial_disclosure",
            &[
                ("select", "per,pbr,roe,dividend_yield".to_string()),
                ("local_code", eq(code)),
                ("order", "disclosure_date.desc".to_string()),
                ("limit", "1".to_string()),
            ],
        )
        .await?;
    Ok(rows.into_iter().next())
}

/// Announcements on or after `from`, earliest first
pub async fn earnings_schedule(
    db: &PostgrestClient,
    code: &str,
    from: NaiveDate,
) -> Result<Vec<EarningsEvent>, DataError> {
    db.select(
        SCHEMA,
        "earnings_calendar",
        &[
            ("select", "local_code,announcement_date,fiscal_year_end".to_string()),
            ("local_code", eq(code)),
            ("announcement_date", format!("gte.{}", from.format("%Y-%m-%d"))),
            ("order", "announcement_date.asc".to_string()),
            ("limit", EARNINGS_LIMIT.to_string()),
        ],
    )
    .await
}

/// Today's date on the Tokyo exchange calendar
pub fn tokyo_today() -> NaiveDate {
    tokyo_date(Utc::now())
}

/// Calendar date in Japan Standard Time at `instant`
pub fn tokyo_date(instant: DateTime<Utc>) -> NaiveDate {
    match FixedOffset::east_opt(JST_OFFSET_SECS) {
        Some(jst) => instant.with_timezone(&jst).date_naive(),
        None => instant.date_naive(),
    }
}

/// Everything for `/stocks/{code}`; `None` when the code is not listed
pub async fn stock_detail(db: &PostgrestClient, code: &str) -> Result<Option<StockDetail>, DataError> {
    let (master, prices, financials, earnings) = tokio::try_join!(
        stock_master(db, code),
        stock_prices(db, code, PRICE_HISTORY_LIMIT),
        latest_financials(db, code),
        earnings_schedule(db, code, tokyo_today()),
    )?;

    Ok(master.map(|master| StockDetail {
        master,
        prices,
        financials,
        earnings,
    }))
}
