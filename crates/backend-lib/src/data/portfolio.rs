//! User-scoped portfolio queries and writes. Aggregation happens in the
//! database procedures; this module only picks the portfolio and collects
//! results.
use kabuport_common::{
    AuthUser, Dashboard, HoldingItem, Portfolio, PortfolioDetail, PortfolioSummary,
    SectorAllocation,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::transaction::recent_for_portfolio;
use super::{DataError, PostgrestClient};
use crate::validation::PortfolioInput;

pub(crate) const SCHEMA: &str = "portfolio";
const PORTFOLIO_COLUMNS: &str = "id,name,account_type,description";

#[derive(Serialize)]
struct OwnedPortfolio<'a> {
    user_id: Uuid,
    #[serde(flatten)]
    input: &'a PortfolioInput,
}

#[derive(Deserialize)]
struct UserSettingsRow {
    default_portfolio_id: Option<Uuid>,
}

#[derive(Deserialize)]
struct PortfolioRow {
    id: Uuid,
}

/// The user's configured default portfolio, else their oldest one
pub async fn default_portfolio_id(
    db: &PostgrestClient,
    user_id: Uuid,
) -> Result<Option<Uuid>, DataError> {
    let settings: Vec<UserSettingsRow> = db
        .select(
            SCHEMA,
            "user_settings",
            &[
                ("select", "default_portfolio_id".to_string()),
                ("user_id", format!("eq.{user_id}")),
                ("limit", "1".to_string()),
            ],
        )
        .await?;
    if let Some(id) = settings.into_iter().next().and_then(|s| s.default_portfolio_id) {
        return Ok(Some(id));
    }

    let portfolios: Vec<PortfolioRow> = db
        .select(
            SCHEMA,
            "portfolios",
            &[
                ("select", "id".to_string()),
                ("user_id", format!("eq.{user_id}")),
                ("order", "created_at.asc".to_string()),
                ("limit", "1".to_string()),
            ],
        )
        .await?;
    Ok(portfolios.into_iter().next().map(|p| p.id))
}

pub async fn portfolio_summary(
    db: &PostgrestClient,
    portfolio_id: Uuid,
) -> Result<Option<PortfolioSummary>, DataError> {
    let rows: Option<Vec<PortfolioSummary>> = db
        .rpc(SCHEMA, "fn_portfolio_summary", &json!({ "p_portfolio_id": portfolio_id }))
        .await?;
    Ok(rows.unwrap_or_default().into_iter().next())
}

pub async fn holdings_summary(
    db: &PostgrestClient,
    portfolio_id: Uuid,
) -> Result<Vec<HoldingItem>, DataError> {
    let rows: Option<Vec<HoldingItem>> = db
        .rpc(SCHEMA, "fn_holdings_summary", &json!({ "p_portfolio_id": portfolio_id }))
        .await?;
    Ok(rows.unwrap_or_default())
}

pub async fn sector_allocation(
    db: &PostgrestClient,
    portfolio_id: Uuid,
) -> Result<Vec<SectorAllocation>, DataError> {
    let rows: Option<Vec<SectorAllocation>> = db
        .rpc(SCHEMA, "fn_sector_allocation", &json!({ "p_portfolio_id": portfolio_id }))
        .await?;
    Ok(rows.unwrap_or_default())
}

/// Dashboard for `user`; `requested` overrides the default portfolio
pub async fn dashboard(
    db: &PostgrestClient,
    user: &AuthUser,
    requested: Option<Uuid>,
) -> Result<Dashboard, DataError> {
    let portfolio_id = match requested {
        Some(id) => Some(id),
        None => default_portfolio_id(db, user.id).await?,
    };

    let Some(id) = portfolio_id else {
        return Ok(Dashboard {
            user: user.clone(),
            portfolio_id: None,
            summary: None,
            holdings: Vec::new(),
            allocation: Vec::new(),
        });
    };

    let (summary, holdings, allocation) = tokio::try_join!(
        portfolio_summary(db, id),
        holdings_summary(db, id),
        sector_allocation(db, id),
    )?;

    Ok(Dashboard {
        user: user.clone(),
        portfolio_id: Some(id),
        summary,
        holdings,
        allocation,
    })
}

/// The user's portfolios, oldest first
pub async fn list_portfolios(db: &PostgrestClient, user_id: Uuid) -> Result<Vec<Portfolio>, DataError> {
    db.select(
        SCHEMA,
        "portfolios",
        &[
            ("select", PORTFOLIO_COLUMNS.to_string()),
            ("user_id", format!("eq.{user_id}")),
            ("order", "created_at.asc".to_string()),
        ],
    )
    .await
}

/// One portfolio with its latest trades; `None` when it is not the user's
pub async fn portfolio_detail(
    db: &PostgrestClient,
    user_id: Uuid,
    portfolio_id: Uuid,
) -> Result<Option<PortfolioDetail>, DataError> {
    let portfolio = async {
        let rows: Vec<Portfolio> = db
            .select(
                SCHEMA,
                "portfolios",
                &[
                    ("select", PORTFOLIO_COLUMNS.to_string()),
                    ("id", format!("eq.{portfolio_id}")),
                    ("user_id", format!("eq.{user_id}")),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok::<_, DataError>(rows.into_iter().next())
    };
    let (portfolio, recent_transactions) =
        tokio::try_join!(portfolio, recent_for_portfolio(db, portfolio_id))?;

    Ok(portfolio.map(|portfolio| PortfolioDetail {
        portfolio,
        recent_transactions,
    }))
}

/// Create a portfolio and make sure the user has a settings row
pub async fn create_portfolio(
    db: &PostgrestClient,
    user_id: Uuid,
    input: &PortfolioInput,
) -> Result<(), DataError> {
    db.insert(SCHEMA, "portfolios", &OwnedPortfolio { user_id, input })
        .await?;
    db.upsert(SCHEMA, "user_settings", &json!({ "user_id": user_id }), "user_id")
        .await
}

/// Returns false when no portfolio of this user has `portfolio_id`
pub async fn update_portfolio(
    db: &PostgrestClient,
    user_id: Uuid,
    portfolio_id: Uuid,
    input: &PortfolioInput,
) -> Result<bool, DataError> {
    let changed = db
        .update(SCHEMA, "portfolios", &owned_filter(user_id, portfolio_id), input)
        .await?;
    Ok(changed > 0)
}

/// Returns false when no portfolio of this user has `portfolio_id`
pub async fn delete_portfolio(
    db: &PostgrestClient,
    user_id: Uuid,
    portfolio_id: Uuid,
) -> Result<bool, DataError> {
    let removed = db
        .delete(SCHEMA, "portfolios", &owned_filter(user_id, portfolio_id))
        .await?;
    Ok(removed > 0)
}

fn owned_filter(user_id: Uuid, portfolio_id: Uuid) -> [(&'static str, String); 2] {
    [
        ("id", format!("eq.{portfolio_id}")),
        ("user_id", format!("eq.{user_id}")),
    ]
}
