//! Recorded trades. Holdings are derived from these in the database.
use kabuport_common::TransactionRecord;
use serde::Serialize;
use uuid::Uuid;

use super::portfolio::SCHEMA;
use super::{DataError, PostgrestClient};
use crate::validation::NewTransaction;

/// Rows on the transactions page
pub const LIST_LIMIT: usize = 50;
/// Rows on a portfolio page
pub const RECENT_LIMIT: usize = 10;

#[derive(Serialize)]
struct OwnedTransaction<'a> {
    user_id: Uuid,
    #[serde(flatten)]
    trade: &'a NewTransaction,
}

/// Latest trades across all the user's portfolios, newest first
pub async fn list_transactions(
    db: &PostgrestClient,
    user_id: Uuid,
) -> Result<Vec<TransactionRecord>, DataError> {
    db.select(
        SCHEMA,
        "transactions",
        &[
            (
                "select",
                "id,trade_date,local_code,trade_type,quantity,unit_price,commission,portfolios(name)"
                    .to_string(),
            ),
            ("user_id", format!("eq.{user_id}")),
            ("order", "trade_date.desc".to_string()),
            ("limit", LIST_LIMIT.to_string()),
        ],
    )
    .await
}

pub async fn recent_for_portfolio(
    db: &PostgrestClient,
    portfolio_id: Uuid,
) -> Result<Vec<TransactionRecord>, DataError> {
    db.select(
        SCHEMA,
        "transactions",
        &[
            ("select", "id,trade_date,local_code,trade_type,quantity,unit_price".to_string()),
            ("portfolio_id", format!("eq.{portfolio_id}")),
            ("order", "trade_date.desc".to_string()),
            ("limit", RECENT_LIMIT.to_string()),
        ],
    )
    .await
}

pub async fn create_transaction(
    db: &PostgrestClient,
    user_id: Uuid,
    trade: &NewTransaction,
) -> Result<(), DataError> {
    db.insert(SCHEMA, "transactions", &OwnedTransaction { user_id, trade })
        .await
}

/// Returns false when the user has no trade with `id`
pub async fn delete_transaction(
    db: &PostgrestClient,
    user_id: Uuid,
    id: i64,
) -> Result<bool, DataError> {
    let removed = db
        .delete(
            SCHEMA,
            "transactions",
            &[("id", format!("eq.{id}")), ("user_id", format!("eq.{user_id}"))],
        )
        .await?;
    Ok(removed > 0)
}
