// ============================
// crates/backend-lib/src/validation/mod.rs
// ============================
//! Input validation for auth forms and path parameters.

use chrono::NaiveDate;
use kabuport_common::{AccountType, TradeType};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;
use uuid::Uuid;

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 72; // bcrypt input limit on the auth service
const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321 SMTP limit
const MAX_PORTFOLIO_NAME_LENGTH: usize = 100;
const MAX_NOTE_LENGTH: usize = 500;

static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());
// Four-character exchange code or its five-character data-feed form (`72030`, `130A0`)
static STOCK_CODE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9][0-9A-Z]{2}[0-9A-Z][0-9]?$").unwrap());
// Trades are recorded against the five-character data-feed code
static TRADE_CODE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9][0-9A-Z]{2}[0-9A-Z][0-9]$").unwrap());
static DATE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

/// Possible validation errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("Invalid password: {0}")]
    InvalidPassword(String),

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Invalid stock code: {0}")]
    InvalidStockCode(String),

    #[error("Invalid portfolio: {0}")]
    InvalidPortfolio(String),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

/// `POST /login` form
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// `POST /signup` form
#[derive(Debug, Deserialize)]
pub struct SignupForm {
    pub email: String,
    pub password: String,
    #[serde(rename = "confirmPassword", alias = "confirm_password")]
    pub confirm_password: String,
}

/// `POST /reset-password` form
#[derive(Debug, Deserialize)]
pub struct ResetPasswordForm {
    pub email: String,
}

/// `POST /portfolios` and `PATCH /portfolios/{id}` form
#[derive(Debug, Deserialize)]
pub struct PortfolioForm {
    pub name: String,
    #[serde(default)]
    pub account_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Validated portfolio fields, written as-is (absent values clear the column)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioInput {
    pub name: String,
    pub account_type: Option<AccountType>,
    pub description: Option<String>,
}

/// `POST /transactions` form; numeric fields arrive as text
#[derive(Debug, Deserialize)]
pub struct TransactionForm {
    pub portfolio_id: String,
    pub local_code: String,
    pub trade_type: String,
    pub trade_date: String,
    pub quantity: String,
    pub unit_price: String,
    #[serde(default)]
    pub commission: Option<String>,
    #[serde(default)]
    pub tax: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Validated trade ready to insert
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTransaction {
    pub portfolio_id: Uuid,
    pub local_code: String,
    pub trade_type: TradeType,
    pub trade_date: NaiveDate,
    pub quantity: i64,
    pub unit_price: f64,
    pub commission: f64,
    pub tax: f64,
    pub notes: Option<String>,
}

/// Form fields left blank count as absent
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Validate an email address
pub fn validate_email(email: &str) -> ValidationResult<&str> {
    if email.is_empty() {
        return Err(ValidationError::InvalidEmail(
            "Email address cannot be empty".to_string(),
        ));
    }

    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::InvalidEmail(format!(
            "Email address cannot exceed {MAX_EMAIL_LENGTH} characters"
        )));
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err(ValidationError::InvalidEmail(
            "Invalid email address format".to_string(),
        ));
    }

    Ok(email)
}

/// Validate a new password
pub fn validate_password(password: &str) -> ValidationResult<&str> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::InvalidPassword(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::InvalidPassword(format!(
            "Password cannot exceed {MAX_PASSWORD_LENGTH} bytes"
        )));
    }

    Ok(password)
}

/// Validate a stock local code such as `7203`, `72030` or `130A0`
pub fn validate_stock_code(code: &str) -> ValidationResult<&str> {
    if !STOCK_CODE_REGEX.is_match(code) {
        return Err(ValidationError::InvalidStockCode(code.to_string()));
    }
    Ok(code)
}

impl PortfolioForm {
    pub fn validate(&self) -> ValidationResult<PortfolioInput> {
        let name = self.name.trim();
        let length = name.chars().count();
        if length == 0 {
            return Err(ValidationError::InvalidPortfolio(
                "Portfolio name cannot be empty".to_string(),
            ));
        }
        if length > MAX_PORTFOLIO_NAME_LENGTH {
            return Err(ValidationError::InvalidPortfolio(format!(
                "Portfolio name cannot exceed {MAX_PORTFOLIO_NAME_LENGTH} characters"
            )));
        }

        let account_type = match non_empty(&self.account_type) {
            Some(value) => Some(AccountType::parse(value).ok_or_else(|| {
                ValidationError::InvalidPortfolio(format!("Unknown account type: {value}"))
            })?),
            None => None,
        };

        let description = non_empty(&self.description).map(str::to_string);
        if description
            .as_ref()
            .is_some_and(|d| d.chars().count() > MAX_NOTE_LENGTH)
        {
            return Err(ValidationError::InvalidPortfolio(format!(
                "Description cannot exceed {MAX_NOTE_LENGTH} characters"
            )));
        }

        Ok(PortfolioInput {
            name: name.to_string(),
            account_type,
            description,
        })
    }
}

impl TransactionForm {
    pub fn validate(&self) -> ValidationResult<NewTransaction> {
        let invalid = |msg: &str| ValidationError::InvalidTransaction(msg.to_string());

        let portfolio_id = Uuid::parse_str(self.portfolio_id.trim())
            .map_err(|_| invalid("Select a portfolio"))?;

        let local_code = self.local_code.trim();
        if !TRADE_CODE_REGEX.is_match(local_code) {
            return Err(invalid("Stock code must be the five-character code"));
        }

        let trade_type = TradeType::parse(self.trade_type.trim())
            .ok_or_else(|| invalid("Trade type must be buy or sell"))?;

        let trade_date = self.trade_date.trim();
        let trade_date = DATE_REGEX
            .is_match(trade_date)
            .then(|| NaiveDate::parse_from_str(trade_date, "%Y-%m-%d").ok())
            .flatten()
            .ok_or_else(|| invalid("Enter a trade date"))?;

        let quantity = self
            .quantity
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|q| *q > 0)
            .ok_or_else(|| invalid("Quantity must be a whole number of at least 1"))?;

        let unit_price = parse_amount(&self.unit_price)
            .filter(|p| *p > 0.0)
            .ok_or_else(|| invalid("Unit price must be positive"))?;

        let commission = match non_empty(&self.commission) {
            Some(value) => parse_amount(value)
                .filter(|c| *c >= 0.0)
                .ok_or_else(|| invalid("Commission cannot be negative"))?,
            None => 0.0,
        };
        let tax = match non_empty(&self.tax) {
            Some(value) => parse_amount(value)
                .filter(|t| *t >= 0.0)
                .ok_or_else(|| invalid("Tax cannot be negative"))?,
            None => 0.0,
        };

        let notes = non_empty(&self.notes).map(str::to_string);
        if notes.as_ref().is_some_and(|n| n.chars().count() > MAX_NOTE_LENGTH) {
            return Err(invalid("Notes cannot exceed 500 characters"));
        }

        Ok(NewTransaction {
            portfolio_id,
            local_code: local_code.to_string(),
            trade_type,
            trade_date,
            quantity,
            unit_price,
            commission,
            tax,
            notes,
        })
    }
}

fn parse_amount(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

impl LoginForm {
    /// Login only checks shape; strength rules apply at signup
    pub fn validate(&self) -> ValidationResult<()> {
        validate_email(self.email.trim())?;
        if self.password.is_empty() {
            return Err(ValidationError::InvalidPassword(
                "Password cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl SignupForm {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_email(self.email.trim())?;
        validate_password(&self.password)?;
        if self.password != self.confirm_password {
            return Err(ValidationError::PasswordMismatch);
        }
        Ok(())
    }
}

impl ResetPasswordForm {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_email(self.email.trim()).map(|_| ())
    }
}
