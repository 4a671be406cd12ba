use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::str::FromStr;
use thiserror::Error;

pub type TxId = String;
pub type AccountId = String;

pub const SIGNIFICANT_DIGITS: u32 = 4;

/// How many categories the spending breakdown keeps; the rest are dropped.
pub const TOP_CATEGORIES: usize = 5;

/// Bucket for outflows that carry no category.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// A recorded transaction. Records are never mutated: an edit arrives as a new
/// record with the same `id`, and the store swaps it in (see `MemoryStore`).
///
/// Every field that comes from the outside world and can be garbage is an
/// `Option`; a value that failed to parse is simply absent. The aggregation
/// functions decide locally what "absent" means (zero for sums, skip for
/// holdings).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: TxId,
    pub account_id: AccountId,
    pub transaction_date: Option<NaiveDateTime>,
    pub amount: Option<Decimal>,
    pub transaction_type: TxType,
    pub ticker_symbol: Option<String>,
    pub quantity: Option<Decimal>,
    pub price_per_unit: Option<Decimal>,
    pub fee: Option<Decimal>,
    pub merchant: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
}

impl Transaction {
    /// Bare transaction with everything optional left out.
    pub fn new(id: &str, account_id: &str, transaction_type: TxType) -> Self {
        Self {
            id: id.to_owned(),
            account_id: account_id.to_owned(),
            transaction_date: None,
            amount: None,
            transaction_type,
            ticker_symbol: None,
            quantity: None,
            price_per_unit: None,
            fee: None,
            merchant: None,
            category: None,
            description: None,
        }
    }

    /// Amount with "missing" read as zero.
    pub fn amount_or_zero(&self) -> Decimal {
        self.amount.unwrap_or_default()
    }
}

/// Investment accounts use a closed set of types, bank accounts put whatever
/// label they like in there, which lands in `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxType {
    Buy,
    Sell,
    Dividend,
    Contribution,
    Withdrawal,
    Other(String),
}

impl From<&str> for TxType {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "buy" => TxType::Buy,
            "sell" => TxType::Sell,
            "dividend" => TxType::Dividend,
            "contribution" => TxType::Contribution,
            "withdrawal" => TxType::Withdrawal,
            _ => TxType::Other(s.trim().to_owned()),
        }
    }
}

/// Current position in one symbol of one investment account. Derived on the
/// fly, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Holding {
    pub ticker_symbol: String,
    #[serde(serialize_with = "rounded")]
    pub quantity: Decimal,
    #[serde(serialize_with = "rounded")]
    pub average_cost: Decimal,
    #[serde(serialize_with = "rounded")]
    pub total_cost: Decimal,
    #[serde(serialize_with = "rounded")]
    pub total_value: Decimal,
    #[serde(serialize_with = "rounded")]
    pub gain: Decimal,
    #[serde(serialize_with = "rounded")]
    pub gain_percent: Decimal,
}

/// One point of a running balance or net worth series. `date` is `None` for
/// transactions whose date could not be read; those sort first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalancePoint {
    pub date: Option<NaiveDateTime>,
    pub account_id: AccountId,
    pub transaction_id: TxId,
    #[serde(serialize_with = "rounded")]
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    #[serde(serialize_with = "rounded")]
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyFlow {
    /// `YYYY-MM`
    pub month: String,
    #[serde(serialize_with = "rounded")]
    pub income: Decimal,
    #[serde(serialize_with = "rounded")]
    pub spending: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountBalance {
    pub account_id: AccountId,
    #[serde(serialize_with = "rounded")]
    pub balance: Decimal,
    pub transactions: usize,
}

/// Trailing window for the spending breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Months(u32),
    All,
}

impl FromStr for Window {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "3" => Ok(Window::Months(3)),
            "6" => Ok(Window::Months(6)),
            "12" => Ok(Window::Months(12)),
            "24" => Ok(Window::Months(24)),
            "all" => Ok(Window::All),
            _ => Err(format!("invalid window {s:?}, use one of 3, 6, 12, 24, all")),
        }
    }
}

/// Resolution of a net worth series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Granularity {
    #[default]
    Transaction,
    Month,
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "transaction" => Ok(Granularity::Transaction),
            "month" | "monthly" => Ok(Granularity::Month),
            _ => Err(format!("invalid granularity {s:?}, use transaction or month")),
        }
    }
}

/// Errors from the store boundary. The aggregation functions themselves never
/// fail; bad input degrades to empty or zero results.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Account {0:?} not found")]
    AccountNotFound(AccountId),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn rounded<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
    Serialize::serialize(&value.round_dp(SIGNIFICANT_DIGITS).normalize(), serializer)
}
