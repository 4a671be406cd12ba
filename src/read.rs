use crate::data::{Transaction, TxType};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

/// Trait for doing something with a `Transaction` read from a CSV file
/// (or received from elsewhere). `MemoryStore` files them away per account;
/// tests use it to check what comes out of a CSV stream.
pub trait TransactionSink {
    fn record(&mut self, tx: Transaction);
}

/// A CSV row before any interpretation. Everything but the two ids may be
/// missing or garbage; `Transaction::from` sorts that out.
#[derive(Debug, Deserialize)]
struct Row {
    id: String,
    account_id: String,
    #[serde(default)]
    transaction_date: Option<String>,
    #[serde(default)]
    amount: Option<String>,
    #[serde(default)]
    transaction_type: Option<String>,
    #[serde(default)]
    ticker_symbol: Option<String>,
    #[serde(default)]
    quantity: Option<String>,
    #[serde(default)]
    price_per_unit: Option<String>,
    #[serde(default)]
    fee: Option<String>,
    #[serde(default)]
    merchant: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl From<Row> for Transaction {
    fn from(row: Row) -> Self {
        let id = row.id;
        let decimal = |field: &str, raw: Option<String>| {
            let raw = raw?;
            match Decimal::from_str(&raw).or_else(|_| Decimal::from_scientific(&raw)) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(
                        tx = %id, field, value = %raw, error = %e,
                        "unreadable number, ignored"
                    );
                    None
                }
            }
        };
        let amount = decimal("amount", row.amount);
        let quantity = decimal("quantity", row.quantity);
        let price_per_unit = decimal("price_per_unit", row.price_per_unit);
        let fee = decimal("fee", row.fee);
        let transaction_date = row.transaction_date.and_then(|raw| {
            let date = parse_date(&raw);
            if date.is_none() {
                tracing::warn!(tx = %id, value = %raw, "unreadable transaction date, ignored");
            }
            date
        });
        Transaction {
            account_id: row.account_id,
            transaction_date,
            amount,
            transaction_type: TxType::from(row.transaction_type.as_deref().unwrap_or_default()),
            ticker_symbol: row.ticker_symbol,
            quantity,
            price_per_unit,
            fee,
            merchant: row.merchant,
            category: row.category,
            description: row.description,
            id,
        }
    }
}

/// Accepts a bare date, a date with a time, or a full RFC 3339 timestamp
/// (converted to UTC wall time).
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.and_time(NaiveTime::MIN));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(datetime);
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|datetime| datetime.naive_utc())
}

/// Simple CSV importer for `Transaction`s. A row that doesn't even have the
/// right shape is logged and skipped; only I/O failures stop the read.
pub fn read_transactions<R: std::io::Read, S: TransactionSink>(
    reader: R,
    sink: &mut S,
) -> Result<usize, anyhow::Error> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let mut count = 0;
    for result in rdr.deserialize::<Row>() {
        match result {
            Ok(row) => {
                sink.record(row.into());
                count += 1;
            }
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => tracing::warn!("skipping malformed row: {e}"),
        }
    }
    Ok(count)
}
