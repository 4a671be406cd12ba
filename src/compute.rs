//! This is where the business logic stands. Everything here is a pure function
//! of the transaction list it's handed: no caching, no incremental state, the
//! caller re-runs the whole thing whenever the list changes. None of these can
//! fail; a transaction with missing pieces either counts as zero or is skipped.

use crate::data::{
    AccountBalance, BalancePoint, CategoryTotal, Granularity, Holding, MonthlyFlow, Transaction,
    TxType, Window, TOP_CATEGORIES, UNCATEGORIZED,
};
use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

/// Running balance of one account (or of whatever mix of accounts is passed).
/// Transactions are ordered by date with a stable sort, so same-day ties keep
/// their input order and undated ones come first. One point per transaction.
pub fn running_balance(transactions: &[Transaction]) -> Vec<BalancePoint> {
    fold_balance(transactions.iter())
}

/// Net worth across accounts: every account's transactions are merged into a
/// single list before folding, so points from different accounts interleave
/// by date.
pub fn net_worth(accounts: &[Vec<Transaction>], granularity: Granularity) -> Vec<BalancePoint> {
    let points = fold_balance(accounts.iter().flatten());
    match granularity {
        Granularity::Transaction => points,
        Granularity::Month => last_point_per_month(points),
    }
}

/// Adds `tx`'s amount to `total`, leaving `total` untouched if that would
/// overflow.
fn accumulate(total: &mut Decimal, amount: Decimal, tx: &Transaction) {
    match total.checked_add(amount) {
        Some(sum) => *total = sum,
        None => {
            tracing::warn!(tx = %tx.id, %amount, "amount overflows the running total, skipped")
        }
    }
}

fn fold_balance<'a>(transactions: impl Iterator<Item = &'a Transaction>) -> Vec<BalancePoint> {
    let mut ordered: Vec<&Transaction> = transactions.collect();
    ordered.sort_by_key(|tx| tx.transaction_date);
    let mut balance = Decimal::ZERO;
    ordered
        .into_iter()
        .map(|tx| {
            accumulate(&mut balance, tx.amount_or_zero(), tx);
            BalancePoint {
                date: tx.transaction_date,
                account_id: tx.account_id.clone(),
                transaction_id: tx.id.clone(),
                balance,
            }
        })
        .collect()
}

fn month_of(date: Option<NaiveDateTime>) -> Option<(i32, u32)> {
    date.map(|d| (d.year(), d.month()))
}

/// Points come in date order, so each month is a contiguous run and we just
/// keep overwriting the run's tail.
fn last_point_per_month(points: Vec<BalancePoint>) -> Vec<BalancePoint> {
    let mut monthly: Vec<BalancePoint> = Vec::new();
    for point in points {
        match monthly.last_mut() {
            Some(last) if month_of(last.date) == month_of(point.date) => *last = point,
            _ => monthly.push(point),
        }
    }
    monthly
}

/// Open position while walking the transaction list.
struct Position {
    opened: usize,
    quantity: Decimal,
    total_cost: Decimal,
    last_price: Decimal,
}

impl Position {
    /// `None` if the position's value or gain doesn't fit in a `Decimal`.
    fn into_holding(self, ticker_symbol: String) -> Option<Holding> {
        let total_value = self.quantity.checked_mul(self.last_price)?;
        let gain = total_value.checked_sub(self.total_cost)?;
        let gain_percent = if self.total_cost.is_zero() {
            Decimal::ZERO
        } else {
            gain.checked_div(self.total_cost)
                .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
                .unwrap_or_default()
        };
        Some(Holding {
            ticker_symbol,
            average_cost: self
                .total_cost
                .checked_div(self.quantity)
                .unwrap_or_default(),
            quantity: self.quantity,
            total_cost: self.total_cost,
            total_value,
            gain,
            gain_percent,
        })
    }
}

/// Holdings of one investment account, walking the transactions in the order
/// given (not re-sorted by date).
///
/// Only buys and sells with a ticker, a quantity and a price move a position.
/// A sell lowers the quantity but leaves `total_cost` alone, so the average
/// cost of what remains goes up after a partial sell. A position that reaches
/// zero (or below) is dropped, and buying the symbol again starts over from a
/// zero cost basis. `total_value` uses the last price seen for the symbol, not
/// a market quote.
pub fn holdings(transactions: &[Transaction]) -> Vec<Holding> {
    let mut positions: HashMap<String, Position> = HashMap::new();
    for (seq, tx) in transactions.iter().enumerate() {
        let Some(symbol) = tx.ticker_symbol.as_deref() else {
            continue;
        };
        let buy = match tx.transaction_type {
            TxType::Buy => true,
            TxType::Sell => false,
            _ => continue,
        };
        let (Some(quantity), Some(price)) = (tx.quantity, tx.price_per_unit) else {
            tracing::debug!(tx = %tx.id, symbol, "trade without quantity or price, skipped");
            continue;
        };
        if quantity.is_zero() || price.is_zero() {
            continue;
        }
        let position = positions.entry(symbol.to_owned()).or_insert(Position {
            opened: seq,
            quantity: Decimal::ZERO,
            total_cost: Decimal::ZERO,
            last_price: Decimal::ZERO,
        });
        let moved = if buy {
            quantity
                .checked_mul(price)
                .and_then(|cost| position.total_cost.checked_add(cost))
                .zip(position.quantity.checked_add(quantity))
        } else {
            position
                .quantity
                .checked_sub(quantity)
                .map(|held| (position.total_cost, held))
        };
        let moved = moved.filter(|(_, held)| held.checked_mul(price).is_some());
        let Some((total_cost, held)) = moved else {
            tracing::warn!(tx = %tx.id, symbol, "trade overflows the position, skipped");
            if position.quantity.is_zero() {
                positions.remove(symbol);
            }
            continue;
        };
        position.total_cost = total_cost;
        position.quantity = held;
        position.last_price = price;
        if position.quantity <= Decimal::ZERO {
            tracing::debug!(tx = %tx.id, symbol, "position closed");
            positions.remove(symbol);
        }
    }
    let mut open: Vec<(String, Position)> = positions.into_iter().collect();
    open.sort_by_key(|(_, position)| position.opened);
    open.into_iter()
        .filter_map(|(symbol, position)| position.into_holding(symbol))
        .collect()
}

/// Biggest spending categories, by absolute outflow, optionally limited to the
/// trailing `window` before `as_of`. Only the top `TOP_CATEGORIES` survive;
/// the long tail is dropped rather than lumped together. Equal totals keep the
/// order in which their category first showed up.
pub fn top_spending_categories(
    transactions: &[Transaction],
    window: Window,
    as_of: NaiveDate,
) -> Vec<CategoryTotal> {
    let cutoff = match window {
        Window::All => None,
        Window::Months(months) => as_of
            .checked_sub_months(Months::new(months))
            .map(|start| start.and_time(NaiveTime::MIN)),
    };
    let mut totals: Vec<CategoryTotal> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for tx in transactions {
        let amount = tx.amount_or_zero();
        if amount >= Decimal::ZERO {
            continue;
        }
        if let Some(cutoff) = cutoff {
            if !tx.transaction_date.is_some_and(|date| date >= cutoff) {
                continue;
            }
        }
        let category = tx
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(UNCATEGORIZED);
        let slot = *index.entry(category).or_insert_with(|| {
            totals.push(CategoryTotal {
                category: category.to_owned(),
                total_amount: Decimal::ZERO,
            });
            totals.len() - 1
        });
        accumulate(&mut totals[slot].total_amount, amount.abs(), tx);
    }
    totals.sort_by(|a, b| b.total_amount.cmp(&a.total_amount));
    totals.truncate(TOP_CATEGORIES);
    totals
}

/// Income and spending per calendar month, oldest first. Months without any
/// transaction don't show up; undated transactions can't be placed and are
/// left out.
pub fn monthly_flows(transactions: &[Transaction]) -> Vec<MonthlyFlow> {
    let mut months: BTreeMap<String, MonthlyFlow> = BTreeMap::new();
    for tx in transactions {
        let Some(date) = tx.transaction_date else {
            continue;
        };
        let month = date.format("%Y-%m").to_string();
        let flow = months.entry(month.clone()).or_insert(MonthlyFlow {
            month,
            income: Decimal::ZERO,
            spending: Decimal::ZERO,
        });
        let amount = tx.amount_or_zero();
        if amount.is_sign_positive() {
            accumulate(&mut flow.income, amount, tx);
        } else {
            accumulate(&mut flow.spending, amount.abs(), tx);
        }
    }
    months.into_values().collect()
}

/// Current balance of every account seen, in first-seen order.
pub fn account_balances(transactions: &[Transaction]) -> Vec<AccountBalance> {
    let mut balances: Vec<AccountBalance> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for tx in transactions {
        let slot = *index.entry(tx.account_id.as_str()).or_insert_with(|| {
            balances.push(AccountBalance {
                account_id: tx.account_id.clone(),
                balance: Decimal::ZERO,
                transactions: 0,
            });
            balances.len() - 1
        });
        accumulate(&mut balances[slot].balance, tx.amount_or_zero(), tx);
        balances[slot].transactions += 1;
    }
    balances
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn cash(id: &str, account: &str, date: NaiveDateTime, amount: Decimal) -> Transaction {
        Transaction {
            transaction_date: Some(date),
            amount: Some(amount),
            ..Transaction::new(id, account, TxType::Other("transfer".into()))
        }
    }

    fn spend(id: &str, category: &str, amount: Decimal) -> Transaction {
        Transaction {
            category: Some(category.into()),
            ..cash(id, "bank", day(2024, 3, 1), amount)
        }
    }

    fn trade(
        id: &str,
        kind: TxType,
        symbol: &str,
        quantity: Decimal,
        price: Decimal,
    ) -> Transaction {
        Transaction {
            ticker_symbol: Some(symbol.into()),
            quantity: Some(quantity),
            price_per_unit: Some(price),
            amount: quantity.checked_mul(price),
            ..Transaction::new(id, "broker", kind)
        }
    }

    #[test]
    fn test_running_balance_sorts_and_folds() {
        let txs = [
            cash("1", "a", day(2024, 1, 10), dec!(-20)),
            cash("2", "a", day(2024, 1, 1), dec!(100)),
            cash("3", "a", day(2024, 1, 10), dec!(5)),
        ];
        let points = running_balance(&txs);
        let ids: Vec<&str> = points.iter().map(|p| p.transaction_id.as_str()).collect();
        assert_eq!(ids, ["2", "1", "3"]);
        let balances: Vec<Decimal> = points.iter().map(|p| p.balance).collect();
        assert_eq!(balances, [dec!(100), dec!(80), dec!(85)]);
    }

    #[test]
    fn test_running_balance_ends_at_sum() {
        let txs = [
            cash("1", "a", day(2023, 5, 2), dec!(12.5)),
            cash("2", "a", day(2022, 1, 1), dec!(-3.25)),
            cash("3", "a", day(2024, 8, 9), dec!(40)),
            Transaction {
                amount: None,
                ..cash("4", "a", day(2024, 8, 10), dec!(0))
            },
        ];
        let total: Decimal = txs.iter().map(Transaction::amount_or_zero).sum();
        let points = running_balance(&txs);
        assert_eq!(points.len(), 4);
        assert_eq!(points.last().unwrap().balance, total);
    }

    #[test]
    fn test_running_balance_single_and_empty() {
        assert!(running_balance(&[]).is_empty());
        let points = running_balance(&[cash("1", "a", day(2024, 2, 2), dec!(42))]);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].balance, dec!(42));
    }

    #[test]
    fn test_undated_transactions_come_first() {
        let txs = [
            cash("1", "a", day(2024, 1, 1), dec!(10)),
            Transaction {
                transaction_date: None,
                ..cash("2", "a", day(2024, 1, 1), dec!(7))
            },
        ];
        let points = running_balance(&txs);
        assert_eq!(points[0].transaction_id, "2");
        assert_eq!(points[0].date, None);
        assert_eq!(points[1].balance, dec!(17));
    }

    #[test]
    fn test_net_worth_interleaves_accounts() {
        let accounts = vec![
            vec![cash("a1", "account1", day(2024, 1, 5), dec!(100))],
            vec![cash("b1", "account2", day(2024, 1, 3), dec!(50))],
        ];
        let points = net_worth(&accounts, Granularity::Transaction);
        assert_eq!(
            points,
            [
                BalancePoint {
                    date: Some(day(2024, 1, 3)),
                    account_id: "account2".into(),
                    transaction_id: "b1".into(),
                    balance: dec!(50),
                },
                BalancePoint {
                    date: Some(day(2024, 1, 5)),
                    account_id: "account1".into(),
                    transaction_id: "a1".into(),
                    balance: dec!(150),
                },
            ]
        );
    }

    #[test]
    fn test_net_worth_monthly() {
        let accounts = vec![
            vec![
                cash("1", "a", day(2024, 1, 5), dec!(100)),
                cash("2", "a", day(2024, 3, 1), dec!(-30)),
            ],
            vec![
                cash("3", "b", day(2024, 1, 20), dec!(10)),
                cash("4", "b", day(2024, 3, 15), dec!(5)),
            ],
        ];
        let points = net_worth(&accounts, Granularity::Month);
        let summary: Vec<(Option<NaiveDateTime>, Decimal)> =
            points.iter().map(|p| (p.date, p.balance)).collect();
        assert_eq!(
            summary,
            [
                (Some(day(2024, 1, 20)), dec!(110)),
                (Some(day(2024, 3, 15)), dec!(85)),
            ]
        );
        assert!(net_worth(&[], Granularity::Month).is_empty());
    }

    #[test]
    fn test_holdings_average_cost() {
        let txs = [
            trade("1", TxType::Buy, "AAPL", dec!(10), dec!(100)),
            trade("2", TxType::Buy, "AAPL", dec!(10), dec!(200)),
        ];
        let result = holdings(&txs);
        assert_eq!(result.len(), 1);
        let aapl = &result[0];
        assert_eq!(aapl.quantity, dec!(20));
        assert_eq!(aapl.average_cost, dec!(150));
        assert_eq!(aapl.total_cost, dec!(3000));
        assert_eq!(aapl.total_value, dec!(4000));
        assert_eq!(aapl.gain, dec!(1000));
    }

    #[test]
    fn test_holdings_full_sell_removes_position() {
        let txs = [
            trade("1", TxType::Buy, "AAPL", dec!(10), dec!(100)),
            trade("2", TxType::Sell, "AAPL", dec!(10), dec!(100)),
        ];
        assert!(holdings(&txs).is_empty());
    }

    #[test]
    fn test_holdings_partial_sell_keeps_cost() {
        let txs = [
            trade("1", TxType::Buy, "AAPL", dec!(10), dec!(100)),
            trade("2", TxType::Sell, "AAPL", dec!(5), dec!(150)),
        ];
        assert_eq!(
            holdings(&txs),
            [Holding {
                ticker_symbol: "AAPL".into(),
                quantity: dec!(5),
                average_cost: dec!(200),
                total_cost: dec!(1000),
                total_value: dec!(750),
                gain: dec!(-250),
                gain_percent: dec!(-25),
            }]
        );
    }

    #[test]
    fn test_holdings_rebuy_after_liquidation_starts_fresh() {
        let txs = [
            trade("1", TxType::Buy, "BTC", dec!(2), dec!(100)),
            trade("2", TxType::Sell, "BTC", dec!(3), dec!(120)),
            trade("3", TxType::Buy, "BTC", dec!(1), dec!(50)),
        ];
        let result = holdings(&txs);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].quantity, dec!(1));
        assert_eq!(result[0].total_cost, dec!(50));
        assert_eq!(result[0].average_cost, dec!(50));
    }

    #[test]
    fn test_holdings_skips_irrelevant_transactions() {
        let txs = [
            trade("1", TxType::Buy, "VTI", dec!(4), dec!(25)),
            trade("2", TxType::Dividend, "VTI", dec!(1), dec!(999)),
            trade("3", TxType::Contribution, "VTI", dec!(1), dec!(999)),
            trade("4", TxType::Withdrawal, "VTI", dec!(1), dec!(999)),
            trade("5", TxType::Buy, "VTI", dec!(0), dec!(999)),
            trade("6", TxType::Buy, "VTI", dec!(3), dec!(0)),
            Transaction {
                ticker_symbol: None,
                ..trade("7", TxType::Buy, "VTI", dec!(1), dec!(999))
            },
            Transaction {
                price_per_unit: None,
                ..trade("8", TxType::Buy, "VTI", dec!(1), dec!(999))
            },
        ];
        let result = holdings(&txs);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].quantity, dec!(4));
        assert_eq!(result[0].total_cost, dec!(100));
        assert_eq!(result[0].total_value, dec!(100));
        assert_eq!(result[0].gain_percent, dec!(0));
    }

    #[test]
    fn test_holdings_uses_last_seen_price_and_open_order() {
        let txs = [
            trade("1", TxType::Buy, "MSFT", dec!(1), dec!(300)),
            trade("2", TxType::Buy, "ETH", dec!(2), dec!(1000)),
            trade("3", TxType::Sell, "ETH", dec!(1), dec!(1500)),
        ];
        let result = holdings(&txs);
        let symbols: Vec<&str> = result.iter().map(|h| h.ticker_symbol.as_str()).collect();
        assert_eq!(symbols, ["MSFT", "ETH"]);
        assert_eq!(result[1].total_value, dec!(1500));
        assert_eq!(result[1].gain, dec!(-500));
        assert_eq!(result[1].gain_percent, dec!(-25));
    }

    #[test]
    fn test_top_spending_categories() {
        let mut txs = vec![
            spend("1", "A", dec!(-300)),
            spend("2", "B", dec!(-200)),
            spend("3", "A", dec!(-100)),
        ];
        for (i, category) in ["B", "C", "D", "E", "F"].iter().enumerate() {
            txs.push(spend(&format!("x{i}"), category, dec!(-50)));
        }
        txs.push(spend("income", "A", dec!(1000)));
        let top = top_spending_categories(&txs, Window::All, day(2024, 6, 1).date());
        assert_eq!(top.len(), 5);
        assert_eq!(
            top[0],
            CategoryTotal {
                category: "A".into(),
                total_amount: dec!(400)
            }
        );
        assert_eq!(
            top[1],
            CategoryTotal {
                category: "B".into(),
                total_amount: dec!(250)
            }
        );
        let rest: Vec<&str> = top[2..].iter().map(|c| c.category.as_str()).collect();
        assert_eq!(rest, ["C", "D", "E"]);
    }

    #[test]
    fn test_spending_window_and_uncategorized() {
        let txs = [
            cash("old", "bank", day(2023, 1, 1), dec!(-500)),
            cash("recent", "bank", day(2024, 5, 1), dec!(-20)),
            Transaction {
                category: Some("  ".into()),
                ..cash("blank", "bank", day(2024, 5, 2), dec!(-5))
            },
            Transaction {
                transaction_date: None,
                ..cash("undated", "bank", day(2024, 5, 1), dec!(-1000))
            },
        ];
        let as_of = day(2024, 6, 1).date();
        let recent = top_spending_categories(&txs, Window::Months(3), as_of);
        assert_eq!(
            recent,
            [CategoryTotal {
                category: UNCATEGORIZED.into(),
                total_amount: dec!(25)
            }]
        );
        let everything = top_spending_categories(&txs, Window::All, as_of);
        assert_eq!(everything[0].total_amount, dec!(1525));
    }

    #[test]
    fn test_monthly_flows() {
        let txs = [
            cash("1", "a", day(2024, 2, 3), dec!(1000)),
            cash("2", "a", day(2024, 1, 15), dec!(-40)),
            cash("3", "a", day(2024, 2, 20), dec!(-60)),
            cash("4", "a", day(2024, 2, 21), dec!(-15)),
            cash("5", "a", day(2024, 4, 1), dec!(10)),
            Transaction {
                transaction_date: None,
                ..cash("6", "a", day(2024, 4, 1), dec!(99))
            },
        ];
        assert_eq!(
            monthly_flows(&txs),
            [
                MonthlyFlow {
                    month: "2024-01".into(),
                    income: dec!(0),
                    spending: dec!(40)
                },
                MonthlyFlow {
                    month: "2024-02".into(),
                    income: dec!(1000),
                    spending: dec!(75)
                },
                MonthlyFlow {
                    month: "2024-04".into(),
                    income: dec!(10),
                    spending: dec!(0)
                },
            ]
        );
    }

    #[test]
    fn test_account_balances() {
        let txs = [
            cash("1", "checking", day(2024, 1, 1), dec!(100)),
            cash("2", "savings", day(2024, 1, 2), dec!(50)),
            cash("3", "checking", day(2024, 1, 3), dec!(-30)),
        ];
        assert_eq!(
            account_balances(&txs),
            [
                AccountBalance {
                    account_id: "checking".into(),
                    balance: dec!(70),
                    transactions: 2
                },
                AccountBalance {
                    account_id: "savings".into(),
                    balance: dec!(50),
                    transactions: 1
                },
            ]
        );
    }

    #[test]
    fn test_balance_overflow_skips_amount() {
        let txs = [
            cash("1", "a", day(2024, 1, 1), Decimal::MAX),
            cash("2", "a", day(2024, 1, 2), Decimal::MAX),
            cash("3", "a", day(2024, 1, 3), dec!(-1)),
        ];
        let balances: Vec<Decimal> = running_balance(&txs).iter().map(|p| p.balance).collect();
        assert_eq!(balances, [Decimal::MAX, Decimal::MAX, Decimal::MAX - dec!(1)]);
        assert_eq!(account_balances(&txs)[0].balance, Decimal::MAX - dec!(1));
        let flows = monthly_flows(&txs);
        assert_eq!(flows[0].income, Decimal::MAX);
        assert_eq!(flows[0].spending, dec!(1));
    }

    #[test]
    fn test_holdings_overflow_skips_trade() {
        let huge = dec!(100000000000000000000);
        let txs = [
            trade("1", TxType::Buy, "BIG", huge, huge),
            trade("2", TxType::Buy, "AAPL", dec!(2), dec!(10)),
            trade("3", TxType::Buy, "AAPL", dec!(10), dec!(10000000000000000000000000000)),
        ];
        let result = holdings(&txs);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].ticker_symbol, "AAPL");
        assert_eq!(result[0].quantity, dec!(2));
        assert_eq!(result[0].total_cost, dec!(20));
    }

    #[test]
    fn test_empty_input_gives_empty_output() {
        let as_of = day(2024, 1, 1).date();
        assert!(running_balance(&[]).is_empty());
        assert!(holdings(&[]).is_empty());
        assert!(top_spending_categories(&[], Window::Months(12), as_of).is_empty());
        assert!(monthly_flows(&[]).is_empty());
        assert!(account_balances(&[]).is_empty());
    }
}
