//! Derived views over a personal-finance transaction history: running balance,
//! net worth, spending by category, monthly income/spending and investment
//! holdings.
//!
//! The derivations in [`compute`] are pure functions over `&[Transaction]`;
//! [`store`] is the boundary they are fed from, [`read`] and [`write`] move
//! transactions and reports in and out as CSV.

pub mod cli;
pub mod compute;
pub mod data;
pub mod read;
pub mod store;
pub mod write;

pub use data::{
    AccountBalance, BalancePoint, CategoryTotal, Error, Granularity, Holding, MonthlyFlow,
    Transaction, TxType, Window,
};
pub use store::{MemoryStore, TransactionStore};
