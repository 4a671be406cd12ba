use crate::{
    compute,
    data::{AccountId, Granularity, Window},
    read::read_transactions,
    store::{MemoryStore, TransactionStore},
    write::write_report,
};
use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

#[derive(Debug, Parser)]
#[command(
    name = "wealthtrack",
    version,
    about = "Balance, net worth, spending and holdings reports from a transaction export"
)]
pub struct Args {
    /// Log filter for stderr (e.g. `warn`, `wealthtrack=debug`).
    #[arg(long, env = "WEALTHTRACK_LOG", default_value = "warn", global = true)]
    pub log_level: String,
    #[command(subcommand)]
    pub command: Command,
}

/// Transaction export plus an optional account filter.
#[derive(Debug, ClapArgs)]
pub struct Source {
    /// CSV export of transactions.
    pub input: PathBuf,
    /// Only use these accounts (repeatable). Defaults to every account.
    #[arg(long = "account")]
    pub accounts: Vec<AccountId>,
}

impl Source {
    fn selected(&self, store: &impl TransactionStore) -> Vec<AccountId> {
        if self.accounts.is_empty() {
            return store.account_ids();
        }
        let mut seen = HashSet::new();
        self.accounts
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Current balance of every account.
    Accounts {
        #[command(flatten)]
        source: Source,
    },
    /// Running balance of one account.
    Balance {
        input: PathBuf,
        #[arg(long)]
        account: AccountId,
    },
    /// Net worth over time across accounts.
    NetWorth {
        #[command(flatten)]
        source: Source,
        /// `transaction` or `month`.
        #[arg(long, default_value = "transaction")]
        granularity: Granularity,
    },
    /// Top spending categories.
    Spending {
        #[command(flatten)]
        source: Source,
        /// Trailing months to look at: 3, 6, 12, 24 or `all`.
        #[arg(long, default_value = "all")]
        window: Window,
        /// Reference date for the window, today by default.
        #[arg(long, env = "WEALTHTRACK_AS_OF")]
        as_of: Option<NaiveDate>,
    },
    /// Income and spending per month.
    Monthly {
        #[command(flatten)]
        source: Source,
    },
    /// Open positions of one investment account.
    Holdings {
        input: PathBuf,
        #[arg(long)]
        account: AccountId,
    },
}

impl Command {
    pub fn input(&self) -> &Path {
        match self {
            Command::Accounts { source }
            | Command::NetWorth { source, .. }
            | Command::Spending { source, .. }
            | Command::Monthly { source } => &source.input,
            Command::Balance { input, .. } | Command::Holdings { input, .. } => input,
        }
    }
}

pub fn load_store(path: &Path) -> Result<MemoryStore, anyhow::Error> {
    let file =
        std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut store = MemoryStore::new();
    let rows = read_transactions(file, &mut store)?;
    tracing::info!(
        rows,
        transactions = store.len(),
        accounts = store.account_ids().len(),
        "transactions loaded"
    );
    Ok(store)
}

/// Fetches what `command` needs from `store`, derives the report and writes it
/// as CSV to `out`.
pub fn report<S: TransactionStore, W: std::io::Write>(
    command: &Command,
    store: &S,
    out: W,
) -> Result<(), anyhow::Error> {
    match command {
        Command::Accounts { source } => {
            let transactions = fetch_flat(store, &source.selected(store))?;
            write_report(out, &compute::account_balances(&transactions))
        }
        Command::Balance { account, .. } => {
            let transactions = store.fetch_transactions(account)?;
            write_report(out, &compute::running_balance(&transactions))
        }
        Command::NetWorth {
            source,
            granularity,
        } => {
            let accounts = store.fetch_accounts(&source.selected(store))?;
            let points = compute::net_worth(&accounts, *granularity);
            tracing::debug!(points = points.len(), "net worth series");
            write_report(out, &points)
        }
        Command::Spending {
            source,
            window,
            as_of,
        } => {
            let transactions = fetch_flat(store, &source.selected(store))?;
            let as_of = as_of.unwrap_or_else(|| chrono::Local::now().date_naive());
            write_report(
                out,
                &compute::top_spending_categories(&transactions, *window, as_of),
            )
        }
        Command::Monthly { source } => {
            let transactions = fetch_flat(store, &source.selected(store))?;
            write_report(out, &compute::monthly_flows(&transactions))
        }
        Command::Holdings { account, .. } => {
            let transactions = store.fetch_transactions(account)?;
            write_report(out, &compute::holdings(&transactions))
        }
    }
}

fn fetch_flat<S: TransactionStore>(
    store: &S,
    account_ids: &[AccountId],
) -> Result<Vec<crate::data::Transaction>, anyhow::Error> {
    Ok(store
        .fetch_accounts(account_ids)?
        .into_iter()
        .flatten()
        .collect())
}
