use crate::{
    data::{AccountId, Error, Transaction, TxId},
    read::TransactionSink,
};
use std::collections::HashMap;

/// Where the aggregation gets its input from. Fetches are plain sequential
/// calls: no retry, no timeout, a failure goes straight back to the caller.
pub trait TransactionStore {
    /// Every known account, in the order it was first seen.
    fn account_ids(&self) -> Vec<AccountId>;

    fn fetch_transactions(&self, account_id: &str) -> Result<Vec<Transaction>, Error>;

    /// One fetch per account, stopping at the first failure.
    fn fetch_accounts(&self, account_ids: &[AccountId]) -> Result<Vec<Vec<Transaction>>, Error> {
        account_ids
            .iter()
            .map(|id| self.fetch_transactions(id))
            .collect()
    }
}

/// Transactions kept in memory, per account, in the order they were recorded.
/// Recording a transaction whose id is already known replaces the old record
/// where it stood: transactions are never edited, they're superseded.
#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: Vec<AccountId>,
    ledgers: HashMap<AccountId, Vec<Transaction>>,
    owners: HashMap<TxId, AccountId>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    fn ledger(&mut self, account_id: &AccountId) -> &mut Vec<Transaction> {
        if !self.ledgers.contains_key(account_id) {
            self.accounts.push(account_id.clone());
        }
        self.ledgers.entry(account_id.clone()).or_default()
    }
}

impl TransactionSink for MemoryStore {
    fn record(&mut self, tx: Transaction) {
        if let Some(owner) = self.owners.insert(tx.id.clone(), tx.account_id.clone()) {
            tracing::debug!(tx = %tx.id, "superseding earlier record");
            let ledger = self.ledger(&owner);
            if let Some(slot) = ledger.iter().position(|old| old.id == tx.id) {
                if owner == tx.account_id {
                    ledger[slot] = tx;
                    return;
                }
                ledger.remove(slot);
            }
        }
        let account_id = tx.account_id.clone();
        self.ledger(&account_id).push(tx);
    }
}

impl TransactionStore for MemoryStore {
    fn account_ids(&self) -> Vec<AccountId> {
        self.accounts.clone()
    }

    fn fetch_transactions(&self, account_id: &str) -> Result<Vec<Transaction>, Error> {
        self.ledgers
            .get(account_id)
            .cloned()
            .ok_or_else(|| Error::AccountNotFound(account_id.to_owned()))
    }
}
