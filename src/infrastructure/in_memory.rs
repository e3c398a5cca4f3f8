use crate::domain::decision::{Decision, DecisionType};
use crate::domain::escrow::Escrow;
use crate::domain::ports::{DecisionStore, EscrowStore, Ledger};
use crate::domain::{AccountId, Epoch, EscrowId};
use crate::error::{EscrowError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct EscrowTables {
    records: HashMap<EscrowId, Escrow>,
    // Deadline index: epoch -> ids maturing at that epoch.
    deadlines: BTreeMap<Epoch, BTreeSet<EscrowId>>,
}

/// In-memory escrow store with the deadline index kept alongside the
/// primary map under one lock, so the two never diverge.
#[derive(Default, Clone)]
pub struct InMemoryEscrowStore {
    tables: Arc<RwLock<EscrowTables>>,
}

impl InMemoryEscrowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EscrowStore for InMemoryEscrowStore {
    async fn create(&self, escrow: Escrow) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.records.contains_key(&escrow.id) {
            return Err(EscrowError::DuplicateId(escrow.id));
        }
        tables
            .deadlines
            .entry(escrow.deadline_epoch)
            .or_default()
            .insert(escrow.id);
        tables.records.insert(escrow.id, escrow);
        Ok(())
    }

    async fn get(&self, id: EscrowId) -> Result<Option<Escrow>> {
        let tables = self.tables.read().await;
        Ok(tables.records.get(&id).cloned())
    }

    async fn update(&self, escrow: Escrow) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.records.contains_key(&escrow.id) {
            return Err(EscrowError::EscrowNotFound(escrow.id));
        }
        tables.records.insert(escrow.id, escrow);
        Ok(())
    }

    async fn remove(&self, id: EscrowId) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(escrow) = tables.records.remove(&id) {
            if let Some(bucket) = tables.deadlines.get_mut(&escrow.deadline_epoch) {
                bucket.remove(&id);
                if bucket.is_empty() {
                    tables.deadlines.remove(&escrow.deadline_epoch);
                }
            }
        }
        Ok(())
    }

    async fn by_participant(&self, account: AccountId) -> Result<Vec<Escrow>> {
        let tables = self.tables.read().await;
        let mut escrows: Vec<Escrow> = tables
            .records
            .values()
            .filter(|e| e.is_active() && e.involves(account))
            .cloned()
            .collect();
        escrows.sort_by_key(|e| e.id);
        Ok(escrows)
    }

    async fn all_active(&self) -> Result<Vec<Escrow>> {
        let tables = self.tables.read().await;
        let mut escrows: Vec<Escrow> = tables
            .records
            .values()
            .filter(|e| e.is_active())
            .cloned()
            .collect();
        escrows.sort_by_key(|e| e.id);
        Ok(escrows)
    }

    async fn maturing(&self, epoch: Epoch) -> Result<Vec<EscrowId>> {
        let tables = self.tables.read().await;
        let ids = tables
            .deadlines
            .range(..=epoch)
            .flat_map(|(_, bucket)| bucket.iter().copied())
            .filter(|id| tables.records.get(id).is_some_and(Escrow::is_active))
            .collect();
        Ok(ids)
    }
}

/// In-memory decision registry.
///
/// Per-escrow maps are keyed by account, which is what gives the registry
/// its overwrite semantics: one live decision per signer.
#[derive(Default, Clone)]
pub struct InMemoryDecisionStore {
    decisions: Arc<RwLock<HashMap<EscrowId, BTreeMap<AccountId, DecisionType>>>>,
}

impl InMemoryDecisionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DecisionStore for InMemoryDecisionStore {
    async fn record(
        &self,
        escrow: EscrowId,
        account: AccountId,
        decision: DecisionType,
    ) -> Result<()> {
        let mut decisions = self.decisions.write().await;
        decisions.entry(escrow).or_default().insert(account, decision);
        Ok(())
    }

    async fn decisions(&self, escrow: EscrowId) -> Result<Vec<Decision>> {
        let decisions = self.decisions.read().await;
        Ok(decisions
            .get(&escrow)
            .map(|per_signer| {
                per_signer
                    .iter()
                    .map(|(account, decision)| Decision {
                        account: *account,
                        decision: *decision,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn clear(&self, escrow: EscrowId) -> Result<()> {
        let mut decisions = self.decisions.write().await;
        decisions.remove(&escrow);
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct AccountState {
    balance: u64,
    frozen: bool,
}

/// One row of the final balances report.
#[derive(Debug, Serialize, PartialEq, Eq, Clone)]
pub struct AccountBalance {
    pub account: AccountId,
    pub balance: u64,
    pub frozen: bool,
}

/// In-memory stand-in for the external ledger collaborator.
///
/// Tracks balances, a per-account frozen flag, and the current epoch. Used
/// by the CLI host and the test suites; a production deployment wires the
/// real ledger behind the same port.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    accounts: Arc<RwLock<HashMap<AccountId, AccountState>>>,
    epoch: Arc<RwLock<Epoch>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_epoch(&self, epoch: Epoch) {
        let mut current = self.epoch.write().await;
        // The ledger epoch never moves backwards.
        if epoch > *current {
            *current = epoch;
        }
    }

    pub async fn freeze(&self, account: AccountId) {
        let mut accounts = self.accounts.write().await;
        accounts.entry(account).or_default().frozen = true;
    }

    pub async fn thaw(&self, account: AccountId) {
        let mut accounts = self.accounts.write().await;
        accounts.entry(account).or_default().frozen = false;
    }

    pub async fn balance(&self, account: AccountId) -> u64 {
        let accounts = self.accounts.read().await;
        accounts.get(&account).map(|a| a.balance).unwrap_or(0)
    }

    /// All known accounts, sorted by id, for the final report.
    pub async fn balances(&self) -> Vec<AccountBalance> {
        let accounts = self.accounts.read().await;
        let mut rows: Vec<AccountBalance> = accounts
            .iter()
            .map(|(account, state)| AccountBalance {
                account: *account,
                balance: state.balance,
                frozen: state.frozen,
            })
            .collect();
        rows.sort_by_key(|row| row.account);
        rows
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn debit(&self, account: AccountId, amount_planck: u64) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        let state = accounts
            .get_mut(&account)
            .ok_or(EscrowError::InsufficientFunds(account))?;
        if state.frozen {
            return Err(EscrowError::AccountFrozen(account));
        }
        if state.balance < amount_planck {
            return Err(EscrowError::InsufficientFunds(account));
        }
        state.balance -= amount_planck;
        Ok(())
    }

    async fn credit(&self, account: AccountId, amount_planck: u64) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        let state = accounts.entry(account).or_default();
        if state.frozen {
            return Err(EscrowError::AccountFrozen(account));
        }
        state.balance += amount_planck;
        Ok(())
    }

    async fn current_epoch(&self) -> Result<Epoch> {
        Ok(*self.epoch.read().await)
    }
}
