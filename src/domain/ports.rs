use crate::domain::decision::{Decision, DecisionType};
use crate::domain::escrow::Escrow;
use crate::domain::{AccountId, Epoch, EscrowId};
use crate::error::Result;
use async_trait::async_trait;

/// Primary escrow record store plus the deadline secondary index.
///
/// `remove` must drop the record from both structures; `maturing` must be
/// served from the index (O(matured) rather than a full scan).
#[async_trait]
pub trait EscrowStore: Send + Sync {
    /// Inserts a new record; fails with `DuplicateId` if the id exists.
    async fn create(&self, escrow: Escrow) -> Result<()>;
    async fn get(&self, id: EscrowId) -> Result<Option<Escrow>>;
    /// Persists a status change for an existing record.
    async fn update(&self, escrow: Escrow) -> Result<()>;
    async fn remove(&self, id: EscrowId) -> Result<()>;
    /// Active escrows where `account` is sender, recipient, or a signer.
    async fn by_participant(&self, account: AccountId) -> Result<Vec<Escrow>>;
    /// Every active escrow, ordered by id. Includes records recovered from
    /// a previous process run.
    async fn all_active(&self) -> Result<Vec<Escrow>>;
    /// Ids of active escrows with `deadline_epoch <= epoch`.
    async fn maturing(&self, epoch: Epoch) -> Result<Vec<EscrowId>>;
}

/// Per-escrow decision registry. Append/overwrite only; no resolution logic.
#[async_trait]
pub trait DecisionStore: Send + Sync {
    /// Stores or overwrites the signer's decision (last write wins).
    async fn record(&self, escrow: EscrowId, account: AccountId, decision: DecisionType)
    -> Result<()>;
    async fn decisions(&self, escrow: EscrowId) -> Result<Vec<Decision>>;
    /// Drops all decisions for a retired escrow.
    async fn clear(&self, escrow: EscrowId) -> Result<()>;
}

/// The external ledger/balance collaborator.
///
/// Settlement compensates a partial split payout by debiting back the
/// credits it already applied. Implementations must therefore let a debit
/// of a freshly credited amount succeed within the same settlement: a
/// freeze taking effect between the credit and the compensating debit
/// would leave the payout half-applied.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Fails with `InsufficientFunds` or `AccountFrozen`.
    async fn debit(&self, account: AccountId, amount_planck: u64) -> Result<()>;
    /// Fails with `AccountFrozen`.
    async fn credit(&self, account: AccountId, amount_planck: u64) -> Result<()>;
    async fn current_epoch(&self) -> Result<Epoch>;
}

pub type EscrowStoreBox = Box<dyn EscrowStore>;
pub type DecisionStoreBox = Box<dyn DecisionStore>;
pub type LedgerBox = Box<dyn Ledger>;
