use crate::domain::decision::{Decision, DecisionType, Tally};
use crate::domain::escrow::{DeadlineAction, Escrow, EscrowStatus};
use crate::domain::ports::{DecisionStoreBox, EscrowStoreBox, LedgerBox};
use crate::domain::resolution::{Outcome, evaluate};
use crate::domain::{AccountId, Epoch, EscrowId};
use crate::error::{EscrowError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Parameters of an escrow creation request, validated in [`Escrow::open`].
#[derive(Debug, Clone)]
pub struct OpenEscrow {
    pub id: EscrowId,
    pub sender: AccountId,
    pub recipient: AccountId,
    pub amount_planck: u64,
    pub required_signers: u32,
    pub signers: Vec<AccountId>,
    pub deadline_epoch: Epoch,
    pub deadline_action: DeadlineAction,
}

/// Read-only projection of an escrow plus its recorded decisions, the shape
/// reporting collaborators consume.
#[derive(Debug, Serialize, Clone)]
pub struct EscrowView {
    pub id: EscrowId,
    pub sender: AccountId,
    pub recipient: AccountId,
    pub amount_planck: u64,
    pub required_signers: u32,
    pub deadline_epoch: Epoch,
    pub deadline_action: DeadlineAction,
    pub status: EscrowStatus,
    pub decisions: Vec<Decision>,
}

impl EscrowView {
    fn new(escrow: Escrow, decisions: Vec<Decision>) -> Self {
        Self {
            id: escrow.id,
            sender: escrow.sender,
            recipient: escrow.recipient,
            amount_planck: escrow.amount_planck,
            required_signers: escrow.required_signers,
            deadline_epoch: escrow.deadline_epoch,
            deadline_action: escrow.deadline_action,
            status: escrow.status,
            decisions,
        }
    }
}

/// The escrow settlement engine.
///
/// Resolution is evaluated synchronously after every decision and again in
/// the batch pass at each epoch advance. Fund movement happens exactly once
/// per escrow: a debit from the sender at open, credits at settlement.
pub struct EscrowEngine {
    escrows: EscrowStoreBox,
    decisions: DecisionStoreBox,
    ledger: LedgerBox,
    // One async mutex per escrow id currently being operated on. Guards
    // create/decide/settle so a single escrow is never mutated concurrently
    // while independent escrows proceed in parallel. Entries are evicted on
    // release, so the map never outgrows the set of in-flight operations.
    locks: Mutex<HashMap<EscrowId, Arc<Mutex<()>>>>,
}

impl EscrowEngine {
    pub fn new(escrows: EscrowStoreBox, decisions: DecisionStoreBox, ledger: LedgerBox) -> Self {
        Self {
            escrows,
            decisions,
            ledger,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock(&self, id: EscrowId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        lock.lock_owned().await
    }

    /// Releases a per-escrow lock and evicts the map entry once nothing
    /// else holds or awaits it, so late or bogus escrow ids never
    /// accumulate entries.
    async fn unlock(&self, id: EscrowId, guard: OwnedMutexGuard<()>) {
        drop(guard);
        let mut locks = self.locks.lock().await;
        // Guards and waiters each hold a clone of the Arc; a count of one
        // means the map reference is the last.
        if let Some(lock) = locks.get(&id)
            && Arc::strong_count(lock) == 1
        {
            locks.remove(&id);
        }
    }

    /// Opens a new escrow: validates the request, debits the sender, and
    /// inserts the record into the store and deadline index.
    pub async fn open(&self, request: OpenEscrow) -> Result<Escrow> {
        let escrow = Escrow::open(
            request.id,
            request.sender,
            request.recipient,
            request.amount_planck,
            request.required_signers,
            request.signers,
            request.deadline_epoch,
            request.deadline_action,
        )?;
        let id = escrow.id;

        let guard = self.lock(id).await;
        let result = self.open_locked(escrow).await;
        self.unlock(id, guard).await;
        result
    }

    async fn open_locked(&self, escrow: Escrow) -> Result<Escrow> {
        // Duplicate check before the debit so a rejected create never moves
        // funds.
        if self.escrows.get(escrow.id).await?.is_some() {
            return Err(EscrowError::DuplicateId(escrow.id));
        }
        self.ledger.debit(escrow.sender, escrow.amount_planck).await?;
        if let Err(e) = self.escrows.create(escrow.clone()).await {
            // Give the hold back; a failed create must leave no trace.
            self.ledger.credit(escrow.sender, escrow.amount_planck).await?;
            return Err(e);
        }

        info!(
            escrow = escrow.id,
            sender = escrow.sender,
            recipient = escrow.recipient,
            amount = escrow.amount_planck,
            deadline = escrow.deadline_epoch,
            "escrow opened"
        );
        Ok(escrow)
    }

    /// Records a signer decision and evaluates resolution synchronously.
    ///
    /// Returns the updated tally. A settlement failure after a consensus
    /// decision is logged and retried at the next epoch pass; the decision
    /// itself is recorded either way.
    pub async fn decide(
        &self,
        escrow_id: EscrowId,
        account: AccountId,
        decision: DecisionType,
    ) -> Result<Tally> {
        let guard = self.lock(escrow_id).await;
        let result = self.decide_locked(escrow_id, account, decision).await;
        self.unlock(escrow_id, guard).await;
        result
    }

    async fn decide_locked(
        &self,
        escrow_id: EscrowId,
        account: AccountId,
        decision: DecisionType,
    ) -> Result<Tally> {
        let escrow = self
            .escrows
            .get(escrow_id)
            .await?
            .ok_or(EscrowError::EscrowNotFound(escrow_id))?;
        if !escrow.is_active() {
            return Err(EscrowError::EscrowNotActive(escrow_id));
        }
        if !escrow.is_signer(account) {
            return Err(EscrowError::NotASigner {
                escrow: escrow_id,
                account,
            });
        }

        self.decisions.record(escrow_id, account, decision).await?;
        debug!(escrow = escrow_id, signer = account, ?decision, "decision recorded");

        let tally = Tally::count(&escrow, &self.decisions.decisions(escrow_id).await?);
        let epoch = self.ledger.current_epoch().await?;
        let outcome = evaluate(&escrow, &tally, epoch);
        if outcome != Outcome::Pending
            && let Err(e) = self.settle_locked(&escrow, outcome).await
        {
            warn!(escrow = escrow_id, error = %e, "settlement deferred to next epoch pass");
        }

        Ok(tally)
    }

    /// Batch pass over escrows maturing at or before `epoch`.
    ///
    /// Settlement failures leave the escrow active for the next pass.
    /// Returns the number of escrows settled.
    pub async fn advance_to(&self, epoch: Epoch) -> Result<u32> {
        let mut settled = 0;
        for escrow_id in self.escrows.maturing(epoch).await? {
            let guard = self.lock(escrow_id).await;
            let result = self.advance_one_locked(escrow_id, epoch).await;
            self.unlock(escrow_id, guard).await;
            match result {
                Ok(true) => settled += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(escrow = escrow_id, error = %e, "settlement failed, will retry");
                }
            }
        }
        Ok(settled)
    }

    async fn advance_one_locked(&self, escrow_id: EscrowId, epoch: Epoch) -> Result<bool> {
        // A concurrent decision path may have settled it already.
        let Some(escrow) = self.escrows.get(escrow_id).await? else {
            return Ok(false);
        };
        if !escrow.is_active() {
            return Ok(false);
        }

        let tally = Tally::count(&escrow, &self.decisions.decisions(escrow_id).await?);
        let outcome = evaluate(&escrow, &tally, epoch);
        if outcome == Outcome::Pending {
            return Ok(false);
        }
        self.settle_locked(&escrow, outcome).await?;
        Ok(true)
    }

    /// Applies an outcome to an escrow: ledger credits, then record
    /// retirement. Idempotent under retry (a replay sees the record
    /// resolved or gone and succeeds as a no-op).
    pub async fn settle(&self, escrow: &Escrow, outcome: Outcome) -> Result<()> {
        let guard = self.lock(escrow.id).await;
        let result = self.settle_locked(escrow, outcome).await;
        self.unlock(escrow.id, guard).await;
        result
    }

    async fn settle_locked(&self, escrow: &Escrow, outcome: Outcome) -> Result<()> {
        // Re-read under the lock; the caller's copy may be stale.
        let Some(mut current) = self.escrows.get(escrow.id).await? else {
            return Ok(());
        };
        if !current.is_active() {
            return Ok(());
        }

        let credits: Vec<(AccountId, u64)> = match outcome {
            Outcome::Pending => return Ok(()),
            Outcome::Release => vec![(current.recipient, current.amount_planck)],
            Outcome::Refund => vec![(current.sender, current.amount_planck)],
            Outcome::Split {
                recipient_planck,
                sender_planck,
            } => vec![
                (current.recipient, recipient_planck),
                (current.sender, sender_planck),
            ],
        };

        let mut applied: Vec<(AccountId, u64)> = Vec::new();
        for (account, amount) in credits {
            if amount == 0 {
                continue;
            }
            if let Err(e) = self.ledger.credit(account, amount).await {
                // A split must land whole or not at all; take back what was
                // already credited before reporting the failure.
                for (account, amount) in applied {
                    if let Err(rollback) = self.ledger.debit(account, amount).await {
                        warn!(escrow = current.id, error = %rollback, "credit rollback failed");
                    }
                }
                return Err(EscrowError::settlement(current.id, e));
            }
            applied.push((account, amount));
        }

        // Persist the transition before retiring the record so a replay
        // observes Resolved rather than Active.
        current.status = EscrowStatus::Resolved;
        self.escrows.update(current.clone()).await?;
        self.escrows.remove(current.id).await?;
        self.decisions.clear(current.id).await?;

        info!(escrow = current.id, ?outcome, "escrow settled");
        Ok(())
    }

    /// Current decision tally for an escrow.
    pub async fn tally(&self, escrow_id: EscrowId) -> Result<Tally> {
        let escrow = self
            .escrows
            .get(escrow_id)
            .await?
            .ok_or(EscrowError::EscrowNotFound(escrow_id))?;
        Ok(Tally::count(&escrow, &self.decisions.decisions(escrow_id).await?))
    }

    /// Read projection: a single escrow with its recorded decisions.
    pub async fn escrow(&self, id: EscrowId) -> Result<Option<EscrowView>> {
        let Some(escrow) = self.escrows.get(id).await? else {
            return Ok(None);
        };
        let decisions = self.decisions.decisions(id).await?;
        Ok(Some(EscrowView::new(escrow, decisions)))
    }

    /// Read projection: all active escrows involving `account` as sender,
    /// recipient, or signer.
    pub async fn by_participant(&self, account: AccountId) -> Result<Vec<EscrowView>> {
        let mut views = Vec::new();
        for escrow in self.escrows.by_participant(account).await? {
            let decisions = self.decisions.decisions(escrow.id).await?;
            views.push(EscrowView::new(escrow, decisions));
        }
        Ok(views)
    }

    /// Read projection: every active escrow in the store, including records
    /// recovered from a previous run.
    pub async fn active_escrows(&self) -> Result<Vec<EscrowView>> {
        let mut views = Vec::new();
        for escrow in self.escrows.all_active().await? {
            let decisions = self.decisions.decisions(escrow.id).await?;
            views.push(EscrowView::new(escrow, decisions));
        }
        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::Ledger;
    use crate::infrastructure::in_memory::{
        InMemoryDecisionStore, InMemoryEscrowStore, InMemoryLedger,
    };

    struct Fixture {
        engine: EscrowEngine,
        ledger: InMemoryLedger,
    }

    async fn fixture() -> Fixture {
        let ledger = InMemoryLedger::new();
        ledger.credit(10, 1_000).await.unwrap();
        let engine = EscrowEngine::new(
            Box::new(InMemoryEscrowStore::new()),
            Box::new(InMemoryDecisionStore::new()),
            Box::new(ledger.clone()),
        );
        Fixture { engine, ledger }
    }

    fn request(id: EscrowId) -> OpenEscrow {
        OpenEscrow {
            id,
            sender: 10,
            recipient: 20,
            amount_planck: 100,
            required_signers: 2,
            signers: vec![3, 4, 5],
            deadline_epoch: 50,
            deadline_action: DeadlineAction::Refund,
        }
    }

    #[tokio::test]
    async fn test_open_debits_sender() {
        let f = fixture().await;
        f.engine.open(request(1)).await.unwrap();
        assert_eq!(f.ledger.balance(10).await, 900);
    }

    #[tokio::test]
    async fn test_open_insufficient_funds() {
        let f = fixture().await;
        let mut req = request(1);
        req.amount_planck = 2_000;
        assert!(matches!(
            f.engine.open(req).await,
            Err(EscrowError::InsufficientFunds(10))
        ));
        assert_eq!(f.ledger.balance(10).await, 1_000);
    }

    #[tokio::test]
    async fn test_open_duplicate_id_no_double_debit() {
        let f = fixture().await;
        f.engine.open(request(1)).await.unwrap();
        assert!(matches!(
            f.engine.open(request(1)).await,
            Err(EscrowError::DuplicateId(1))
        ));
        assert_eq!(f.ledger.balance(10).await, 900);
    }

    #[tokio::test]
    async fn test_consensus_releases_before_deadline() {
        let f = fixture().await;
        f.engine.open(request(1)).await.unwrap();

        let tally = f.engine.decide(1, 3, DecisionType::Accepted).await.unwrap();
        assert_eq!(tally.accepted, 1);
        assert_eq!(f.ledger.balance(20).await, 0);

        f.engine.decide(1, 4, DecisionType::Accepted).await.unwrap();
        assert_eq!(f.ledger.balance(20).await, 100);
        assert!(f.engine.escrow(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_decide_not_a_signer() {
        let f = fixture().await;
        f.engine.open(request(1)).await.unwrap();
        assert!(matches!(
            f.engine.decide(1, 99, DecisionType::Accepted).await,
            Err(EscrowError::NotASigner { escrow: 1, account: 99 })
        ));
        let tally = f.engine.tally(1).await.unwrap();
        assert_eq!(tally.decided(), 0);
        assert_eq!(tally.undecided, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn test_decide_after_resolution() {
        let f = fixture().await;
        f.engine.open(request(1)).await.unwrap();
        f.engine.decide(1, 3, DecisionType::Accepted).await.unwrap();
        f.engine.decide(1, 4, DecisionType::Accepted).await.unwrap();

        // Record is retired after settlement.
        assert!(matches!(
            f.engine.decide(1, 5, DecisionType::Accepted).await,
            Err(EscrowError::EscrowNotFound(1))
        ));
    }

    #[tokio::test]
    async fn test_settle_is_idempotent() {
        let f = fixture().await;
        let escrow = f.engine.open(request(1)).await.unwrap();

        f.engine.settle(&escrow, Outcome::Release).await.unwrap();
        assert_eq!(f.ledger.balance(20).await, 100);

        // Replay must be a no-op, not a second credit.
        f.engine.settle(&escrow, Outcome::Release).await.unwrap();
        assert_eq!(f.ledger.balance(20).await, 100);
    }

    #[tokio::test]
    async fn test_deadline_refund_pass() {
        let f = fixture().await;
        f.engine.open(request(1)).await.unwrap();

        assert_eq!(f.engine.advance_to(49).await.unwrap(), 0);
        assert_eq!(f.engine.advance_to(50).await.unwrap(), 1);
        assert_eq!(f.ledger.balance(10).await, 1_000);
    }

    #[tokio::test]
    async fn test_settlement_failure_keeps_escrow_active() {
        let f = fixture().await;
        let mut req = request(1);
        req.deadline_action = DeadlineAction::Release;
        f.engine.open(req).await.unwrap();
        f.ledger.freeze(20).await;

        assert_eq!(f.engine.advance_to(50).await.unwrap(), 0);
        let view = f.engine.escrow(1).await.unwrap().unwrap();
        assert_eq!(view.status, EscrowStatus::Active);

        f.ledger.thaw(20).await;
        assert_eq!(f.engine.advance_to(51).await.unwrap(), 1);
        assert_eq!(f.ledger.balance(20).await, 100);
    }

    #[tokio::test]
    async fn test_split_failure_rolls_back_applied_credits() {
        let f = fixture().await;
        let mut req = request(1);
        req.deadline_action = DeadlineAction::Split;
        f.engine.open(req).await.unwrap();
        f.engine.decide(1, 3, DecisionType::Accepted).await.unwrap();
        f.engine.decide(1, 4, DecisionType::Rejected).await.unwrap();

        // The recipient leg lands first; the frozen sender leg then fails
        // and the compensating debit must take the recipient leg back.
        f.ledger.freeze(10).await;
        assert_eq!(f.engine.advance_to(50).await.unwrap(), 0);
        assert_eq!(f.ledger.balance(20).await, 0);
        let view = f.engine.escrow(1).await.unwrap().unwrap();
        assert_eq!(view.status, EscrowStatus::Active);

        f.ledger.thaw(10).await;
        assert_eq!(f.engine.advance_to(51).await.unwrap(), 1);
        assert_eq!(f.ledger.balance(20).await, 50);
        assert_eq!(f.ledger.balance(10).await, 950);
    }

    #[tokio::test]
    async fn test_decision_overwrite_single_live_vote() {
        let f = fixture().await;
        f.engine.open(request(1)).await.unwrap();

        f.engine.decide(1, 3, DecisionType::Accepted).await.unwrap();
        let tally = f.engine.decide(1, 3, DecisionType::Rejected).await.unwrap();
        assert_eq!(tally.accepted, 0);
        assert_eq!(tally.rejected, 1);
        assert_eq!(tally.undecided, vec![4, 5]);
    }

    #[tokio::test]
    async fn test_lock_map_drops_unknown_ids() {
        let f = fixture().await;
        assert!(matches!(
            f.engine.decide(999, 3, DecisionType::Accepted).await,
            Err(EscrowError::EscrowNotFound(999))
        ));
        assert!(f.engine.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_lock_map_drops_retired_ids() {
        let f = fixture().await;
        f.engine.open(request(1)).await.unwrap();
        f.engine.decide(1, 3, DecisionType::Accepted).await.unwrap();
        f.engine.decide(1, 4, DecisionType::Accepted).await.unwrap();

        // A decision arriving after settlement must not leave an entry
        // behind either.
        assert!(f.engine.decide(1, 5, DecisionType::Accepted).await.is_err());
        assert!(f.engine.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_by_participant_projection() {
        let f = fixture().await;
        f.engine.open(request(1)).await.unwrap();
        f.engine.decide(1, 3, DecisionType::Accepted).await.unwrap();

        let views = f.engine.by_participant(3).await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].decisions.len(), 1);
        assert_eq!(views[0].decisions[0].account, 3);

        assert!(f.engine.by_participant(99).await.unwrap().is_empty());
    }
}
