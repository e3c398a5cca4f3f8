use crate::domain::{AccountId, Epoch, EscrowId};
use crate::error::{EscrowError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Default policy applied when the deadline passes without consensus.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum DeadlineAction {
    Undecided,
    Release,
    Refund,
    Split,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum EscrowStatus {
    Active,
    Resolved,
}

/// A conditional fund hold.
///
/// The amount is debited from the sender when the escrow is opened and moves
/// only at settlement. All fields other than `status` are immutable after
/// creation; `status` transitions `Active -> Resolved` exactly once.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Escrow {
    pub id: EscrowId,
    pub sender: AccountId,
    pub recipient: AccountId,
    /// Held amount in the ledger's smallest unit.
    pub amount_planck: u64,
    /// Matching decisions needed for early consensus resolution.
    pub required_signers: u32,
    pub signers: BTreeSet<AccountId>,
    pub deadline_epoch: Epoch,
    pub deadline_action: DeadlineAction,
    pub status: EscrowStatus,
}

impl Escrow {
    /// Validates and builds a new `Active` escrow record.
    ///
    /// The signer list is taken as given by the creation transaction, so
    /// duplicates are a caller error rather than something to deduplicate
    /// silently.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        id: EscrowId,
        sender: AccountId,
        recipient: AccountId,
        amount_planck: u64,
        required_signers: u32,
        signers: Vec<AccountId>,
        deadline_epoch: Epoch,
        deadline_action: DeadlineAction,
    ) -> Result<Self> {
        if amount_planck == 0 {
            return Err(EscrowError::InvalidAmount);
        }
        if signers.is_empty() {
            return Err(EscrowError::InvalidSignerSet(
                "signer set is empty".to_string(),
            ));
        }
        let signer_set: BTreeSet<AccountId> = signers.iter().copied().collect();
        if signer_set.len() != signers.len() {
            return Err(EscrowError::InvalidSignerSet(
                "duplicate signer in set".to_string(),
            ));
        }
        if required_signers == 0 || required_signers as usize > signer_set.len() {
            return Err(EscrowError::InvalidSignerSet(format!(
                "required {} of {} signers",
                required_signers,
                signer_set.len()
            )));
        }

        Ok(Self {
            id,
            sender,
            recipient,
            amount_planck,
            required_signers,
            signers: signer_set,
            deadline_epoch,
            deadline_action,
            status: EscrowStatus::Active,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == EscrowStatus::Active
    }

    pub fn is_signer(&self, account: AccountId) -> bool {
        self.signers.contains(&account)
    }

    /// Whether `account` is the sender, the recipient, or one of the signers.
    pub fn involves(&self, account: AccountId) -> bool {
        self.sender == account || self.recipient == account || self.is_signer(account)
    }
}
