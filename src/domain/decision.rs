use crate::domain::AccountId;
use crate::domain::escrow::Escrow;
use serde::{Deserialize, Serialize};

/// One signer's vote on an escrow.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum DecisionType {
    Undecided,
    /// Vote to release the held amount to the recipient.
    Accepted,
    /// Vote to refund the held amount to the sender.
    Rejected,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub struct Decision {
    pub account: AccountId,
    pub decision: DecisionType,
}

/// Aggregated decision counts for one escrow.
///
/// Each signer contributes at most one live decision (last write wins), so
/// `accepted + rejected + undecided.len()` always equals the signer set size.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Tally {
    pub accepted: u32,
    pub rejected: u32,
    pub undecided: Vec<AccountId>,
}

impl Tally {
    /// Builds the tally from the registry contents for `escrow`.
    ///
    /// Decisions from accounts outside the signer set are ignored rather
    /// than counted; the registry never stores them, but a stale record
    /// must not corrupt the consensus count.
    pub fn count(escrow: &Escrow, decisions: &[Decision]) -> Self {
        let mut tally = Tally::default();
        for signer in &escrow.signers {
            let decided = decisions
                .iter()
                .find(|d| d.account == *signer)
                .map(|d| d.decision)
                .unwrap_or(DecisionType::Undecided);
            match decided {
                DecisionType::Accepted => tally.accepted += 1,
                DecisionType::Rejected => tally.rejected += 1,
                DecisionType::Undecided => tally.undecided.push(*signer),
            }
        }
        tally
    }

    pub fn decided(&self) -> u32 {
        self.accepted + self.rejected
    }
}
