//! Pure resolution logic: `(escrow, tally, epoch) -> Outcome`.
//!
//! Every node must compute the same outcome from the same inputs, so this
//! module performs no I/O and consults no clock beyond the epoch argument.

use crate::domain::Epoch;
use crate::domain::decision::Tally;
use crate::domain::escrow::{DeadlineAction, Escrow};

/// The settlement implied by an escrow's current state.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Outcome {
    /// No consensus yet and the deadline has not passed; escrow stays active.
    Pending,
    /// Full amount to the recipient.
    Release,
    /// Full amount back to the sender.
    Refund,
    /// Amount divided between recipient and sender per the decided votes.
    Split {
        recipient_planck: u64,
        sender_planck: u64,
    },
}

/// Evaluates an escrow against its decision tally at `epoch`.
///
/// The steps are ordered: consensus is checked before the deadline policy,
/// so consensus wins even when both conditions hold at the same epoch.
pub fn evaluate(escrow: &Escrow, tally: &Tally, epoch: Epoch) -> Outcome {
    if tally.accepted >= escrow.required_signers {
        return Outcome::Release;
    }
    if tally.rejected >= escrow.required_signers {
        return Outcome::Refund;
    }
    if epoch < escrow.deadline_epoch {
        return Outcome::Pending;
    }

    match escrow.deadline_action {
        DeadlineAction::Release => Outcome::Release,
        DeadlineAction::Refund => Outcome::Refund,
        // No declared default is a contract bug, but funds must never
        // strand: refund is the conservative resolution.
        DeadlineAction::Undecided => Outcome::Refund,
        DeadlineAction::Split => split(escrow.amount_planck, tally),
    }
}

/// Divides `amount` proportionally to the accepted share of decided votes,
/// remainder to the sender. With no decided votes there is nothing to
/// apportion and the whole amount refunds.
fn split(amount: u64, tally: &Tally) -> Outcome {
    let decided = tally.decided();
    if decided == 0 {
        return Outcome::Refund;
    }
    let recipient_planck =
        (u128::from(amount) * u128::from(tally.accepted) / u128::from(decided)) as u64;
    Outcome::Split {
        recipient_planck,
        sender_planck: amount - recipient_planck,
    }
}
