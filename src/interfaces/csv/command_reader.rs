use crate::domain::decision::DecisionType;
use crate::domain::escrow::DeadlineAction;
use crate::domain::{AccountId, Epoch, EscrowId};
use crate::error::{EscrowError, Result};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    /// Credit an account on the ledger (workload setup).
    Fund,
    /// Create an escrow.
    Open,
    /// Submit a signer decision.
    Decide,
    /// Move the ledger epoch forward and run the batch settlement pass.
    Advance,
}

/// One row of the command CSV.
///
/// Columns: `op, escrow, account, recipient, amount, required, signers,
/// deadline, action, decision`. Unused columns are left empty; `signers` is
/// a pipe-separated account list (`3|4|5`). `advance` reads its target epoch
/// from the `deadline` column.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Command {
    pub op: CommandType,
    pub escrow: Option<EscrowId>,
    pub account: Option<AccountId>,
    pub recipient: Option<AccountId>,
    pub amount: Option<u64>,
    pub required: Option<u32>,
    pub signers: Option<String>,
    pub deadline: Option<Epoch>,
    pub action: Option<DeadlineAction>,
    pub decision: Option<DecisionType>,
}

fn require<T>(field: Option<T>, name: &str) -> Result<T> {
    field.ok_or_else(|| EscrowError::InvalidCommand(format!("missing {name} field")))
}

impl Command {
    pub fn escrow_id(&self) -> Result<EscrowId> {
        require(self.escrow, "escrow")
    }

    pub fn account(&self) -> Result<AccountId> {
        require(self.account, "account")
    }

    pub fn recipient(&self) -> Result<AccountId> {
        require(self.recipient, "recipient")
    }

    pub fn amount(&self) -> Result<u64> {
        require(self.amount, "amount")
    }

    pub fn required(&self) -> Result<u32> {
        require(self.required, "required")
    }

    pub fn deadline(&self) -> Result<Epoch> {
        require(self.deadline, "deadline")
    }

    pub fn action(&self) -> Result<DeadlineAction> {
        require(self.action, "action")
    }

    pub fn decision_value(&self) -> Result<DecisionType> {
        require(self.decision, "decision")
    }

    /// Parses the pipe-separated signer list.
    pub fn signer_list(&self) -> Result<Vec<AccountId>> {
        let raw = require(self.signers.as_deref(), "signers")?;
        raw.split('|')
            .map(|part| {
                part.trim().parse::<AccountId>().map_err(|_| {
                    EscrowError::InvalidCommand(format!("bad signer id {part:?}"))
                })
            })
            .collect()
    }
}

/// Streams commands out of a CSV source.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(EscrowError::from))
    }
}
