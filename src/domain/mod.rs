//! Domain entities and the pure resolution logic.

pub mod decision;
pub mod escrow;
pub mod ports;
pub mod resolution;

/// Ledger account identifier.
pub type AccountId = u64;
/// Escrow record identifier, unique across the ledger.
pub type EscrowId = u64;
/// Ledger epoch counter, monotonically increasing.
pub type Epoch = u64;
