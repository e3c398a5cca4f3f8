//! Application layer orchestrating the escrow lifecycle.
//!
//! `EscrowEngine` owns the storage and ledger ports and serializes all
//! mutations per escrow id, so independent escrows never block one another.

pub mod engine;
