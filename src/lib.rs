//! Ledger-embedded escrow settlement engine.
//!
//! Funds are held conditionally, signers vote to release or refund, and
//! every escrow resolves deterministically either on consensus or when its
//! deadline epoch passes and the pre-declared default policy applies.

pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
