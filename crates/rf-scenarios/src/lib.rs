//! # rf-scenarios
//!
//! Ready-made racefuzz scenarios.
//!
//! - `bank`: a shared balance with a lost-update invariant, in bracketed and
//!   unguarded variants
//! - `catalog`: small locking bugs (and their fixes) with the finding each
//!   one must produce

pub mod bank;
pub mod catalog;

pub use bank::{bank_campaign, deposit_bracketed, deposit_unguarded, BankAccount, BALANCE, GUARD};
pub use catalog::{catalog, entry, CatalogEntry, Expected};
