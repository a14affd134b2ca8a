// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # yieldvault: Core Library
//!
//! A tokenized vault: users deposit an underlying asset and receive fungible
//! shares; the vault forwards everything it receives to an external lending
//! venue and recalls it on the way out. Shares are claims on whatever the
//! vault manages, so their value rises as the venue pays yield.
//!
//! The interesting part is not the plumbing. It is keeping the exchange rate
//! honest while balances move underneath it, and never leaving a half-done
//! operation behind once value has left the building.
//!
//! ## Architecture
//!
//! - **ledger** - Fungible accounting, share/asset conversion math, rounding.
//! - **venue** - The two-hook contract the vault expects from a venue.
//! - **vault** - Deposit/mint and withdraw/redeem lifecycles, previews, limits.
//! - **config** - Construction parameters and protocol constants.
//!
//! ## Design Philosophy
//!
//! 1. Rounding always favours the vault. Existing holders never subsidise
//!    the person walking in or out.
//! 2. A failed call has zero net effect. Every write keeps an undo journal.
//! 3. The vault never looks inside the venue. Supply, release, report.
//! 4. If it touches money, it has tests. Plural.

pub mod config;
pub mod ledger;
pub mod vault;
pub mod venue;

pub use config::{ConfigError, VaultConfig};
pub use ledger::{MathError, Rounding, ShareLedger, SharedLedger, TokenError, TokenLedger};
pub use vault::{Stage, Vault, VaultError, VaultEvent, VaultEventKind, VaultSnapshot};
pub use venue::{VenueAdapter, VenueError};

/// Identity of an account on any ledger. Plain strings, same as addresses
/// everywhere else in the stack (`alice`, `vault:yvUSDC`, `pool:aave-v3`).
pub type AccountId = String;
