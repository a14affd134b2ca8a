//! # Vault
//!
//! The tokenized vault: one underlying asset in, proportional shares out,
//! with every deposit deployed into a lending venue and every withdrawal
//! pulled back from it.
//!
//! ```text
//! core.rs     - Vault: pricing, deposit/mint, withdraw/redeem, share transfers
//! error.rs    - VaultError taxonomy
//! events.rs   - Deposit/Withdraw events and read-only snapshots
//! journal.rs  - undo log used to keep each operation all-or-nothing
//! ```
//!
//! ## Invariants
//!
//! 1. **Shares are claims, not balances.** A holder's shares are worth
//!    `shares * total_assets / total_shares` of the underlying, rounded in
//!    the vault's favour.
//!
//! 2. **Total assets is idle custody plus the venue position.** Nothing else
//!    is counted, and nothing that isn't there is counted.
//!
//! 3. **Every public write is atomic.** A failed call leaves shares,
//!    allowances, custody and the venue position exactly as it found them.

mod core;
mod error;
mod events;
mod journal;

pub use self::core::{Stage, Vault};
pub use error::VaultError;
pub use events::{VaultEvent, VaultEventKind, VaultSnapshot};
