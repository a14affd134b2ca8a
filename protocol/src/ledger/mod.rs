//! # Ledger Module: Fungible Accounting & Exchange-Rate Math
//!
//! Everything that counts units lives here. The vault module decides *when*
//! to move value; this module decides *how much* and refuses to let the
//! books go out of balance.
//!
//! ## Architecture
//!
//! ```text
//! math.rs    - mul_div with an explicit rounding direction
//! token.rs   - Generic fungible ledger: balances, supply, allowances
//! shares.rs  - Share ledger: a token ledger plus share/asset conversion
//! ```
//!
//! ## Design Principles
//!
//! 1. **All amounts are `u64` in smallest-unit denomination.** Intermediate
//!    products are widened to `u128`; results that don't fit are errors,
//!    never truncations.
//!
//! 2. **Rounding is a parameter, not an accident.** Every conversion names
//!    its direction at the call site so a reviewer can check it against the
//!    policy without reading the arithmetic.
//!
//! 3. **Supply is derived state kept in lockstep.** `total_supply` is
//!    updated in the same call that touches a balance, so the sum of
//!    balances equals supply after every successful operation.

pub mod math;
pub mod shares;
pub mod token;

use std::sync::Arc;

use parking_lot::RwLock;

pub use math::{mul_div, MathError, Rounding};
pub use shares::ShareLedger;
pub use token::{TokenError, TokenLedger};

/// A token ledger shared between the vault, its venue adapter, and whoever
/// hosts them. The underlying asset is the only ledger that needs this:
/// three parties move it around.
pub type SharedLedger = Arc<RwLock<TokenLedger>>;

/// Wraps a ledger for sharing.
pub fn shared(ledger: TokenLedger) -> SharedLedger {
    Arc::new(RwLock::new(ledger))
}
