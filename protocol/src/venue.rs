//! # Venue Adapter Contract
//!
//! The vault talks to its lending venue through exactly two hooks:
//!
//! ```text
//! deposit:   ... mint shares  ──▶ approve(amount); supply(amount)
//! withdraw:  release(amount) ──▶ burn shares ... pay receiver
//! ```
//!
//! Everything else on this trait is a read: identities checked once at
//! construction, and the position value the vault needs to price shares.
//!
//! ## Contract
//!
//! - `supply` moves `amount` of the underlying from the vault's custody
//!   account to the venue and credits the vault's position. It either moves
//!   the full amount or nothing.
//! - `release` moves `amount` back from the venue into custody and debits
//!   the position. Same all-or-nothing rule.
//! - `approve` grants the venue the right to pull exactly `amount`. The
//!   vault calls it right before each `supply` and revokes it if the supply
//!   fails.
//! - Adapters must not call back into the vault. Nothing here defends
//!   against it; `&mut` borrows make it awkward to even write.

use thiserror::Error;

/// Why a venue refused or failed a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VenueError {
    /// The venue does not hold enough free liquidity to release the amount.
    #[error("insufficient venue liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity {
        /// Amount the vault asked for.
        requested: u64,
        /// Amount the venue could actually release.
        available: u64,
    },

    /// The venue tried to pull more than the vault approved.
    #[error("venue pull exceeds approval: approved {approved}, requested {requested}")]
    InsufficientAllowance {
        /// Amount currently approved.
        approved: u64,
        /// Amount the venue tried to pull.
        requested: u64,
    },

    /// The venue's market for this asset is frozen.
    #[error("venue market for {asset} is frozen")]
    Frozen {
        /// The frozen asset.
        asset: String,
    },

    /// Any other refusal, with the venue's own explanation.
    #[error("venue rejected the request: {0}")]
    Rejected(String),
}

/// A lending venue as seen from the vault.
///
/// `Send` so a vault can be moved behind a mutex in a server.
pub trait VenueAdapter: Send {
    /// Identity of the venue (e.g. "aave-v3").
    fn venue_id(&self) -> &str;

    /// Identity of the position token the vault receives (e.g. "aUSDC").
    fn position_token(&self) -> &str;

    /// Underlying asset the position token is denominated in. The vault
    /// adopts this as its own asset.
    fn underlying_asset(&self) -> &str;

    /// Account on the underlying ledger whose position this adapter manages
    /// and which receives released funds.
    fn beneficiary(&self) -> &str;

    /// Current value of the position, in underlying units. Includes accrued
    /// yield.
    fn position_value(&self) -> u64;

    /// How much the venue could release right now. Never more than
    /// [`position_value`](Self::position_value).
    fn available_liquidity(&self) -> u64 {
        self.position_value()
    }

    /// Whether `supply` would currently be accepted at all.
    fn accepts_deposits(&self) -> bool {
        true
    }

    /// Lets the venue pull exactly `amount` from the beneficiary's custody
    /// on the next `supply`.
    fn approve(&mut self, amount: u64);

    /// Moves `amount` into the venue, crediting the position.
    ///
    /// # Errors
    ///
    /// Any [`VenueError`]; on error the venue has moved nothing.
    fn supply(&mut self, amount: u64) -> Result<(), VenueError>;

    /// Moves `amount` out of the venue into the beneficiary's custody,
    /// debiting the position.
    ///
    /// # Errors
    ///
    /// [`VenueError::InsufficientLiquidity`] if the venue can't return the
    /// full amount; on error the venue has moved nothing.
    fn release(&mut self, amount: u64) -> Result<(), VenueError>;
}
