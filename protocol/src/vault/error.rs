//! Error types for the vault lifecycle.
//!
//! Every public vault operation that can fail returns a [`VaultError`].
//! Whatever the variant, the failed call has had no net effect: shares,
//! allowances, custody and the venue position are as they were.

use thiserror::Error;

use crate::config::ConfigError;
use crate::ledger::{MathError, TokenError};
use crate::venue::VenueError;
use crate::AccountId;

/// Errors returned by [`Vault`](super::Vault) operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VaultError {
    /// The requested amount was zero.
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// The request is non-zero but converts to zero on the other side of the
    /// exchange rate. Minting or burning nothing would let dust through.
    #[error("invalid amount: {requested} {denomination} converts to zero")]
    InvalidAmount {
        /// The amount the caller asked for.
        requested: u64,
        /// What `requested` was denominated in: "assets" or "shares".
        denomination: &'static str,
    },

    /// The owner holds fewer shares than the operation burns or moves.
    #[error("insufficient shares for {holder}: holds {available}, needs {required}")]
    InsufficientBalance {
        /// Share holder being debited.
        holder: AccountId,
        /// Shares the holder has.
        available: u64,
        /// Shares the operation needs.
        required: u64,
    },

    /// The caller acts for an owner without enough share allowance.
    #[error("insufficient share allowance: {spender} may spend {allowance} of {owner}'s shares, needs {required}")]
    InsufficientAllowance {
        /// Share owner.
        owner: AccountId,
        /// Caller acting on the owner's behalf.
        spender: AccountId,
        /// Remaining allowance.
        allowance: u64,
        /// Shares the operation needs.
        required: u64,
    },

    /// The depositor doesn't hold the underlying it is trying to deposit.
    #[error("insufficient {asset} for {account}: holds {available}, needs {required}")]
    InsufficientAssets {
        /// Underlying asset.
        asset: String,
        /// Account being debited.
        account: AccountId,
        /// Units the account has.
        available: u64,
        /// Units the operation needs.
        required: u64,
    },

    /// The venue refused or could not complete a supply or release.
    #[error("venue unavailable: {0}")]
    VenueUnavailable(#[source] VenueError),

    /// Exchange-rate math failed.
    #[error("conversion failed: {0}")]
    Math(#[from] MathError),

    /// A ledger failure with no more specific vault meaning (supply
    /// overflow, in practice).
    #[error("ledger error: {0}")]
    Ledger(#[source] TokenError),

    /// Construction parameters were rejected.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl VaultError {
    /// Maps a share-ledger failure onto the vault taxonomy.
    pub(crate) fn from_shares(err: TokenError, requested: u64) -> Self {
        match err {
            TokenError::InvalidAmount { .. } => VaultError::InvalidAmount {
                requested,
                denomination: "shares",
            },
            TokenError::InsufficientBalance {
                account,
                available,
                requested,
                ..
            } => VaultError::InsufficientBalance {
                holder: account,
                available,
                required: requested,
            },
            TokenError::InsufficientAllowance {
                owner,
                spender,
                allowance,
                requested,
                ..
            } => VaultError::InsufficientAllowance {
                owner,
                spender,
                allowance,
                required: requested,
            },
            other => VaultError::Ledger(other),
        }
    }

    /// Maps an underlying-asset ledger failure onto the vault taxonomy.
    pub(crate) fn from_assets(err: TokenError) -> Self {
        match err {
            TokenError::InsufficientBalance {
                symbol,
                account,
                available,
                requested,
            } => VaultError::InsufficientAssets {
                asset: symbol,
                account,
                available,
                required: requested,
            },
            other => VaultError::Ledger(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_shortfall_maps_to_insufficient_balance() {
        let err = VaultError::from_shares(
            TokenError::InsufficientBalance {
                symbol: "yvUSDC".into(),
                account: "alice".into(),
                available: 5,
                requested: 9,
            },
            9,
        );
        assert_eq!(
            err,
            VaultError::InsufficientBalance {
                holder: "alice".into(),
                available: 5,
                required: 9,
            }
        );
    }

    #[test]
    fn zero_share_amount_maps_to_invalid_amount() {
        let err = VaultError::from_shares(
            TokenError::InvalidAmount {
                symbol: "yvUSDC".into(),
            },
            0,
        );
        assert!(matches!(
            err,
            VaultError::InvalidAmount {
                denomination: "shares",
                ..
            }
        ));
    }

    #[test]
    fn asset_shortfall_maps_to_insufficient_assets() {
        let err = VaultError::from_assets(TokenError::InsufficientBalance {
            symbol: "USDC".into(),
            account: "bob".into(),
            available: 1,
            requested: 2,
        });
        assert!(matches!(err, VaultError::InsufficientAssets { available: 1, required: 2, .. }));
    }

    #[test]
    fn venue_errors_keep_their_source() {
        let err = VaultError::VenueUnavailable(VenueError::InsufficientLiquidity {
            requested: 501,
            available: 500,
        });
        assert_eq!(
            err.to_string(),
            "venue unavailable: insufficient venue liquidity: requested 501, available 500"
        );
    }
}
