//! # Share Ledger
//!
//! A [`TokenLedger`] for vault shares, plus the exchange rate between shares
//! and the underlying asset:
//!
//! ```text
//! shares_for(assets) = assets * total_shares / total_assets
//! assets_for(shares) = shares * total_assets / total_shares
//! ```
//!
//! While no shares exist the rate is fixed at 1:1
//! ([`INITIAL_SHARES_PER_ASSET`]); there is nothing to divide by.
//!
//! The ledger doesn't know `total_assets`. The vault measures it (idle
//! balance plus venue position) and passes it in, so conversions stay pure
//! and can be computed before anything is committed.

use serde::{Deserialize, Serialize};

use super::math::{mul_div, MathError, Rounding};
use super::token::{TokenError, TokenLedger};
use crate::config::INITIAL_SHARES_PER_ASSET;
use crate::AccountId;

/// Share balances and supply, with conversion to and from the underlying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareLedger {
    token: TokenLedger,
}

impl ShareLedger {
    /// Creates an empty share ledger. Shares are identified by the vault's
    /// symbol and carry the underlying asset's precision.
    pub fn new(symbol: impl Into<String>, decimals: u8) -> Self {
        let symbol = symbol.into();
        Self {
            token: TokenLedger::new(symbol.clone(), symbol, decimals),
        }
    }

    /// Total shares outstanding.
    pub fn total_shares(&self) -> u64 {
        self.token.total_supply()
    }

    /// Shares held by `holder`.
    pub fn balance_of(&self, holder: &str) -> u64 {
        self.token.balance_of(holder)
    }

    /// Read access to the underlying token ledger.
    pub fn token(&self) -> &TokenLedger {
        &self.token
    }

    // -----------------------------------------------------------------------
    // Conversion
    // -----------------------------------------------------------------------

    /// Shares equivalent to `assets`, given the vault manages `total_assets`.
    ///
    /// # Errors
    ///
    /// [`MathError::DivisionByZero`] if shares are outstanding against zero
    /// managed assets; [`MathError::Overflow`] if the result exceeds `u64`.
    pub fn convert_to_shares(
        &self,
        assets: u64,
        total_assets: u64,
        rounding: Rounding,
    ) -> Result<u64, MathError> {
        let supply = self.total_shares();
        if supply == 0 {
            return assets
                .checked_mul(INITIAL_SHARES_PER_ASSET)
                .ok_or(MathError::Overflow);
        }
        mul_div(assets, supply, total_assets, rounding)
    }

    /// Underlying units equivalent to `shares`, given the vault manages
    /// `total_assets`.
    ///
    /// # Errors
    ///
    /// [`MathError::Overflow`] if the result exceeds `u64`.
    pub fn convert_to_assets(
        &self,
        shares: u64,
        total_assets: u64,
        rounding: Rounding,
    ) -> Result<u64, MathError> {
        let supply = self.total_shares();
        if supply == 0 {
            return Ok(match rounding {
                Rounding::Down => shares / INITIAL_SHARES_PER_ASSET,
                Rounding::Up => shares.div_ceil(INITIAL_SHARES_PER_ASSET),
            });
        }
        mul_div(shares, total_assets, supply, rounding)
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Issues `shares` to `holder`. Returns the holder's new balance.
    ///
    /// # Errors
    ///
    /// [`TokenError::InvalidAmount`] for zero shares,
    /// [`TokenError::SupplyOverflow`] if supply would overflow.
    pub fn mint(&mut self, holder: &str, shares: u64) -> Result<u64, TokenError> {
        self.token.mint(holder, shares)
    }

    /// Destroys `shares` held by `holder`. Returns the remaining balance.
    ///
    /// # Errors
    ///
    /// [`TokenError::InvalidAmount`] for zero shares,
    /// [`TokenError::InsufficientBalance`] if `holder` has fewer shares.
    pub fn burn(&mut self, holder: &str, shares: u64) -> Result<u64, TokenError> {
        self.token.burn(holder, shares)
    }

    /// Moves shares between holders. The exchange rate is unaffected.
    ///
    /// # Errors
    ///
    /// [`TokenError::InsufficientBalance`] if `from` has fewer shares.
    pub fn transfer(&mut self, from: &str, to: &str, shares: u64) -> Result<(), TokenError> {
        self.token.transfer(from, to, shares)
    }

    /// Moves `from`'s shares on behalf of `spender`.
    ///
    /// # Errors
    ///
    /// [`TokenError::InsufficientAllowance`] or
    /// [`TokenError::InsufficientBalance`].
    pub fn transfer_from(
        &mut self,
        spender: &str,
        from: &str,
        to: &str,
        shares: u64,
    ) -> Result<(), TokenError> {
        self.token.transfer_from(spender, from, to, shares)
    }

    /// Sets `spender`'s allowance over `owner`'s shares. Returns the previous
    /// allowance.
    pub fn approve(&mut self, owner: &str, spender: &str, shares: u64) -> u64 {
        self.token.approve(owner, spender, shares)
    }

    /// Remaining share allowance.
    pub fn allowance(&self, owner: &str, spender: &str) -> u64 {
        self.token.allowance(owner, spender)
    }

    /// Consumes share allowance. Returns the allowance before spending.
    ///
    /// # Errors
    ///
    /// [`TokenError::InsufficientAllowance`] if the allowance is too small.
    pub fn spend_allowance(
        &mut self,
        owner: &str,
        spender: &str,
        shares: u64,
    ) -> Result<u64, TokenError> {
        self.token.spend_allowance(owner, spender, shares)
    }

    /// Every holder record, sorted.
    pub fn holders(&self) -> Vec<(AccountId, u64)> {
        self.token.holders()
    }
}
