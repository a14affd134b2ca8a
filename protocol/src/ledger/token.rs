//! # Fungible Token Ledger
//!
//! The bookkeeping primitive under both the vault's shares and the
//! underlying asset: balances per account, total supply, and spending
//! allowances. It knows nothing about exchange rates or venues.
//!
//! ## Invariants
//!
//! - `total_supply == sum(balances)` after every successful call.
//! - A failed call leaves the ledger untouched. Checks happen before writes.
//! - Accounts are never removed. A balance that reaches zero stays on the
//!   books as a zero.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::AccountId;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during ledger operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Minting or burning zero units. Never a meaningful request; usually a
    /// conversion that rounded to nothing.
    #[error("invalid amount: cannot mint or burn zero {symbol}")]
    InvalidAmount {
        /// Token the operation targeted.
        symbol: String,
    },

    /// Tried to move or destroy more than the account holds.
    #[error("insufficient {symbol} balance for {account}: available {available}, requested {requested}")]
    InsufficientBalance {
        /// Token being debited.
        symbol: String,
        /// Account being debited.
        account: AccountId,
        /// Current balance.
        available: u64,
        /// Amount requested.
        requested: u64,
    },

    /// A spender tried to use more than the owner approved.
    #[error("insufficient {symbol} allowance: {spender} may spend {allowance} of {owner}'s, requested {requested}")]
    InsufficientAllowance {
        /// Token being spent.
        symbol: String,
        /// Account whose balance is being spent.
        owner: AccountId,
        /// Account doing the spending.
        spender: AccountId,
        /// Remaining allowance.
        allowance: u64,
        /// Amount requested.
        requested: u64,
    },

    /// Supply or a balance would exceed `u64::MAX`.
    #[error("{symbol} supply overflow: crediting {amount} would exceed u64::MAX")]
    SupplyOverflow {
        /// Token being credited.
        symbol: String,
        /// Amount that caused the overflow.
        amount: u64,
    },
}

// ---------------------------------------------------------------------------
// TokenLedger
// ---------------------------------------------------------------------------

/// Balances, supply and allowances for a single fungible token.
///
/// Not `Sync` by itself. Share it through
/// [`SharedLedger`](super::SharedLedger) when more than one party needs to
/// move units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenLedger {
    /// Stable identifier of the token (e.g. "USDC").
    token_id: String,
    /// Display ticker. Often equal to `token_id`; for shares it is the vault
    /// symbol.
    symbol: String,
    /// Display precision. The ledger itself never divides by it.
    decimals: u8,
    /// Sum of all balances.
    total_supply: u64,
    /// Balance per account.
    balances: HashMap<AccountId, u64>,
    /// `owner -> (spender -> remaining allowance)`.
    allowances: HashMap<AccountId, HashMap<AccountId, u64>>,
}

impl TokenLedger {
    /// Creates an empty ledger with zero supply.
    pub fn new(token_id: impl Into<String>, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            token_id: token_id.into(),
            symbol: symbol.into(),
            decimals,
            total_supply: 0,
            balances: HashMap::new(),
            allowances: HashMap::new(),
        }
    }

    /// Returns the token identifier.
    pub fn token_id(&self) -> &str {
        &self.token_id
    }

    /// Returns the display ticker.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Returns the display precision.
    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// Returns the sum of all balances.
    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    /// Returns the balance of `account`, or 0 if it has never held units.
    pub fn balance_of(&self, account: &str) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Returns `true` if `account` has a record, even a zero one.
    pub fn has_record(&self, account: &str) -> bool {
        self.balances.contains_key(account)
    }

    /// Returns every account with a record, sorted by account id.
    pub fn holders(&self) -> Vec<(AccountId, u64)> {
        let mut holders: Vec<_> = self
            .balances
            .iter()
            .map(|(account, balance)| (account.clone(), *balance))
            .collect();
        holders.sort();
        holders
    }

    /// Sum of balances computed from scratch. Widened so a corrupted ledger
    /// can't hide behind overflow.
    pub fn balance_sum(&self) -> u128 {
        self.balances.values().map(|b| u128::from(*b)).sum()
    }

    // -----------------------------------------------------------------------
    // Supply
    // -----------------------------------------------------------------------

    /// Creates `amount` new units in `to`'s balance.
    ///
    /// Returns the recipient's new balance.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidAmount`] for a zero amount and
    /// [`TokenError::SupplyOverflow`] if supply or the balance would overflow.
    pub fn mint(&mut self, to: &str, amount: u64) -> Result<u64, TokenError> {
        if amount == 0 {
            return Err(self.invalid_amount());
        }

        let new_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or_else(|| self.overflow(amount))?;
        // Can't overflow if supply didn't: balance <= supply.
        let balance = self.balances.entry(to.to_string()).or_insert(0);
        *balance += amount;
        let new_balance = *balance;
        self.total_supply = new_supply;

        Ok(new_balance)
    }

    /// Destroys `amount` units from `from`'s balance.
    ///
    /// Returns the holder's remaining balance.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidAmount`] for a zero amount and
    /// [`TokenError::InsufficientBalance`] if `from` holds less than `amount`.
    pub fn burn(&mut self, from: &str, amount: u64) -> Result<u64, TokenError> {
        if amount == 0 {
            return Err(self.invalid_amount());
        }
        self.ensure_balance(from, amount)?;

        let remaining = self.debit_unchecked(from, amount);
        self.total_supply -= amount;

        Ok(remaining)
    }

    // -----------------------------------------------------------------------
    // Transfers
    // -----------------------------------------------------------------------

    /// Moves `amount` units from `from` to `to`. A zero transfer is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InsufficientBalance`] if `from` holds less than
    /// `amount`.
    pub fn transfer(&mut self, from: &str, to: &str, amount: u64) -> Result<(), TokenError> {
        if amount == 0 {
            return Ok(());
        }
        self.ensure_balance(from, amount)?;
        if from == to {
            return Ok(());
        }

        self.debit_unchecked(from, amount);
        // Can't overflow: the units already existed in `from`, and the sum
        // of all balances is bounded by supply.
        *self.balances.entry(to.to_string()).or_insert(0) += amount;

        Ok(())
    }

    /// Moves `amount` of `from`'s units to `to` on behalf of `spender`,
    /// consuming allowance.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InsufficientAllowance`] or
    /// [`TokenError::InsufficientBalance`]; either way nothing changes.
    pub fn transfer_from(
        &mut self,
        spender: &str,
        from: &str,
        to: &str,
        amount: u64,
    ) -> Result<(), TokenError> {
        self.ensure_allowance(from, spender, amount)?;
        self.ensure_balance(from, amount)?;
        self.spend_allowance(from, spender, amount)?;
        self.transfer(from, to, amount)
    }

    // -----------------------------------------------------------------------
    // Allowances
    // -----------------------------------------------------------------------

    /// Sets `spender`'s allowance over `owner`'s units to exactly `amount`.
    ///
    /// Returns the previous allowance so callers can restore it.
    pub fn approve(&mut self, owner: &str, spender: &str, amount: u64) -> u64 {
        let previous = self.allowance(owner, spender);
        if amount == 0 {
            if let Some(spenders) = self.allowances.get_mut(owner) {
                spenders.remove(spender);
                if spenders.is_empty() {
                    self.allowances.remove(owner);
                }
            }
        } else {
            self.allowances
                .entry(owner.to_string())
                .or_default()
                .insert(spender.to_string(), amount);
        }
        previous
    }

    /// Returns how much of `owner`'s balance `spender` may still move.
    pub fn allowance(&self, owner: &str, spender: &str) -> u64 {
        self.allowances
            .get(owner)
            .and_then(|spenders| spenders.get(spender))
            .copied()
            .unwrap_or(0)
    }

    /// Consumes `amount` of `spender`'s allowance over `owner`'s units.
    ///
    /// An allowance of `u64::MAX` is treated as unlimited and never
    /// decremented. Returns the allowance before spending.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InsufficientAllowance`] if the allowance is
    /// smaller than `amount`.
    pub fn spend_allowance(
        &mut self,
        owner: &str,
        spender: &str,
        amount: u64,
    ) -> Result<u64, TokenError> {
        let current = self.ensure_allowance(owner, spender, amount)?;
        if current != u64::MAX && amount > 0 {
            self.approve(owner, spender, current - amount);
        }
        Ok(current)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn ensure_balance(&self, account: &str, amount: u64) -> Result<(), TokenError> {
        let available = self.balance_of(account);
        if available < amount {
            return Err(TokenError::InsufficientBalance {
                symbol: self.symbol.clone(),
                account: account.to_string(),
                available,
                requested: amount,
            });
        }
        Ok(())
    }

    fn ensure_allowance(&self, owner: &str, spender: &str, amount: u64) -> Result<u64, TokenError> {
        let allowance = self.allowance(owner, spender);
        if allowance < amount {
            return Err(TokenError::InsufficientAllowance {
                symbol: self.symbol.clone(),
                owner: owner.to_string(),
                spender: spender.to_string(),
                allowance,
                requested: amount,
            });
        }
        Ok(allowance)
    }

    /// Caller must have checked the balance.
    fn debit_unchecked(&mut self, account: &str, amount: u64) -> u64 {
        let balance = self.balances.entry(account.to_string()).or_insert(0);
        *balance -= amount;
        *balance
    }

    fn invalid_amount(&self) -> TokenError {
        TokenError::InvalidAmount {
            symbol: self.symbol.clone(),
        }
    }

    fn overflow(&self, amount: u64) -> TokenError {
        TokenError::SupplyOverflow {
            symbol: self.symbol.clone(),
            amount,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
