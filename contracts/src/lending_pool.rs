//! # Lending Pool
//!
//! An in-process lending market the vault can deploy into. One reserve per
//! asset, each tracking supplier positions as *scaled* balances against a
//! liquidity index:
//!
//! ```text
//! position(owner) = scaled(owner) * liquidity_index / WAD
//! ```
//!
//! Yield raises the index, so every supplier's position grows in proportion
//! without touching individual balances. Borrows take cash out of the
//! reserve; until they are repaid, suppliers can't withdraw what isn't there.
//!
//! The pool holds real underlying on the asset's [`TokenLedger`] under its
//! own account. Suppliers must approve that account before calling
//! [`supply`](LendingPool::supply), which pulls exactly the approved amount.
//!
//! Rounding always favours the pool: scaled balances are minted rounded down
//! and burned rounded up, and positions are read rounded down.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use yieldvault::{AccountId, TokenError, TokenLedger};

/// Fixed-point unit of the liquidity index (1.0).
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// Prefix of the account a pool holds reserves under.
pub const POOL_ACCOUNT_PREFIX: &str = "pool:";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during pool operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// No reserve is listed for this asset.
    #[error("no reserve for asset {0}")]
    UnknownReserve(String),

    /// A reserve for this asset is already listed.
    #[error("reserve for asset {0} already exists")]
    ReserveExists(String),

    /// The ledger passed in tracks a different token than the reserve.
    #[error("ledger tracks {ledger}, reserve is for {reserve}")]
    AssetMismatch {
        /// Asset of the reserve.
        reserve: String,
        /// Token tracked by the ledger.
        ledger: String,
    },

    /// The operation needs a non-zero amount.
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// The reserve is frozen: no new supply or borrows.
    #[error("reserve {0} is frozen")]
    Frozen(String),

    /// Not enough cash in the reserve.
    #[error("insufficient liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity {
        /// Amount asked for.
        requested: u64,
        /// Cash on hand.
        available: u64,
    },

    /// The owner's position is smaller than the withdrawal.
    #[error("insufficient position for {owner}: holds {position}, requested {requested}")]
    InsufficientPosition {
        /// Position owner.
        owner: AccountId,
        /// Current position value.
        position: u64,
        /// Amount asked for.
        requested: u64,
    },

    /// Repaying more than is owed.
    #[error("overpayment: attempted to repay {attempted} but only {outstanding} outstanding")]
    Overpayment {
        /// Amount the borrower tried to repay.
        attempted: u64,
        /// Remaining debt.
        outstanding: u64,
    },

    /// Yield can't be distributed to an empty reserve.
    #[error("reserve {0} has no suppliers")]
    NoSuppliers(String),

    /// Index or balance arithmetic overflowed.
    #[error("arithmetic overflow")]
    Overflow,

    /// The underlying ledger refused the transfer.
    #[error(transparent)]
    Ledger(#[from] TokenError),
}

// ---------------------------------------------------------------------------
// Reserve
// ---------------------------------------------------------------------------

/// State of one listed asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reserve {
    /// Underlying asset id.
    pub asset: String,
    /// Symbol of the position token suppliers receive (e.g. "aUSDC").
    pub position_token: String,
    /// Current liquidity index, in [`WAD`] units. Starts at 1.0.
    pub liquidity_index: u128,
    /// Sum of all scaled balances.
    pub total_scaled: u128,
    /// Underlying held by the pool for this reserve.
    pub cash: u64,
    /// Underlying currently lent out.
    pub borrowed: u64,
    /// Frozen reserves accept withdrawals and repayments only.
    pub frozen: bool,
    scaled: HashMap<AccountId, u128>,
    debts: HashMap<AccountId, u64>,
}

impl Reserve {
    fn new(asset: String, position_token: String) -> Self {
        Self {
            asset,
            position_token,
            liquidity_index: WAD,
            total_scaled: 0,
            cash: 0,
            borrowed: 0,
            frozen: false,
            scaled: HashMap::new(),
            debts: HashMap::new(),
        }
    }

    /// Value of `owner`'s position, rounded down.
    pub fn position_of(&self, owner: &str) -> u64 {
        let scaled = self.scaled.get(owner).copied().unwrap_or(0);
        self.to_underlying(scaled).unwrap_or(u64::MAX)
    }

    /// Value of every position combined, rounded down.
    pub fn total_supplied(&self) -> u64 {
        self.to_underlying(self.total_scaled).unwrap_or(u64::MAX)
    }

    /// Outstanding debt of `borrower`.
    pub fn debt_of(&self, borrower: &str) -> u64 {
        self.debts.get(borrower).copied().unwrap_or(0)
    }

    fn to_underlying(&self, scaled: u128) -> Result<u64, PoolError> {
        let value = scaled
            .checked_mul(self.liquidity_index)
            .ok_or(PoolError::Overflow)?
            / WAD;
        u64::try_from(value).map_err(|_| PoolError::Overflow)
    }

    fn to_scaled(&self, amount: u64, round_up: bool) -> Result<u128, PoolError> {
        let numerator = u128::from(amount)
            .checked_mul(WAD)
            .ok_or(PoolError::Overflow)?;
        let scaled = numerator / self.liquidity_index;
        if round_up && numerator % self.liquidity_index != 0 {
            return Ok(scaled + 1);
        }
        Ok(scaled)
    }
}

// ---------------------------------------------------------------------------
// LendingPool
// ---------------------------------------------------------------------------

/// A multi-reserve lending market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LendingPool {
    id: String,
    account: AccountId,
    reserves: HashMap<String, Reserve>,
}

impl LendingPool {
    /// Creates an empty pool. Reserves are held under `pool:<id>`.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            account: format!("{POOL_ACCOUNT_PREFIX}{id}"),
            id,
            reserves: HashMap::new(),
        }
    }

    /// Pool identity (e.g. "aave-v3").
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Account the pool holds underlying under, and the spender suppliers
    /// must approve.
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Lists a new asset.
    ///
    /// # Errors
    ///
    /// [`PoolError::ReserveExists`] if the asset is already listed.
    pub fn init_reserve(
        &mut self,
        asset: impl Into<String>,
        position_token: impl Into<String>,
    ) -> Result<(), PoolError> {
        let asset = asset.into();
        if self.reserves.contains_key(&asset) {
            return Err(PoolError::ReserveExists(asset));
        }
        let position_token = position_token.into();
        info!(pool = %self.id, asset = %asset, position_token = %position_token, "reserve listed");
        self.reserves
            .insert(asset.clone(), Reserve::new(asset, position_token));
        Ok(())
    }

    /// Reserve state for `asset`.
    pub fn reserve(&self, asset: &str) -> Option<&Reserve> {
        self.reserves.get(asset)
    }

    /// Value of `owner`'s position in `asset`. Zero if unlisted.
    pub fn position_of(&self, asset: &str, owner: &str) -> u64 {
        self.reserves
            .get(asset)
            .map(|r| r.position_of(owner))
            .unwrap_or(0)
    }

    /// Cash that could be withdrawn or borrowed from `asset` right now.
    pub fn available_liquidity(&self, asset: &str) -> u64 {
        self.reserves.get(asset).map(|r| r.cash).unwrap_or(0)
    }

    /// Supplies `amount` of `asset` pulled from `from`, crediting
    /// `on_behalf_of`'s position. `from` must have approved the pool account.
    ///
    /// # Errors
    ///
    /// [`PoolError::Frozen`], [`PoolError::ZeroAmount`], or
    /// [`PoolError::Ledger`] if the allowance or balance falls short. Nothing
    /// moves on error.
    pub fn supply(
        &mut self,
        ledger: &mut TokenLedger,
        from: &str,
        asset: &str,
        amount: u64,
        on_behalf_of: &str,
    ) -> Result<(), PoolError> {
        if amount == 0 {
            return Err(PoolError::ZeroAmount);
        }
        let account = self.account.clone();
        let reserve = Self::reserve_for(&mut self.reserves, ledger, asset)?;
        if reserve.frozen {
            return Err(PoolError::Frozen(asset.to_string()));
        }

        let scaled = reserve.to_scaled(amount, false)?;
        let cash = reserve.cash.checked_add(amount).ok_or(PoolError::Overflow)?;
        let total_scaled = reserve
            .total_scaled
            .checked_add(scaled)
            .ok_or(PoolError::Overflow)?;

        ledger.transfer_from(&account, from, &account, amount)?;

        reserve.cash = cash;
        reserve.total_scaled = total_scaled;
        *reserve.scaled.entry(on_behalf_of.to_string()).or_insert(0) += scaled;

        debug!(pool = %self.id, asset, from, on_behalf_of, amount, "supplied");
        Ok(())
    }

    /// Withdraws `amount` of `asset` from `owner`'s position, paying `to`.
    ///
    /// # Errors
    ///
    /// [`PoolError::InsufficientPosition`] or
    /// [`PoolError::InsufficientLiquidity`]. Frozen reserves still allow
    /// withdrawals.
    pub fn withdraw(
        &mut self,
        ledger: &mut TokenLedger,
        owner: &str,
        asset: &str,
        amount: u64,
        to: &str,
    ) -> Result<(), PoolError> {
        if amount == 0 {
            return Err(PoolError::ZeroAmount);
        }
        let account = self.account.clone();
        let reserve = Self::reserve_for(&mut self.reserves, ledger, asset)?;

        let position = reserve.position_of(owner);
        if amount > position {
            return Err(PoolError::InsufficientPosition {
                owner: owner.to_string(),
                position,
                requested: amount,
            });
        }
        if amount > reserve.cash {
            return Err(PoolError::InsufficientLiquidity {
                requested: amount,
                available: reserve.cash,
            });
        }

        let owned = reserve.scaled.get(owner).copied().unwrap_or(0);
        // A full exit burns every scaled unit so no dust is left behind.
        let burn = if amount == position {
            owned
        } else {
            reserve.to_scaled(amount, true)?.min(owned)
        };

        ledger.transfer(&account, to, amount)?;

        reserve.cash -= amount;
        reserve.total_scaled -= burn;
        if let Some(balance) = reserve.scaled.get_mut(owner) {
            *balance -= burn;
        }

        debug!(pool = %self.id, asset, owner, to, amount, "withdrawn");
        Ok(())
    }

    /// Lends `amount` of `asset` to `borrower`. No collateral is modelled.
    ///
    /// # Errors
    ///
    /// [`PoolError::Frozen`] or [`PoolError::InsufficientLiquidity`].
    pub fn borrow(
        &mut self,
        ledger: &mut TokenLedger,
        borrower: &str,
        asset: &str,
        amount: u64,
    ) -> Result<(), PoolError> {
        if amount == 0 {
            return Err(PoolError::ZeroAmount);
        }
        let account = self.account.clone();
        let reserve = Self::reserve_for(&mut self.reserves, ledger, asset)?;
        if reserve.frozen {
            return Err(PoolError::Frozen(asset.to_string()));
        }
        if amount > reserve.cash {
            return Err(PoolError::InsufficientLiquidity {
                requested: amount,
                available: reserve.cash,
            });
        }
        let borrowed = reserve
            .borrowed
            .checked_add(amount)
            .ok_or(PoolError::Overflow)?;

        ledger.transfer(&account, borrower, amount)?;

        reserve.cash -= amount;
        reserve.borrowed = borrowed;
        *reserve.debts.entry(borrower.to_string()).or_insert(0) += amount;

        info!(pool = %self.id, asset, borrower, amount, cash = reserve.cash, "borrowed");
        Ok(())
    }

    /// Repays `amount` of `borrower`'s debt in `asset`.
    ///
    /// # Errors
    ///
    /// [`PoolError::Overpayment`] if `amount` exceeds the debt, or
    /// [`PoolError::Ledger`] if the borrower can't pay.
    pub fn repay(
        &mut self,
        ledger: &mut TokenLedger,
        borrower: &str,
        asset: &str,
        amount: u64,
    ) -> Result<(), PoolError> {
        if amount == 0 {
            return Err(PoolError::ZeroAmount);
        }
        let account = self.account.clone();
        let reserve = Self::reserve_for(&mut self.reserves, ledger, asset)?;
        let outstanding = reserve.debt_of(borrower);
        if amount > outstanding {
            return Err(PoolError::Overpayment {
                attempted: amount,
                outstanding,
            });
        }

        ledger.transfer(borrower, &account, amount)?;

        reserve.cash += amount;
        reserve.borrowed -= amount;
        if let Some(debt) = reserve.debts.get_mut(borrower) {
            *debt -= amount;
        }

        info!(pool = %self.id, asset, borrower, amount, "repaid");
        Ok(())
    }

    /// Pays `amount` of fresh interest into `asset`'s reserve, raising the
    /// liquidity index so every supplier's position grows pro rata.
    ///
    /// The interest is minted on the ledger; in a real market it would come
    /// from borrowers.
    ///
    /// # Errors
    ///
    /// [`PoolError::NoSuppliers`] if nobody is supplying.
    pub fn distribute_yield(
        &mut self,
        ledger: &mut TokenLedger,
        asset: &str,
        amount: u64,
    ) -> Result<(), PoolError> {
        if amount == 0 {
            return Err(PoolError::ZeroAmount);
        }
        let account = self.account.clone();
        let reserve = Self::reserve_for(&mut self.reserves, ledger, asset)?;
        if reserve.total_scaled == 0 {
            return Err(PoolError::NoSuppliers(asset.to_string()));
        }

        let increment = u128::from(amount)
            .checked_mul(WAD)
            .ok_or(PoolError::Overflow)?
            / reserve.total_scaled;
        let index = reserve
            .liquidity_index
            .checked_add(increment)
            .ok_or(PoolError::Overflow)?;
        let cash = reserve.cash.checked_add(amount).ok_or(PoolError::Overflow)?;

        ledger.mint(&account, amount)?;

        reserve.liquidity_index = index;
        reserve.cash = cash;

        info!(pool = %self.id, asset, amount, liquidity_index = %index, "yield distributed");
        Ok(())
    }

    /// Freezes or unfreezes `asset`'s reserve.
    ///
    /// # Errors
    ///
    /// [`PoolError::UnknownReserve`].
    pub fn set_frozen(&mut self, asset: &str, frozen: bool) -> Result<(), PoolError> {
        let reserve = self
            .reserves
            .get_mut(asset)
            .ok_or_else(|| PoolError::UnknownReserve(asset.to_string()))?;
        reserve.frozen = frozen;
        info!(pool = %self.id, asset, frozen, "reserve freeze updated");
        Ok(())
    }

    fn reserve_for<'a>(
        reserves: &'a mut HashMap<String, Reserve>,
        ledger: &TokenLedger,
        asset: &str,
    ) -> Result<&'a mut Reserve, PoolError> {
        if ledger.token_id() != asset {
            return Err(PoolError::AssetMismatch {
                reserve: asset.to_string(),
                ledger: ledger.token_id().to_string(),
            });
        }
        reserves
            .get_mut(asset)
            .ok_or_else(|| PoolError::UnknownReserve(asset.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POOL: &str = "pool:aave-v3";

    fn setup() -> (LendingPool, TokenLedger) {
        let mut pool = LendingPool::new("aave-v3");
        pool.init_reserve("USDC", "aUSDC").unwrap();
        let mut ledger = TokenLedger::new("USDC", "USDC", 6);
        ledger.mint("alice", 10_000).unwrap();
        ledger.mint("bob", 10_000).unwrap();
        (pool, ledger)
    }

    fn supply(pool: &mut LendingPool, ledger: &mut TokenLedger, who: &str, amount: u64) {
        ledger.approve(who, POOL, amount);
        pool.supply(ledger, who, "USDC", amount, who).unwrap();
    }

    #[test]
    fn supply_pulls_approved_amount() {
        let (mut pool, mut ledger) = setup();
        supply(&mut pool, &mut ledger, "alice", 1_000);

        assert_eq!(pool.position_of("USDC", "alice"), 1_000);
        assert_eq!(pool.available_liquidity("USDC"), 1_000);
        assert_eq!(ledger.balance_of(POOL), 1_000);
        assert_eq!(ledger.allowance("alice", POOL), 0);
    }

    #[test]
    fn supply_without_approval_moves_nothing() {
        let (mut pool, mut ledger) = setup();
        let err = pool.supply(&mut ledger, "alice", "USDC", 500, "alice").unwrap_err();
        assert!(matches!(
            err,
            PoolError::Ledger(TokenError::InsufficientAllowance { .. })
        ));
        assert_eq!(pool.position_of("USDC", "alice"), 0);
        assert_eq!(ledger.balance_of("alice"), 10_000);
    }

    #[test]
    fn duplicate_reserve_rejected() {
        let (mut pool, _) = setup();
        assert_eq!(
            pool.init_reserve("USDC", "aUSDC2"),
            Err(PoolError::ReserveExists("USDC".into()))
        );
    }

    #[test]
    fn wrong_ledger_rejected() {
        let (mut pool, _) = setup();
        let mut dai = TokenLedger::new("DAI", "DAI", 18);
        assert!(matches!(
            pool.supply(&mut dai, "alice", "USDC", 1, "alice"),
            Err(PoolError::AssetMismatch { .. })
        ));
    }

    #[test]
    fn yield_grows_positions_pro_rata() {
        let (mut pool, mut ledger) = setup();
        supply(&mut pool, &mut ledger, "alice", 3_000);
        supply(&mut pool, &mut ledger, "bob", 1_000);

        pool.distribute_yield(&mut ledger, "USDC", 400).unwrap();

        assert_eq!(pool.position_of("USDC", "alice"), 3_300);
        assert_eq!(pool.position_of("USDC", "bob"), 1_100);
        assert_eq!(pool.available_liquidity("USDC"), 4_400);
    }

    #[test]
    fn yield_needs_suppliers() {
        let (mut pool, mut ledger) = setup();
        assert_eq!(
            pool.distribute_yield(&mut ledger, "USDC", 10),
            Err(PoolError::NoSuppliers("USDC".into()))
        );
    }

    #[test]
    fn full_withdrawal_clears_position() {
        let (mut pool, mut ledger) = setup();
        supply(&mut pool, &mut ledger, "alice", 1_000);
        pool.distribute_yield(&mut ledger, "USDC", 7).unwrap();

        let position = pool.position_of("USDC", "alice");
        pool.withdraw(&mut ledger, "alice", "USDC", position, "alice").unwrap();

        assert_eq!(pool.position_of("USDC", "alice"), 0);
        assert_eq!(pool.reserve("USDC").unwrap().total_scaled, 0);
        assert_eq!(ledger.balance_of("alice"), 10_007);
    }

    #[test]
    fn withdraw_beyond_position_rejected() {
        let (mut pool, mut ledger) = setup();
        supply(&mut pool, &mut ledger, "alice", 500);
        let err = pool.withdraw(&mut ledger, "alice", "USDC", 501, "alice").unwrap_err();
        assert_eq!(
            err,
            PoolError::InsufficientPosition {
                owner: "alice".into(),
                position: 500,
                requested: 501,
            }
        );
    }

    #[test]
    fn borrows_limit_withdrawals() {
        let (mut pool, mut ledger) = setup();
        supply(&mut pool, &mut ledger, "alice", 1_000);
        pool.borrow(&mut ledger, "carol", "USDC", 800).unwrap();

        assert_eq!(pool.available_liquidity("USDC"), 200);
        let err = pool.withdraw(&mut ledger, "alice", "USDC", 300, "alice").unwrap_err();
        assert_eq!(
            err,
            PoolError::InsufficientLiquidity {
                requested: 300,
                available: 200,
            }
        );

        pool.repay(&mut ledger, "carol", "USDC", 800).unwrap();
        pool.withdraw(&mut ledger, "alice", "USDC", 300, "alice").unwrap();
        assert_eq!(pool.position_of("USDC", "alice"), 700);
    }

    #[test]
    fn overpayment_rejected() {
        let (mut pool, mut ledger) = setup();
        supply(&mut pool, &mut ledger, "alice", 1_000);
        pool.borrow(&mut ledger, "bob", "USDC", 100).unwrap();
        assert_eq!(
            pool.repay(&mut ledger, "bob", "USDC", 101),
            Err(PoolError::Overpayment {
                attempted: 101,
                outstanding: 100,
            })
        );
    }

    #[test]
    fn frozen_reserve_blocks_supply_but_not_withdraw() {
        let (mut pool, mut ledger) = setup();
        supply(&mut pool, &mut ledger, "alice", 1_000);
        pool.set_frozen("USDC", true).unwrap();

        ledger.approve("bob", POOL, 10);
        assert_eq!(
            pool.supply(&mut ledger, "bob", "USDC", 10, "bob"),
            Err(PoolError::Frozen("USDC".into()))
        );
        pool.withdraw(&mut ledger, "alice", "USDC", 100, "alice").unwrap();
        assert_eq!(pool.position_of("USDC", "alice"), 900);
    }

    #[test]
    fn pool_state_serializes() {
        let (mut pool, mut ledger) = setup();
        supply(&mut pool, &mut ledger, "alice", 1_000);
        let json = serde_json::to_string(&pool).unwrap();
        let restored: LendingPool = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.position_of("USDC", "alice"), 1_000);
    }
}
