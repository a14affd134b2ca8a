//! # Lending Pool Adapter
//!
//! Connects a [`Vault`](yieldvault::Vault) to a shared [`LendingPool`].
//!
//! The adapter supplies and withdraws on behalf of a single beneficiary (the
//! vault's custody account). Approvals are real allowances on the asset
//! ledger, granted to the pool account for exactly the amount about to be
//! supplied.
//!
//! Lock order is pool, then asset ledger. Callers must not hold the asset
//! ledger lock while calling into the adapter.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use yieldvault::{SharedLedger, TokenError, VenueAdapter, VenueError};

use crate::lending_pool::{LendingPool, PoolError};

/// A lending pool shared between the adapter and whoever else uses it
/// (borrowers, the yield source, an operator).
pub type SharedPool = Arc<RwLock<LendingPool>>;

impl From<PoolError> for VenueError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::InsufficientLiquidity {
                requested,
                available,
            } => VenueError::InsufficientLiquidity {
                requested,
                available,
            },
            PoolError::Frozen(asset) => VenueError::Frozen { asset },
            PoolError::Ledger(TokenError::InsufficientAllowance {
                allowance,
                requested,
                ..
            }) => VenueError::InsufficientAllowance {
                approved: allowance,
                requested,
            },
            other => VenueError::Rejected(other.to_string()),
        }
    }
}

/// [`VenueAdapter`] over a [`LendingPool`] reserve.
pub struct LendingPoolAdapter {
    pool: SharedPool,
    assets: SharedLedger,
    venue_id: String,
    pool_account: String,
    asset: String,
    position_token: String,
    beneficiary: String,
}

impl LendingPoolAdapter {
    /// Binds `beneficiary`'s position in `asset` on `pool`.
    ///
    /// # Errors
    ///
    /// [`PoolError::UnknownReserve`] if the pool doesn't list `asset`.
    pub fn new(
        pool: SharedPool,
        assets: SharedLedger,
        asset: &str,
        beneficiary: impl Into<String>,
    ) -> Result<Self, PoolError> {
        let (venue_id, pool_account, position_token) = {
            let guard = pool.read();
            let reserve = guard
                .reserve(asset)
                .ok_or_else(|| PoolError::UnknownReserve(asset.to_string()))?;
            (
                guard.id().to_string(),
                guard.account().to_string(),
                reserve.position_token.clone(),
            )
        };

        Ok(Self {
            pool,
            assets,
            venue_id,
            pool_account,
            asset: asset.to_string(),
            position_token,
            beneficiary: beneficiary.into(),
        })
    }
}

impl VenueAdapter for LendingPoolAdapter {
    fn venue_id(&self) -> &str {
        &self.venue_id
    }

    fn position_token(&self) -> &str {
        &self.position_token
    }

    fn underlying_asset(&self) -> &str {
        &self.asset
    }

    fn beneficiary(&self) -> &str {
        &self.beneficiary
    }

    fn position_value(&self) -> u64 {
        self.pool.read().position_of(&self.asset, &self.beneficiary)
    }

    fn available_liquidity(&self) -> u64 {
        let pool = self.pool.read();
        pool.position_of(&self.asset, &self.beneficiary)
            .min(pool.available_liquidity(&self.asset))
    }

    fn accepts_deposits(&self) -> bool {
        self.pool
            .read()
            .reserve(&self.asset)
            .map(|r| !r.frozen)
            .unwrap_or(false)
    }

    fn approve(&mut self, amount: u64) {
        self.assets
            .write()
            .approve(&self.beneficiary, &self.pool_account, amount);
        debug!(venue = %self.venue_id, owner = %self.beneficiary, amount, "pool approval set");
    }

    fn supply(&mut self, amount: u64) -> Result<(), VenueError> {
        let mut pool = self.pool.write();
        let mut assets = self.assets.write();
        pool.supply(&mut assets, &self.beneficiary, &self.asset, amount, &self.beneficiary)?;
        Ok(())
    }

    fn release(&mut self, amount: u64) -> Result<(), VenueError> {
        let mut pool = self.pool.write();
        let available = pool
            .position_of(&self.asset, &self.beneficiary)
            .min(pool.available_liquidity(&self.asset));
        if amount > available {
            return Err(VenueError::InsufficientLiquidity {
                requested: amount,
                available,
            });
        }
        let mut assets = self.assets.write();
        pool.withdraw(&mut assets, &self.beneficiary, &self.asset, amount, &self.beneficiary)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yieldvault::ledger::shared;
    use yieldvault::TokenLedger;

    const VAULT: &str = "vault:yvUSDC";

    fn setup() -> (SharedPool, SharedLedger, LendingPoolAdapter) {
        let mut pool = LendingPool::new("aave-v3");
        pool.init_reserve("USDC", "aUSDC").unwrap();
        let pool = Arc::new(RwLock::new(pool));
        let mut ledger = TokenLedger::new("USDC", "USDC", 6);
        ledger.mint(VAULT, 1_000).unwrap();
        let assets = shared(ledger);
        let adapter =
            LendingPoolAdapter::new(Arc::clone(&pool), Arc::clone(&assets), "USDC", VAULT).unwrap();
        (pool, assets, adapter)
    }

    #[test]
    fn identities_come_from_the_reserve() {
        let (_, _, adapter) = setup();
        assert_eq!(adapter.venue_id(), "aave-v3");
        assert_eq!(adapter.position_token(), "aUSDC");
        assert_eq!(adapter.underlying_asset(), "USDC");
        assert_eq!(adapter.beneficiary(), VAULT);
    }

    #[test]
    fn unlisted_asset_rejected() {
        let (pool, assets, _) = setup();
        assert!(matches!(
            LendingPoolAdapter::new(pool, assets, "DAI", VAULT),
            Err(PoolError::UnknownReserve(_))
        ));
    }

    #[test]
    fn supply_consumes_exact_approval() {
        let (_, assets, mut adapter) = setup();
        adapter.approve(600);
        adapter.supply(600).unwrap();

        assert_eq!(adapter.position_value(), 600);
        assert_eq!(assets.read().allowance(VAULT, "pool:aave-v3"), 0);
        assert_eq!(assets.read().balance_of(VAULT), 400);
    }

    #[test]
    fn supply_beyond_approval_fails() {
        let (_, _, mut adapter) = setup();
        adapter.approve(100);
        assert_eq!(
            adapter.supply(200),
            Err(VenueError::InsufficientAllowance {
                approved: 100,
                requested: 200,
            })
        );
        assert_eq!(adapter.position_value(), 0);
    }

    #[test]
    fn release_capped_by_pool_cash() {
        let (pool, assets, mut adapter) = setup();
        adapter.approve(1_000);
        adapter.supply(1_000).unwrap();
        pool.write()
            .borrow(&mut assets.write(), "carol", "USDC", 700)
            .unwrap();

        assert_eq!(adapter.available_liquidity(), 300);
        assert_eq!(
            adapter.release(301),
            Err(VenueError::InsufficientLiquidity {
                requested: 301,
                available: 300,
            })
        );
        adapter.release(300).unwrap();
        assert_eq!(assets.read().balance_of(VAULT), 300);
    }

    #[test]
    fn frozen_reserve_refuses_deposits() {
        let (pool, _, mut adapter) = setup();
        pool.write().set_frozen("USDC", true).unwrap();
        assert!(!adapter.accepts_deposits());
        adapter.approve(10);
        assert_eq!(
            adapter.supply(10),
            Err(VenueError::Frozen {
                asset: "USDC".into()
            })
        );
    }
}
