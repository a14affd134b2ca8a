//! # Vault Core
//!
//! Orchestrates the four public writes around the share ledger and the two
//! venue hooks.
//!
//! ```text
//! deposit / mint
//!   Idle ─▶ SharesComputed ─▶ Recorded ─────────▶ Deployed ─▶ Idle
//!            price, pull       mint shares          approve + supply
//!
//! withdraw / redeem
//!   Idle ─▶ SharesComputed ─▶ Released ─────────▶ Recorded ─▶ Idle
//!            price              venue release       burn, pay receiver
//! ```
//!
//! Prices are always taken before anything moves, from the idle custody
//! balance plus the venue position as they stand. The incoming deposit is
//! not counted until it has been deployed.
//!
//! On the way out the venue is asked for the funds *before* shares are
//! burned. A venue that can't pay means nothing was burned. Liquidity,
//! allowance and the owner's balance are all checked before the release,
//! so a withdrawal that fails leaves the venue position untouched. If a
//! step after the release still fails, the released funds are held idle in
//! custody, where they keep counting toward total assets.

use tracing::{debug, error, info, warn};

use super::error::VaultError;
use super::events::{VaultEvent, VaultEventKind, VaultSnapshot};
use super::journal::{Journal, Undo};
use crate::config::{ConfigError, VaultConfig};
use crate::ledger::{MathError, Rounding, ShareLedger, SharedLedger};
use crate::venue::{VenueAdapter, VenueError};
use crate::AccountId;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Where the vault is inside the current operation.
///
/// Always `Idle` between calls. The other variants are only observable in
/// logs, and from an adapter that (against its contract) inspects the vault
/// mid-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// No operation in progress.
    Idle,
    /// Amounts priced; nothing moved yet.
    SharesComputed,
    /// Share ledger updated for this operation.
    Recorded,
    /// Deposit supplied to the venue.
    Deployed,
    /// Withdrawal released from the venue into custody.
    Released,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Idle => write!(f, "Idle"),
            Stage::SharesComputed => write!(f, "SharesComputed"),
            Stage::Recorded => write!(f, "Recorded"),
            Stage::Deployed => write!(f, "Deployed"),
            Stage::Released => write!(f, "Released"),
        }
    }
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// A tokenized vault over one underlying asset and one lending venue.
///
/// Owns its share ledger outright; shares the underlying-asset ledger with
/// the venue adapter. All writes take `&mut self`, so two flows can never
/// interleave on the same vault. Hosts that share a vault across threads
/// put it behind a mutex.
pub struct Vault {
    config: VaultConfig,
    /// Underlying asset id, taken from the venue's position token.
    asset: String,
    decimals: u8,
    shares: ShareLedger,
    assets: SharedLedger,
    venue: Box<dyn VenueAdapter>,
    stage: Stage,
    events: Vec<VaultEvent>,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("symbol", &self.config.symbol)
            .field("asset", &self.asset)
            .field("venue", &self.config.venue)
            .field("total_shares", &self.shares.total_shares())
            .field("stage", &self.stage)
            .finish()
    }
}

impl Vault {
    /// Builds a vault over `venue`, moving value on the shared `assets`
    /// ledger.
    ///
    /// The underlying asset is whatever the venue's position token is
    /// denominated in; the asset ledger must track that same token.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Config`] if the config is invalid or disagrees
    /// with the adapter or the ledger.
    pub fn new(
        config: VaultConfig,
        assets: SharedLedger,
        venue: Box<dyn VenueAdapter>,
    ) -> Result<Self, VaultError> {
        config.validate()?;

        let identities = [
            ("venue", config.venue.as_str(), venue.venue_id()),
            ("position_token", config.position_token.as_str(), venue.position_token()),
            ("account", config.account.as_str(), venue.beneficiary()),
        ];
        for (field, expected, actual) in identities {
            if expected != actual {
                return Err(ConfigError::VenueMismatch {
                    field,
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                }
                .into());
            }
        }

        let asset = venue.underlying_asset().to_string();
        let decimals = {
            let ledger = assets.read();
            if ledger.token_id() != asset {
                return Err(ConfigError::AssetMismatch {
                    venue_asset: asset,
                    ledger_asset: ledger.token_id().to_string(),
                }
                .into());
            }
            ledger.decimals()
        };

        info!(
            vault = %config.symbol,
            asset = %asset,
            venue = %config.venue,
            position_token = %config.position_token,
            "vault created"
        );

        Ok(Self {
            shares: ShareLedger::new(config.symbol.clone(), decimals),
            config,
            asset,
            decimals,
            assets,
            venue,
            stage: Stage::Idle,
            events: Vec::new(),
        })
    }

    // -----------------------------------------------------------------------
    // Metadata
    // -----------------------------------------------------------------------

    /// Vault name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Share symbol.
    pub fn symbol(&self) -> &str {
        &self.config.symbol
    }

    /// Underlying asset id.
    pub fn asset(&self) -> &str {
        &self.asset
    }

    /// Share precision, equal to the underlying's.
    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// Custody account on the underlying ledger.
    pub fn account(&self) -> &str {
        &self.config.account
    }

    /// Construction parameters.
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Current lifecycle stage. `Idle` whenever a caller can observe it.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    // -----------------------------------------------------------------------
    // Accounting reads
    // -----------------------------------------------------------------------

    /// Underlying held directly in custody.
    pub fn idle_assets(&self) -> u64 {
        self.assets.read().balance_of(&self.config.account)
    }

    /// Value of the venue position as the venue reports it.
    pub fn position_value(&self) -> u64 {
        self.venue.position_value()
    }

    /// Everything the vault manages: custody plus venue position. Nothing
    /// else is counted.
    pub fn total_assets(&self) -> u64 {
        self.idle_assets().saturating_add(self.position_value())
    }

    /// Shares outstanding.
    pub fn total_supply(&self) -> u64 {
        self.shares.total_shares()
    }

    /// Shares held by `holder`.
    pub fn balance_of(&self, holder: &str) -> u64 {
        self.shares.balance_of(holder)
    }

    /// Share allowance `spender` holds over `owner`.
    pub fn allowance(&self, owner: &str, spender: &str) -> u64 {
        self.shares.allowance(owner, spender)
    }

    /// Every share holder record, sorted. Zero balances included.
    pub fn holders(&self) -> Vec<(AccountId, u64)> {
        self.shares.holders()
    }

    /// `true` if holder balances add up to total supply.
    pub fn shares_balanced(&self) -> bool {
        self.shares.token().balance_sum() == u128::from(self.shares.total_shares())
    }

    // -----------------------------------------------------------------------
    // Conversion & previews
    // -----------------------------------------------------------------------

    /// Shares `assets` is worth at the current rate, rounded down.
    ///
    /// # Errors
    ///
    /// [`VaultError::Math`] if shares exist against zero assets or the
    /// result overflows.
    pub fn convert_to_shares(&self, assets: u64) -> Result<u64, VaultError> {
        self.to_shares(assets, Rounding::Down)
    }

    /// Underlying `shares` is worth at the current rate, rounded down.
    ///
    /// # Errors
    ///
    /// [`VaultError::Math`] on overflow.
    pub fn convert_to_assets(&self, shares: u64) -> Result<u64, VaultError> {
        self.to_assets(shares, Rounding::Down)
    }

    /// Shares a `deposit` of `assets` would mint now. Rounded down.
    ///
    /// # Errors
    ///
    /// [`VaultError::Math`].
    pub fn preview_deposit(&self, assets: u64) -> Result<u64, VaultError> {
        self.to_shares(assets, Rounding::Down)
    }

    /// Underlying a `mint` of `shares` would charge now. Rounded up.
    ///
    /// # Errors
    ///
    /// [`VaultError::Math`].
    pub fn preview_mint(&self, shares: u64) -> Result<u64, VaultError> {
        self.to_assets(shares, Rounding::Up)
    }

    /// Shares a `withdraw` of `assets` would burn now. Rounded up.
    ///
    /// # Errors
    ///
    /// [`VaultError::Math`].
    pub fn preview_withdraw(&self, assets: u64) -> Result<u64, VaultError> {
        self.to_shares(assets, Rounding::Up)
    }

    /// Underlying a `redeem` of `shares` would pay now. Rounded down.
    ///
    /// # Errors
    ///
    /// [`VaultError::Math`].
    pub fn preview_redeem(&self, shares: u64) -> Result<u64, VaultError> {
        self.to_assets(shares, Rounding::Down)
    }

    fn to_shares(&self, assets: u64, rounding: Rounding) -> Result<u64, VaultError> {
        Ok(self
            .shares
            .convert_to_shares(assets, self.total_assets(), rounding)?)
    }

    fn to_assets(&self, shares: u64, rounding: Rounding) -> Result<u64, VaultError> {
        Ok(self
            .shares
            .convert_to_assets(shares, self.total_assets(), rounding)?)
    }

    // -----------------------------------------------------------------------
    // Limits
    // -----------------------------------------------------------------------

    /// Largest deposit that could currently succeed for anyone.
    ///
    /// Zero while the venue refuses deposits; otherwise the headroom before
    /// managed assets would overflow.
    pub fn max_deposit(&self, _receiver: &str) -> u64 {
        if !self.venue.accepts_deposits() {
            return 0;
        }
        u64::MAX - self.total_assets()
    }

    /// Largest mint that could currently succeed.
    pub fn max_mint(&self, receiver: &str) -> u64 {
        let max_assets = self.max_deposit(receiver);
        if max_assets == 0 {
            return 0;
        }
        let headroom = u64::MAX - self.total_supply();
        match self.to_shares(max_assets, Rounding::Down) {
            Ok(shares) => shares.min(headroom),
            Err(VaultError::Math(MathError::Overflow)) => headroom,
            Err(_) => 0,
        }
    }

    /// Largest `withdraw` `owner` could make now: their shares' value, capped
    /// by what the venue can release.
    pub fn max_withdraw(&self, owner: &str) -> u64 {
        let owned = self
            .to_assets(self.balance_of(owner), Rounding::Down)
            .unwrap_or(0);
        owned.min(self.venue.available_liquidity())
    }

    /// Largest `redeem` `owner` could make now.
    pub fn max_redeem(&self, owner: &str) -> u64 {
        let balance = self.balance_of(owner);
        let liquidity = self.venue.available_liquidity();
        let owned = self.to_assets(balance, Rounding::Down).unwrap_or(0);
        if owned <= liquidity {
            return balance;
        }
        self.to_shares(liquidity, Rounding::Down)
            .map(|shares| shares.min(balance))
            .unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Deposit flow
    // -----------------------------------------------------------------------

    /// Deposits exactly `assets` from `caller` and mints the resulting
    /// shares to `receiver`. Returns the shares minted.
    ///
    /// # Errors
    ///
    /// - [`VaultError::ZeroAmount`] if `assets` is zero.
    /// - [`VaultError::InvalidAmount`] if `assets` is worth zero shares.
    /// - [`VaultError::InsufficientAssets`] if `caller` can't pay.
    /// - [`VaultError::VenueUnavailable`] if the venue rejects the supply.
    /// - [`VaultError::Math`] if the vault can't be priced.
    pub fn deposit(&mut self, caller: &str, receiver: &str, assets: u64) -> Result<u64, VaultError> {
        if assets == 0 {
            return Err(VaultError::ZeroAmount);
        }

        let shares = self.preview_deposit(assets)?;
        if shares == 0 {
            return Err(VaultError::InvalidAmount {
                requested: assets,
                denomination: "assets",
            });
        }

        self.enter(caller, receiver, assets, shares)?;
        Ok(shares)
    }

    /// Mints exactly `shares` to `receiver`, charging `caller` whatever they
    /// cost. Returns the underlying charged.
    ///
    /// # Errors
    ///
    /// Same as [`deposit`](Self::deposit), with `InvalidAmount` raised when
    /// `shares` would cost nothing.
    pub fn mint(&mut self, caller: &str, receiver: &str, shares: u64) -> Result<u64, VaultError> {
        if shares == 0 {
            return Err(VaultError::ZeroAmount);
        }

        let assets = self.preview_mint(shares)?;
        if assets == 0 {
            return Err(VaultError::InvalidAmount {
                requested: shares,
                denomination: "shares",
            });
        }

        self.enter(caller, receiver, assets, shares)?;
        Ok(assets)
    }

    fn enter(
        &mut self,
        caller: &str,
        receiver: &str,
        assets: u64,
        shares: u64,
    ) -> Result<(), VaultError> {
        self.stage = Stage::SharesComputed;
        debug!(
            vault = %self.config.symbol,
            caller,
            receiver,
            assets,
            shares,
            stage = %self.stage,
            "deposit priced"
        );

        let mut journal = Journal::default();
        let result = self.try_enter(caller, receiver, assets, shares, &mut journal);
        if let Err(err) = &result {
            warn!(
                vault = %self.config.symbol,
                caller,
                assets,
                stage = %self.stage,
                error = %err,
                "deposit failed, unwinding"
            );
            self.unwind(journal);
        }
        self.stage = Stage::Idle;
        result?;

        self.record(VaultEventKind::Deposit {
            caller: caller.to_string(),
            owner: receiver.to_string(),
            assets,
            shares,
        });
        info!(
            vault = %self.config.symbol,
            caller,
            receiver,
            assets,
            shares,
            total_assets = self.total_assets(),
            total_shares = self.total_supply(),
            "deposit committed"
        );
        Ok(())
    }

    fn try_enter(
        &mut self,
        caller: &str,
        receiver: &str,
        assets: u64,
        shares: u64,
        journal: &mut Journal,
    ) -> Result<(), VaultError> {
        self.assets
            .write()
            .transfer(caller, &self.config.account, assets)
            .map_err(VaultError::from_assets)?;
        journal.push(Undo::ReturnAssets {
            to: caller.to_string(),
            amount: assets,
        });

        self.shares
            .mint(receiver, shares)
            .map_err(|e| VaultError::from_shares(e, shares))?;
        journal.push(Undo::BurnShares {
            holder: receiver.to_string(),
            shares,
        });
        self.stage = Stage::Recorded;
        debug!(vault = %self.config.symbol, receiver, shares, stage = %self.stage, "shares minted");

        self.venue.approve(assets);
        journal.push(Undo::RevokeVenueApproval);
        self.venue
            .supply(assets)
            .map_err(VaultError::VenueUnavailable)?;
        self.stage = Stage::Deployed;
        debug!(vault = %self.config.symbol, assets, stage = %self.stage, "deposit supplied to venue");

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Withdraw flow
    // -----------------------------------------------------------------------

    /// Withdraws exactly `assets` to `receiver`, burning however many of
    /// `owner`'s shares that costs. Returns the shares burned.
    ///
    /// `caller` must be `owner` or hold enough share allowance from them.
    ///
    /// # Errors
    ///
    /// - [`VaultError::ZeroAmount`] if `assets` is zero.
    /// - [`VaultError::VenueUnavailable`] if the venue can't release
    ///   `assets`; checked before any share is burned.
    /// - [`VaultError::InsufficientBalance`] /
    ///   [`VaultError::InsufficientAllowance`] if `owner` can't cover the
    ///   burn; the released funds go back to the venue first.
    /// - [`VaultError::Math`] if the vault can't be priced.
    pub fn withdraw(
        &mut self,
        caller: &str,
        receiver: &str,
        owner: &str,
        assets: u64,
    ) -> Result<u64, VaultError> {
        if assets == 0 {
            return Err(VaultError::ZeroAmount);
        }

        let shares = self.preview_withdraw(assets)?;
        if shares == 0 {
            return Err(VaultError::InvalidAmount {
                requested: assets,
                denomination: "assets",
            });
        }

        self.exit(caller, receiver, owner, assets, shares)?;
        Ok(shares)
    }

    /// Redeems exactly `shares` of `owner`'s, paying what they're worth to
    /// `receiver`. Returns the underlying paid.
    ///
    /// # Errors
    ///
    /// Same as [`withdraw`](Self::withdraw), with `InvalidAmount` raised when
    /// `shares` are worth nothing.
    pub fn redeem(
        &mut self,
        caller: &str,
        receiver: &str,
        owner: &str,
        shares: u64,
    ) -> Result<u64, VaultError> {
        if shares == 0 {
            return Err(VaultError::ZeroAmount);
        }

        let assets = self.preview_redeem(shares)?;
        if assets == 0 {
            return Err(VaultError::InvalidAmount {
                requested: shares,
                denomination: "shares",
            });
        }

        self.exit(caller, receiver, owner, assets, shares)?;
        Ok(assets)
    }

    fn exit(
        &mut self,
        caller: &str,
        receiver: &str,
        owner: &str,
        assets: u64,
        shares: u64,
    ) -> Result<(), VaultError> {
        self.stage = Stage::SharesComputed;
        debug!(
            vault = %self.config.symbol,
            caller,
            owner,
            assets,
            shares,
            stage = %self.stage,
            "withdrawal priced"
        );

        let mut journal = Journal::default();
        let result = self.try_exit(caller, receiver, owner, assets, shares, &mut journal);
        if let Err(err) = &result {
            warn!(
                vault = %self.config.symbol,
                caller,
                owner,
                assets,
                shares,
                stage = %self.stage,
                error = %err,
                "withdrawal failed, unwinding"
            );
            self.unwind(journal);
        }
        self.stage = Stage::Idle;
        result?;

        self.record(VaultEventKind::Withdraw {
            caller: caller.to_string(),
            receiver: receiver.to_string(),
            owner: owner.to_string(),
            assets,
            shares,
        });
        info!(
            vault = %self.config.symbol,
            caller,
            receiver,
            owner,
            assets,
            shares,
            total_assets = self.total_assets(),
            total_shares = self.total_supply(),
            "withdrawal committed"
        );
        Ok(())
    }

    /// Read-only dry run of `try_exit`, checked in the same order: venue
    /// liquidity, then allowance, then the owner's shares. A call that
    /// fails here has released nothing.
    fn check_exit(
        &self,
        caller: &str,
        owner: &str,
        assets: u64,
        shares: u64,
    ) -> Result<(), VaultError> {
        let available = self.venue.available_liquidity();
        if assets > available {
            return Err(VaultError::VenueUnavailable(
                VenueError::InsufficientLiquidity {
                    requested: assets,
                    available,
                },
            ));
        }

        if caller != owner {
            let allowance = self.shares.allowance(owner, caller);
            if allowance < shares {
                return Err(VaultError::InsufficientAllowance {
                    owner: owner.to_string(),
                    spender: caller.to_string(),
                    allowance,
                    required: shares,
                });
            }
        }

        let balance = self.shares.balance_of(owner);
        if balance < shares {
            return Err(VaultError::InsufficientBalance {
                holder: owner.to_string(),
                available: balance,
                required: shares,
            });
        }
        Ok(())
    }

    fn try_exit(
        &mut self,
        caller: &str,
        receiver: &str,
        owner: &str,
        assets: u64,
        shares: u64,
        journal: &mut Journal,
    ) -> Result<(), VaultError> {
        self.check_exit(caller, owner, assets, shares)?;

        self.venue
            .release(assets)
            .map_err(VaultError::VenueUnavailable)?;
        journal.push(Undo::HoldReleased { amount: assets });
        self.stage = Stage::Released;
        debug!(vault = %self.config.symbol, assets, stage = %self.stage, "released from venue");

        if caller != owner {
            let previous = self
                .shares
                .spend_allowance(owner, caller, shares)
                .map_err(|e| VaultError::from_shares(e, shares))?;
            journal.push(Undo::RestoreShareAllowance {
                owner: owner.to_string(),
                spender: caller.to_string(),
                allowance: previous,
            });
        }

        self.shares
            .burn(owner, shares)
            .map_err(|e| VaultError::from_shares(e, shares))?;
        journal.push(Undo::MintShares {
            holder: owner.to_string(),
            shares,
        });
        self.stage = Stage::Recorded;
        debug!(vault = %self.config.symbol, owner, shares, stage = %self.stage, "shares burned");

        self.assets
            .write()
            .transfer(&self.config.account, receiver, assets)
            .map_err(VaultError::from_assets)?;

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Share transfers
    // -----------------------------------------------------------------------

    /// Moves `shares` from `from` to `to`. Vault assets are untouched.
    ///
    /// # Errors
    ///
    /// [`VaultError::InsufficientBalance`] if `from` has fewer shares.
    pub fn transfer(&mut self, from: &str, to: &str, shares: u64) -> Result<(), VaultError> {
        self.shares
            .transfer(from, to, shares)
            .map_err(|e| VaultError::from_shares(e, shares))?;
        debug!(vault = %self.config.symbol, from, to, shares, "shares transferred");
        Ok(())
    }

    /// Sets `spender`'s allowance over `owner`'s shares.
    pub fn approve(&mut self, owner: &str, spender: &str, shares: u64) {
        self.shares.approve(owner, spender, shares);
        debug!(vault = %self.config.symbol, owner, spender, shares, "share allowance set");
    }

    /// Moves `from`'s shares to `to` on behalf of `spender`.
    ///
    /// # Errors
    ///
    /// [`VaultError::InsufficientAllowance`] or
    /// [`VaultError::InsufficientBalance`].
    pub fn transfer_from(
        &mut self,
        spender: &str,
        from: &str,
        to: &str,
        shares: u64,
    ) -> Result<(), VaultError> {
        self.shares
            .transfer_from(spender, from, to, shares)
            .map_err(|e| VaultError::from_shares(e, shares))?;
        debug!(vault = %self.config.symbol, spender, from, to, shares, "shares transferred");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Events & snapshots
    // -----------------------------------------------------------------------

    /// Takes every event recorded since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<VaultEvent> {
        std::mem::take(&mut self.events)
    }

    /// Summarises the vault's current state.
    pub fn snapshot(&self) -> VaultSnapshot {
        let idle_assets = self.idle_assets();
        let position_value = self.position_value();
        let one_share = 10u64.checked_pow(u32::from(self.decimals)).unwrap_or(u64::MAX);
        VaultSnapshot {
            name: self.config.name.clone(),
            symbol: self.config.symbol.clone(),
            asset: self.asset.clone(),
            decimals: self.decimals,
            venue: self.config.venue.clone(),
            position_token: self.config.position_token.clone(),
            account: self.config.account.clone(),
            total_assets: idle_assets.saturating_add(position_value),
            idle_assets,
            position_value,
            total_shares: self.total_supply(),
            holders: self.shares.token().holders().len(),
            price_per_share: self.convert_to_assets(one_share).unwrap_or(0),
            accepts_deposits: self.venue.accepts_deposits(),
            available_liquidity: self.venue.available_liquidity(),
        }
    }

    fn record(&mut self, kind: VaultEventKind) {
        self.events.push(VaultEvent::new(&self.config.symbol, kind));
    }

    // -----------------------------------------------------------------------
    // Compensation
    // -----------------------------------------------------------------------

    /// Reverses every step in `journal`, newest first.
    fn unwind(&mut self, journal: Journal) {
        for undo in journal.into_reverse() {
            let outcome = match &undo {
                Undo::ReturnAssets { to, amount } => self
                    .assets
                    .write()
                    .transfer(&self.config.account, to, *amount)
                    .map_err(|e| e.to_string()),
                Undo::BurnShares { holder, shares } => self
                    .shares
                    .burn(holder, *shares)
                    .map(|_| ())
                    .map_err(|e| e.to_string()),
                Undo::MintShares { holder, shares } => self
                    .shares
                    .mint(holder, *shares)
                    .map(|_| ())
                    .map_err(|e| e.to_string()),
                Undo::RestoreShareAllowance {
                    owner,
                    spender,
                    allowance,
                } => {
                    self.shares.approve(owner, spender, *allowance);
                    Ok(())
                }
                Undo::RevokeVenueApproval => {
                    self.venue.approve(0);
                    Ok(())
                }
                Undo::HoldReleased { amount } => {
                    // Not re-supplied; idle custody counts toward total assets.
                    warn!(
                        vault = %self.config.symbol,
                        amount,
                        idle = self.idle_assets(),
                        "released funds held idle in custody"
                    );
                    Ok(())
                }
            };

            match outcome {
                Ok(()) => debug!(vault = %self.config.symbol, ?undo, "compensated"),
                Err(reason) => error!(
                    vault = %self.config.symbol,
                    ?undo,
                    reason = %reason,
                    "compensation failed"
                ),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{shared, TokenLedger};
    use std::sync::Arc;

    use parking_lot::Mutex;

    const VAULT: &str = "vault:yvUSDC";
    const VENUE: &str = "venue:mock";

    /// Knobs a test can turn on the mock venue while the vault owns it.
    #[derive(Debug, Default)]
    struct Controls {
        fail_supply: bool,
        /// `release` succeeds but delivers one unit less than it debits.
        short_release: bool,
        /// Caps what `release` will hand back; `None` means the whole position.
        liquidity_cap: Option<u64>,
        approved: u64,
        supplies: u32,
        releases: u32,
    }

    /// A venue that keeps the vault's funds in its own ledger account and
    /// tracks the position as a plain counter.
    struct MockVenue {
        assets: SharedLedger,
        position: Arc<Mutex<u64>>,
        controls: Arc<Mutex<Controls>>,
    }

    impl VenueAdapter for MockVenue {
        fn venue_id(&self) -> &str {
            "mock"
        }

        fn position_token(&self) -> &str {
            "mUSDC"
        }

        fn underlying_asset(&self) -> &str {
            "USDC"
        }

        fn beneficiary(&self) -> &str {
            VAULT
        }

        fn position_value(&self) -> u64 {
            *self.position.lock()
        }

        fn available_liquidity(&self) -> u64 {
            let position = *self.position.lock();
            match self.controls.lock().liquidity_cap {
                Some(cap) => position.min(cap),
                None => position,
            }
        }

        fn approve(&mut self, amount: u64) {
            self.controls.lock().approved = amount;
        }

        fn supply(&mut self, amount: u64) -> Result<(), VenueError> {
            let mut controls = self.controls.lock();
            if controls.fail_supply {
                return Err(VenueError::Rejected("supply disabled".into()));
            }
            if controls.approved < amount {
                return Err(VenueError::InsufficientAllowance {
                    approved: controls.approved,
                    requested: amount,
                });
            }
            self.assets
                .write()
                .transfer(VAULT, VENUE, amount)
                .map_err(|e| VenueError::Rejected(e.to_string()))?;
            controls.approved -= amount;
            controls.supplies += 1;
            *self.position.lock() += amount;
            Ok(())
        }

        fn release(&mut self, amount: u64) -> Result<(), VenueError> {
            let available = self.available_liquidity();
            if amount > available {
                return Err(VenueError::InsufficientLiquidity {
                    requested: amount,
                    available,
                });
            }
            let delivered = if self.controls.lock().short_release {
                amount - 1
            } else {
                amount
            };
            self.assets
                .write()
                .transfer(VENUE, VAULT, delivered)
                .map_err(|e| VenueError::Rejected(e.to_string()))?;
            *self.position.lock() -= amount;
            self.controls.lock().releases += 1;
            Ok(())
        }
    }

    struct Harness {
        vault: Vault,
        assets: SharedLedger,
        position: Arc<Mutex<u64>>,
        controls: Arc<Mutex<Controls>>,
    }

    impl Harness {
        /// Simulates yield: the venue's holdings and the position grow.
        fn accrue(&self, amount: u64) {
            self.assets.write().mint(VENUE, amount).unwrap();
            *self.position.lock() += amount;
        }

        fn usdc(&self, account: &str) -> u64 {
            self.assets.read().balance_of(account)
        }
    }

    fn harness() -> Harness {
        let mut ledger = TokenLedger::new("USDC", "USDC", 6);
        ledger.mint("alice", 1_000_000).unwrap();
        ledger.mint("bob", 1_000_000).unwrap();
        let assets = shared(ledger);
        let position = Arc::new(Mutex::new(0));
        let controls = Arc::new(Mutex::new(Controls::default()));
        let venue = MockVenue {
            assets: Arc::clone(&assets),
            position: Arc::clone(&position),
            controls: Arc::clone(&controls),
        };
        let config = VaultConfig::new("Yield Vault USDC", "yvUSDC", "mock", "mUSDC");
        let vault = Vault::new(config, Arc::clone(&assets), Box::new(venue)).unwrap();
        Harness {
            vault,
            assets,
            position,
            controls,
        }
    }

    // -- construction -------------------------------------------------------

    #[test]
    fn construction_derives_asset_from_venue() {
        let h = harness();
        assert_eq!(h.vault.asset(), "USDC");
        assert_eq!(h.vault.decimals(), 6);
        assert_eq!(h.vault.account(), VAULT);
        assert_eq!(h.vault.stage(), Stage::Idle);
    }

    #[test]
    fn construction_rejects_mismatched_venue() {
        let h = harness();
        let venue = MockVenue {
            assets: Arc::clone(&h.assets),
            position: Arc::new(Mutex::new(0)),
            controls: Arc::new(Mutex::new(Controls::default())),
        };
        let config = VaultConfig::new("Other", "yvUSDC", "aave-v3", "mUSDC");
        let err = Vault::new(config, Arc::clone(&h.assets), Box::new(venue)).unwrap_err();
        assert!(matches!(
            err,
            VaultError::Config(ConfigError::VenueMismatch { field: "venue", .. })
        ));
    }

    #[test]
    fn construction_rejects_wrong_asset_ledger() {
        let dai = shared(TokenLedger::new("DAI", "DAI", 18));
        let venue = MockVenue {
            assets: Arc::clone(&dai),
            position: Arc::new(Mutex::new(0)),
            controls: Arc::new(Mutex::new(Controls::default())),
        };
        let config = VaultConfig::new("Yield Vault USDC", "yvUSDC", "mock", "mUSDC");
        let err = Vault::new(config, dai, Box::new(venue)).unwrap_err();
        assert!(matches!(
            err,
            VaultError::Config(ConfigError::AssetMismatch { .. })
        ));
    }

    // -- deposit ------------------------------------------------------------

    #[test]
    fn first_deposit_mints_one_to_one_and_deploys() {
        let mut h = harness();
        let shares = h.vault.deposit("alice", "alice", 1_000).unwrap();

        assert_eq!(shares, 1_000);
        assert_eq!(h.vault.balance_of("alice"), 1_000);
        assert_eq!(h.vault.total_supply(), 1_000);
        assert_eq!(h.vault.position_value(), 1_000);
        assert_eq!(h.vault.idle_assets(), 0);
        assert_eq!(h.usdc("alice"), 999_000);
        assert_eq!(h.controls.lock().approved, 0, "approval fully consumed");
    }

    #[test]
    fn deposit_to_other_receiver() {
        let mut h = harness();
        h.vault.deposit("alice", "carol", 500).unwrap();
        assert_eq!(h.vault.balance_of("carol"), 500);
        assert_eq!(h.vault.balance_of("alice"), 0);
        assert_eq!(h.usdc("alice"), 999_500);
    }

    #[test]
    fn zero_deposit_rejected() {
        let mut h = harness();
        assert_eq!(h.vault.deposit("alice", "alice", 0), Err(VaultError::ZeroAmount));
    }

    #[test]
    fn deposit_after_yield_mints_fewer_shares() {
        let mut h = harness();
        h.vault.deposit("alice", "alice", 1_000).unwrap();
        h.accrue(1_000);

        let shares = h.vault.deposit("bob", "bob", 500).unwrap();
        assert_eq!(shares, 250);
        assert_eq!(h.vault.total_assets(), 2_500);
    }

    #[test]
    fn failed_supply_leaves_no_trace() {
        let mut h = harness();
        h.vault.deposit("alice", "alice", 1_000).unwrap();
        let supply_before = h.vault.total_supply();
        h.controls.lock().fail_supply = true;

        let err = h.vault.deposit("bob", "bob", 1_000).unwrap_err();

        assert!(matches!(err, VaultError::VenueUnavailable(VenueError::Rejected(_))));
        assert_eq!(h.vault.balance_of("bob"), 0);
        assert_eq!(h.vault.total_supply(), supply_before);
        assert_eq!(h.usdc("bob"), 1_000_000);
        assert_eq!(h.vault.idle_assets(), 0);
        assert_eq!(h.controls.lock().approved, 0, "approval revoked");
        assert_eq!(h.vault.stage(), Stage::Idle);
        assert!(h.vault.shares_balanced());
    }

    #[test]
    fn failed_supply_emits_no_event() {
        let mut h = harness();
        h.controls.lock().fail_supply = true;
        assert!(h.vault.deposit("alice", "alice", 10).is_err());
        assert!(h.vault.drain_events().is_empty());
    }

    #[test]
    fn unfunded_depositor_rejected_before_minting() {
        let mut h = harness();
        let err = h.vault.deposit("nobody", "nobody", 10).unwrap_err();
        assert!(matches!(
            err,
            VaultError::InsufficientAssets { available: 0, required: 10, .. }
        ));
        assert_eq!(h.vault.total_supply(), 0);
        assert_eq!(h.controls.lock().supplies, 0);
    }

    #[test]
    fn dust_deposit_into_rich_vault_is_invalid() {
        let mut h = harness();
        h.vault.deposit("alice", "alice", 10).unwrap();
        // 10 shares now back 1_000_010 assets; 1 unit buys 0.00001 shares.
        h.accrue(1_000_000);

        let err = h.vault.deposit("bob", "bob", 1).unwrap_err();
        assert_eq!(
            err,
            VaultError::InvalidAmount {
                requested: 1,
                denomination: "assets",
            }
        );
        assert_eq!(h.usdc("bob"), 1_000_000);
        assert_eq!(h.vault.total_supply(), 10);
    }

    // -- mint ---------------------------------------------------------------

    #[test]
    fn mint_charges_rounded_up() {
        let mut h = harness();
        h.vault.deposit("alice", "alice", 3).unwrap();
        h.accrue(1); // 4 assets : 3 shares

        // 1 share costs 4/3 assets, rounded up to 2.
        let charged = h.vault.mint("bob", "bob", 1).unwrap();
        assert_eq!(charged, 2);
        assert_eq!(h.vault.balance_of("bob"), 1);
        assert_eq!(h.usdc("bob"), 999_998);
    }

    #[test]
    fn zero_mint_rejected() {
        let mut h = harness();
        assert_eq!(h.vault.mint("alice", "alice", 0), Err(VaultError::ZeroAmount));
    }

    // -- withdraw / redeem --------------------------------------------------

    #[test]
    fn withdraw_releases_then_burns() {
        let mut h = harness();
        h.vault.deposit("alice", "alice", 1_000).unwrap();

        let burned = h.vault.withdraw("alice", "alice", "alice", 400).unwrap();
        assert_eq!(burned, 400);
        assert_eq!(h.vault.balance_of("alice"), 600);
        assert_eq!(h.vault.position_value(), 600);
        assert_eq!(h.usdc("alice"), 999_400);
        assert_eq!(h.controls.lock().releases, 1);
    }

    #[test]
    fn withdraw_exactly_position_succeeds() {
        let mut h = harness();
        h.vault.deposit("alice", "alice", 500).unwrap();
        assert_eq!(h.vault.withdraw("alice", "alice", "alice", 500), Ok(500));
        assert_eq!(h.vault.total_supply(), 0);
        assert_eq!(h.vault.total_assets(), 0);
    }

    #[test]
    fn withdraw_beyond_position_fails_before_burning() {
        let mut h = harness();
        h.vault.deposit("alice", "alice", 500).unwrap();

        let err = h.vault.withdraw("alice", "alice", "alice", 501).unwrap_err();
        assert_eq!(
            err,
            VaultError::VenueUnavailable(VenueError::InsufficientLiquidity {
                requested: 501,
                available: 500,
            })
        );
        assert_eq!(h.vault.balance_of("alice"), 500);
        assert_eq!(h.vault.position_value(), 500);
        assert_eq!(h.usdc("alice"), 999_500);
    }

    #[test]
    fn withdraw_rounds_burn_up() {
        let mut h = harness();
        h.vault.deposit("alice", "alice", 3).unwrap();
        h.accrue(1); // 4 assets : 3 shares

        // 1 asset costs 0.75 shares, rounded up to 1.
        assert_eq!(h.vault.preview_withdraw(1), Ok(1));
        assert_eq!(h.vault.withdraw("alice", "alice", "alice", 1), Ok(1));
    }

    #[test]
    fn short_owner_rejected_before_release() {
        let mut h = harness();
        h.vault.deposit("alice", "alice", 1_000).unwrap();
        h.vault.deposit("bob", "bob", 100).unwrap();

        // Bob asks for more than his 100 shares are worth; the venue could pay.
        let err = h.vault.withdraw("bob", "bob", "bob", 600).unwrap_err();

        assert_eq!(
            err,
            VaultError::InsufficientBalance {
                holder: "bob".into(),
                available: 100,
                required: 600,
            }
        );
        assert_eq!(h.vault.balance_of("bob"), 100);
        assert_eq!(h.vault.position_value(), 1_100);
        assert_eq!(h.vault.idle_assets(), 0);
        assert_eq!(h.usdc("bob"), 999_900);
        assert_eq!(h.controls.lock().releases, 0, "venue never touched");
        assert_eq!(h.controls.lock().supplies, 2);
        assert_eq!(h.vault.stage(), Stage::Idle);
    }

    #[test]
    fn shareless_caller_cannot_move_the_venue() {
        let mut h = harness();
        h.vault.deposit("alice", "alice", 3_000).unwrap();
        h.accrue(1_001);
        let total = h.vault.total_assets();

        for _ in 0..50 {
            assert!(matches!(
                h.vault.withdraw("mallory", "mallory", "mallory", 7),
                Err(VaultError::InsufficientBalance { available: 0, .. })
            ));
        }
        assert_eq!(h.vault.total_assets(), total);
        assert_eq!(h.controls.lock().releases, 0);
        assert_eq!(h.vault.drain_events().len(), 1);
    }

    #[test]
    fn failure_after_release_holds_funds_idle() {
        let mut h = harness();
        h.vault.deposit("alice", "alice", 1_000).unwrap();
        h.vault.drain_events();
        h.controls.lock().short_release = true;

        // The venue debits 300 but only hands over 299, so paying alice fails.
        let err = h.vault.withdraw("alice", "alice", "alice", 300).unwrap_err();

        assert!(matches!(err, VaultError::InsufficientAssets { .. }));
        assert_eq!(h.vault.balance_of("alice"), 1_000);
        assert_eq!(h.vault.total_supply(), 1_000);
        assert_eq!(h.vault.idle_assets(), 299);
        assert_eq!(h.vault.position_value(), 700);
        assert_eq!(h.usdc("alice"), 999_000);
        assert_eq!(h.controls.lock().supplies, 1, "nothing re-supplied");
        assert!(h.vault.drain_events().is_empty());
        assert_eq!(h.vault.stage(), Stage::Idle);
    }

    #[test]
    fn redeem_pays_rounded_down() {
        let mut h = harness();
        h.vault.deposit("alice", "alice", 3).unwrap();
        h.accrue(1); // 4 assets : 3 shares

        // 1 share is worth 1.33, paid as 1.
        assert_eq!(h.vault.redeem("alice", "alice", "alice", 1), Ok(1));
        assert_eq!(h.vault.balance_of("alice"), 2);
        assert_eq!(h.vault.total_assets(), 3);
    }

    #[test]
    fn redeem_worth_nothing_is_invalid() {
        let mut h = harness();
        h.vault.deposit("alice", "alice", 1_000).unwrap();
        // Wipe the position: shares are now worth zero.
        *h.position.lock() = 0;

        let err = h.vault.redeem("alice", "alice", "alice", 10).unwrap_err();
        assert_eq!(
            err,
            VaultError::InvalidAmount {
                requested: 10,
                denomination: "shares",
            }
        );
    }

    #[test]
    fn deposit_into_wiped_vault_cannot_be_priced() {
        let mut h = harness();
        h.vault.deposit("alice", "alice", 1_000).unwrap();
        *h.position.lock() = 0;

        let err = h.vault.deposit("bob", "bob", 10).unwrap_err();
        assert_eq!(err, VaultError::Math(MathError::DivisionByZero));
        // Minting shares for free is just as impossible.
        assert!(h.vault.mint("bob", "bob", 10).is_err());
        assert_eq!(h.vault.total_supply(), 1_000);
    }

    #[test]
    fn round_trip_loses_at_most_one_unit() {
        let mut h = harness();
        h.vault.deposit("alice", "alice", 7).unwrap();
        h.accrue(3); // 10 assets : 7 shares

        let shares = h.vault.deposit("bob", "bob", 1_000).unwrap();
        let back = h.vault.redeem("bob", "bob", "bob", shares).unwrap();
        assert!(back <= 1_000);
        assert!(1_000 - back <= 1, "lost {} units", 1_000 - back);
    }

    // -- delegated withdrawals ----------------------------------------------

    #[test]
    fn caller_with_allowance_withdraws_for_owner() {
        let mut h = harness();
        h.vault.deposit("alice", "alice", 1_000).unwrap();
        h.vault.approve("alice", "router", 300);

        let burned = h.vault.withdraw("router", "carol", "alice", 300).unwrap();
        assert_eq!(burned, 300);
        assert_eq!(h.vault.allowance("alice", "router"), 0);
        assert_eq!(h.usdc("carol"), 300);
        assert_eq!(h.vault.balance_of("alice"), 700);
    }

    #[test]
    fn caller_without_allowance_rejected_before_release() {
        let mut h = harness();
        h.vault.deposit("alice", "alice", 1_000).unwrap();
        h.vault.approve("alice", "router", 100);

        let err = h.vault.redeem("router", "router", "alice", 200).unwrap_err();
        assert!(matches!(
            err,
            VaultError::InsufficientAllowance { allowance: 100, required: 200, .. }
        ));
        assert_eq!(h.vault.allowance("alice", "router"), 100);
        assert_eq!(h.vault.balance_of("alice"), 1_000);
        assert_eq!(h.vault.position_value(), 1_000);
    }

    #[test]
    fn allowance_untouched_when_owner_short() {
        let mut h = harness();
        h.vault.deposit("alice", "alice", 100).unwrap();
        h.vault.deposit("bob", "bob", 1_000).unwrap();
        h.vault.approve("alice", "router", 500);

        // Allowance covers it, Alice's balance doesn't.
        let err = h.vault.withdraw("router", "router", "alice", 500).unwrap_err();
        assert!(matches!(err, VaultError::InsufficientBalance { .. }));
        assert_eq!(h.vault.allowance("alice", "router"), 500);
        assert_eq!(h.controls.lock().releases, 0);
    }

    // -- limits -------------------------------------------------------------

    #[test]
    fn max_withdraw_capped_by_liquidity() {
        let mut h = harness();
        h.vault.deposit("alice", "alice", 1_000).unwrap();
        assert_eq!(h.vault.max_withdraw("alice"), 1_000);
        assert_eq!(h.vault.max_redeem("alice"), 1_000);

        h.controls.lock().liquidity_cap = Some(250);
        assert_eq!(h.vault.max_withdraw("alice"), 250);
        assert_eq!(h.vault.max_redeem("alice"), 250);
        assert_eq!(h.vault.max_withdraw("nobody"), 0);
    }

    #[test]
    fn max_deposit_and_mint_on_empty_vault() {
        let h = harness();
        assert_eq!(h.vault.max_deposit("alice"), u64::MAX);
        assert_eq!(h.vault.max_mint("alice"), u64::MAX);
    }

    // -- transfers, reads, events ------------------------------------------

    #[test]
    fn share_transfers_keep_supply_balanced() {
        let mut h = harness();
        h.vault.deposit("alice", "alice", 1_000).unwrap();
        h.vault.transfer("alice", "bob", 400).unwrap();
        h.vault.approve("bob", "carol", 100);
        h.vault.transfer_from("carol", "bob", "dave", 100).unwrap();

        assert_eq!(h.vault.balance_of("alice"), 600);
        assert_eq!(h.vault.balance_of("bob"), 300);
        assert_eq!(h.vault.balance_of("dave"), 100);
        assert_eq!(h.vault.total_supply(), 1_000);
        assert!(h.vault.shares_balanced());
    }

    #[test]
    fn previews_match_executions() {
        let mut h = harness();
        h.vault.deposit("alice", "alice", 997).unwrap();
        h.accrue(13);

        let expected = h.vault.preview_deposit(333).unwrap();
        assert_eq!(h.vault.deposit("bob", "bob", 333), Ok(expected));

        let expected = h.vault.preview_redeem(100).unwrap();
        assert_eq!(h.vault.redeem("bob", "bob", "bob", 100), Ok(expected));
    }

    #[test]
    fn reads_are_idempotent() {
        let mut h = harness();
        h.vault.deposit("alice", "alice", 12_345).unwrap();
        h.accrue(678);
        let a = h.vault.convert_to_shares(1_000);
        let b = h.vault.convert_to_assets(1_000);
        for _ in 0..5 {
            assert_eq!(h.vault.convert_to_shares(1_000), a);
            assert_eq!(h.vault.convert_to_assets(1_000), b);
        }
    }

    #[test]
    fn events_drain_in_order() {
        let mut h = harness();
        h.vault.deposit("alice", "alice", 100).unwrap();
        h.vault.redeem("alice", "bob", "alice", 40).unwrap();

        let events = h.vault.drain_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].kind, VaultEventKind::Deposit { assets: 100, .. }));
        assert!(matches!(
            &events[1].kind,
            VaultEventKind::Withdraw { receiver, shares: 40, .. } if receiver == "bob"
        ));
        assert!(h.vault.drain_events().is_empty());
    }

    #[test]
    fn snapshot_reports_price_per_share() {
        let mut h = harness();
        h.vault.deposit("alice", "alice", 1_000_000).unwrap();
        h.accrue(500_000);

        let snap = h.vault.snapshot();
        assert_eq!(snap.total_assets, 1_500_000);
        assert_eq!(snap.total_shares, 1_000_000);
        assert_eq!(snap.price_per_share, 1_500_000);
        assert_eq!(snap.holders, 1);
        assert_eq!(snap.asset, "USDC");
    }
}
