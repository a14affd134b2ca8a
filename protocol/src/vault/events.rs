//! Vault events and display snapshots.
//!
//! Events are buffered inside the vault as operations commit and drained by
//! whoever hosts it. A failed operation never produces an event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AccountId;

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VaultEventKind {
    /// `caller` paid `assets` and `owner` received `shares`.
    Deposit {
        caller: AccountId,
        owner: AccountId,
        assets: u64,
        shares: u64,
    },
    /// `owner` gave up `shares` and `receiver` got `assets`, at `caller`'s
    /// request.
    Withdraw {
        caller: AccountId,
        receiver: AccountId,
        owner: AccountId,
        assets: u64,
        shares: u64,
    },
}

/// A committed vault operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultEvent {
    /// Unique event id.
    pub id: Uuid,
    /// Share symbol of the emitting vault.
    pub vault: String,
    /// When the operation committed.
    pub timestamp: DateTime<Utc>,
    /// The operation itself.
    #[serde(flatten)]
    pub kind: VaultEventKind,
}

impl VaultEvent {
    pub(crate) fn new(vault: &str, kind: VaultEventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            vault: vault.to_string(),
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Underlying units that moved.
    pub fn assets(&self) -> u64 {
        match &self.kind {
            VaultEventKind::Deposit { assets, .. } | VaultEventKind::Withdraw { assets, .. } => {
                *assets
            }
        }
    }

    /// Shares minted or burned.
    pub fn shares(&self) -> u64 {
        match &self.kind {
            VaultEventKind::Deposit { shares, .. } | VaultEventKind::Withdraw { shares, .. } => {
                *shares
            }
        }
    }
}

/// Point-in-time summary of a vault, for display. Stale the moment the next
/// operation commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSnapshot {
    pub name: String,
    pub symbol: String,
    pub asset: String,
    pub decimals: u8,
    pub venue: String,
    pub position_token: String,
    pub account: AccountId,
    /// Idle custody plus venue position.
    pub total_assets: u64,
    pub idle_assets: u64,
    pub position_value: u64,
    pub total_shares: u64,
    /// Number of holder records, including zero balances.
    pub holders: usize,
    /// Underlying units one whole share (10^decimals units) redeems for.
    pub price_per_share: u64,
    pub accepts_deposits: bool,
    pub available_liquidity: u64,
}
