//! # Vault Configuration & Constants
//!
//! Every magic number in the vault lives here. Construction parameters are
//! validated once, when the vault is built, and are immutable afterwards.
//! There is no runtime reconfiguration: if you want a different venue, you
//! want a different vault.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Exchange Rate
// ---------------------------------------------------------------------------

/// Shares minted per unit of underlying while no shares exist.
///
/// The first depositor sets the price at 1:1. Anything else would need a
/// reference price we don't have.
pub const INITIAL_SHARES_PER_ASSET: u64 = 1;

/// Share tokens use the same precision as the underlying asset unless told
/// otherwise. Most stablecoin reserves are 6, most native tokens are 8 or 9.
pub const DEFAULT_DECIMALS: u8 = 6;

// ---------------------------------------------------------------------------
// Metadata Limits
// ---------------------------------------------------------------------------

/// Maximum length of a vault name, in bytes.
pub const MAX_NAME_LENGTH: usize = 64;

/// Maximum length of a share symbol, in bytes. Tickers, not sentences.
pub const MAX_SYMBOL_LENGTH: usize = 16;

/// Prefix of the custody account a vault uses on the underlying ledger.
pub const VAULT_ACCOUNT_PREFIX: &str = "vault:";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Construction parameters that failed validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required field was empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A metadata field exceeded its length limit.
    #[error("{field} too long: {len} bytes (max {max})")]
    TooLong {
        /// The offending field.
        field: &'static str,
        /// Actual length in bytes.
        len: usize,
        /// Allowed maximum.
        max: usize,
    },

    /// The adapter handed to the vault does not match what the config names.
    #[error("venue mismatch on {field}: config says {expected}, adapter reports {actual}")]
    VenueMismatch {
        /// Which identity disagreed.
        field: &'static str,
        /// Value from the configuration.
        expected: String,
        /// Value reported by the adapter.
        actual: String,
    },

    /// The shared asset ledger tracks a different token than the venue's
    /// position token is denominated in.
    #[error("asset mismatch: venue position is backed by {venue_asset}, ledger tracks {ledger_asset}")]
    AssetMismatch {
        /// Underlying asset derived from the position token.
        venue_asset: String,
        /// Token tracked by the supplied asset ledger.
        ledger_asset: String,
    },
}

// ---------------------------------------------------------------------------
// VaultConfig
// ---------------------------------------------------------------------------

/// Construction parameters for a [`Vault`](crate::vault::Vault).
///
/// The underlying asset is deliberately absent: it is derived from the
/// venue's position token so the two can never disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Human-readable vault name (e.g. "Yield Vault USDC").
    pub name: String,
    /// Share ticker (e.g. "yvUSDC").
    pub symbol: String,
    /// Identity of the lending venue the vault deploys into.
    pub venue: String,
    /// Identity of the venue's position token for the underlying asset.
    pub position_token: String,
    /// Custody account the vault uses on the underlying ledger.
    pub account: String,
}

impl VaultConfig {
    /// Builds a config with the conventional custody account
    /// (`vault:<symbol>`).
    pub fn new(
        name: impl Into<String>,
        symbol: impl Into<String>,
        venue: impl Into<String>,
        position_token: impl Into<String>,
    ) -> Self {
        let symbol = symbol.into();
        Self {
            name: name.into(),
            account: format!("{VAULT_ACCOUNT_PREFIX}{symbol}"),
            symbol,
            venue: venue.into(),
            position_token: position_token.into(),
        }
    }

    /// Overrides the custody account.
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = account.into();
        self
    }

    /// Checks the self-contained parts of the config. Cross-checks against
    /// the adapter happen in [`Vault::new`](crate::vault::Vault::new).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] for empty fields and
    /// [`ConfigError::TooLong`] when name or symbol exceed their limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("name", &self.name),
            ("symbol", &self.symbol),
            ("venue", &self.venue),
            ("position_token", &self.position_token),
            ("account", &self.account),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField(field));
            }
        }

        if self.name.len() > MAX_NAME_LENGTH {
            return Err(ConfigError::TooLong {
                field: "name",
                len: self.name.len(),
                max: MAX_NAME_LENGTH,
            });
        }
        if self.symbol.len() > MAX_SYMBOL_LENGTH {
            return Err(ConfigError::TooLong {
                field: "symbol",
                len: self.symbol.len(),
                max: MAX_SYMBOL_LENGTH,
            });
        }

        Ok(())
    }
}
