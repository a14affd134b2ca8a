//! # CLI Interface
//!
//! Defines the command-line argument structure for `yieldvault-node` using
//! `clap` derive. Supports three subcommands: `run`, `simulate`, and
//! `version`. Every option can also be set through a `YIELDVAULT_*`
//! environment variable.

use clap::{Args, Parser, Subcommand};

use yieldvault::config::DEFAULT_DECIMALS;

use crate::logging::LogFormat;

/// Tokenized yield vault host.
///
/// Runs a single vault over a simulated lending pool, serves a REST and
/// WebSocket API for it, and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "yieldvault-node",
    about = "Tokenized yield vault host",
    version,
    propagate_version = true
)]
pub struct YieldVaultCli {
    /// Log output format.
    #[arg(long, global = true, env = "YIELDVAULT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the API and metrics servers.
    Run(RunArgs),
    /// Drive a vault through randomised traffic and print the final state.
    Simulate(SimulateArgs),
    /// Print version information and exit.
    Version,
}

/// Parameters of the vault and pool the node hosts.
#[derive(Args, Debug, Clone)]
pub struct VaultArgs {
    /// Underlying asset id.
    #[arg(long, env = "YIELDVAULT_ASSET", default_value = "USDC")]
    pub asset: String,

    /// Precision of the underlying asset.
    #[arg(long, env = "YIELDVAULT_DECIMALS", default_value_t = DEFAULT_DECIMALS)]
    pub decimals: u8,

    /// Identity of the lending pool.
    #[arg(long, env = "YIELDVAULT_VENUE", default_value = "aave-v3")]
    pub venue: String,

    /// Position token symbol. Defaults to `a<ASSET>`.
    #[arg(long, env = "YIELDVAULT_POSITION_TOKEN")]
    pub position_token: Option<String>,

    /// Vault name. Defaults to `Yield Vault <ASSET>`.
    #[arg(long, env = "YIELDVAULT_NAME")]
    pub name: Option<String>,

    /// Share symbol. Defaults to `yv<ASSET>`.
    #[arg(long, env = "YIELDVAULT_SYMBOL")]
    pub symbol: Option<String>,

    /// Largest amount a single `/faucet` call may mint.
    #[arg(long, env = "YIELDVAULT_FAUCET_LIMIT", default_value_t = 1_000_000_000_000)]
    pub faucet_limit: u64,
}

impl VaultArgs {
    pub fn position_token(&self) -> String {
        self.position_token
            .clone()
            .unwrap_or_else(|| format!("a{}", self.asset))
    }

    pub fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("Yield Vault {}", self.asset))
    }

    pub fn symbol(&self) -> String {
        self.symbol
            .clone()
            .unwrap_or_else(|| format!("yv{}", self.asset))
    }
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub vault: VaultArgs,

    /// Port for the REST and WebSocket API.
    #[arg(long, env = "YIELDVAULT_RPC_PORT", default_value_t = 9741)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "YIELDVAULT_METRICS_PORT", default_value_t = 9742)]
    pub metrics_port: u16,
}

/// Arguments for the `simulate` subcommand.
#[derive(Parser, Debug)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub vault: VaultArgs,

    /// Number of random operations to run.
    #[arg(long, env = "YIELDVAULT_SIM_STEPS", default_value_t = 1_000)]
    pub steps: usize,

    /// Number of simulated depositors.
    #[arg(long, env = "YIELDVAULT_SIM_USERS", default_value_t = 4)]
    pub users: usize,

    /// RNG seed, for reproducible runs.
    #[arg(long, env = "YIELDVAULT_SIM_SEED", default_value_t = 42)]
    pub seed: u64,
}
