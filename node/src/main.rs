// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Yield Vault Node
//!
//! Entry point for the `yieldvault-node` binary. Parses CLI arguments,
//! initializes logging and metrics, builds a vault over a simulated lending
//! pool, and serves the HTTP/WS API.
//!
//! The binary supports three subcommands:
//!
//! - `run`      - serve the API and metrics endpoints
//! - `simulate` - drive the vault through seeded random traffic
//! - `version`  - print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;

use cli::{Commands, YieldVaultCli};
use logging::LogFormat;
use metrics::VaultMetrics;

/// Broadcast channel capacity for live event streaming.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = YieldVaultCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args, cli.log_format).await,
        Commands::Simulate(args) => simulate(args, cli.log_format),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the API and metrics servers and blocks until shutdown.
async fn run_node(args: cli::RunArgs, log_format: LogFormat) -> Result<()> {
    logging::init_logging(logging::SERVE_FILTER, log_format)?;

    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        asset = %args.vault.asset,
        venue = %args.vault.venue,
        "starting yieldvault-node"
    );

    // --- Metrics ---
    let vault_metrics = Arc::new(VaultMetrics::new().context("failed to register metrics")?);

    // --- Event broadcast ---
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    // --- Application state ---
    let app_state = api::AppState::bootstrap(&args.vault, Arc::clone(&vault_metrics), event_tx)?;
    tracing::info!(
        vault = %args.vault.symbol(),
        account = %app_state.vault.lock().account(),
        "vault deployed"
    );

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("RPC/API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(vault_metrics);
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("yieldvault-node stopped");
    Ok(())
}

/// Runs seeded random traffic against a fresh vault and prints the final
/// snapshot as JSON on stdout.
fn simulate(args: cli::SimulateArgs, log_format: LogFormat) -> Result<()> {
    logging::init_logging(logging::SIMULATE_FILTER, log_format)?;

    let vault_metrics = Arc::new(VaultMetrics::new().context("failed to register metrics")?);
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    let state = api::AppState::bootstrap(&args.vault, vault_metrics, event_tx)?;

    let users: Vec<String> = (0..args.users.max(1)).map(|i| format!("user-{i}")).collect();
    let unit = 10u64.saturating_pow(u32::from(args.vault.decimals));
    {
        let mut ledger = state.assets.write();
        for user in &users {
            ledger
                .mint(user, unit.saturating_mul(1_000_000))
                .with_context(|| format!("failed to fund {user}"))?;
        }
    }

    let mut rng = StdRng::seed_from_u64(args.seed);
    let (mut committed, mut rejected) = (0u64, 0u64);

    for _ in 0..args.steps {
        let caller = &users[rng.gen_range(0..users.len())];
        let amount = rng.gen_range(1..=unit.saturating_mul(10_000));

        let outcome = match rng.gen_range(0..10) {
            0..=3 => state.vault.lock().deposit(caller, caller, amount).map(|_| ()),
            4 => state.vault.lock().mint(caller, caller, amount).map(|_| ()),
            5 | 6 => {
                let mut vault = state.vault.lock();
                let assets = amount.min(vault.max_withdraw(caller));
                vault.withdraw(caller, caller, caller, assets).map(|_| ())
            }
            7 => {
                let mut vault = state.vault.lock();
                let shares = vault.balance_of(caller) / 2;
                vault.redeem(caller, caller, caller, shares).map(|_| ())
            }
            8 => {
                let interest = amount / 100 + 1;
                if let Err(err) = state.pool.write().distribute_yield(
                    &mut state.assets.write(),
                    &state.asset,
                    interest,
                ) {
                    tracing::debug!(error = %err, "yield skipped");
                }
                continue;
            }
            _ => {
                let mut pool = state.pool.write();
                let mut ledger = state.assets.write();
                let debt = pool
                    .reserve(&state.asset)
                    .map(|r| r.debt_of("borrower"))
                    .unwrap_or(0);
                let result = if debt > 0 && rng.gen_bool(0.5) {
                    pool.repay(&mut ledger, "borrower", &state.asset, debt)
                } else {
                    pool.borrow(&mut ledger, "borrower", &state.asset, amount / 4 + 1)
                };
                if let Err(err) = result {
                    tracing::debug!(error = %err, "pool activity skipped");
                }
                continue;
            }
        };

        match outcome {
            Ok(()) => committed += 1,
            Err(err) => {
                rejected += 1;
                tracing::debug!(error = %err, "simulated operation rejected");
            }
        }
    }

    let snapshot = state.vault.lock().snapshot();
    tracing::info!(
        steps = args.steps,
        committed,
        rejected,
        total_assets = snapshot.total_assets,
        total_shares = snapshot.total_shares,
        "simulation finished"
    );
    let report =
        serde_json::to_string_pretty(&snapshot).context("failed to serialize vault snapshot")?;
    println!("{}", report);
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("yieldvault-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc           {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
