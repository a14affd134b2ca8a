//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the hosted vault over HTTP.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                    | Description                          |
//! |--------|-------------------------|--------------------------------------|
//! | GET    | `/health`               | Liveness check                       |
//! | GET    | `/status`               | Node and vault summary               |
//! | GET    | `/vault`                | Full vault snapshot                  |
//! | GET    | `/holders/:id`          | Shares, value and limits of a holder |
//! | GET    | `/preview/:op/:amount`  | Preview deposit/mint/withdraw/redeem |
//! | POST   | `/deposit`              | Deposit exact assets                 |
//! | POST   | `/mint`                 | Mint exact shares                    |
//! | POST   | `/withdraw`             | Withdraw exact assets                |
//! | POST   | `/redeem`               | Redeem exact shares                  |
//! | POST   | `/transfer`             | Move shares between holders          |
//! | POST   | `/faucet`               | Mint test underlying to an account   |
//! | POST   | `/venue/yield`          | Pay interest into the pool reserve   |
//! | POST   | `/venue/borrow`         | Borrow cash out of the pool reserve  |
//! | POST   | `/venue/freeze`         | Freeze or unfreeze the reserve       |
//! | GET    | `/ws`                   | WebSocket for live vault events      |
//!
//! Each vault write holds the vault mutex for its whole duration, so
//! requests are serialized against one another.

use anyhow::Context;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use yieldvault::ledger::shared;
use yieldvault::{
    SharedLedger, TokenError, TokenLedger, Vault, VaultConfig, VaultError, VaultEvent,
    VaultSnapshot,
};
use yieldvault_contracts::{LendingPool, LendingPoolAdapter, PoolError, SharedPool};

use crate::cli::VaultArgs;
use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone: everything sits behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Underlying asset id of the hosted vault.
    pub asset: String,
    /// The hosted vault.
    pub vault: Arc<Mutex<Vault>>,
    /// The lending pool the vault deploys into.
    pub pool: SharedPool,
    /// Ledger of the underlying asset.
    pub assets: SharedLedger,
    /// Largest amount a single faucet call may mint.
    pub faucet_limit: u64,
    /// Broadcast channel for committed vault events.
    pub event_tx: broadcast::Sender<VaultEvent>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
    /// When the node started.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Lists the asset on a fresh pool and builds a vault on top of it.
    pub fn bootstrap(
        args: &VaultArgs,
        metrics: SharedMetrics,
        event_tx: broadcast::Sender<VaultEvent>,
    ) -> anyhow::Result<Self> {
        let position_token = args.position_token();

        let mut pool = LendingPool::new(&args.venue);
        pool.init_reserve(&args.asset, &position_token)
            .with_context(|| format!("failed to list {} on {}", args.asset, args.venue))?;
        let pool = Arc::new(RwLock::new(pool));

        let assets = shared(TokenLedger::new(&args.asset, &args.asset, args.decimals));

        let config = VaultConfig::new(args.name(), args.symbol(), &args.venue, &position_token);
        let adapter = LendingPoolAdapter::new(
            Arc::clone(&pool),
            Arc::clone(&assets),
            &args.asset,
            &config.account,
        )
        .context("failed to bind pool adapter")?;
        let vault = Vault::new(config, Arc::clone(&assets), Box::new(adapter))
            .context("failed to build vault")?;

        metrics.observe(&vault.snapshot());

        Ok(Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            asset: args.asset.clone(),
            vault: Arc::new(Mutex::new(vault)),
            pool,
            assets,
            faucet_limit: args.faucet_limit,
            event_tx,
            metrics,
            started_at: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/vault", get(vault_handler))
        .route("/holders/:id", get(holder_handler))
        .route("/preview/:op/:amount", get(preview_handler))
        .route("/deposit", post(deposit_handler))
        .route("/mint", post(mint_handler))
        .route("/withdraw", post(withdraw_handler))
        .route("/redeem", post(redeem_handler))
        .route("/transfer", post(transfer_handler))
        .route("/faucet", post(faucet_handler))
        .route("/venue/yield", post(yield_handler))
        .route("/venue/borrow", post(borrow_handler))
        .route("/venue/freeze", post(freeze_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request Types
// ---------------------------------------------------------------------------

/// Body of `POST /deposit`. `receiver` defaults to `caller`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DepositRequest {
    pub caller: String,
    pub receiver: Option<String>,
    pub assets: u64,
}

/// Body of `POST /mint`. `receiver` defaults to `caller`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MintRequest {
    pub caller: String,
    pub receiver: Option<String>,
    pub shares: u64,
}

/// Body of `POST /withdraw`. `receiver` and `owner` default to `caller`.
#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub caller: String,
    pub receiver: Option<String>,
    pub owner: Option<String>,
    pub assets: u64,
}

/// Body of `POST /redeem`. `receiver` and `owner` default to `caller`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RedeemRequest {
    pub caller: String,
    pub receiver: Option<String>,
    pub owner: Option<String>,
    pub shares: u64,
}

/// Body of `POST /transfer`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from: String,
    pub to: String,
    pub shares: u64,
}

/// Body of `POST /faucet`.
#[derive(Debug, Serialize, Deserialize)]
pub struct FaucetRequest {
    pub account: String,
    pub amount: u64,
}

/// Body of `POST /venue/yield`.
#[derive(Debug, Serialize, Deserialize)]
pub struct YieldRequest {
    pub amount: u64,
}

/// Body of `POST /venue/borrow`.
#[derive(Debug, Serialize, Deserialize)]
pub struct BorrowRequest {
    pub borrower: String,
    pub amount: u64,
}

/// Body of `POST /venue/freeze`.
#[derive(Debug, Serialize, Deserialize)]
pub struct FreezeRequest {
    pub frozen: bool,
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// Share symbol of the hosted vault.
    pub vault: String,
    /// Underlying asset.
    pub asset: String,
    /// Lending venue.
    pub venue: String,
    pub total_assets: u64,
    pub total_shares: u64,
    /// Seconds since the node started.
    pub uptime_secs: i64,
    /// RFC 3339 timestamp of the response.
    pub timestamp: String,
}

/// Response payload for `GET /holders/:id`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HolderResponse {
    pub account: String,
    /// Shares held.
    pub shares: u64,
    /// What those shares redeem for now.
    pub value: u64,
    /// Underlying held outside the vault.
    pub underlying: u64,
    pub max_withdraw: u64,
    pub max_redeem: u64,
}

/// Response payload for `GET /preview/:op/:amount`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PreviewResponse {
    pub op: String,
    pub amount: u64,
    /// Shares for deposit/withdraw, underlying for mint/redeem.
    pub result: u64,
}

/// Response payload for the four vault writes.
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationResponse {
    pub op: String,
    /// Underlying moved in or out.
    pub assets: u64,
    /// Shares minted or burned.
    pub shares: u64,
    pub total_assets: u64,
    pub total_shares: u64,
}

/// Response payload for `POST /transfer`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TransferResponse {
    pub from: String,
    pub to: String,
    pub shares: u64,
    pub from_balance: u64,
    pub to_balance: u64,
}

/// Response payload for `POST /faucet`.
#[derive(Debug, Serialize, Deserialize)]
pub struct FaucetResponse {
    pub account: String,
    pub balance: u64,
}

/// Response payload for the `/venue/*` endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReserveResponse {
    pub asset: String,
    pub position_token: String,
    pub cash: u64,
    pub borrowed: u64,
    pub total_supplied: u64,
    pub frozen: bool,
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// An error rendered as an HTTP status with an [`ErrorResponse`] body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<VaultError> for ApiError {
    fn from(err: VaultError) -> Self {
        let status = match &err {
            VaultError::ZeroAmount | VaultError::InvalidAmount { .. } => StatusCode::BAD_REQUEST,
            VaultError::InsufficientBalance { .. }
            | VaultError::InsufficientAllowance { .. }
            | VaultError::InsufficientAssets { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            VaultError::VenueUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            VaultError::Math(_) => StatusCode::CONFLICT,
            VaultError::Ledger(_) | VaultError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<PoolError> for ApiError {
    fn from(err: PoolError) -> Self {
        let status = match &err {
            PoolError::ZeroAmount => StatusCode::BAD_REQUEST,
            PoolError::UnknownReserve(_) => StatusCode::NOT_FOUND,
            PoolError::Frozen(_) | PoolError::NoSuppliers(_) | PoolError::ReserveExists(_) => {
                StatusCode::CONFLICT
            }
            PoolError::InsufficientLiquidity { .. }
            | PoolError::InsufficientPosition { .. }
            | PoolError::Overpayment { .. }
            | PoolError::Overflow
            | PoolError::Ledger(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PoolError::AssetMismatch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        let status = match &err {
            TokenError::InvalidAmount { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------------
// Vault execution
// ---------------------------------------------------------------------------

/// Runs one vault write under the vault lock, then records metrics and
/// publishes any committed events.
fn execute<T>(
    state: &AppState,
    op: &'static str,
    f: impl FnOnce(&mut Vault) -> Result<T, VaultError>,
) -> Result<(T, VaultSnapshot), ApiError> {
    let timer = state.metrics.operation_latency_seconds.start_timer();
    let mut vault = state.vault.lock();
    let result = f(&mut vault);
    timer.observe_duration();
    let snapshot = vault.snapshot();
    let events = vault.drain_events();
    drop(vault);

    state.metrics.observe(&snapshot);
    match result {
        Ok(value) => {
            state.metrics.operations_total.with_label_values(&[op]).inc();
            for event in events {
                // No subscribers is fine.
                let _ = state.event_tx.send(event);
            }
            Ok((value, snapshot))
        }
        Err(err) => {
            state.metrics.failed_operations_total.inc();
            tracing::warn!(op, error = %err, "vault operation rejected");
            Err(err.into())
        }
    }
}

/// Refreshes gauges after the pool changed underneath the vault.
fn refresh_metrics(state: &AppState) {
    let snapshot = state.vault.lock().snapshot();
    state.metrics.observe(&snapshot);
}

fn reserve_response(state: &AppState) -> Result<ReserveResponse, ApiError> {
    let pool = state.pool.read();
    let reserve = pool
        .reserve(&state.asset)
        .ok_or_else(|| PoolError::UnknownReserve(state.asset.clone()))?;
    Ok(ReserveResponse {
        asset: reserve.asset.clone(),
        position_token: reserve.position_token.clone(),
        cash: reserve.cash,
        borrowed: reserve.borrowed,
        total_supplied: reserve.total_supplied(),
        frozen: reserve.frozen,
    })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` - returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` - node and vault summary.
async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let vault = state.vault.lock();
    let resp = StatusResponse {
        version: state.version.clone(),
        vault: vault.symbol().to_string(),
        asset: vault.asset().to_string(),
        venue: vault.config().venue.clone(),
        total_assets: vault.total_assets(),
        total_shares: vault.total_supply(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        timestamp: Utc::now().to_rfc3339(),
    };
    Json(resp)
}

/// `GET /vault` - full snapshot.
async fn vault_handler(State(state): State<AppState>) -> Json<VaultSnapshot> {
    Json(state.vault.lock().snapshot())
}

/// `GET /holders/:id` - one account's position in the vault.
async fn holder_handler(
    Path(account): Path<String>,
    State(state): State<AppState>,
) -> Json<HolderResponse> {
    let vault = state.vault.lock();
    let shares = vault.balance_of(&account);
    let resp = HolderResponse {
        shares,
        value: vault.convert_to_assets(shares).unwrap_or(0),
        underlying: state.assets.read().balance_of(&account),
        max_withdraw: vault.max_withdraw(&account),
        max_redeem: vault.max_redeem(&account),
        account,
    };
    Json(resp)
}

/// `GET /preview/:op/:amount` - what an operation would do right now.
async fn preview_handler(
    Path((op, amount)): Path<(String, u64)>,
    State(state): State<AppState>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let vault = state.vault.lock();
    let result = match op.as_str() {
        "deposit" => vault.preview_deposit(amount)?,
        "mint" => vault.preview_mint(amount)?,
        "withdraw" => vault.preview_withdraw(amount)?,
        "redeem" => vault.preview_redeem(amount)?,
        other => {
            return Err(ApiError::bad_request(format!(
                "unknown preview operation: {other}"
            )))
        }
    };
    Ok(Json(PreviewResponse { op, amount, result }))
}

/// `POST /deposit`
async fn deposit_handler(
    State(state): State<AppState>,
    Json(req): Json<DepositRequest>,
) -> Result<Json<OperationResponse>, ApiError> {
    let receiver = req.receiver.unwrap_or_else(|| req.caller.clone());
    let (shares, snapshot) = execute(&state, "deposit", |vault| {
        vault.deposit(&req.caller, &receiver, req.assets)
    })?;
    Ok(Json(OperationResponse {
        op: "deposit".into(),
        assets: req.assets,
        shares,
        total_assets: snapshot.total_assets,
        total_shares: snapshot.total_shares,
    }))
}

/// `POST /mint`
async fn mint_handler(
    State(state): State<AppState>,
    Json(req): Json<MintRequest>,
) -> Result<Json<OperationResponse>, ApiError> {
    let receiver = req.receiver.unwrap_or_else(|| req.caller.clone());
    let (assets, snapshot) = execute(&state, "mint", |vault| {
        vault.mint(&req.caller, &receiver, req.shares)
    })?;
    Ok(Json(OperationResponse {
        op: "mint".into(),
        assets,
        shares: req.shares,
        total_assets: snapshot.total_assets,
        total_shares: snapshot.total_shares,
    }))
}

/// `POST /withdraw`
async fn withdraw_handler(
    State(state): State<AppState>,
    Json(req): Json<WithdrawRequest>,
) -> Result<Json<OperationResponse>, ApiError> {
    let receiver = req.receiver.unwrap_or_else(|| req.caller.clone());
    let owner = req.owner.unwrap_or_else(|| req.caller.clone());
    let (shares, snapshot) = execute(&state, "withdraw", |vault| {
        vault.withdraw(&req.caller, &receiver, &owner, req.assets)
    })?;
    Ok(Json(OperationResponse {
        op: "withdraw".into(),
        assets: req.assets,
        shares,
        total_assets: snapshot.total_assets,
        total_shares: snapshot.total_shares,
    }))
}

/// `POST /redeem`
async fn redeem_handler(
    State(state): State<AppState>,
    Json(req): Json<RedeemRequest>,
) -> Result<Json<OperationResponse>, ApiError> {
    let receiver = req.receiver.unwrap_or_else(|| req.caller.clone());
    let owner = req.owner.unwrap_or_else(|| req.caller.clone());
    let (assets, snapshot) = execute(&state, "redeem", |vault| {
        vault.redeem(&req.caller, &receiver, &owner, req.shares)
    })?;
    Ok(Json(OperationResponse {
        op: "redeem".into(),
        assets,
        shares: req.shares,
        total_assets: snapshot.total_assets,
        total_shares: snapshot.total_shares,
    }))
}

/// `POST /transfer`
async fn transfer_handler(
    State(state): State<AppState>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<TransferResponse>, ApiError> {
    let ((from_balance, to_balance), _) = execute(&state, "transfer", |vault| {
        vault.transfer(&req.from, &req.to, req.shares)?;
        Ok((vault.balance_of(&req.from), vault.balance_of(&req.to)))
    })?;
    Ok(Json(TransferResponse {
        from: req.from,
        to: req.to,
        shares: req.shares,
        from_balance,
        to_balance,
    }))
}

/// `POST /faucet` - mints test underlying. Capped per call.
async fn faucet_handler(
    State(state): State<AppState>,
    Json(req): Json<FaucetRequest>,
) -> Result<Json<FaucetResponse>, ApiError> {
    if req.amount > state.faucet_limit {
        return Err(ApiError::bad_request(format!(
            "faucet amount {} exceeds limit {}",
            req.amount, state.faucet_limit
        )));
    }
    let balance = state.assets.write().mint(&req.account, req.amount)?;
    tracing::info!(account = %req.account, amount = req.amount, "faucet mint");
    Ok(Json(FaucetResponse {
        account: req.account,
        balance,
    }))
}

/// `POST /venue/yield` - pays interest into the reserve.
async fn yield_handler(
    State(state): State<AppState>,
    Json(req): Json<YieldRequest>,
) -> Result<Json<ReserveResponse>, ApiError> {
    state
        .pool
        .write()
        .distribute_yield(&mut state.assets.write(), &state.asset, req.amount)?;
    refresh_metrics(&state);
    Ok(Json(reserve_response(&state)?))
}

/// `POST /venue/borrow` - takes cash out of the reserve.
async fn borrow_handler(
    State(state): State<AppState>,
    Json(req): Json<BorrowRequest>,
) -> Result<Json<ReserveResponse>, ApiError> {
    state.pool.write().borrow(
        &mut state.assets.write(),
        &req.borrower,
        &state.asset,
        req.amount,
    )?;
    Ok(Json(reserve_response(&state)?))
}

/// `POST /venue/freeze` - toggles the reserve's frozen flag.
async fn freeze_handler(
    State(state): State<AppState>,
    Json(req): Json<FreezeRequest>,
) -> Result<Json<ReserveResponse>, ApiError> {
    state.pool.write().set_frozen(&state.asset, req.frozen)?;
    Ok(Json(reserve_response(&state)?))
}

/// `GET /ws` - WebSocket upgrade for live event streaming.
///
/// Clients receive JSON-encoded [`VaultEvent`] messages for every committed
/// deposit and withdrawal. Client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drives a single WebSocket connection, forwarding broadcast events
/// until the client disconnects or the channel is closed.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
