//! # yieldvault Venue Contracts
//!
//! The venue side of a yieldvault deployment:
//!
//! - **Lending Pool** - an in-process lending market with per-asset
//!   reserves, scaled supplier balances, borrows and yield distribution.
//! - **Pool Adapter** - the [`VenueAdapter`](yieldvault::VenueAdapter) that
//!   lets a vault supply into and release from a pool reserve.
//!
//! ## Design Principles
//!
//! 1. All monetary operations check for overflow before anything moves.
//! 2. Every ledger transfer is the last fallible step, so a rejected call
//!    leaves pool state untouched.
//! 3. Pool state is serializable (serde) for snapshots and the node API.

pub mod lending_pool;
pub mod pool_adapter;

pub use lending_pool::{LendingPool, PoolError, Reserve};
pub use pool_adapter::{LendingPoolAdapter, SharedPool};
