//! The gateway's opaque store: `SQLite` persistence for organizations,
//! projects, api keys, provider keys, custom providers, logs,
//! transactions, and the worker's coordination locks (§3).
//!
//! [`Store`] is the one type most callers need; [`GatewayEnv`] reads the
//! process-wide deployment flags, and [`lock`] exposes the `withLock`
//! primitive the usage worker uses directly (it needs the pool, not a
//! `Store` method, since it runs outside any single store call).

pub mod env;
pub mod error;
pub mod lock;
mod migrations;
pub mod pool;
pub mod store;

pub use env::GatewayEnv;
pub use error::{Result, StoreError};
pub use pool::{new_file, new_in_memory, ConnectionPool, PoolConfig, PooledConnection};
pub use store::{BatchProcessOutcome, Store};
