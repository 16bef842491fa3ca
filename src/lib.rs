//! Sentinel-aware Redis client
//!
//! Keeps a connection pool per named master pointed at whichever node the
//! sentinels currently report as primary, swapping pools on failover while
//! callers keep using `get_master` / `put_master` / `do_master`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod cli;
pub mod client;
pub mod conn;
pub mod error;
pub mod logging;
pub mod pool;
pub mod protocol;
pub mod resp;
pub mod sentinel;

#[cfg(test)]
mod testing;

pub use client::SentinelClient;
pub use conn::{ConnectOptions, Dialer, Network, RespConn, SentinelLink, TcpDialer};
pub use error::{Error, Result};
pub use pool::{BoxFuture, MasterConn, Pool, PoolFactory, RespPool, RespPoolFactory};
pub use protocol::RespValue;
pub use sentinel::{ClientConfig, MasterChange};
