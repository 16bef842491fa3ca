//! Master pool switch
//!
//! Holds the pool for one named master and replaces it when the sentinels
//! report that the master has moved. Readers load the current pool from an
//! `ArcSwap` without locking; only the swap itself is serialized.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::resolver::resolve_master;
use crate::conn::SentinelLink;
use crate::error::{Error, Result};
use crate::pool::{BoxFuture, MasterConn, Pool, PoolFactory};

/// The pool in use together with the address it was built for
struct Active<P> {
    pool: Arc<P>,
    addr: String,
}

/// Outcome of `PoolSwitch::ensure_master`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MasterChange {
    Unchanged,
    Switched { from: String, to: String },
}

pub struct PoolSwitch<F: PoolFactory> {
    name: String,
    factory: Arc<F>,
    active: ArcSwap<Active<F::Pool>>,
    /// Serializes swaps; never held across an await
    swap_lock: Mutex<()>,
    closed: AtomicBool,
    recheck: Arc<Notify>,
    swaps: AtomicU64,
}

impl<F: PoolFactory> PoolSwitch<F> {
    /// Resolve `name` through `link` and build its first pool
    pub async fn connect<L: SentinelLink>(
        name: &str,
        factory: Arc<F>,
        link: &mut L,
        recheck: Arc<Notify>,
    ) -> Result<Self> {
        let addr = resolve_master(link, name).await?;
        let pool = factory.build(&addr).await?;
        log::info!(
            "Master {} at {} (via sentinel {})",
            name,
            addr,
            link.peer_addr()
        );
        Ok(Self::new(name, factory, addr, pool, recheck))
    }

    pub fn new(
        name: &str,
        factory: Arc<F>,
        addr: String,
        pool: F::Pool,
        recheck: Arc<Notify>,
    ) -> Self {
        Self {
            name: name.to_string(),
            factory,
            active: ArcSwap::from_pointee(Active {
                pool: Arc::new(pool),
                addr,
            }),
            swap_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
            recheck,
            swaps: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address the current pool was built for
    pub fn master_addr(&self) -> String {
        self.active.load().addr.clone()
    }

    /// Number of completed pool replacements
    pub fn swap_count(&self) -> u64 {
        self.swaps.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn is_current(&self, active: &Arc<Active<F::Pool>>) -> bool {
        Arc::ptr_eq(active, &*self.active.load())
    }

    fn request_recheck(&self) {
        self.recheck.notify_one();
    }

    /// Check a connection out of the current pool.
    ///
    /// If the pool was retired between loading it and asking it for a
    /// connection, the new pool is tried instead.
    pub async fn get(&self) -> Result<MasterConn<F::Pool>> {
        loop {
            let active = self.active.load_full();
            match active.pool.get().await {
                Ok(conn) => {
                    return Ok(MasterConn::new(
                        conn,
                        active.pool.clone(),
                        active.addr.clone(),
                    ));
                }
                Err(Error::PoolClosed) if !self.is_closed() && !self.is_current(&active) => {
                    continue;
                }
                Err(e) => {
                    if e.is_connection_failure() {
                        log::warn!(
                            "Connection to master {} at {} failed: {}",
                            self.name,
                            active.addr,
                            e
                        );
                        self.request_recheck();
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Return a connection to the pool it came from
    pub fn put(&self, conn: MasterConn<F::Pool>) {
        conn.release();
    }

    /// Run `action` with a pooled connection.
    ///
    /// The connection goes back to its pool afterwards, unless the action
    /// failed at the connection level, in which case it is dropped and a
    /// re-check of the master is requested.
    pub async fn run<T, A>(&self, action: A) -> Result<T>
    where
        A: for<'c> FnOnce(&'c mut <F::Pool as Pool>::Conn) -> BoxFuture<'c, Result<T>>,
    {
        let mut conn = self.get().await?;
        let result = action(&mut *conn).await;

        match &result {
            Err(e) if e.is_connection_failure() => {
                log::warn!(
                    "Command on master {} at {} failed: {}",
                    self.name,
                    conn.master_addr(),
                    e
                );
                drop(conn);
                self.request_recheck();
            }
            _ => self.put(conn),
        }
        result
    }

    /// Ask the sentinel behind `link` for the master's address and, if it
    /// moved, build a pool for the new address and swap it in. The retired
    /// pool is closed once it has been replaced.
    pub async fn ensure_master<L: SentinelLink>(&self, link: &mut L) -> Result<MasterChange> {
        if self.is_closed() {
            return Err(Error::PoolClosed);
        }

        let current = self.master_addr();
        let addr = resolve_master(link, &self.name).await?;
        if addr == current {
            return Ok(MasterChange::Unchanged);
        }

        log::info!(
            "Sentinel {} reports master {} moved {} -> {}",
            link.peer_addr(),
            self.name,
            current,
            addr
        );

        let pool = match self.factory.build(&addr).await {
            Ok(pool) => pool,
            Err(e) => {
                log::warn!(
                    "Failed to build pool for master {} at {}: {}",
                    self.name,
                    addr,
                    e
                );
                return Err(Error::pool_build(addr, e));
            }
        };

        let next = Arc::new(Active {
            pool: Arc::new(pool),
            addr: addr.clone(),
        });

        let swapped = {
            let _guard = self.swap_lock.lock();
            if self.is_closed() || self.active.load().addr == addr {
                Err(next)
            } else {
                Ok(self.active.swap(next))
            }
        };

        match swapped {
            Ok(old) => {
                self.swaps.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = old.pool.close().await {
                    log::warn!("Error closing old pool for {}: {}", old.addr, e);
                }
                log::info!("Switched master {} to {}", self.name, addr);
                Ok(MasterChange::Switched {
                    from: old.addr.clone(),
                    to: addr,
                })
            }
            Err(unused) => {
                // Lost the race to another swap, or closed meanwhile
                if let Err(e) = unused.pool.close().await {
                    log::warn!("Error closing unused pool for {}: {}", unused.addr, e);
                }
                if self.is_closed() {
                    Err(Error::PoolClosed)
                } else {
                    Ok(MasterChange::Unchanged)
                }
            }
        }
    }

    /// Close the current pool. No further swaps happen afterwards.
    pub async fn close(&self) -> Result<()> {
        let active = {
            let _guard = self.swap_lock.lock();
            if self.closed.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            self.active.load_full()
        };
        active.pool.close().await
    }
}
