//! Connection pools
//!
//! The failover machinery only needs a small contract from a pool: hand out
//! a connection, take one back, and close. `RespPool` is the default
//! implementation over `RespConn`; anything implementing `Pool` can be
//! plugged in through a `PoolFactory`.

use std::collections::VecDeque;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::conn::{ConnectOptions, RespConn};
use crate::error::{Error, Result};

/// Boxed future returned by actions passed to `do_master`
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Pool collaborator contract
pub trait Pool: Send + Sync + 'static {
    type Conn: Send + 'static;

    /// Check a connection out. A closed pool fails with `Error::PoolClosed`.
    fn get(&self) -> impl Future<Output = Result<Self::Conn>> + Send;

    /// Return a connection. Must be a silent no-op once the pool is closed.
    fn put(&self, conn: Self::Conn);

    /// Close the pool and every idle connection it holds
    fn close(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Builds a pool for a master address (the pool strategy function)
pub trait PoolFactory: Send + Sync + 'static {
    type Pool: Pool;

    fn build(&self, addr: &str) -> impl Future<Output = Result<Self::Pool>> + Send;
}

/// A connection checked out through a failover client.
///
/// Remembers the pool it came from so that it is returned there even if the
/// master has been switched in the meantime.
pub struct MasterConn<P: Pool> {
    conn: P::Conn,
    origin: Arc<P>,
    master_addr: String,
}

impl<P: Pool> MasterConn<P> {
    pub(crate) fn new(conn: P::Conn, origin: Arc<P>, master_addr: String) -> Self {
        Self {
            conn,
            origin,
            master_addr,
        }
    }

    /// Address of the master this connection was opened against
    pub fn master_addr(&self) -> &str {
        &self.master_addr
    }

    /// Detach the raw connection; it will not be returned to any pool
    pub fn into_inner(self) -> P::Conn {
        self.conn
    }

    pub(crate) fn release(self) {
        self.origin.put(self.conn);
    }
}

impl<P: Pool> Deref for MasterConn<P> {
    type Target = P::Conn;

    fn deref(&self) -> &P::Conn {
        &self.conn
    }
}

impl<P: Pool> DerefMut for MasterConn<P> {
    fn deref_mut(&mut self) -> &mut P::Conn {
        &mut self.conn
    }
}

/// Pool statistics
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Connections dialed over the pool's lifetime
    pub connections_created: u64,
    /// Connections dropped because they were broken, or the pool was full or closed
    pub connections_discarded: u64,
    /// Connections currently idle in the pool
    pub idle_connections: u64,
}

#[derive(Debug, Default)]
struct PoolMetrics {
    connections_created: AtomicU64,
    connections_discarded: AtomicU64,
}

/// Default pool of `RespConn`s to one master.
///
/// Keeps up to `size` idle connections. When empty, `get` dials a fresh
/// connection instead of waiting. Connections handed back broken, or to a
/// full pool, are dropped.
pub struct RespPool {
    addr: String,
    size: usize,
    opts: ConnectOptions,
    idle: Mutex<VecDeque<RespConn>>,
    closed: AtomicBool,
    metrics: PoolMetrics,
}

impl RespPool {
    /// Create the pool and pre-dial `size` connections. Fails if any dial fails.
    pub async fn new(addr: &str, size: usize, opts: ConnectOptions) -> Result<Self> {
        let pool = Self {
            addr: addr.to_string(),
            size,
            opts,
            idle: Mutex::new(VecDeque::with_capacity(size)),
            closed: AtomicBool::new(false),
            metrics: PoolMetrics::default(),
        };

        for _ in 0..size {
            let conn = pool.dial().await?;
            pool.idle.lock().push_back(conn);
        }

        Ok(pool)
    }

    async fn dial(&self) -> Result<RespConn> {
        let conn = RespConn::connect(&self.addr, &self.opts).await?;
        self.metrics
            .connections_created
            .fetch_add(1, Ordering::Relaxed);
        Ok(conn)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            connections_created: self.metrics.connections_created.load(Ordering::Relaxed),
            connections_discarded: self.metrics.connections_discarded.load(Ordering::Relaxed),
            idle_connections: self.idle.lock().len() as u64,
        }
    }
}

impl Pool for RespPool {
    type Conn = RespConn;

    async fn get(&self) -> Result<RespConn> {
        if self.is_closed() {
            return Err(Error::PoolClosed);
        }

        let idle = self.idle.lock().pop_front();
        match idle {
            Some(conn) => Ok(conn),
            None => self.dial().await,
        }
    }

    fn put(&self, conn: RespConn) {
        if conn.is_broken() {
            log::debug!("Discarding broken connection to {}", self.addr);
            self.metrics
                .connections_discarded
                .fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut idle = self.idle.lock();
        if self.is_closed() || idle.len() >= self.size {
            drop(idle);
            self.metrics
                .connections_discarded
                .fetch_add(1, Ordering::Relaxed);
            return;
        }
        idle.push_back(conn);
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let drained: Vec<RespConn> = self.idle.lock().drain(..).collect();
        log::debug!(
            "Closing pool for {} ({} idle connections)",
            self.addr,
            drained.len()
        );
        for conn in drained {
            conn.close().await;
        }
        Ok(())
    }
}

/// Factory producing a `RespPool` per master address
#[derive(Debug, Clone)]
pub struct RespPoolFactory {
    size: usize,
    opts: ConnectOptions,
}

impl RespPoolFactory {
    pub fn new(size: usize, opts: ConnectOptions) -> Self {
        Self { size, opts }
    }
}

impl PoolFactory for RespPoolFactory {
    type Pool = RespPool;

    fn build(&self, addr: &str) -> impl Future<Output = Result<RespPool>> + Send {
        RespPool::new(addr, self.size, self.opts.clone())
    }
}
