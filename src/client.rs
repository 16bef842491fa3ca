//! Sentinel failover client
//!
//! Entry point for applications: hands out connections to the current
//! master of each tracked name and keeps them current in the background.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::conn::{Dialer, TcpDialer};
use crate::error::{Error, Result};
use crate::pool::{BoxFuture, MasterConn, Pool, PoolFactory, RespPoolFactory};
use crate::sentinel::{AddressBook, ClientConfig, PoolSwitch, SentinelMonitor, discover_sentinels};

/// How long `close` waits for an in-flight watchdog pass
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Failover-aware client over one or more sentinel-monitored masters
pub struct SentinelClient<D: Dialer = TcpDialer, F: PoolFactory = RespPoolFactory> {
    config: ClientConfig,
    masters: HashMap<String, Arc<PoolSwitch<F>>>,
    book: Arc<Mutex<AddressBook>>,
    monitor: Arc<SentinelMonitor<D, F>>,
    recheck: Arc<Notify>,
    task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl SentinelClient {
    /// Connect through one seed sentinel with the default RESP pool
    ///
    /// `network` is `tcp` or `unix`; `pool_size` is the idle connection cap
    /// per master.
    pub async fn new(
        network: &str,
        seed_addr: &str,
        pool_size: usize,
        master_names: &[&str],
    ) -> Result<Self> {
        let mut config = ClientConfig::new(seed_addr, master_names).with_pool_size(pool_size);
        config.network = network.parse()?;
        Self::from_config(config).await
    }

    /// Connect with the default dialer and pool built from `config`
    pub async fn from_config(config: ClientConfig) -> Result<Self> {
        let dialer = TcpDialer::new(config.sentinel_connect_options());
        let factory = RespPoolFactory::new(config.pool_size, config.master_connect_options());
        Self::with_parts(config, dialer, factory).await
    }
}

impl<D: Dialer, F: PoolFactory> SentinelClient<D, F> {
    /// Connect with a custom dialer and pool factory.
    ///
    /// Every master must resolve through one reachable sentinel before this
    /// returns. The watchdog is started in the background.
    pub async fn with_parts(mut config: ClientConfig, dialer: D, factory: F) -> Result<Self> {
        config.validate()?;
        let mut seen = Vec::with_capacity(config.masters.len());
        config.masters.retain(|name| {
            let fresh = !seen.contains(name);
            if fresh {
                seen.push(name.clone());
            }
            fresh
        });

        let mut book = AddressBook::seed(config.sentinels.iter().cloned())?;
        let recheck = Arc::new(Notify::new());
        let factory = Arc::new(factory);

        let switches = bootstrap(&config, &mut book, &dialer, &factory, &recheck).await?;

        let masters: HashMap<String, Arc<PoolSwitch<F>>> = switches
            .iter()
            .map(|switch| (switch.name().to_string(), switch.clone()))
            .collect();

        let book = Arc::new(Mutex::new(book));
        let monitor = Arc::new(SentinelMonitor::new(
            book.clone(),
            switches,
            Arc::new(dialer),
            recheck.clone(),
            &config,
        ));

        let task = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.run().await })
        };

        Ok(Self {
            config,
            masters,
            book,
            monitor,
            recheck,
            task: Mutex::new(Some(task)),
            closed: AtomicBool::new(false),
        })
    }

    fn switch(&self, name: &str) -> Result<&Arc<PoolSwitch<F>>> {
        self.masters
            .get(name)
            .ok_or_else(|| Error::UnknownMaster(name.to_string()))
    }

    /// Check out a connection to the current master of `name`
    pub async fn get_master(&self, name: &str) -> Result<MasterConn<F::Pool>> {
        self.switch(name)?.get().await
    }

    /// Return a connection taken with `get_master`
    pub fn put_master(&self, name: &str, conn: MasterConn<F::Pool>) -> Result<()> {
        self.switch(name)?.put(conn);
        Ok(())
    }

    /// Run `action` on a connection to the current master of `name`
    pub async fn do_master<T, A>(&self, name: &str, action: A) -> Result<T>
    where
        A: for<'c> FnOnce(&'c mut <F::Pool as Pool>::Conn) -> BoxFuture<'c, Result<T>>,
    {
        self.switch(name)?.run(action).await
    }

    /// Address of the current master of `name`
    pub fn master_addr(&self, name: &str) -> Result<String> {
        Ok(self.switch(name)?.master_addr())
    }

    /// Tracked master names, in configuration order
    pub fn master_names(&self) -> &[String] {
        &self.config.masters
    }

    /// Every sentinel address currently known
    pub fn sentinel_addrs(&self) -> Vec<String> {
        self.book.lock().addrs()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Run one verification pass now and report its outcome
    pub async fn refresh(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::PoolClosed);
        }
        self.monitor.check_once().await
    }

    /// Wake the watchdog for an immediate pass
    pub fn request_recheck(&self) {
        self.recheck.notify_one();
    }

    /// Stop the watchdog and close every master pool. Idempotent.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.monitor.stop();
        let task = self.task.lock().take();
        if let Some(mut task) = task
            && timeout(SHUTDOWN_GRACE, &mut task).await.is_err()
        {
            log::warn!("Sentinel watchdog did not stop in time, aborting");
            task.abort();
        }

        let mut first_err = None;
        for switch in self.masters.values() {
            if let Err(e) = switch.close().await {
                log::warn!("Error closing pool for {}: {}", switch.name(), e);
                first_err.get_or_insert(e);
            }
        }

        log::info!("Sentinel client closed");
        first_err.map_or(Ok(()), Err)
    }
}

impl<D: Dialer, F: PoolFactory> Drop for SentinelClient<D, F> {
    fn drop(&mut self) {
        self.monitor.stop();
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

/// Resolve every master through the first sentinel that can answer for all
/// of them, then seed the address book with that sentinel's peers.
async fn bootstrap<D: Dialer, F: PoolFactory>(
    config: &ClientConfig,
    book: &mut AddressBook,
    dialer: &D,
    factory: &Arc<F>,
    recheck: &Arc<Notify>,
) -> Result<Vec<Arc<PoolSwitch<F>>>> {
    let mut last_err = None;

    for _ in 0..book.len() {
        let addr = book.next();
        let dialed = match timeout(config.dial_timeout, dialer.dial(&addr)).await {
            Ok(result) => result,
            Err(_) => Err(Error::dial(
                addr.as_str(),
                std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timeout"),
            )),
        };
        let mut link = match dialed {
            Ok(link) => link,
            Err(e) => {
                log::warn!("Sentinel {} unreachable: {}", addr, e);
                book.mark_unreachable(&addr);
                continue;
            }
        };

        let mut switches = Vec::with_capacity(config.masters.len());
        let mut failed = None;
        for name in &config.masters {
            match PoolSwitch::connect(name, factory.clone(), &mut link, recheck.clone()).await {
                Ok(switch) => switches.push(Arc::new(switch)),
                Err(e) => {
                    log::warn!("Sentinel {} could not resolve master {}: {}", addr, name, e);
                    failed = Some(e);
                    break;
                }
            }
        }

        if let Some(e) = failed {
            for switch in switches {
                if let Err(e) = switch.close().await {
                    log::warn!("Error closing pool for {}: {}", switch.name(), e);
                }
            }
            book.mark_unreachable(&addr);
            last_err = Some(e);
            continue;
        }

        for name in &config.masters {
            match discover_sentinels(&mut link, name).await {
                Ok(peers) => {
                    book.merge_discovered(&addr, peers);
                }
                Err(e) => log::debug!("Discovery via {} for {} failed: {}", addr, name, e),
            }
        }
        book.mark_reachable(&addr);
        return Ok(switches);
    }

    Err(last_err.unwrap_or_else(|| {
        Error::Configuration(format!(
            "no sentinel reachable (tried {})",
            book.addrs().join(", ")
        ))
    }))
}
