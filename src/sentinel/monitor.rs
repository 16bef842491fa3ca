//! Sentinel Watchdog
//!
//! Background re-verification of every tracked master:
//! - runs every `check_interval`, and immediately when a re-check is
//!   requested after a connection failure
//! - each pass asks one reachable sentinel for every master, falling through
//!   to the next known sentinel on dial, protocol or validation failures
//! - learns new sentinels from each sentinel it talks to
//! - prunes discovered sentinels that keep failing

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, timeout};

use super::address_book::AddressBook;
use super::config::ClientConfig;
use super::discovery::discover_sentinels;
use super::switch::{MasterChange, PoolSwitch};
use crate::conn::Dialer;
use crate::error::{Error, Result};
use crate::pool::PoolFactory;

/// Sentinel watchdog service
pub struct SentinelMonitor<D: Dialer, F: PoolFactory> {
    book: Arc<Mutex<AddressBook>>,
    switches: Vec<Arc<PoolSwitch<F>>>,
    dialer: Arc<D>,
    check_interval: Duration,
    dial_timeout: Duration,
    prune_after: u32,
    recheck: Arc<Notify>,
    shutdown: Notify,
    running: AtomicBool,
    passes: AtomicU64,
}

impl<D: Dialer, F: PoolFactory> SentinelMonitor<D, F> {
    pub fn new(
        book: Arc<Mutex<AddressBook>>,
        switches: Vec<Arc<PoolSwitch<F>>>,
        dialer: Arc<D>,
        recheck: Arc<Notify>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            book,
            switches,
            dialer,
            check_interval: config.check_interval,
            dial_timeout: config.dial_timeout,
            prune_after: config.prune_after,
            recheck,
            shutdown: Notify::new(),
            running: AtomicBool::new(true),
            passes: AtomicU64::new(0),
        }
    }

    /// Completed verification passes
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask a running `run` loop to exit after its current pass
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.shutdown.notify_one();
    }

    /// Run until `stop` is called
    pub async fn run(&self) {
        let mut ticker = if self.check_interval.is_zero() {
            None
        } else {
            let mut ticker = interval_at(Instant::now() + self.check_interval, self.check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            Some(ticker)
        };

        log::debug!(
            "Sentinel watchdog started (interval {:?}, {} masters)",
            self.check_interval,
            self.switches.len()
        );

        while self.is_running() {
            tokio::select! {
                _ = self.shutdown.notified() => break,
                _ = tick(&mut ticker) => {}
                _ = self.recheck.notified() => {
                    log::debug!("Re-check requested");
                }
            }

            if !self.is_running() {
                break;
            }

            if let Err(e) = self.check_once().await {
                log::warn!("Sentinel check failed: {}", e);
            }
        }

        log::debug!("Sentinel watchdog stopped");
    }

    /// One verification pass over the known sentinels
    pub async fn check_once(&self) -> Result<()> {
        let candidates = self.book.lock().len();
        let mut pending: Vec<&Arc<PoolSwitch<F>>> = self.switches.iter().collect();

        for _ in 0..candidates {
            let addr = self.book.lock().next();

            let dialed = match timeout(self.dial_timeout, self.dialer.dial(&addr)).await {
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
                    self.book.lock().mark_unreachable(&addr);
                    continue;
                }
            };

            let mut unresolved = Vec::new();
            let mut resolved = Vec::new();
            // A master we cannot build a pool for is not the sentinel's fault
            let mut sentinel_failed = false;
            for switch in pending {
                match switch.ensure_master(&mut link).await {
                    Ok(MasterChange::Unchanged) => resolved.push(switch.name()),
                    Ok(MasterChange::Switched { from, to }) => {
                        log::info!(
                            "Failover detected for {}: {} -> {} (via sentinel {})",
                            switch.name(),
                            from,
                            to,
                            addr
                        );
                        resolved.push(switch.name());
                    }
                    Err(e) => {
                        log::warn!(
                            "Sentinel {} could not confirm master {}: {}",
                            addr,
                            switch.name(),
                            e
                        );
                        if !matches!(e, Error::PoolBuild { .. }) {
                            sentinel_failed = true;
                        }
                        unresolved.push(switch);
                    }
                }
            }

            let mut discovered = Vec::new();
            for name in &resolved {
                match discover_sentinels(&mut link, name).await {
                    Ok(peers) => discovered.extend(peers),
                    Err(e) => log::debug!("Discovery via {} for {} failed: {}", addr, name, e),
                }
            }
            drop(link);

            let added = {
                let mut book = self.book.lock();
                let added = book.merge_discovered(&addr, discovered);
                if sentinel_failed {
                    book.mark_unreachable(&addr);
                } else if unresolved.is_empty() {
                    book.mark_reachable(&addr);
                } else {
                    book.mark_answered(&addr);
                }
                added
            };
            if added > 0 {
                log::info!("Discovered {} new sentinel(s) via {}", added, addr);
            }

            pending = unresolved;
            if pending.is_empty() {
                break;
            }
        }

        self.book.lock().prune(self.prune_after);
        self.passes.fetch_add(1, Ordering::Relaxed);

        if pending.is_empty() {
            Ok(())
        } else {
            Err(Error::SentinelsExhausted(candidates))
        }
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
