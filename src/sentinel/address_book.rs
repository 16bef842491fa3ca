//! Sentinel Address Book
//!
//! The set of sentinel addresses a client knows about: the seeds it was
//! configured with plus every peer learned through discovery. Selection
//! prefers the sentinel that answered last, then rotates through the rest.

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct Entry {
    addr: String,
    /// Configured addresses are never pruned
    seed: bool,
    /// Consecutive failed contacts
    failures: u32,
}

/// Known sentinel addresses, deduplicated, in insertion order
#[derive(Debug, Clone)]
pub struct AddressBook {
    entries: Vec<Entry>,
    cursor: usize,
    last_good: Option<String>,
}

impl AddressBook {
    /// Build a book from the configured seed addresses. At least one
    /// non-empty address is required.
    pub fn seed<I, S>(addrs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut book = Self {
            entries: Vec::new(),
            cursor: 0,
            last_good: None,
        };

        for addr in addrs {
            let addr = addr.into();
            let addr = addr.trim();
            if !addr.is_empty() && !book.contains(addr) {
                book.entries.push(Entry {
                    addr: addr.to_string(),
                    seed: true,
                    failures: 0,
                });
            }
        }

        if book.entries.is_empty() {
            return Err(Error::Configuration(
                "at least one sentinel address is required".into(),
            ));
        }
        Ok(book)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.position(addr).is_some()
    }

    pub fn is_seed(&self, addr: &str) -> bool {
        self.position(addr).is_some_and(|idx| self.entries[idx].seed)
    }

    fn position(&self, addr: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.addr == addr)
    }

    /// All known addresses, seeds first
    pub fn addrs(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.addr.clone()).collect()
    }

    /// Address that most recently answered, if still known
    pub fn last_good(&self) -> Option<&str> {
        self.last_good.as_deref()
    }

    /// Add addresses not already present. Returns how many were new.
    pub fn merge<I, S>(&mut self, addrs: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut added = 0;
        for addr in addrs {
            let addr = addr.into();
            if addr.is_empty() || self.contains(&addr) {
                continue;
            }
            log::debug!("Learned sentinel {}", addr);
            self.entries.push(Entry {
                addr,
                seed: false,
                failures: 0,
            });
            added += 1;
        }
        added
    }

    /// Merge the peers reported by `queried`, never re-adding `queried` itself
    pub fn merge_discovered<I, S>(&mut self, queried: &str, found: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let peers: Vec<String> = found
            .into_iter()
            .map(Into::into)
            .filter(|addr| addr != queried)
            .collect();
        self.merge(peers)
    }

    /// Next address to try. The last sentinel that answered comes first;
    /// otherwise addresses are handed out round-robin so a pass that fails
    /// everywhere visits each address once.
    pub fn next(&mut self) -> String {
        if let Some(good) = self.last_good.clone()
            && let Some(idx) = self.position(&good)
        {
            self.cursor = (idx + 1) % self.entries.len();
            return good;
        }

        let idx = self.cursor % self.entries.len();
        self.cursor = (idx + 1) % self.entries.len();
        self.entries[idx].addr.clone()
    }

    /// Record a successful contact
    pub fn mark_reachable(&mut self, addr: &str) {
        if let Some(idx) = self.position(addr) {
            self.entries[idx].failures = 0;
            self.last_good = Some(addr.to_string());
        }
    }

    /// Record a sentinel that answered but could not settle every master.
    /// Its failure count resets, but it stops being preferred so the rest of
    /// the pass moves on to other sentinels.
    pub fn mark_answered(&mut self, addr: &str) {
        if let Some(idx) = self.position(addr) {
            self.entries[idx].failures = 0;
        }
        if self.last_good.as_deref() == Some(addr) {
            self.last_good = None;
        }
    }

    /// Record a failed contact. The address stops being preferred.
    pub fn mark_unreachable(&mut self, addr: &str) {
        if let Some(idx) = self.position(addr) {
            self.entries[idx].failures = self.entries[idx].failures.saturating_add(1);
        }
        if self.last_good.as_deref() == Some(addr) {
            self.last_good = None;
        }
    }

    pub fn failures(&self, addr: &str) -> Option<u32> {
        self.position(addr).map(|idx| self.entries[idx].failures)
    }

    /// Drop discovered addresses that failed `max_failures` times in a row.
    /// Seeds are kept. `0` disables pruning.
    pub fn prune(&mut self, max_failures: u32) -> Vec<String> {
        if max_failures == 0 {
            return Vec::new();
        }

        let mut removed = Vec::new();
        self.entries.retain(|e| {
            let keep = e.seed || e.failures < max_failures;
            if !keep {
                removed.push(e.addr.clone());
            }
            keep
        });

        if !removed.is_empty() {
            log::info!("Pruned unreachable sentinels: {}", removed.join(", "));
            self.cursor %= self.entries.len();
        }
        removed
    }
}
