//! Sentinel Client Configuration
//!
//! Configuration for a failover client: which sentinels to ask, which
//! masters to track, and how to connect to both.

use std::time::Duration;

use crate::conn::{ConnectOptions, Network};
use crate::error::{Error, Result};

/// Default sentinel port
pub const DEFAULT_SENTINEL_PORT: u16 = 26379;

/// Failover client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Transport for sentinels and masters (default tcp)
    pub network: Network,
    /// Seed sentinel addresses
    pub sentinels: Vec<String>,
    /// Master names to track
    pub masters: Vec<String>,
    /// Idle connections kept per master pool (default 10)
    pub pool_size: usize,
    /// Connect timeout for sentinels and masters (default 500ms)
    pub dial_timeout: Duration,
    /// Per-command reply timeout (default 1s, zero = unbounded)
    pub command_timeout: Duration,
    /// Watchdog period (default 1s, zero = only on demand)
    pub check_interval: Duration,
    /// Forget a discovered sentinel after this many consecutive failures
    /// (default 5, zero = never)
    pub prune_after: u32,
    /// Username for authenticating with sentinels
    pub sentinel_user: Option<String>,
    /// Password for authenticating with sentinels
    pub sentinel_pass: Option<String>,
    /// Username for authenticating with masters (Redis 6+ ACL)
    pub master_user: Option<String>,
    /// Password for authenticating with masters
    pub master_pass: Option<String>,
    /// Log level
    pub loglevel: String,
    /// Log file path (empty = stderr)
    pub logfile: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            network: Network::Tcp,
            sentinels: Vec::new(),
            masters: Vec::new(),
            pool_size: 10,
            dial_timeout: Duration::from_millis(500),
            command_timeout: Duration::from_secs(1),
            check_interval: Duration::from_secs(1),
            prune_after: 5,
            sentinel_user: None,
            sentinel_pass: None,
            master_user: None,
            master_pass: None,
            loglevel: "notice".to_string(),
            logfile: String::new(),
        }
    }
}

impl ClientConfig {
    /// Config with one seed sentinel and the given masters
    pub fn new(seed: &str, masters: &[&str]) -> Self {
        Self {
            sentinels: vec![seed.to_string()],
            masters: masters.iter().map(|m| m.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Add a seed sentinel. A bare host gets the default sentinel port.
    pub fn add_sentinel(&mut self, addr: &str) {
        let addr = with_default_port(addr);
        if !self.sentinels.contains(&addr) {
            self.sentinels.push(addr);
        }
    }

    /// Track a master name
    pub fn add_master(&mut self, name: &str) {
        if !self.masters.iter().any(|m| m == name) {
            self.masters.push(name.to_string());
        }
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_prune_after(mut self, failures: u32) -> Self {
        self.prune_after = failures;
        self
    }

    pub fn with_sentinel_auth(mut self, user: Option<&str>, pass: &str) -> Self {
        self.sentinel_user = user.map(str::to_string);
        self.sentinel_pass = Some(pass.to_string());
        self
    }

    pub fn with_master_auth(mut self, user: Option<&str>, pass: &str) -> Self {
        self.master_user = user.map(str::to_string);
        self.master_pass = Some(pass.to_string());
        self
    }

    /// Reject configurations a client cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.sentinels.iter().all(|s| s.trim().is_empty()) {
            return Err(Error::Configuration(
                "at least one sentinel address is required".into(),
            ));
        }
        if self.masters.is_empty() {
            return Err(Error::Configuration(
                "at least one master name is required".into(),
            ));
        }
        if let Some(name) = self.masters.iter().find(|m| m.trim().is_empty()) {
            return Err(Error::Configuration(format!(
                "invalid master name '{}'",
                name
            )));
        }
        if self.pool_size == 0 {
            return Err(Error::Configuration("pool size must be at least 1".into()));
        }
        if self.dial_timeout.is_zero() {
            return Err(Error::Configuration("dial timeout must be non-zero".into()));
        }
        Ok(())
    }

    /// Options for short-lived sentinel connections
    pub fn sentinel_connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            network: self.network,
            dial_timeout: self.dial_timeout,
            command_timeout: self.command_timeout,
            username: self.sentinel_user.clone(),
            password: self.sentinel_pass.clone(),
        }
    }

    /// Options for pooled master connections
    pub fn master_connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            network: self.network,
            dial_timeout: self.dial_timeout,
            command_timeout: self.command_timeout,
            username: self.master_user.clone(),
            password: self.master_pass.clone(),
        }
    }
}

fn with_default_port(addr: &str) -> String {
    let addr = addr.trim();
    let has_port = match addr.rsplit_once(':') {
        // [v6]:port or host:port, but not a bare v6 address
        Some((host, port)) => {
            port.parse::<u16>().is_ok() && (host.ends_with(']') || !host.contains(':'))
        }
        None => false,
    };

    if has_port || addr.starts_with('/') {
        addr.to_string()
    } else if addr.contains(':') && !addr.starts_with('[') {
        format!("[{}]:{}", addr, DEFAULT_SENTINEL_PORT)
    } else {
        format!("{}:{}", addr, DEFAULT_SENTINEL_PORT)
    }
}
