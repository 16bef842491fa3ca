use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::error::{Error, Result};
use crate::sentinel::{ClientConfig, parse_client_config};

#[derive(Parser, Debug)]
#[command(name = "sentinel-watch")]
#[command(version)]
#[command(about = "Follow the masters reported by a set of Redis sentinels", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(value_name = "CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Sentinel address (host:port), repeatable
    #[arg(long = "sentinel", value_name = "ADDR")]
    pub sentinels: Vec<String>,

    /// Master name to track, repeatable
    #[arg(long = "master", value_name = "NAME")]
    pub masters: Vec<String>,

    /// Transport (tcp or unix)
    #[arg(long)]
    pub network: Option<String>,

    /// Idle connections kept per master
    #[arg(long)]
    pub pool_size: Option<usize>,

    /// Watchdog period in milliseconds (0 = only on demand)
    #[arg(long)]
    pub check_interval_ms: Option<u64>,

    #[arg(long)]
    pub dial_timeout_ms: Option<u64>,

    #[arg(long)]
    pub command_timeout_ms: Option<u64>,

    /// Forget discovered sentinels after this many failed passes (0 = never)
    #[arg(long)]
    pub prune_after: Option<u32>,

    #[arg(long)]
    pub sentinel_user: Option<String>,

    #[arg(long)]
    pub sentinel_pass: Option<String>,

    #[arg(long)]
    pub masteruser: Option<String>,

    #[arg(long)]
    pub masterauth: Option<String>,

    /// Log level (debug, verbose, notice, warning, nothing)
    #[arg(long)]
    pub loglevel: Option<String>,

    /// Log file path
    #[arg(long)]
    pub logfile: Option<String>,

    /// Seconds between status lines
    #[arg(long, default_value_t = 5)]
    pub report_every: u64,
}

impl Cli {
    /// Parse the process arguments and build the client configuration
    pub fn load_config() -> Result<(Cli, ClientConfig)> {
        let cli = Cli::parse();
        let config = cli.to_config()?;
        Ok((cli, config))
    }

    /// Config file first, then command-line flags on top
    pub fn to_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.config_file {
            Some(path) => parse_client_config(path)?,
            None => ClientConfig::default(),
        };

        for addr in &self.sentinels {
            config.add_sentinel(addr);
        }
        for name in &self.masters {
            config.add_master(name);
        }
        if let Some(network) = &self.network {
            config.network = network.parse()?;
        }
        if let Some(size) = self.pool_size {
            config.pool_size = size;
        }
        if let Some(ms) = self.check_interval_ms {
            config.check_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.dial_timeout_ms {
            config.dial_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.command_timeout_ms {
            config.command_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = self.prune_after {
            config.prune_after = n;
        }
        if let Some(user) = &self.sentinel_user {
            config.sentinel_user = Some(user.clone());
        }
        if let Some(pass) = &self.sentinel_pass {
            config.sentinel_pass = Some(pass.clone());
        }
        if let Some(user) = &self.masteruser {
            config.master_user = Some(user.clone());
        }
        if let Some(pass) = &self.masterauth {
            config.master_pass = Some(pass.clone());
        }
        if let Some(level) = &self.loglevel {
            config.loglevel = level.clone();
        }
        if let Some(file) = &self.logfile {
            config.logfile = file.clone();
        }

        if self.report_every == 0 {
            return Err(Error::Configuration(
                "--report-every must be at least 1".into(),
            ));
        }

        config.validate()?;
        Ok(config)
    }
}
