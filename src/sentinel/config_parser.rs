//! Client Configuration Parser
//!
//! Parses sentinel client config files in the familiar redis.conf layout:
//!
//! ```text
//! sentinel addr 10.0.0.1:26379
//! sentinel auth-pass s3cret
//! master bucket0 bucket1
//! pool-size 16
//! ```
//!
//! Bad lines are reported and skipped; the rest of the file still applies.

use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::sentinel::config::ClientConfig;

/// Parse a client configuration file
pub fn parse_client_config(path: &Path) -> Result<ClientConfig> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::Configuration(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(parse_client_config_str(&content))
}

/// Parse configuration text, starting from the defaults
pub fn parse_client_config_str(content: &str) -> ClientConfig {
    let mut config = ClientConfig::default();

    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Err(e) = parse_line(line, &mut config) {
            log::warn!("Config line {}: {}", line_num + 1, e);
        }
    }

    config
}

fn parse_line(line: &str, config: &mut ClientConfig) -> std::result::Result<(), String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.is_empty() {
        return Ok(());
    }

    let directive = parts[0].to_lowercase();
    let value = parts.get(1).copied();

    match directive.as_str() {
        "sentinel" => parse_sentinel_directive(&parts[1..], config)?,
        "master" => {
            if parts.len() < 2 {
                return Err("master directive requires at least one name".to_string());
            }
            for name in &parts[1..] {
                config.add_master(name);
            }
        }
        "network" => {
            let value = value.ok_or("network directive requires a value")?;
            config.network = value.parse().map_err(|e| format!("{}", e))?;
        }
        "pool-size" => {
            let value = value.ok_or("pool-size requires a value")?;
            config.pool_size = value
                .parse()
                .map_err(|_| format!("invalid pool-size '{}'", value))?;
        }
        "dial-timeout-ms" => {
            config.dial_timeout = parse_millis(value, "dial-timeout-ms")?;
        }
        "command-timeout-ms" => {
            config.command_timeout = parse_millis(value, "command-timeout-ms")?;
        }
        "masteruser" => {
            let value = value.ok_or("masteruser requires a value")?;
            config.master_user = Some(value.to_string());
        }
        "masterauth" => {
            let value = value.ok_or("masterauth requires a value")?;
            config.master_pass = Some(value.to_string());
        }
        "loglevel" => {
            let value = value.ok_or("loglevel directive requires a value")?;
            config.loglevel = value.to_string();
        }
        "logfile" => {
            // logfile "" means stderr
            config.logfile = value.unwrap_or_default().trim_matches('"').to_string();
        }
        _ => {
            return Err(format!("unknown directive '{}'", parts[0]));
        }
    }

    Ok(())
}

fn parse_sentinel_directive(parts: &[&str], config: &mut ClientConfig) -> std::result::Result<(), String> {
    if parts.is_empty() {
        return Err("sentinel directive requires a subcommand".to_string());
    }

    let subcommand = parts[0].to_lowercase();
    let value = parts.get(1).copied();

    match subcommand.as_str() {
        "addr" => {
            // sentinel addr <host:port> [<host:port> ...]
            if parts.len() < 2 {
                return Err("sentinel addr requires at least one address".to_string());
            }
            for addr in &parts[1..] {
                config.add_sentinel(addr);
            }
        }
        "auth-user" => {
            let value = value.ok_or("sentinel auth-user requires a username")?;
            config.sentinel_user = Some(value.to_string());
        }
        "auth-pass" => {
            let value = value.ok_or("sentinel auth-pass requires a password")?;
            config.sentinel_pass = Some(value.to_string());
        }
        "check-interval-ms" => {
            config.check_interval = parse_millis(value, "sentinel check-interval-ms")?;
        }
        "prune-after" => {
            let value = value.ok_or("sentinel prune-after requires a count")?;
            config.prune_after = match parse_bool(value) {
                Ok(false) => 0,
                _ => value
                    .parse()
                    .map_err(|_| format!("invalid prune-after '{}'", value))?,
            };
        }
        _ => {
            return Err(format!("unknown sentinel subcommand '{}'", parts[0]));
        }
    }

    Ok(())
}

fn parse_millis(value: Option<&str>, what: &str) -> std::result::Result<Duration, String> {
    let value = value.ok_or_else(|| format!("{} requires a value", what))?;
    value
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| format!("invalid {} '{}'", what, value))
}

/// Parse a yes/no value
fn parse_bool(s: &str) -> std::result::Result<bool, String> {
    match s.to_lowercase().as_str() {
        "yes" | "true" | "1" => Ok(true),
        "no" | "false" | "0" => Ok(false),
        _ => Err(format!("invalid boolean value: {}", s)),
    }
}
