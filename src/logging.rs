//! Logging configuration module
//!
//! Redis-style logger for the `log` facade:
//! - Log levels (debug, verbose, notice, warning, nothing)
//! - `pid:level-char timestamp message` lines on stderr or a log file
//! - Credentials (AUTH arguments, configured passwords) never reach the output

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::time::SystemTime;

use log::{LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;

use crate::sentinel::ClientConfig;

/// Redis-style log levels mapped to Rust log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedisLogLevel {
    Debug,
    Verbose,
    Notice,
    Warning,
    Nothing,
}

impl RedisLogLevel {
    /// Parse a Redis-style level name; unknown names mean `notice`
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "debug" => Self::Debug,
            "verbose" => Self::Verbose,
            "notice" => Self::Notice,
            "warning" => Self::Warning,
            "nothing" => Self::Nothing,
            _ => Self::Notice,
        }
    }

    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            Self::Debug => LevelFilter::Debug,
            Self::Verbose => LevelFilter::Info,
            Self::Notice => LevelFilter::Info,
            Self::Warning => LevelFilter::Warn,
            Self::Nothing => LevelFilter::Off,
        }
    }
}

/// Logger writing to a file or stderr
pub struct ClientLogger {
    level: LevelFilter,
    file: Option<Mutex<File>>,
    secrets: Vec<String>,
}

impl ClientLogger {
    pub fn new(config: &ClientConfig) -> Self {
        let level = RedisLogLevel::parse(&config.loglevel).to_level_filter();

        let file = if !config.logfile.is_empty() {
            match OpenOptions::new()
                .create(true)
                .append(true)
                .open(&config.logfile)
            {
                Ok(f) => Some(Mutex::new(f)),
                Err(e) => {
                    eprintln!(
                        "Warning: Failed to open log file '{}': {}",
                        config.logfile, e
                    );
                    None
                }
            }
        } else {
            None
        };

        let secrets = [&config.sentinel_pass, &config.master_pass]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect();

        Self {
            level,
            file,
            secrets,
        }
    }

    /// Mask configured passwords and anything following an AUTH keyword
    fn sanitize_message(&self, msg: &str) -> String {
        let mut result = msg.to_string();
        for secret in &self.secrets {
            result = result.replace(secret.as_str(), "[REDACTED]");
        }
        redact_after(&result, "AUTH")
    }

    fn format_record(&self, record: &Record) -> String {
        let level_char = match record.level() {
            log::Level::Error => '!',
            log::Level::Warn => '#',
            log::Level::Info => '*',
            log::Level::Debug => '-',
            log::Level::Trace => '.',
        };

        let msg = self.sanitize_message(&record.args().to_string());
        format!("{}:{} {} {}\n", std::process::id(), level_char, timestamp(), msg)
    }
}

impl Log for ClientLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let formatted = self.format_record(record);
        match &self.file {
            Some(file) => {
                let _ = file.lock().write_all(formatted.as_bytes());
            }
            None => eprint!("{}", formatted),
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            let _ = file.lock().flush();
        }
    }
}

/// Replace the word following each (case-insensitive) `keyword`
fn redact_after(input: &str, keyword: &str) -> String {
    let mut out = Vec::new();
    let mut redact_next = false;
    for word in input.split(' ') {
        if redact_next && !word.is_empty() {
            out.push("[REDACTED]");
            redact_next = false;
            continue;
        }
        redact_next = word.eq_ignore_ascii_case(keyword);
        out.push(word);
    }
    out.join(" ")
}

/// Seconds.millis since the epoch
fn timestamp() -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:03}", now.as_secs(), now.subsec_millis())
}

/// Install `ClientLogger` as the global logger
pub fn init_logging(config: &ClientConfig) -> Result<(), log::SetLoggerError> {
    let logger = Box::new(ClientLogger::new(config));
    let level = RedisLogLevel::parse(&config.loglevel).to_level_filter();

    log::set_boxed_logger(logger)?;
    log::set_max_level(level);

    Ok(())
}
