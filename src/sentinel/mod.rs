//! Sentinel-aware master tracking
//!
//! Keeps a pool per named master pointed at whichever node the sentinels
//! currently report as primary.
//!
//! Pieces:
//! - Address book of known sentinels (seeds plus discovered peers)
//! - Master resolution and peer discovery over a sentinel link
//! - Lock-free pool switch per master (ArcSwap snapshot, serialized swaps)
//! - Watchdog re-verifying masters periodically and on demand

pub mod address_book;
pub mod config;
pub mod config_parser;
pub mod discovery;
pub mod monitor;
pub mod resolver;
pub mod switch;

pub use address_book::AddressBook;
pub use config::ClientConfig;
pub use config_parser::{parse_client_config, parse_client_config_str};
pub use discovery::discover_sentinels;
pub use monitor::SentinelMonitor;
pub use resolver::resolve_master;
pub use switch::{MasterChange, PoolSwitch};
