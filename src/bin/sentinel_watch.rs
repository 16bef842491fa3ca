//! Sentinel Watch Binary
//!
//! Connects to a set of sentinels, follows the configured masters and logs
//! where each one lives until interrupted.

use std::time::Duration;

use mimalloc::MiMalloc;

use sockudo_sentinel_client::cli::Cli;
use sockudo_sentinel_client::logging::init_logging;
use sockudo_sentinel_client::{RespConn, SentinelClient};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (cli, config) = Cli::load_config()?;
    init_logging(&config)?;

    log::info!(
        "Sentinel watch starting: {} sentinel(s), masters [{}]",
        config.sentinels.len(),
        config.masters.join(", ")
    );

    let client = SentinelClient::from_config(config).await?;
    for name in client.master_names() {
        log::info!("{} -> {}", name, client.master_addr(name)?);
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(cli.report_every));
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Shutdown signal received.");
                break;
            }
            _ = ticker.tick() => {
                for name in client.master_names() {
                    let probe = client
                        .do_master(name, |conn: &mut RespConn| {
                            Box::pin(async move { conn.command(&["PING"]).await })
                        })
                        .await;
                    match probe {
                        Ok(_) => log::info!("{} -> {} (ok)", name, client.master_addr(name)?),
                        Err(e) => log::warn!("{} -> {} ({})", name, client.master_addr(name)?, e),
                    }
                }
                log::debug!("Known sentinels: {}", client.sentinel_addrs().join(", "));
            }
        }
    }

    client.close().await?;
    Ok(())
}
