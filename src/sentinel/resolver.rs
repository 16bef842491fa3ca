//! Master resolution
//!
//! Asks one sentinel where a named master currently lives.

use crate::conn::SentinelLink;
use crate::error::Result;
use crate::resp::FieldMap;

/// Query `SENTINEL MASTER <name>` and return the master's `host:port`.
///
/// An error reply (unknown name) surfaces as `Error::Reply`; a reply without
/// usable `ip`/`port` fields is `Error::MalformedResponse`.
pub async fn resolve_master<L: SentinelLink>(link: &mut L, name: &str) -> Result<String> {
    let reply = link.command(&["SENTINEL", "MASTER", name]).await?;
    let fields = FieldMap::from_reply(&reply)?;

    let addr = fields.host_port().inspect_err(|e| {
        log::debug!(
            "Sentinel {} returned unusable record for {}: {}",
            link.peer_addr(),
            name,
            e
        );
    })?;

    if let Some(flags) = fields.get("flags")
        && (flags.contains("s_down") || flags.contains("o_down"))
    {
        log::warn!(
            "Sentinel {} reports master {} at {} as down ({})",
            link.peer_addr(),
            name,
            addr,
            flags
        );
    }

    Ok(addr)
}
