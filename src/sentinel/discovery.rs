//! Sentinel Auto-Discovery
//!
//! Learns the peers of a sentinel through `SENTINEL SENTINELS <name>`.
//! Each peer record carries at least `ip` and `port`; records missing either
//! are skipped rather than failing the whole reply.

use crate::conn::SentinelLink;
use crate::error::{Error, Result};
use crate::resp::{FieldMap, RespValue};

/// Addresses (`host:port`) of the sentinels that `link` knows monitor `name`
pub async fn discover_sentinels<L: SentinelLink>(link: &mut L, name: &str) -> Result<Vec<String>> {
    let reply = link.command(&["SENTINEL", "SENTINELS", name]).await?;

    let records = match reply {
        RespValue::Array(records) => records,
        RespValue::Null | RespValue::NullArray => return Ok(Vec::new()),
        other => {
            return Err(Error::MalformedResponse(format!(
                "expected array of sentinel records, got {}",
                other.kind()
            )));
        }
    };

    let mut peers = Vec::with_capacity(records.len());
    for record in &records {
        match FieldMap::from_reply(record).and_then(|fields| fields.host_port()) {
            Ok(addr) => {
                if !peers.contains(&addr) {
                    peers.push(addr);
                }
            }
            Err(e) => {
                log::debug!(
                    "Skipping sentinel record from {} for {}: {}",
                    link.peer_addr(),
                    name,
                    e
                );
            }
        }
    }

    Ok(peers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSentinel, MockLink};

    #[tokio::test]
    async fn test_discovers_peers() {
        let sentinel = FakeSentinel::new();
        sentinel.set_sentinels("bucket0", &[("10.0.0.2", "26379"), ("10.0.0.3", "26379")]);
        let mut link = MockLink::new("10.0.0.1:26379", sentinel);

        let peers = discover_sentinels(&mut link, "bucket0").await.unwrap();
        assert_eq!(peers, vec!["10.0.0.2:26379", "10.0.0.3:26379"]);
    }

    #[tokio::test]
    async fn test_skips_records_missing_fields() {
        let sentinel = FakeSentinel::new();
        sentinel.set_sentinels_reply(
            "bucket0",
            RespValue::array(vec![
                RespValue::field_array(&[("ip", "10.0.0.2")]),
                RespValue::field_array(&[("ip", "10.0.0.3"), ("port", "26379")]),
                RespValue::field_array(&[("port", "26379")]),
                RespValue::bulk_string("garbage"),
            ]),
        );
        let mut link = MockLink::new("10.0.0.1:26379", sentinel);

        let peers = discover_sentinels(&mut link, "bucket0").await.unwrap();
        assert_eq!(peers, vec!["10.0.0.3:26379"]);
    }

    #[tokio::test]
    async fn test_empty_and_null_replies() {
        let sentinel = FakeSentinel::new();
        let mut link = MockLink::new("10.0.0.1:26379", sentinel.clone());
        assert!(discover_sentinels(&mut link, "bucket0").await.unwrap().is_empty());

        sentinel.set_sentinels_reply("bucket0", RespValue::NullArray);
        assert!(discover_sentinels(&mut link, "bucket0").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_array_reply_is_malformed() {
        let sentinel = FakeSentinel::new();
        sentinel.set_sentinels_reply("bucket0", RespValue::Integer(3));
        let mut link = MockLink::new("10.0.0.1:26379", sentinel);

        let err = discover_sentinels(&mut link, "bucket0").await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }
}
