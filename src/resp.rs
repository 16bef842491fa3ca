//! RESP reply helpers
//!
//! Re-exports the protocol types and adds typed decoding for the
//! `field value field value ...` records that SENTINEL subcommands return.

pub use crate::protocol::{Parser, RespValue};

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Turn an error reply into `Error::Reply`, pass everything else through
pub fn into_result(reply: RespValue) -> Result<RespValue> {
    match reply {
        RespValue::Error(msg) => Err(Error::Reply(String::from_utf8_lossy(&msg).into_owned())),
        other => Ok(other),
    }
}

/// A decoded field/value record.
///
/// Built from a flat RESP2 array or a RESP3 map. Values that are integers on
/// the wire are kept in their decimal form so callers only deal with strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    fields: HashMap<String, String>,
}

impl FieldMap {
    pub fn from_reply(reply: &RespValue) -> Result<Self> {
        let mut fields = HashMap::new();

        match reply {
            RespValue::Array(items) => {
                if items.len() % 2 != 0 {
                    return Err(Error::MalformedResponse(format!(
                        "field/value array has odd length {}",
                        items.len()
                    )));
                }
                for pair in items.chunks_exact(2) {
                    fields.insert(scalar(&pair[0])?, scalar(&pair[1])?);
                }
            }
            RespValue::Map(pairs) => {
                for (key, value) in pairs {
                    fields.insert(scalar(key)?, scalar(value)?);
                }
            }
            RespValue::Error(msg) => {
                return Err(Error::Reply(String::from_utf8_lossy(msg).into_owned()));
            }
            other => {
                return Err(Error::MalformedResponse(format!(
                    "expected field/value record, got {}",
                    other.kind()
                )));
            }
        }

        Ok(Self { fields })
    }

    /// Value of `field`, treating an empty string the same as absence
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Like `get`, but a missing field is a malformed-response error
    pub fn require(&self, field: &str) -> Result<&str> {
        self.get(field)
            .ok_or_else(|| Error::MalformedResponse(format!("missing or empty '{}' field", field)))
    }

    /// `host:port` from the `ip`/`port` fields. Port 0 is rejected; IPv6 hosts
    /// are bracketed.
    pub fn host_port(&self) -> Result<String> {
        let host = self.require("ip")?;
        let port = self.require("port")?;
        let port = match port.parse::<u16>() {
            Ok(port) if port != 0 => port,
            _ => {
                return Err(Error::MalformedResponse(format!(
                    "invalid port '{}'",
                    port
                )));
            }
        };

        if host.contains(':') && !host.starts_with('[') {
            Ok(format!("[{}]:{}", host, port))
        } else {
            Ok(format!("{}:{}", host, port))
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn scalar(value: &RespValue) -> Result<String> {
    match value {
        RespValue::BulkString(b) | RespValue::SimpleString(b) => std::str::from_utf8(b)
            .map(str::to_owned)
            .map_err(|_| Error::MalformedResponse("field is not valid utf-8".into())),
        RespValue::Integer(n) => Ok(n.to_string()),
        RespValue::Double(d) => Ok(d.to_string()),
        RespValue::Null => Ok(String::new()),
        other => Err(Error::MalformedResponse(format!(
            "expected string field, got {}",
            other.kind()
        ))),
    }
}
