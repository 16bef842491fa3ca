use bytes::{Buf, Bytes, BytesMut};

use super::types::RespValue;
use crate::error::{Error, Result};

/// Incremental RESP reply parser
pub struct Parser;

impl Parser {
    /// Parse one complete value from `buf`, advancing past it.
    /// Returns `Ok(None)` and leaves `buf` untouched when more data is needed.
    #[inline]
    pub fn parse(buf: &mut BytesMut) -> Result<Option<RespValue>> {
        match Self::parse_value(buf)? {
            Some((value, consumed)) => {
                buf.advance(consumed);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Parse value, returning (value, bytes_consumed) or None if incomplete
    fn parse_value(buf: &[u8]) -> Result<Option<(RespValue, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        match buf[0] {
            b'+' => Self::parse_line(buf, RespValue::SimpleString),
            b'-' => Self::parse_line(buf, RespValue::Error),
            b':' => Self::parse_integer(buf),
            b'$' => Self::parse_bulk_string(buf),
            b'*' => Self::parse_array(buf),
            b'%' => Self::parse_map(buf),
            b'_' => Ok(Self::find_crlf(buf).map(|pos| (RespValue::Null, pos + 2))),
            b'#' => Self::parse_boolean(buf),
            b',' => Self::parse_double(buf),
            other => Err(Error::Protocol(format!(
                "unexpected type byte {:?}",
                other as char
            ))),
        }
    }

    /// Find \r\n in buffer, return position of \r
    #[inline]
    fn find_crlf(buf: &[u8]) -> Option<usize> {
        let mut from = 0;
        while let Some(pos) = memchr::memchr(b'\r', &buf[from..]) {
            let pos = from + pos;
            if pos + 1 >= buf.len() {
                return None;
            }
            if buf[pos + 1] == b'\n' {
                return Some(pos);
            }
            from = pos + 1;
        }
        None
    }

    fn parse_line(
        buf: &[u8],
        wrap: fn(Bytes) -> RespValue,
    ) -> Result<Option<(RespValue, usize)>> {
        Ok(Self::find_crlf(buf)
            .map(|pos| (wrap(Bytes::copy_from_slice(&buf[1..pos])), pos + 2)))
    }

    /// Parse the decimal header that follows a type byte
    fn parse_len(buf: &[u8], what: &str) -> Result<Option<(i64, usize)>> {
        let Some(pos) = Self::find_crlf(buf) else {
            return Ok(None);
        };
        let n = std::str::from_utf8(&buf[1..pos])
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| Error::Protocol(format!("invalid {}", what)))?;
        Ok(Some((n, pos + 2)))
    }

    fn parse_integer(buf: &[u8]) -> Result<Option<(RespValue, usize)>> {
        Ok(Self::parse_len(buf, "integer")?.map(|(n, used)| (RespValue::Integer(n), used)))
    }

    fn parse_bulk_string(buf: &[u8]) -> Result<Option<(RespValue, usize)>> {
        let Some((len, data_start)) = Self::parse_len(buf, "bulk length")? else {
            return Ok(None);
        };

        if len == -1 {
            return Ok(Some((RespValue::Null, data_start)));
        }
        if len < 0 {
            return Err(Error::Protocol("negative bulk length".into()));
        }

        let data_end = data_start + len as usize;
        let total_len = data_end + 2; // +2 for trailing \r\n

        if buf.len() < total_len {
            return Ok(None);
        }
        if &buf[data_end..total_len] != b"\r\n" {
            return Err(Error::Protocol("bulk string not terminated by CRLF".into()));
        }

        let data = Bytes::copy_from_slice(&buf[data_start..data_end]);
        Ok(Some((RespValue::BulkString(data), total_len)))
    }

    fn parse_array(buf: &[u8]) -> Result<Option<(RespValue, usize)>> {
        let Some((len, mut offset)) = Self::parse_len(buf, "array length")? else {
            return Ok(None);
        };

        if len == -1 {
            return Ok(Some((RespValue::NullArray, offset)));
        }
        if len < 0 {
            return Err(Error::Protocol("negative array length".into()));
        }

        let mut items = Vec::with_capacity((len as usize).min(1024));
        for _ in 0..len {
            match Self::parse_value(&buf[offset..])? {
                Some((value, consumed)) => {
                    items.push(value);
                    offset += consumed;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((RespValue::Array(items), offset)))
    }

    fn parse_map(buf: &[u8]) -> Result<Option<(RespValue, usize)>> {
        let Some((len, mut offset)) = Self::parse_len(buf, "map length")? else {
            return Ok(None);
        };
        if len < 0 {
            return Err(Error::Protocol("negative map length".into()));
        }

        let mut pairs = Vec::with_capacity((len as usize).min(1024));
        for _ in 0..len {
            let Some((key, used)) = Self::parse_value(&buf[offset..])? else {
                return Ok(None);
            };
            offset += used;
            let Some((value, used)) = Self::parse_value(&buf[offset..])? else {
                return Ok(None);
            };
            offset += used;
            pairs.push((key, value));
        }

        Ok(Some((RespValue::Map(pairs), offset)))
    }

    fn parse_boolean(buf: &[u8]) -> Result<Option<(RespValue, usize)>> {
        let Some(pos) = Self::find_crlf(buf) else {
            return Ok(None);
        };
        let value = match &buf[1..pos] {
            b"t" => true,
            b"f" => false,
            _ => return Err(Error::Protocol("invalid boolean".into())),
        };
        Ok(Some((RespValue::Boolean(value), pos + 2)))
    }

    fn parse_double(buf: &[u8]) -> Result<Option<(RespValue, usize)>> {
        let Some(pos) = Self::find_crlf(buf) else {
            return Ok(None);
        };
        let d = std::str::from_utf8(&buf[1..pos])
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| Error::Protocol("invalid double".into()))?;
        Ok(Some((RespValue::Double(d), pos + 2)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(input: &[u8]) -> Option<RespValue> {
        let mut buf = BytesMut::from(input);
        let value = Parser::parse(&mut buf).unwrap();
        assert!(value.is_none() || buf.is_empty(), "trailing bytes left");
        value
    }

    #[test]
    fn test_parse_scalars() {
        assert_eq!(parse_all(b"+OK\r\n"), Some(RespValue::ok()));
        assert_eq!(
            parse_all(b"-ERR No such master with that name\r\n"),
            Some(RespValue::error("ERR No such master with that name"))
        );
        assert_eq!(parse_all(b":42\r\n"), Some(RespValue::Integer(42)));
        assert_eq!(parse_all(b"$-1\r\n"), Some(RespValue::Null));
        assert_eq!(parse_all(b"_\r\n"), Some(RespValue::Null));
        assert_eq!(parse_all(b"#t\r\n"), Some(RespValue::Boolean(true)));
    }

    #[test]
    fn test_parse_sentinel_master_reply() {
        let reply = RespValue::field_array(&[
            ("name", "bucket0"),
            ("ip", "10.0.0.5"),
            ("port", "6379"),
        ]);
        let wire = reply.serialize();
        assert_eq!(parse_all(&wire), Some(reply));
    }

    #[test]
    fn test_parse_nested_array() {
        let reply = RespValue::array(vec![
            RespValue::field_array(&[("ip", "10.0.0.2"), ("port", "26379")]),
            RespValue::field_array(&[("ip", "10.0.0.3"), ("port", "26379")]),
        ]);
        let wire = reply.serialize();
        assert_eq!(parse_all(&wire), Some(reply));
    }

    #[test]
    fn test_parse_resp3_map() {
        let input = b"%2\r\n$2\r\nip\r\n$8\r\n10.0.0.5\r\n$4\r\nport\r\n:6379\r\n";
        let expected = RespValue::map(vec![
            (
                RespValue::bulk_string("ip"),
                RespValue::bulk_string("10.0.0.5"),
            ),
            (RespValue::bulk_string("port"), RespValue::Integer(6379)),
        ]);
        assert_eq!(parse_all(input), Some(expected));
    }

    #[test]
    fn test_parse_incomplete_leaves_buffer() {
        let mut buf = BytesMut::from(&b"*2\r\n$2\r\nip\r\n$8\r\n10.0"[..]);
        let before = buf.len();
        assert_eq!(Parser::parse(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), before);

        buf.extend_from_slice(b".0.5\r\n");
        let value = Parser::parse(&mut buf).unwrap().unwrap();
        assert_eq!(
            value,
            RespValue::field_array(&[("ip", "10.0.0.5")])
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_parse_two_frames_back_to_back() {
        let mut buf = BytesMut::from(&b"+OK\r\n:1\r\n"[..]);
        assert_eq!(Parser::parse(&mut buf).unwrap(), Some(RespValue::ok()));
        assert_eq!(Parser::parse(&mut buf).unwrap(), Some(RespValue::Integer(1)));
        assert_eq!(Parser::parse(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_parse_invalid() {
        let mut buf = BytesMut::from(&b"?what\r\n"[..]);
        assert!(matches!(Parser::parse(&mut buf), Err(Error::Protocol(_))));

        let mut buf = BytesMut::from(&b"$abc\r\n"[..]);
        assert!(matches!(Parser::parse(&mut buf), Err(Error::Protocol(_))));

        let mut buf = BytesMut::from(&b"$2\r\nabcd\r\n"[..]);
        assert!(matches!(Parser::parse(&mut buf), Err(Error::Protocol(_))));
    }
}
