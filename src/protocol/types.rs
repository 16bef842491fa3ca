use bytes::Bytes;

/// A single RESP2/RESP3 reply (or request) frame
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// Simple string: +OK\r\n
    SimpleString(Bytes),
    /// Error: -ERR message\r\n
    Error(Bytes),
    /// Integer: :1000\r\n
    Integer(i64),
    /// Bulk string: $5\r\nhello\r\n
    BulkString(Bytes),
    /// Null bulk string: $-1\r\n (RESP2) or _\r\n (RESP3)
    Null,
    /// Null array: *-1\r\n
    NullArray,
    /// Array: *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
    Array(Vec<RespValue>),
    /// RESP3 map: %1\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
    Map(Vec<(RespValue, RespValue)>),
    /// RESP3 boolean: #t\r\n
    Boolean(bool),
    /// RESP3 double: ,3.14\r\n
    Double(f64),
}

impl RespValue {
    pub const OK: RespValue = RespValue::SimpleString(Bytes::from_static(b"OK"));

    #[inline]
    pub fn ok() -> Self {
        Self::OK
    }

    #[inline]
    pub fn error(msg: &str) -> Self {
        Self::Error(Bytes::copy_from_slice(msg.as_bytes()))
    }

    #[inline]
    pub fn bulk_string(s: &str) -> Self {
        Self::BulkString(Bytes::copy_from_slice(s.as_bytes()))
    }

    #[inline]
    pub fn array(items: Vec<RespValue>) -> Self {
        Self::Array(items)
    }

    #[inline]
    pub fn map(pairs: Vec<(RespValue, RespValue)>) -> Self {
        Self::Map(pairs)
    }

    /// Build a request frame: an array of bulk strings
    pub fn command(parts: &[&str]) -> Self {
        Self::Array(parts.iter().map(|p| Self::bulk_string(p)).collect())
    }

    /// Flat `field value field value ...` array, the shape SENTINEL replies use
    pub fn field_array(pairs: &[(&str, &str)]) -> Self {
        let mut items = Vec::with_capacity(pairs.len() * 2);
        for (field, value) in pairs {
            items.push(Self::bulk_string(field));
            items.push(Self::bulk_string(value));
        }
        Self::Array(items)
    }

    /// Serialize to RESP2 wire format
    pub fn serialize(&self) -> Bytes {
        let mut buf = Vec::with_capacity(64);
        self.write_to(&mut buf);
        Bytes::from(buf)
    }

    pub fn write_to(&self, buf: &mut Vec<u8>) {
        self.write_to_protocol(buf, 2);
    }

    /// Write with the given protocol version (2 or 3)
    pub fn write_to_protocol(&self, buf: &mut Vec<u8>, protocol: u8) {
        match self {
            RespValue::SimpleString(s) => {
                buf.push(b'+');
                buf.extend_from_slice(s);
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Error(e) => {
                buf.push(b'-');
                buf.extend_from_slice(e);
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Integer(n) => {
                buf.push(b':');
                buf.extend_from_slice(itoa::Buffer::new().format(*n).as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::BulkString(s) => write_bulk(buf, s),
            RespValue::Null => {
                if protocol >= 3 {
                    buf.extend_from_slice(b"_\r\n");
                } else {
                    buf.extend_from_slice(b"$-1\r\n");
                }
            }
            RespValue::NullArray => {
                if protocol >= 3 {
                    buf.extend_from_slice(b"_\r\n");
                } else {
                    buf.extend_from_slice(b"*-1\r\n");
                }
            }
            RespValue::Array(items) => {
                write_header(buf, b'*', items.len());
                for item in items {
                    item.write_to_protocol(buf, protocol);
                }
            }
            RespValue::Map(pairs) => {
                // RESP2 has no map type; flatten to [k1, v1, k2, v2, ...]
                if protocol >= 3 {
                    write_header(buf, b'%', pairs.len());
                } else {
                    write_header(buf, b'*', pairs.len() * 2);
                }
                for (key, value) in pairs {
                    key.write_to_protocol(buf, protocol);
                    value.write_to_protocol(buf, protocol);
                }
            }
            RespValue::Boolean(b) => {
                let frame: &[u8] = match (protocol >= 3, *b) {
                    (true, true) => b"#t\r\n",
                    (true, false) => b"#f\r\n",
                    (false, true) => b":1\r\n",
                    (false, false) => b":0\r\n",
                };
                buf.extend_from_slice(frame);
            }
            RespValue::Double(d) => {
                let s = d.to_string();
                if protocol >= 3 {
                    buf.push(b',');
                    buf.extend_from_slice(s.as_bytes());
                    buf.extend_from_slice(b"\r\n");
                } else {
                    write_bulk(buf, s.as_bytes());
                }
            }
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            RespValue::BulkString(b) | RespValue::SimpleString(b) => Some(b),
            _ => None,
        }
    }

    /// String view of a simple or bulk string; `None` for other types or bad UTF-8
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            RespValue::Integer(n) => Some(*n),
            RespValue::BulkString(b) | RespValue::SimpleString(b) => {
                std::str::from_utf8(b).ok()?.parse().ok()
            }
            _ => None,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, RespValue::Null | RespValue::NullArray)
    }

    /// Short type name used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            RespValue::SimpleString(_) => "simple string",
            RespValue::Error(_) => "error",
            RespValue::Integer(_) => "integer",
            RespValue::BulkString(_) => "bulk string",
            RespValue::Null => "null",
            RespValue::NullArray => "null array",
            RespValue::Array(_) => "array",
            RespValue::Map(_) => "map",
            RespValue::Boolean(_) => "boolean",
            RespValue::Double(_) => "double",
        }
    }
}

#[inline]
fn write_header(buf: &mut Vec<u8>, prefix: u8, len: usize) {
    buf.push(prefix);
    buf.extend_from_slice(itoa::Buffer::new().format(len).as_bytes());
    buf.extend_from_slice(b"\r\n");
}

#[inline]
fn write_bulk(buf: &mut Vec<u8>, data: &[u8]) {
    write_header(buf, b'$', data.len());
    buf.extend_from_slice(data);
    buf.extend_from_slice(b"\r\n");
}
