//! RESP Frame Types
//!
//! The Redis adapter speaks RESP2: every command is an array of bulk
//! strings and every reply is one of five frame types, each introduced by
//! a prefix byte and terminated by CRLF.
//!
//! ```text
//!   +OK\r\n                         simple string
//!   -ERR wrong type\r\n             error
//!   :42\r\n                         integer
//!   $5\r\nhello\r\n                 bulk string   ($-1\r\n is null)
//!   *2\r\n$3\r\nGET\r\n$1\r\nk\r\n  array         (*-1\r\n is null)
//! ```

use bytes::{BufMut, Bytes, BytesMut};

/// The CRLF terminator
pub const CRLF: &[u8] = b"\r\n";

/// Frame type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// One RESP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// `+<string>\r\n`, never contains CRLF
    SimpleString(String),

    /// `-<message>\r\n`
    Error(String),

    /// `:<integer>\r\n`
    Integer(i64),

    /// `$<length>\r\n<data>\r\n`, binary safe
    BulkString(Bytes),

    /// Null bulk string or null array
    Null,

    /// `*<count>\r\n<element>...`
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Builds a command frame: an array of bulk strings.
    ///
    /// # Example
    /// ```
    /// use kvport::protocol::RespValue;
    ///
    /// let cmd = RespValue::command(["GET", "name"]);
    /// assert_eq!(cmd.serialize(), b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n");
    /// ```
    pub fn command<I, A>(args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Bytes>,
    {
        RespValue::Array(
            args.into_iter()
                .map(|arg| RespValue::BulkString(arg.into()))
                .collect(),
        )
    }

    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    /// Serializes the frame to a new buffer.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        self.serialize_into(&mut buf);
        buf.to_vec()
    }

    /// Appends the wire form of the frame to `buf`.
    pub fn serialize_into(&self, buf: &mut BytesMut) {
        match self {
            RespValue::SimpleString(s) => {
                buf.put_u8(prefix::SIMPLE_STRING);
                buf.put_slice(s.as_bytes());
                buf.put_slice(CRLF);
            }
            RespValue::Error(s) => {
                buf.put_u8(prefix::ERROR);
                buf.put_slice(s.as_bytes());
                buf.put_slice(CRLF);
            }
            RespValue::Integer(n) => {
                buf.put_u8(prefix::INTEGER);
                buf.put_slice(n.to_string().as_bytes());
                buf.put_slice(CRLF);
            }
            RespValue::BulkString(data) => {
                buf.put_u8(prefix::BULK_STRING);
                buf.put_slice(data.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                buf.put_slice(data);
                buf.put_slice(CRLF);
            }
            RespValue::Null => {
                buf.put_u8(prefix::BULK_STRING);
                buf.put_slice(b"-1");
                buf.put_slice(CRLF);
            }
            RespValue::Array(values) => {
                buf.put_u8(prefix::ARRAY);
                buf.put_slice(values.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                for value in values {
                    value.serialize_into(buf);
                }
            }
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RespValue::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Returns the text of a simple or UTF-8 bulk string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(s) => Some(s),
            RespValue::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RespValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Consumes the frame and returns bulk string data.
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            RespValue::BulkString(b) => Some(b),
            _ => None,
        }
    }

    /// Consumes the frame and returns array elements.
    pub fn into_array(self) -> Option<Vec<RespValue>> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Short description used in protocol error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            RespValue::SimpleString(_) => "simple string",
            RespValue::Error(_) => "error",
            RespValue::Integer(_) => "integer",
            RespValue::BulkString(_) => "bulk string",
            RespValue::Null => "null",
            RespValue::Array(_) => "array",
        }
    }
}
