//! Incremental RESP Parser
//!
//! Replies arrive from the socket in arbitrary chunks. The parser works
//! on whatever is buffered and reports one of three outcomes:
//!
//! - `Ok(Some((value, consumed)))`: a complete frame, `consumed` bytes long
//! - `Ok(None)`: the frame is incomplete, read more and retry
//! - `Err(ParseError)`: the bytes are not valid RESP
//!
//! The caller appends socket data to a `BytesMut`, parses, and on success
//! advances the buffer by `consumed`. Both the client connection and the
//! in-process test server use the same loop.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur during RESP parsing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Unknown type prefix byte
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// Invalid integer or length line
    #[error("invalid integer: {0:?}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a simple string or error message
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// Negative length other than the null marker
    #[error("invalid length: {0}")]
    InvalidLength(i64),

    /// Missing CRLF after bulk data
    #[error("bulk string missing trailing CRLF")]
    MissingCrlf,

    /// Arrays nested beyond the supported depth
    #[error("maximum nesting depth exceeded: {0}")]
    TooDeep(usize),

    /// The frame exceeds the maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth
pub const MAX_NESTING_DEPTH: usize = 32;

/// Parses one complete frame from the start of `buf`.
///
/// # Example
///
/// ```
/// use kvport::protocol::{parse_frame, RespValue};
///
/// let (value, consumed) = parse_frame(b"+OK\r\n").unwrap().unwrap();
/// assert_eq!(value, RespValue::simple_string("OK"));
/// assert_eq!(consumed, 5);
///
/// assert!(parse_frame(b"$5\r\nhel").unwrap().is_none());
/// ```
pub fn parse_frame(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    parse_value(buf, 0)
}

fn parse_value(buf: &[u8], depth: usize) -> ParseResult<Option<(RespValue, usize)>> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };

    if depth > MAX_NESTING_DEPTH {
        return Err(ParseError::TooDeep(MAX_NESTING_DEPTH));
    }

    match first {
        prefix::SIMPLE_STRING => Ok(line(buf)?.map(|(text, consumed)| {
            (RespValue::SimpleString(text.to_string()), consumed)
        })),
        prefix::ERROR => {
            Ok(line(buf)?.map(|(text, consumed)| (RespValue::Error(text.to_string()), consumed)))
        }
        prefix::INTEGER => match line(buf)? {
            Some((text, consumed)) => Ok(Some((RespValue::Integer(integer(text)?), consumed))),
            None => Ok(None),
        },
        prefix::BULK_STRING => parse_bulk_string(buf),
        prefix::ARRAY => parse_array(buf, depth),
        other => Err(ParseError::UnknownPrefix(other)),
    }
}

/// Reads the line after the prefix byte.
///
/// Returns the text and the bytes consumed including prefix and CRLF.
fn line(buf: &[u8]) -> ParseResult<Option<(&str, usize)>> {
    match find_crlf(&buf[1..]) {
        Some(pos) => {
            let text = std::str::from_utf8(&buf[1..1 + pos])
                .map_err(|_| ParseError::InvalidUtf8("line"))?;
            Ok(Some((text, 1 + pos + 2)))
        }
        None => Ok(None),
    }
}

fn integer(text: &str) -> ParseResult<i64> {
    text.parse()
        .map_err(|_| ParseError::InvalidInteger(text.to_string()))
}

/// `$<length>\r\n<data>\r\n`
fn parse_bulk_string(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    let Some((text, header)) = line(buf)? else {
        return Ok(None);
    };

    let length = integer(text)?;
    if length == -1 {
        return Ok(Some((RespValue::Null, header)));
    }
    if length < 0 {
        return Err(ParseError::InvalidLength(length));
    }

    let length = length as usize;
    if length > MAX_BULK_SIZE {
        return Err(ParseError::MessageTooLarge {
            size: length,
            max: MAX_BULK_SIZE,
        });
    }

    let total = header + length + 2;
    if buf.len() < total {
        return Ok(None);
    }
    if &buf[header + length..total] != CRLF {
        return Err(ParseError::MissingCrlf);
    }

    let data = Bytes::copy_from_slice(&buf[header..header + length]);
    Ok(Some((RespValue::BulkString(data), total)))
}

/// `*<count>\r\n<element>...`
fn parse_array(buf: &[u8], depth: usize) -> ParseResult<Option<(RespValue, usize)>> {
    let Some((text, header)) = line(buf)? else {
        return Ok(None);
    };

    let count = integer(text)?;
    if count == -1 {
        return Ok(Some((RespValue::Null, header)));
    }
    if count < 0 {
        return Err(ParseError::InvalidLength(count));
    }

    // Cap the preallocation: the count comes off the wire
    let mut elements = Vec::with_capacity((count as usize).min(1024));
    let mut consumed = header;

    for _ in 0..count {
        match parse_value(&buf[consumed..], depth + 1)? {
            Some((value, used)) => {
                elements.push(value);
                consumed += used;
            }
            None => return Ok(None),
        }
    }

    Ok(Some((RespValue::Array(elements), consumed)))
}

/// Finds the position of CRLF in the buffer.
#[inline]
pub(crate) fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_string() {
        let (value, consumed) = parse_frame(b"+OK\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::SimpleString("OK".to_string()));
        assert_eq!(consumed, 5);
        assert!(parse_frame(b"+OK").unwrap().is_none());
    }

    #[test]
    fn test_parse_error() {
        let (value, consumed) = parse_frame(b"-ERR unknown command\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Error("ERR unknown command".to_string()));
        assert_eq!(consumed, 22);
    }

    #[test]
    fn test_parse_integer() {
        assert_eq!(
            parse_frame(b":-42\r\n").unwrap().unwrap(),
            (RespValue::Integer(-42), 6)
        );
        assert!(matches!(
            parse_frame(b":abc\r\n"),
            Err(ParseError::InvalidInteger(_))
        ));
    }

    #[test]
    fn test_parse_bulk_string() {
        let (value, consumed) = parse_frame(b"$5\r\nhello\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::BulkString(Bytes::from("hello")));
        assert_eq!(consumed, 11);

        assert!(parse_frame(b"$5\r\nhel").unwrap().is_none());
        assert_eq!(parse_frame(b"$-1\r\n").unwrap().unwrap(), (RespValue::Null, 5));
        assert_eq!(
            parse_frame(b"$5\r\nhelloXX"),
            Err(ParseError::MissingCrlf)
        );
        assert_eq!(
            parse_frame(b"$-2\r\n"),
            Err(ParseError::InvalidLength(-2))
        );
    }

    #[test]
    fn test_parse_binary_bulk_string() {
        let (value, _) = parse_frame(b"$4\r\n\r\n\x00\xff\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::BulkString(Bytes::from_static(b"\r\n\x00\xff")));
    }

    #[test]
    fn test_parse_array() {
        let input = b"*2\r\n$1\r\n0\r\n*2\r\n$3\r\na:1\r\n$3\r\na:2\r\n";
        let (value, consumed) = parse_frame(input).unwrap().unwrap();
        assert_eq!(consumed, input.len());
        assert_eq!(
            value,
            RespValue::Array(vec![
                RespValue::bulk_string("0"),
                RespValue::Array(vec![
                    RespValue::bulk_string("a:1"),
                    RespValue::bulk_string("a:2"),
                ]),
            ])
        );

        assert!(parse_frame(&input[..input.len() - 3]).unwrap().is_none());
        assert_eq!(parse_frame(b"*-1\r\n").unwrap().unwrap(), (RespValue::Null, 5));
        assert_eq!(
            parse_frame(b"*0\r\n").unwrap().unwrap(),
            (RespValue::Array(vec![]), 4)
        );
    }

    #[test]
    fn test_parse_pipelined() {
        let input = b"+OK\r\n:1\r\n";
        let (_, consumed) = parse_frame(input).unwrap().unwrap();
        let (second, _) = parse_frame(&input[consumed..]).unwrap().unwrap();
        assert_eq!(second, RespValue::Integer(1));
    }

    #[test]
    fn test_unknown_prefix() {
        assert_eq!(
            parse_frame(b"GET k\r\n"),
            Err(ParseError::UnknownPrefix(b'G'))
        );
    }

    #[test]
    fn test_nesting_limit() {
        let input = "*1\r\n".repeat(MAX_NESTING_DEPTH + 2);
        assert_eq!(
            parse_frame(input.as_bytes()),
            Err(ParseError::TooDeep(MAX_NESTING_DEPTH))
        );
    }

    #[test]
    fn test_find_crlf() {
        assert_eq!(find_crlf(b"ab\r\n"), Some(2));
        assert_eq!(find_crlf(b"ab\r"), None);
        assert_eq!(find_crlf(b""), None);
    }
}
