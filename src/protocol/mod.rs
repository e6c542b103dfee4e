//! RESP Protocol
//!
//! Client-side codec for the Redis Serialization Protocol, used by the
//! Redis adapter and by the in-process server its tests run against.
//!
//! - `types`: the [`RespValue`] frame and its serialization
//! - `parser`: incremental frame parsing
//!
//! ## Example
//!
//! ```
//! use kvport::protocol::{parse_frame, RespValue};
//!
//! let request = RespValue::command(["GET", "name"]).serialize();
//! let (parsed, consumed) = parse_frame(&request).unwrap().unwrap();
//! assert_eq!(consumed, request.len());
//! assert_eq!(parsed.into_array().map(|a| a.len()), Some(2));
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_frame, ParseError, ParseResult};
pub use types::RespValue;
