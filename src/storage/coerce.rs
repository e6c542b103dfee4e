//! Coercion Engine
//!
//! A successful `get` returns a [`Lookup`]: either a hit carrying the
//! decoded [`Value`], or a miss. Accessors on the lookup convert the value
//! on demand to the shape the caller asks for.
//!
//! ## Accessor Contract
//!
//! Every accessor returns `Result<Option<T>, ConversionError>`:
//!
//! | Lookup | Conversion | Result          |
//! |--------|------------|-----------------|
//! | miss   | -          | `Ok(None)`      |
//! | hit    | succeeds   | `Ok(Some(v))`   |
//! | hit    | fails      | `Err(e)`        |
//!
//! Errors raised by `get` itself never reach the accessors: they are
//! propagated with `?` before any conversion is attempted.
//!
//! ## Conversion Table
//!
//! - bool <-> numeric: `true` is 1, `false` is 0, any nonzero number is `true`
//! - integer -> integer: two's-complement truncation
//! - float -> integer: round half away from zero, then saturate
//! - text/bytes -> typed: parsed with the target's canonical grammar
//! - sequences: only homogeneous [`Value::Seq`] values convert, element by element;
//!   a [`Value::Bytes`] converts to numeric sequences one byte per element
//!
//! ## Example
//!
//! ```
//! use kvport::storage::{Lookup, Value};
//!
//! let hit = Lookup::hit(Value::F64(3.7));
//! assert_eq!(hit.i64().unwrap(), Some(4));
//!
//! let miss = Lookup::miss();
//! assert_eq!(miss.i64().unwrap(), None);
//! ```

use crate::error::ConversionError;
use crate::storage::{Kind, Value};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// The outcome of a successful `get`: a hit or a miss.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    value: Option<Value>,
}

impl Lookup {
    /// Creates a hit.
    pub fn hit(value: Value) -> Self {
        Self { value: Some(value) }
    }

    /// Creates a miss.
    pub fn miss() -> Self {
        Self { value: None }
    }

    /// Returns true if a live entry was found.
    pub fn is_hit(&self) -> bool {
        self.value.is_some()
    }

    /// Returns true if no live entry exists for the key.
    pub fn is_miss(&self) -> bool {
        self.value.is_none()
    }

    /// Returns the raw stored value.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Consumes the lookup and returns the raw stored value.
    pub fn into_value(self) -> Option<Value> {
        self.value
    }

    /// Converts the value to any [`FromValue`] shape.
    pub fn get<T: FromValue>(&self) -> Result<Option<T>, ConversionError> {
        self.value.as_ref().map(T::from_value).transpose()
    }

    /// Deserializes the value into any `serde` type.
    ///
    /// This is the way to read back maps and structs.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<Option<T>, ConversionError> {
        match &self.value {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.to_json())
                .map(Some)
                .map_err(|e| ConversionError::Deserialize(e.to_string())),
        }
    }

    pub fn bool(&self) -> Result<Option<bool>, ConversionError> {
        self.get()
    }

    pub fn i8(&self) -> Result<Option<i8>, ConversionError> {
        self.get()
    }

    pub fn i16(&self) -> Result<Option<i16>, ConversionError> {
        self.get()
    }

    pub fn i32(&self) -> Result<Option<i32>, ConversionError> {
        self.get()
    }

    pub fn i64(&self) -> Result<Option<i64>, ConversionError> {
        self.get()
    }

    pub fn u8(&self) -> Result<Option<u8>, ConversionError> {
        self.get()
    }

    pub fn u16(&self) -> Result<Option<u16>, ConversionError> {
        self.get()
    }

    pub fn u32(&self) -> Result<Option<u32>, ConversionError> {
        self.get()
    }

    pub fn u64(&self) -> Result<Option<u64>, ConversionError> {
        self.get()
    }

    pub fn f32(&self) -> Result<Option<f32>, ConversionError> {
        self.get()
    }

    pub fn f64(&self) -> Result<Option<f64>, ConversionError> {
        self.get()
    }

    /// Returns the value as text.
    pub fn string(&self) -> Result<Option<String>, ConversionError> {
        self.get()
    }

    /// Returns the value as raw bytes (strings yield their UTF-8 bytes).
    pub fn bytes(&self) -> Result<Option<Bytes>, ConversionError> {
        self.get()
    }

    /// Parses the value as a UUID.
    pub fn uuid(&self) -> Result<Option<Uuid>, ConversionError> {
        self.get()
    }

    pub fn bool_vec(&self) -> Result<Option<Vec<bool>>, ConversionError> {
        self.get()
    }

    pub fn i8_vec(&self) -> Result<Option<Vec<i8>>, ConversionError> {
        self.get()
    }

    pub fn i16_vec(&self) -> Result<Option<Vec<i16>>, ConversionError> {
        self.get()
    }

    pub fn i32_vec(&self) -> Result<Option<Vec<i32>>, ConversionError> {
        self.get()
    }

    pub fn i64_vec(&self) -> Result<Option<Vec<i64>>, ConversionError> {
        self.get()
    }

    pub fn u8_vec(&self) -> Result<Option<Vec<u8>>, ConversionError> {
        self.get()
    }

    pub fn u16_vec(&self) -> Result<Option<Vec<u16>>, ConversionError> {
        self.get()
    }

    pub fn u32_vec(&self) -> Result<Option<Vec<u32>>, ConversionError> {
        self.get()
    }

    pub fn u64_vec(&self) -> Result<Option<Vec<u64>>, ConversionError> {
        self.get()
    }

    pub fn f32_vec(&self) -> Result<Option<Vec<f32>>, ConversionError> {
        self.get()
    }

    pub fn f64_vec(&self) -> Result<Option<Vec<f64>>, ConversionError> {
        self.get()
    }

    pub fn string_vec(&self) -> Result<Option<Vec<String>>, ConversionError> {
        self.get()
    }

    pub fn bytes_vec(&self) -> Result<Option<Vec<Bytes>>, ConversionError> {
        self.get()
    }

    pub fn uuid_vec(&self) -> Result<Option<Vec<Uuid>>, ConversionError> {
        self.get()
    }
}

impl From<Option<Value>> for Lookup {
    fn from(value: Option<Value>) -> Self {
        Self { value }
    }
}

/// A shape a stored [`Value`] can be converted to.
pub trait FromValue: Sized {
    /// Name of the shape, used in error messages.
    const SHAPE: &'static str;

    /// Converts a stored value.
    fn from_value(value: &Value) -> Result<Self, ConversionError>;

    /// Converts one element of a homogeneous sequence.
    ///
    /// Element conversion never parses text into numbers or booleans.
    fn from_element(value: &Value) -> Result<Self, ConversionError> {
        Self::from_value(value)
    }
}

fn nil<T: FromValue>() -> ConversionError {
    ConversionError::Nil { target: T::SHAPE }
}

fn unsupported<T: FromValue>(value: &Value) -> ConversionError {
    ConversionError::Unsupported {
        source_kind: value.kind(),
        target: T::SHAPE,
    }
}

fn malformed<T: FromValue>(kind: Kind, input: &str) -> ConversionError {
    ConversionError::Malformed {
        source_kind: kind,
        target: T::SHAPE,
        input: input.to_string(),
    }
}

/// Returns the text behind a string or bytes value.
fn text_of<T: FromValue>(value: &Value) -> Option<Result<&str, ConversionError>> {
    match value {
        Value::Str(s) => Some(Ok(s.as_str())),
        Value::Bytes(b) => Some(
            std::str::from_utf8(b)
                .map_err(|_| malformed::<T>(Kind::Bytes, &String::from_utf8_lossy(b))),
        ),
        _ => None,
    }
}

/// Parses a boolean using the accepted spellings.
fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

impl FromValue for bool {
    const SHAPE: &'static str = "bool";

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        if let Some(text) = text_of::<Self>(value) {
            let text = text?;
            return parse_bool(text).ok_or_else(|| malformed::<Self>(value.kind(), text));
        }
        match *value {
            Value::Bool(b) => Ok(b),
            Value::I8(n) => Ok(n != 0),
            Value::I16(n) => Ok(n != 0),
            Value::I32(n) => Ok(n != 0),
            Value::I64(n) => Ok(n != 0),
            Value::U8(n) => Ok(n != 0),
            Value::U16(n) => Ok(n != 0),
            Value::U32(n) => Ok(n != 0),
            Value::U64(n) => Ok(n != 0),
            Value::F32(n) => Ok(n != 0.0),
            Value::F64(n) => Ok(n != 0.0),
            Value::Nil => Err(nil::<Self>()),
            _ => Err(unsupported::<Self>(value)),
        }
    }

    fn from_element(value: &Value) -> Result<Self, ConversionError> {
        match *value {
            Value::Bool(b) => Ok(b),
            Value::Nil => Err(nil::<Self>()),
            _ => Err(unsupported::<Self>(value)),
        }
    }
}

macro_rules! impl_from_value_int {
    ($($ty:ident),* $(,)?) => {
        $(
            impl FromValue for $ty {
                const SHAPE: &'static str = stringify!($ty);

                fn from_value(value: &Value) -> Result<Self, ConversionError> {
                    match text_of::<Self>(value) {
                        Some(text) => {
                            let text = text?;
                            text.parse::<$ty>()
                                .map_err(|_| malformed::<Self>(value.kind(), text))
                        }
                        None => Self::from_element(value),
                    }
                }

                fn from_element(value: &Value) -> Result<Self, ConversionError> {
                    match *value {
                        Value::Bool(b) => Ok(b as $ty),
                        Value::I8(n) => Ok(n as $ty),
                        Value::I16(n) => Ok(n as $ty),
                        Value::I32(n) => Ok(n as $ty),
                        Value::I64(n) => Ok(n as $ty),
                        Value::U8(n) => Ok(n as $ty),
                        Value::U16(n) => Ok(n as $ty),
                        Value::U32(n) => Ok(n as $ty),
                        Value::U64(n) => Ok(n as $ty),
                        Value::F32(n) => Ok(n.round() as $ty),
                        Value::F64(n) => Ok(n.round() as $ty),
                        Value::Nil => Err(nil::<Self>()),
                        _ => Err(unsupported::<Self>(value)),
                    }
                }
            }
        )*
    };
}

impl_from_value_int!(i8, i16, i32, i64, u8, u16, u32, u64);

macro_rules! impl_from_value_float {
    ($($ty:ident),* $(,)?) => {
        $(
            impl FromValue for $ty {
                const SHAPE: &'static str = stringify!($ty);

                fn from_value(value: &Value) -> Result<Self, ConversionError> {
                    match text_of::<Self>(value) {
                        Some(text) => {
                            let text = text?;
                            text.parse::<$ty>()
                                .map_err(|_| malformed::<Self>(value.kind(), text))
                        }
                        None => Self::from_element(value),
                    }
                }

                fn from_element(value: &Value) -> Result<Self, ConversionError> {
                    match *value {
                        Value::Bool(b) => Ok(if b { 1.0 } else { 0.0 }),
                        Value::I8(n) => Ok(n as $ty),
                        Value::I16(n) => Ok(n as $ty),
                        Value::I32(n) => Ok(n as $ty),
                        Value::I64(n) => Ok(n as $ty),
                        Value::U8(n) => Ok(n as $ty),
                        Value::U16(n) => Ok(n as $ty),
                        Value::U32(n) => Ok(n as $ty),
                        Value::U64(n) => Ok(n as $ty),
                        Value::F32(n) => Ok(n as $ty),
                        Value::F64(n) => Ok(n as $ty),
                        Value::Nil => Err(nil::<Self>()),
                        _ => Err(unsupported::<Self>(value)),
                    }
                }
            }
        )*
    };
}

impl_from_value_float!(f32, f64);

impl FromValue for String {
    const SHAPE: &'static str = "string";

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        if let Some(text) = text_of::<Self>(value) {
            return text.map(str::to_string);
        }
        match *value {
            Value::Bool(b) => Ok(b.to_string()),
            Value::I8(n) => Ok(n.to_string()),
            Value::I16(n) => Ok(n.to_string()),
            Value::I32(n) => Ok(n.to_string()),
            Value::I64(n) => Ok(n.to_string()),
            Value::U8(n) => Ok(n.to_string()),
            Value::U16(n) => Ok(n.to_string()),
            Value::U32(n) => Ok(n.to_string()),
            Value::U64(n) => Ok(n.to_string()),
            Value::F32(n) => Ok(n.to_string()),
            Value::F64(n) => Ok(n.to_string()),
            Value::Nil => Err(nil::<Self>()),
            _ => Err(unsupported::<Self>(value)),
        }
    }

    fn from_element(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Str(s) => Ok(s.clone()),
            Value::Nil => Err(nil::<Self>()),
            _ => Err(unsupported::<Self>(value)),
        }
    }
}

impl FromValue for Bytes {
    const SHAPE: &'static str = "bytes";

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            Value::Str(s) => Ok(Bytes::from(s.clone())),
            Value::Nil => Err(nil::<Self>()),
            _ => Err(unsupported::<Self>(value)),
        }
    }
}

impl FromValue for Uuid {
    const SHAPE: &'static str = "uuid";

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match text_of::<Self>(value) {
            Some(text) => {
                let text = text?;
                Uuid::parse_str(text).map_err(|_| malformed::<Self>(value.kind(), text))
            }
            None if value.is_nil() => Err(nil::<Self>()),
            None => Err(unsupported::<Self>(value)),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    const SHAPE: &'static str = "sequence";

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        let items = match value {
            Value::Seq(items) => items,
            // A byte string is a sequence of u8 for numeric targets
            Value::Bytes(bytes) => {
                return bytes
                    .iter()
                    .map(|&byte| T::from_element(&Value::U8(byte)))
                    .collect::<Result<_, _>>()
                    .map_err(|_| ConversionError::Unsupported {
                        source_kind: Kind::Bytes,
                        target: T::SHAPE,
                    })
            }
            Value::Nil => return Err(nil::<Self>()),
            other => {
                return Err(ConversionError::Unsupported {
                    source_kind: other.kind(),
                    target: T::SHAPE,
                })
            }
        };

        if let Some(first) = items.first() {
            let first = first.kind();
            if let Some(other) = items.iter().map(Value::kind).find(|k| *k != first) {
                return Err(ConversionError::Heterogeneous {
                    target: T::SHAPE,
                    first,
                    other,
                });
            }
        }

        items.iter().map(T::from_element).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn hit(value: impl Into<Value>) -> Lookup {
        Lookup::hit(value.into())
    }

    #[test]
    fn test_miss_yields_none() {
        let miss = Lookup::miss();
        assert!(miss.is_miss());
        assert_eq!(miss.bool().unwrap(), None);
        assert_eq!(miss.string().unwrap(), None);
        assert_eq!(miss.u64_vec().unwrap(), None);
        assert_eq!(miss.uuid().unwrap(), None);
    }

    #[test]
    fn test_bool_from_text() {
        assert_eq!(hit("true").bool().unwrap(), Some(true));
        assert_eq!(hit("F").bool().unwrap(), Some(false));
        assert_eq!(hit(b"1".to_vec()).bool().unwrap(), Some(true));

        let err = hit("maybe").bool().unwrap_err();
        assert!(matches!(
            err,
            ConversionError::Malformed { target: "bool", .. }
        ));
    }

    #[test]
    fn test_bool_from_numbers() {
        assert_eq!(hit(0i32).bool().unwrap(), Some(false));
        assert_eq!(hit(-5i64).bool().unwrap(), Some(true));
        assert_eq!(hit(0.1f64).bool().unwrap(), Some(true));
        assert_eq!(hit(true).i32().unwrap(), Some(1));
        assert_eq!(hit(false).f64().unwrap(), Some(0.0));
    }

    #[test]
    fn test_float_to_int_rounds() {
        assert_eq!(hit(3.7f64).i64().unwrap(), Some(4));
        assert_eq!(hit(3.2f64).i64().unwrap(), Some(3));
        assert_eq!(hit(-2.5f64).i32().unwrap(), Some(-3));
        assert_eq!(hit(2.5f32).u8().unwrap(), Some(3));
        assert_eq!(hit(1e20f64).i32().unwrap(), Some(i32::MAX));
    }

    #[test]
    fn test_narrowing_truncates() {
        assert_eq!(hit(300i64).u8().unwrap(), Some(44));
        assert_eq!(hit(-1i32).u16().unwrap(), Some(u16::MAX));
        assert_eq!(hit(u64::MAX).i64().unwrap(), Some(-1));
    }

    #[test]
    fn test_int_from_text() {
        assert_eq!(hit("42").i64().unwrap(), Some(42));
        assert_eq!(hit("-7").i8().unwrap(), Some(-7));
        assert!(hit("3.7").i64().is_err());
        assert!(hit("300").u8().is_err());
        assert!(hit("forty").u32().is_err());
    }

    #[test]
    fn test_float_from_text() {
        assert_eq!(hit("2.5").f64().unwrap(), Some(2.5));
        assert_eq!(hit("1e3").f32().unwrap(), Some(1000.0));
        assert!(hit("abc").f64().is_err());
    }

    #[test]
    fn test_string_conversions() {
        assert_eq!(hit(true).string().unwrap(), Some("true".to_string()));
        assert_eq!(hit(-12i16).string().unwrap(), Some("-12".to_string()));
        assert_eq!(hit(0.5f64).string().unwrap(), Some("0.5".to_string()));
        assert_eq!(
            hit(b"doe".to_vec()).string().unwrap(),
            Some("doe".to_string())
        );
        assert!(hit(vec![0xffu8, 0xfe]).string().is_err());
    }

    #[test]
    fn test_bytes_conversions() {
        assert_eq!(
            hit("doe").bytes().unwrap(),
            Some(Bytes::from_static(b"doe"))
        );
        assert!(hit(7i32).bytes().is_err());
    }

    #[test]
    fn test_uuid() {
        let id = Uuid::new_v4();
        assert_eq!(hit(id).uuid().unwrap(), Some(id));
        assert_eq!(
            hit(id.to_string().into_bytes()).uuid().unwrap(),
            Some(id)
        );
        assert!(hit("not-a-uuid").uuid().is_err());
        assert!(hit(42i64).uuid().is_err());
    }

    #[test]
    fn test_nil_is_an_error() {
        let nil = Lookup::hit(Value::Nil);
        assert!(nil.is_hit());
        assert_eq!(
            nil.bool().unwrap_err(),
            ConversionError::Nil { target: "bool" }
        );
        assert!(nil.string().is_err());
        assert!(nil.i64_vec().is_err());
    }

    #[test]
    fn test_sequences() {
        assert_eq!(
            hit(vec![true, false]).i64_vec().unwrap(),
            Some(vec![1, 0])
        );
        assert_eq!(
            hit(vec![1.4f64, 2.6]).u64_vec().unwrap(),
            Some(vec![1, 3])
        );
        assert_eq!(
            hit(vec!["a", "b"]).string_vec().unwrap(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(
            Lookup::hit(Value::Seq(vec![])).f32_vec().unwrap(),
            Some(vec![])
        );
    }

    #[test]
    fn test_bytes_as_numeric_sequence() {
        let bytes = hit(vec![1u8, 2, 255]);
        assert_eq!(bytes.u8_vec().unwrap(), Some(vec![1, 2, 255]));
        assert_eq!(bytes.i64_vec().unwrap(), Some(vec![1, 2, 255]));
        assert_eq!(bytes.i8_vec().unwrap(), Some(vec![1, 2, -1]));
        assert_eq!(bytes.f64_vec().unwrap(), Some(vec![1.0, 2.0, 255.0]));
        assert_eq!(hit(Vec::<u8>::new()).u64_vec().unwrap(), Some(vec![]));

        assert!(matches!(
            bytes.string_vec().unwrap_err(),
            ConversionError::Unsupported {
                source_kind: Kind::Bytes,
                ..
            }
        ));
        assert!(bytes.bool_vec().is_err());
    }

    #[test]
    fn test_sequence_rules() {
        // Scalars are not sequences and sequences are not scalars.
        assert!(hit(7i64).i64_vec().is_err());
        assert!(hit(vec![7i64]).i64().is_err());

        // Elements are not parsed from text.
        assert!(hit(vec!["1", "2"]).i64_vec().is_err());
        assert!(hit(vec![1i64, 0]).bool_vec().is_err());

        let mixed = Lookup::hit(Value::Seq(vec![Value::I64(1), Value::F64(2.0)]));
        assert!(matches!(
            mixed.f64_vec().unwrap_err(),
            ConversionError::Heterogeneous { .. }
        ));
    }

    #[test]
    fn test_uuid_sequence() {
        let ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        assert_eq!(hit(ids.clone()).uuid_vec().unwrap(), Some(ids));
    }

    #[test]
    fn test_maps_need_deserialize() {
        let session = hit(Value::map([("uid", 7i64)]));
        assert!(session.string().is_err());

        let map: BTreeMap<String, u32> = session.deserialize().unwrap().unwrap();
        assert_eq!(map.get("uid"), Some(&7));
    }

    #[test]
    fn test_deserialize_struct() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Session {
            uid: u32,
            tags: Vec<String>,
        }

        let value = Value::map([
            ("uid", Value::I64(7)),
            ("tags", Value::from(vec!["admin"])),
        ]);
        let session: Session = Lookup::hit(value).deserialize().unwrap().unwrap();
        assert_eq!(
            session,
            Session {
                uid: 7,
                tags: vec!["admin".to_string()],
            }
        );

        assert!(hit("nope").deserialize::<Session>().is_err());
    }
}
