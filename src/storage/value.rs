//! Stored Value Type
//!
//! [`Value`] is the payload every backend stores. It is a plain sum type:
//! the storage layer never inspects it, and the coercion layer converts it
//! to the shape a caller asks for through an explicit conversion table.
//!
//! Values can be built from Rust primitives, strings, byte buffers, UUIDs,
//! vectors, maps, or any `serde::Serialize` type through
//! [`Value::from_serialize`].

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// A value stored under a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Absence of a value (`None`, JSON `null`)
    Nil,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(#[serde(with = "float_repr")] f32),
    F64(#[serde(with = "float_repr")] f64),
    /// UTF-8 text
    Str(String),
    /// Raw bytes
    Bytes(Bytes),
    /// An ordered sequence; accessors only accept homogeneous ones
    Seq(Vec<Value>),
    /// A string-keyed map
    Map(BTreeMap<String, Value>),
}

/// JSON has no NaN or infinity, so non-finite floats travel as the
/// strings `"NaN"`, `"inf"` and `"-inf"`.
mod float_repr {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub trait Float: Copy + Into<f64> {
        fn from_f64(value: f64) -> Self;
        fn write<S: Serializer>(self, serializer: S) -> Result<S::Ok, S::Error>;
    }

    impl Float for f32 {
        fn from_f64(value: f64) -> Self {
            value as f32
        }

        fn write<S: Serializer>(self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_f32(self)
        }
    }

    impl Float for f64 {
        fn from_f64(value: f64) -> Self {
            value
        }

        fn write<S: Serializer>(self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_f64(self)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr<F> {
        Number(F),
        Text(String),
    }

    pub fn serialize<F: Float, S: Serializer>(value: &F, serializer: S) -> Result<S::Ok, S::Error> {
        let wide: f64 = (*value).into();
        if wide.is_nan() {
            serializer.serialize_str("NaN")
        } else if wide.is_infinite() {
            serializer.serialize_str(if wide > 0.0 { "inf" } else { "-inf" })
        } else {
            value.write(serializer)
        }
    }

    pub fn deserialize<'de, F, D>(deserializer: D) -> Result<F, D::Error>
    where
        F: Float + Deserialize<'de>,
        D: Deserializer<'de>,
    {
        match Repr::<F>::deserialize(deserializer)? {
            Repr::Number(value) => Ok(value),
            Repr::Text(text) => match text.as_str() {
                "NaN" => Ok(F::from_f64(f64::NAN)),
                "inf" => Ok(F::from_f64(f64::INFINITY)),
                "-inf" => Ok(F::from_f64(f64::NEG_INFINITY)),
                other => Err(de::Error::invalid_value(
                    de::Unexpected::Str(other),
                    &"a number, \"NaN\", \"inf\" or \"-inf\"",
                )),
            },
        }
    }
}

/// The kind of a [`Value`], used in conversion errors and homogeneity checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Nil,
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Str,
    Bytes,
    Seq,
    Map,
}

impl Kind {
    /// Returns the lowercase name of this kind.
    pub fn name(self) -> &'static str {
        match self {
            Kind::Nil => "nil",
            Kind::Bool => "bool",
            Kind::I8 => "i8",
            Kind::I16 => "i16",
            Kind::I32 => "i32",
            Kind::I64 => "i64",
            Kind::U8 => "u8",
            Kind::U16 => "u16",
            Kind::U32 => "u32",
            Kind::U64 => "u64",
            Kind::F32 => "f32",
            Kind::F64 => "f64",
            Kind::Str => "string",
            Kind::Bytes => "bytes",
            Kind::Seq => "sequence",
            Kind::Map => "map",
        }
    }

    /// Returns true for integer and float kinds.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Kind::I8
                | Kind::I16
                | Kind::I32
                | Kind::I64
                | Kind::U8
                | Kind::U16
                | Kind::U32
                | Kind::U64
                | Kind::F32
                | Kind::F64
        )
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Value {
    /// Returns the kind of this value.
    pub fn kind(&self) -> Kind {
        match self {
            Value::Nil => Kind::Nil,
            Value::Bool(_) => Kind::Bool,
            Value::I8(_) => Kind::I8,
            Value::I16(_) => Kind::I16,
            Value::I32(_) => Kind::I32,
            Value::I64(_) => Kind::I64,
            Value::U8(_) => Kind::U8,
            Value::U16(_) => Kind::U16,
            Value::U32(_) => Kind::U32,
            Value::U64(_) => Kind::U64,
            Value::F32(_) => Kind::F32,
            Value::F64(_) => Kind::F64,
            Value::Str(_) => Kind::Str,
            Value::Bytes(_) => Kind::Bytes,
            Value::Seq(_) => Kind::Seq,
            Value::Map(_) => Kind::Map,
        }
    }

    /// Returns true if this value is nil.
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Builds a map value from key/value pairs.
    ///
    /// # Example
    ///
    /// ```
    /// use kvport::storage::Value;
    ///
    /// let session = Value::map([("uid", 7i64)]);
    /// assert_eq!(session.kind().name(), "map");
    /// ```
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Converts any serializable type into a value.
    ///
    /// Structs and maps become [`Value::Map`], sequences [`Value::Seq`].
    /// JSON numbers map to `I64` when they fit, then `U64`, then `F64`.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Value::from)
    }

    /// Converts this value to a JSON document.
    ///
    /// Bytes become arrays of numbers; non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Value::Nil => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::I8(n) => Json::from(*n),
            Value::I16(n) => Json::from(*n),
            Value::I32(n) => Json::from(*n),
            Value::I64(n) => Json::from(*n),
            Value::U8(n) => Json::from(*n),
            Value::U16(n) => Json::from(*n),
            Value::U32(n) => Json::from(*n),
            Value::U64(n) => Json::from(*n),
            Value::F32(n) => serde_json::Number::from_f64(f64::from(*n))
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::F64(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Str(s) => Json::String(s.clone()),
            Value::Bytes(b) => Json::Array(b.iter().map(|byte| Json::from(*byte)).collect()),
            Value::Seq(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Value::Nil,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::I64(i)
                } else if let Some(u) = n.as_u64() {
                    Value::U64(u)
                } else {
                    Value::F64(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Json::String(s) => Value::Str(s),
            Json::Array(items) => Value::Seq(items.into_iter().map(Value::from).collect()),
            Json::Object(map) => Value::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect()),
        }
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_scalar! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => Str,
    Bytes => Bytes,
}

impl From<isize> for Value {
    fn from(v: isize) -> Self {
        Value::I64(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::U64(v as u64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Str(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(Bytes::from(v))
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(Bytes::copy_from_slice(v))
    }
}

impl From<uuid::Uuid> for Value {
    fn from(v: uuid::Uuid) -> Self {
        Value::Str(v.hyphenated().to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Nil)
    }
}

// `Vec<u8>` is raw bytes, so sequences are implemented per element type.
macro_rules! impl_from_vec {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<Vec<$ty>> for Value {
                fn from(v: Vec<$ty>) -> Self {
                    Value::Seq(v.into_iter().map(Value::from).collect())
                }
            }
        )*
    };
}

impl_from_vec!(bool, i8, i16, i32, i64, u16, u32, u64, f32, f64, String, &str, Bytes, uuid::Uuid, Value);

impl<V: Into<Value>> From<BTreeMap<String, V>> for Value {
    fn from(map: BTreeMap<String, V>) -> Self {
        Value::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<V: Into<Value>> From<HashMap<String, V>> for Value {
    fn from(map: HashMap<String, V>) -> Self {
        Value::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}
