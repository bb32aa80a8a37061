//! Dynamically-typed configuration values and permissive coercions.
//!
//! Loaders produce [`Value`]s; typed getters and the value binder convert
//! them to concrete Rust types. Conversions are permissive: a `"8080"`
//! string coerces to an integer, a `1` integer coerces to `true`, and so on.
//! A conversion that cannot be performed yields `None` rather than an error.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// A dynamically-typed configuration value.
///
/// `Value` is the currency of the whole crate: loaders fill a
/// [`LoadResult`](crate::loader::LoadResult) with them, snapshots map keys to
/// them, and the binder projects them onto struct fields.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Boolean value.
    Bool(bool),
    /// Signed integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// UTF-8 string value.
    String(String),
    /// Time span value.
    Duration(Duration),
    /// Point-in-time value.
    Time(DateTime<Utc>),
    /// Ordered list of values.
    Array(Vec<Value>),
    /// String-keyed mapping of values.
    Map(HashMap<String, Value>),
}

impl Value {
    /// Coerces the value to a string.
    ///
    /// Scalars render their natural textual form; arrays and maps do not
    /// coerce.
    pub fn as_string(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Duration(d) => Some(format!("{d:?}")),
            Value::Time(t) => Some(t.to_rfc3339()),
            Value::Array(_) | Value::Map(_) => None,
        }
    }

    /// Coerces the value to a boolean.
    ///
    /// Accepts the usual textual spellings (`true`, `yes`, `on`, `1`, ...)
    /// case-insensitively; numbers are truthy when non-zero.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::Float(f) => Some(*f != 0.0),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "1" | "t" | "true" | "y" | "yes" | "on" => Some(true),
                "0" | "f" | "false" | "n" | "no" | "off" | "" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Coerces the value to a signed integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Float(f) => Some(*f as i64),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .ok()
                .or_else(|| s.trim().parse::<f64>().ok().map(|f| f as i64)),
            _ => None,
        }
    }

    /// Coerces the value to a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Coerces the value to a duration.
    ///
    /// Integers and floats are whole seconds; strings accept an optional
    /// `ns`/`us`/`ms`/`s`/`m`/`h` suffix (`"500ms"`, `"1.5h"`). A bare
    /// numeric string is seconds.
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Value::Duration(d) => Some(*d),
            Value::Int(i) => u64::try_from(*i).ok().map(Duration::from_secs),
            Value::Float(f) => Duration::try_from_secs_f64(*f).ok(),
            Value::String(s) => parse_duration(s),
            _ => None,
        }
    }

    /// Coerces the value to a point in time.
    ///
    /// Strings are parsed as RFC 3339; integers are Unix seconds.
    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Time(t) => Some(*t),
            Value::Int(i) => Utc.timestamp_opt(*i, 0).single(),
            Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            _ => None,
        }
    }

    /// Coerces the value to a list of strings.
    ///
    /// Arrays coerce element-wise; a plain string is split on whitespace.
    pub fn as_string_slice(&self) -> Option<Vec<String>> {
        match self {
            Value::Array(items) => items.iter().map(Value::as_string).collect(),
            Value::String(s) => Some(s.split_whitespace().map(str::to_string).collect()),
            _ => None,
        }
    }

    /// Coerces the value to a list of integers. Every element must coerce.
    pub fn as_int_slice(&self) -> Option<Vec<i64>> {
        match self {
            Value::Array(items) => items.iter().map(Value::as_i64).collect(),
            _ => None,
        }
    }

    /// Returns the map form of the value.
    pub fn as_string_map(&self) -> Option<HashMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m.clone()),
            _ => None,
        }
    }

    /// Coerces the value to a string-to-string map. Every entry value must
    /// coerce to a string.
    pub fn as_string_map_string(&self) -> Option<HashMap<String, String>> {
        match self {
            Value::Map(m) => m
                .iter()
                .map(|(k, v)| v.as_string().map(|s| (k.clone(), s)))
                .collect(),
            _ => None,
        }
    }
}

/// Parses a duration string with an optional unit suffix.
///
/// Supported suffixes: `ns`, `us`, `ms`, `s`, `m`, `h`. Bare numbers are
/// seconds. Fractional amounts are accepted (`"1.5h"`).
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let (amount, scale_nanos) = if let Some(n) = s.strip_suffix("ns") {
        (n, 1.0)
    } else if let Some(n) = s.strip_suffix("us") {
        (n, 1e3)
    } else if let Some(n) = s.strip_suffix("ms") {
        (n, 1e6)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3600.0 * 1e9)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60.0 * 1e9)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1e9)
    } else {
        (s, 1e9)
    };

    let amount: f64 = amount.trim().parse().ok()?;
    if amount < 0.0 || !amount.is_finite() {
        return None;
    }
    Some(Duration::from_nanos((amount * scale_nanos) as u64))
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Duration> for Value {
    fn from(v: Duration) -> Self {
        Value::Duration(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Time(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::Array(v.into_iter().map(Value::String).collect())
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(v: HashMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

/// Conversion from a [`Value`] into a concrete field type.
///
/// Implemented for every scalar the binder supports. The conversion follows
/// the same permissive rules as the `as_*` methods on `Value`.
pub trait FromValue: Sized {
    /// Attempts the conversion, returning `None` when the value cannot
    /// represent `Self`.
    fn from_value(v: &Value) -> Option<Self>;
}

impl FromValue for Value {
    fn from_value(v: &Value) -> Option<Self> {
        Some(v.clone())
    }
}

impl FromValue for String {
    fn from_value(v: &Value) -> Option<Self> {
        v.as_string()
    }
}

impl FromValue for bool {
    fn from_value(v: &Value) -> Option<Self> {
        v.as_bool()
    }
}

impl FromValue for f64 {
    fn from_value(v: &Value) -> Option<Self> {
        v.as_f64()
    }
}

impl FromValue for f32 {
    fn from_value(v: &Value) -> Option<Self> {
        v.as_f64().map(|f| f as f32)
    }
}

impl FromValue for Duration {
    fn from_value(v: &Value) -> Option<Self> {
        v.as_duration()
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(v: &Value) -> Option<Self> {
        v.as_time()
    }
}

impl FromValue for Vec<String> {
    fn from_value(v: &Value) -> Option<Self> {
        v.as_string_slice()
    }
}

impl FromValue for Vec<i64> {
    fn from_value(v: &Value) -> Option<Self> {
        v.as_int_slice()
    }
}

impl FromValue for HashMap<String, String> {
    fn from_value(v: &Value) -> Option<Self> {
        v.as_string_map_string()
    }
}

impl FromValue for HashMap<String, Value> {
    fn from_value(v: &Value) -> Option<Self> {
        v.as_string_map()
    }
}

macro_rules! from_value_int {
    ($($t:ty),*) => {
        $(
            impl FromValue for $t {
                fn from_value(v: &Value) -> Option<Self> {
                    v.as_i64().and_then(|i| <$t>::try_from(i).ok())
                }
            }
        )*
    };
}

from_value_int!(i64, i32, i16, u64, u32, u16, u8, usize);

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Duration(d) => serializer.serialize_str(&format!("{d:?}")),
            Value::Time(t) => serializer.serialize_str(&t.to_rfc3339()),
            Value::Array(items) => items.serialize(serializer),
            Value::Map(m) => m.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a configuration value")
            }

            fn visit_bool<E: serde::de::Error>(self, v: bool) -> std::result::Result<Value, E> {
                Ok(Value::Bool(v))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> std::result::Result<Value, E> {
                Ok(Value::Int(v))
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> std::result::Result<Value, E> {
                Ok(Value::Int(i64::try_from(v).unwrap_or(i64::MAX)))
            }

            fn visit_f64<E: serde::de::Error>(self, v: f64) -> std::result::Result<Value, E> {
                Ok(Value::Float(v))
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> std::result::Result<Value, E> {
                Ok(Value::String(v.to_string()))
            }

            fn visit_string<E: serde::de::Error>(self, v: String) -> std::result::Result<Value, E> {
                Ok(Value::String(v))
            }

            fn visit_seq<A: SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> std::result::Result<Value, A::Error> {
                let mut items = Vec::new();
                while let Some(item) = seq.next_element()? {
                    items.push(item);
                }
                Ok(Value::Array(items))
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Value, A::Error> {
                let mut m = HashMap::new();
                while let Some((k, v)) = map.next_entry::<String, Value>()? {
                    m.insert(k, v);
                }
                Ok(Value::Map(m))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}
