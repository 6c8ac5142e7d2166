use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{TypeError, TypeResult};

/// A single column value.
///
/// Values are totally ordered and hashable so they can take part in record
/// keys. Floating point numbers are deliberately absent: scalar codecs encode
/// them before they reach the persistence layer.
///
/// Deserialization is untagged, which keeps mapping documents readable
/// (`value = "BOOK"`, `value = 3`). Text-like inputs always decode as
/// [`Value::Text`].
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Text(_) => "text",
            Self::Uuid(_) => "uuid",
            Self::Timestamp(_) => "timestamp",
            Self::Bytes(_) => "bytes",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Uuid(v) => write!(f, "{v}"),
            Self::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            Self::Bytes(v) => write!(f, "0x{}", hex::encode(v)),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// The value of one mapped property.
///
/// A property spans one or more columns. Single-column properties carry a
/// [`Value`]; multi-column ones (composite identifiers, composite foreign
/// keys) carry one value per column in column order. Hydration may also
/// produce the two markers [`FieldValue::Unfetched`] (lazy, not loaded) and
/// [`FieldValue::Unknown`] (not selectable from this table).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldValue {
    Single(Value),
    Composite(Vec<Value>),
    Unfetched,
    Unknown,
}

impl FieldValue {
    pub const fn null() -> Self {
        Self::Single(Value::Null)
    }

    /// Returns `true` if this is a loaded value whose every column is null.
    pub fn is_null(&self) -> bool {
        match self {
            Self::Single(v) => v.is_null(),
            Self::Composite(vs) => vs.iter().all(Value::is_null),
            Self::Unfetched | Self::Unknown => false,
        }
    }

    /// Returns `false` for the hydration markers.
    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Unfetched | Self::Unknown)
    }

    /// Split this value into exactly `arity` column values.
    ///
    /// A null single value spreads to `arity` nulls.
    pub fn to_columns(&self, arity: usize) -> TypeResult<Vec<Value>> {
        match self {
            Self::Single(Value::Null) => Ok(vec![Value::Null; arity]),
            Self::Single(v) if arity == 1 => Ok(vec![v.clone()]),
            Self::Single(_) => Err(TypeError::ArityMismatch {
                expected: arity,
                actual: 1,
            }),
            Self::Composite(vs) if vs.len() == arity => Ok(vs.clone()),
            Self::Composite(vs) => Err(TypeError::ArityMismatch {
                expected: arity,
                actual: vs.len(),
            }),
            Self::Unfetched => Err(TypeError::Unavailable("unfetched".into())),
            Self::Unknown => Err(TypeError::Unavailable("unknown".into())),
        }
    }

    /// Reassemble a property value from its column values.
    ///
    /// All-null columns collapse to a single null: an all-null foreign key
    /// means "no association".
    pub fn from_columns(mut values: Vec<Value>) -> Self {
        if values.iter().all(Value::is_null) {
            return Self::null();
        }
        if values.len() == 1 {
            return Self::Single(values.remove(0));
        }
        Self::Composite(values)
    }
}

impl Default for FieldValue {
    fn default() -> Self {
        Self::null()
    }
}

impl From<Value> for FieldValue {
    fn from(v: Value) -> Self {
        Self::Single(v)
    }
}

macro_rules! field_value_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(v: $ty) -> Self {
                    Self::Single(Value::from(v))
                }
            }
        )*
    };
}

field_value_from!(bool, i64, i32, &str, String, Uuid, DateTime<Utc>);

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(v) => write!(f, "{v}"),
            Self::Composite(vs) => {
                let parts: Vec<String> = vs.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(", "))
            }
            Self::Unfetched => write!(f, "<unfetched>"),
            Self::Unknown => write!(f, "<unknown>"),
        }
    }
}
