use std::fmt;

use serde::Serialize;

/// Concrete leaf value appearing in responses and inputs.
///
/// The engine resolves every GraphQL scalar down to one of these four
/// primitive representations. Enum values are carried as their names in the
/// `String` variant.
#[derive(Clone, Debug, PartialEq)]
pub enum ScalarValue {
    /// 32-bit signed integer, as the GraphQL `Int` type requires.
    Int(i32),
    /// IEEE 754 double.
    Float(f64),
    /// UTF-8 string, also carrying `ID` and enum values.
    String(String),
    /// Boolean.
    Boolean(bool),
}

impl ScalarValue {
    /// View as an integer, if this is one.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            ScalarValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// View as a float. Integers widen losslessly.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ScalarValue::Int(i) => Some(f64::from(*i)),
            ScalarValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// View as a string slice, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// View as a boolean, if this is one.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            ScalarValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Int(i) => write!(f, "{i}"),
            ScalarValue::Float(n) => write!(f, "{n}"),
            ScalarValue::String(s) => write!(f, "\"{s}\""),
            ScalarValue::Boolean(b) => write!(f, "{b}"),
        }
    }
}

impl Serialize for ScalarValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ScalarValue::Int(i) => serializer.serialize_i32(*i),
            ScalarValue::Float(n) => serializer.serialize_f64(*n),
            ScalarValue::String(s) => serializer.serialize_str(s),
            ScalarValue::Boolean(b) => serializer.serialize_bool(*b),
        }
    }
}

impl From<i32> for ScalarValue {
    fn from(i: i32) -> Self {
        ScalarValue::Int(i)
    }
}

impl From<f64> for ScalarValue {
    fn from(f: f64) -> Self {
        ScalarValue::Float(f)
    }
}

impl From<bool> for ScalarValue {
    fn from(b: bool) -> Self {
        ScalarValue::Boolean(b)
    }
}

impl From<String> for ScalarValue {
    fn from(s: String) -> Self {
        ScalarValue::String(s)
    }
}

impl From<&str> for ScalarValue {
    fn from(s: &str) -> Self {
        ScalarValue::String(s.into())
    }
}

impl From<arcstr::ArcStr> for ScalarValue {
    fn from(s: arcstr::ArcStr) -> Self {
        ScalarValue::String(s.as_str().into())
    }
}
