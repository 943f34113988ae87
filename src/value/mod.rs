//! Serializable values returned from query execution.

mod macros;
mod object;
mod scalar;

use std::fmt;

use serde::Serialize;

pub use self::{object::Object, scalar::ScalarValue};

/// Serializable value returned from query and field execution.
///
/// Used by the execution engine to build up the response structure. Similar
/// to the `Json` type found in serialization crates, but lists and objects
/// do not contain any location information since they are generated by
/// resolving fields rather than by parsing a source query.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Absent or `null` value.
    Null,
    /// Scalar leaf value.
    Scalar(ScalarValue),
    /// List of values.
    List(Vec<Value>),
    /// Object value.
    Object(Object),
}

impl Value {
    // CONSTRUCTORS

    /// Construct a null value.
    pub fn null() -> Value {
        Value::Null
    }

    /// Construct a list value.
    pub fn list(l: Vec<Value>) -> Value {
        Value::List(l)
    }

    /// Construct an object value.
    pub fn object(o: Object) -> Value {
        Value::Object(o)
    }

    /// Construct a scalar value.
    pub fn scalar<T: Into<ScalarValue>>(s: T) -> Value {
        Value::Scalar(s.into())
    }

    // DISCRIMINATORS

    /// Does this value represent null?
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// View the underlying scalar value, if present.
    pub fn as_scalar(&self) -> Option<&ScalarValue> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// View the underlying string value, if present.
    pub fn as_string_value(&self) -> Option<&str> {
        self.as_scalar().and_then(ScalarValue::as_str)
    }

    /// View the underlying object value, if present.
    pub fn as_object_value(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Mutable view into the underlying object value, if present.
    pub fn as_mut_object_value(&mut self) -> Option<&mut Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// View the underlying list value, if present.
    pub fn as_list_value(&self) -> Option<&Vec<Value>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }
}

/// Merges `value` into `result` under `response_key`.
///
/// Merged objects merge recursively, merged lists merge element-wise; a
/// fresh key appends a field. Anything else keeps the existing entry.
pub(crate) fn merge_key_into(result: &mut Object, response_key: &str, value: Value) {
    if let Some(e) = result.get_mut_field_value(response_key) {
        match e {
            Value::Object(dest_obj) => {
                if let Value::Object(src_obj) = value {
                    merge_maps(dest_obj, src_obj);
                }
            }
            Value::List(dest_list) => {
                if let Value::List(src_list) = value {
                    dest_list.iter_mut().zip(src_list).for_each(|(d, s)| {
                        if let (Value::Object(d_obj), Value::Object(s_obj)) = (d, s) {
                            merge_maps(d_obj, s_obj);
                        }
                    });
                }
            }
            _ => {}
        }
        return;
    }
    result.add_field(response_key, value);
}

/// Merges `src` object's fields into `dest`.
fn merge_maps(dest: &mut Object, src: Object) {
    for (key, value) in src {
        if dest.contains_field(&key) {
            merge_key_into(dest, &key, value);
        } else {
            dest.add_field(key, value);
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Scalar(s) => write!(f, "{s}"),
            Value::List(list) => {
                write!(f, "[")?;
                for (idx, item) in list.iter().enumerate() {
                    write!(f, "{item}")?;
                    if idx < list.len() - 1 {
                        write!(f, ", ")?;
                    }
                }
                write!(f, "]")
            }
            Value::Object(obj) => {
                write!(f, "{{")?;
                for (idx, (key, value)) in obj.iter().enumerate() {
                    write!(f, "\"{key}\": {value}")?;
                    if idx < obj.field_count() - 1 {
                        write!(f, ", ")?;
                    }
                }
                write!(f, "}}")
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Scalar(s) => s.serialize(serializer),
            Value::List(l) => l.serialize(serializer),
            Value::Object(o) => o.serialize(serializer),
        }
    }
}

impl<T> From<Option<T>> for Value
where
    Value: From<T>,
{
    fn from(v: Option<T>) -> Value {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl From<ScalarValue> for Value {
    fn from(s: ScalarValue) -> Value {
        Value::Scalar(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::scalar(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::scalar(s)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Value {
        Value::scalar(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Value {
        Value::scalar(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::scalar(b)
    }
}

#[cfg(test)]
mod tests {
    use crate::engine_value;

    use super::Value;

    #[test]
    fn display_null() {
        let s: Value = engine_value!(null);
        assert_eq!("null", format!("{s}"));
    }

    #[test]
    fn display_int() {
        let s: Value = engine_value!(123);
        assert_eq!("123", format!("{s}"));
    }

    #[test]
    fn display_string() {
        let s: Value = engine_value!("foo");
        assert_eq!("\"foo\"", format!("{s}"));
    }

    #[test]
    fn display_bool() {
        let s: Value = engine_value!(false);
        assert_eq!("false", format!("{s}"));
    }

    #[test]
    fn display_list() {
        let s: Value = engine_value!([1, null, "foo"]);
        assert_eq!("[1, null, \"foo\"]", format!("{s}"));
    }

    #[test]
    fn display_object() {
        let s: Value = engine_value!({
            "int": 1,
            "null": null,
            "string": "foo",
        });
        assert_eq!(
            r#"{"int": 1, "null": null, "string": "foo"}"#,
            format!("{s}"),
        );
    }

    #[test]
    fn serialize_to_json() {
        let s: Value = engine_value!({
            "list": [1, null],
            "nested": {"b": true},
        });
        assert_eq!(
            serde_json::to_string(&s).unwrap(),
            r#"{"list":[1,null],"nested":{"b":true}}"#,
        );
    }

    #[test]
    fn merge_key_into_merges_objects() {
        let mut obj = match engine_value!({"a": {"x": 1}}) {
            Value::Object(o) => o,
            _ => unreachable!(),
        };
        let addition = engine_value!({"y": 2});
        super::merge_key_into(&mut obj, "a", addition);
        assert_eq!(Value::Object(obj), engine_value!({"a": {"x": 1, "y": 2}}));
    }
}
