//! Engine-agnostic parameter and cell values.
//!
//! Both engines bind parameters from and decode cells into [`Value`]. Booleans
//! are always [`Value::Bool`] in memory: the embedded engine stores them as
//! 0/1 and the adapter converts in both directions for columns declared
//! `BOOLEAN`.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::DbError;

/// A single parameter or column value.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
        }
    }
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
        Value::Int(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Build a parameter list from heterogeneous values.
///
/// ```rust,ignore
/// db.execute("UPDATE accounts SET name = ? WHERE id = ?", &params!["Ana", 7_i64]).await?;
/// ```
#[macro_export]
macro_rules! params {
    () => { ::std::vec::Vec::<$crate::Value>::new() };
    ($($v:expr),+ $(,)?) => { ::std::vec![$($crate::Value::from($v)),+] };
}

/// Conversion out of a [`Value`] for typed row access.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

/// Integers 0 and 1 are accepted as well: computed expressions lose the
/// declared `BOOLEAN` type on the embedded engine.
impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::Int(0) => Some(false),
            Value::Int(1) => Some(true),
            _ => None,
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bytes(b) => Some(b.clone()),
            _ => None,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// One result row: column names in select order, each mapped to a value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn with_capacity(len: usize) -> Self {
        Self {
            columns: Vec::with_capacity(len),
            values: Vec::with_capacity(len),
        }
    }

    pub(crate) fn push(&mut self, column: impl Into<String>, value: Value) {
        self.columns.push(column.into());
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Value of the first column named `column`.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    /// Typed access; fails when the column is missing or holds another type.
    pub fn try_get<T: FromValue>(&self, column: &str) -> Result<T, DbError> {
        let value = self
            .get(column)
            .ok_or_else(|| DbError::column(column, "no such column in row"))?;
        T::from_value(value).ok_or_else(|| {
            DbError::column(
                column,
                format!(
                    "cannot convert {} value to {}",
                    value.kind(),
                    std::any::type_name::<T>()
                ),
            )
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> Row {
        let mut row = Row::with_capacity(4);
        row.push("id", Value::Int(7));
        row.push("name", Value::Text("Ana".to_string()));
        row.push("consented", Value::Bool(true));
        row.push("error", Value::Null);
        row
    }

    #[test]
    fn test_typed_access() {
        let row = sample_row();
        assert_eq!(row.try_get::<i64>("id").unwrap(), 7);
        assert_eq!(row.try_get::<String>("name").unwrap(), "Ana");
        assert!(row.try_get::<bool>("consented").unwrap());
        assert_eq!(row.try_get::<Option<String>>("error").unwrap(), None);
    }

    #[test]
    fn test_missing_column_and_type_mismatch() {
        let row = sample_row();
        assert!(matches!(
            row.try_get::<i64>("nope"),
            Err(DbError::Column { .. })
        ));
        assert!(matches!(
            row.try_get::<i64>("name"),
            Err(DbError::Column { .. })
        ));
    }

    #[test]
    fn test_bool_accepts_integer_flags() {
        assert_eq!(bool::from_value(&Value::Int(1)), Some(true));
        assert_eq!(bool::from_value(&Value::Int(0)), Some(false));
        assert_eq!(bool::from_value(&Value::Int(2)), None);
    }

    #[test]
    fn test_row_serializes_as_ordered_object() {
        let json = serde_json::to_string(&sample_row()).unwrap();
        assert_eq!(
            json,
            r#"{"id":7,"name":"Ana","consented":true,"error":null}"#
        );
    }

    #[test]
    fn test_params_macro() {
        let params = params!["Ana", 3_i64, true, None::<String>];
        assert_eq!(
            params,
            vec![
                Value::Text("Ana".to_string()),
                Value::Int(3),
                Value::Bool(true),
                Value::Null
            ]
        );
        assert!(params![].is_empty());
    }
}
