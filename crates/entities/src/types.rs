//! Rows and values exchanged with the SQL collaborator.

use anyhow::bail;
use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use sea_query::{Value, Values};
use serde_json::{Number, Value as Json};

/// A nullable SQL scalar, as bound to a statement or read from a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    /// `BOOLEAN`
    Boolean(Option<bool>),
    /// 32-bit signed integer.
    Int32(Option<i32>),
    /// 64-bit signed integer.
    Int64(Option<i64>),
    /// 32-bit unsigned integer.
    Uint32(Option<u32>),
    /// 64-bit unsigned integer.
    Uint64(Option<u64>),
    /// Single precision float.
    Float(Option<f32>),
    /// Double precision float.
    Double(Option<f64>),
    /// Text.
    Str(Option<String>),
    /// Binary blob.
    Binary(Option<Vec<u8>>),
    /// Date formatted as `YYYY-MM-DD`.
    Date(Option<String>),
    /// Time formatted as `HH:MM:SS[.f]`.
    Time(Option<String>),
    /// Timestamp text, RFC 3339 or `YYYY-MM-DD HH:MM:SS[.f]`.
    Timestamp(Option<String>),
}

impl DataType {
    /// The SQL `NULL` value.
    pub const NULL: Self = Self::Str(None);

    /// Returns `true` when the value is SQL `NULL`, whatever its type.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(
            self,
            Self::Boolean(None)
                | Self::Int32(None)
                | Self::Int64(None)
                | Self::Uint32(None)
                | Self::Uint64(None)
                | Self::Float(None)
                | Self::Double(None)
                | Self::Str(None)
                | Self::Binary(None)
                | Self::Date(None)
                | Self::Time(None)
                | Self::Timestamp(None)
        )
    }

    /// Returns the textual content of string-like values.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Str(Some(v)) | Self::Date(Some(v)) | Self::Time(Some(v)) | Self::Timestamp(Some(v)) => {
                Some(v)
            }
            _ => None,
        }
    }

    /// Converts the value to its JSON representation. Binary values are
    /// base64 encoded and non-finite floats become `null`.
    #[must_use]
    pub fn to_json(&self) -> Json {
        match self {
            Self::Boolean(Some(v)) => Json::Bool(*v),
            Self::Int32(Some(v)) => Json::Number((*v).into()),
            Self::Int64(Some(v)) => Json::Number((*v).into()),
            Self::Uint32(Some(v)) => Json::Number((*v).into()),
            Self::Uint64(Some(v)) => Json::Number((*v).into()),
            Self::Float(Some(v)) => Number::from_f64(f64::from(*v)).map_or(Json::Null, Json::Number),
            Self::Double(Some(v)) => Number::from_f64(*v).map_or(Json::Null, Json::Number),
            Self::Str(Some(v)) | Self::Date(Some(v)) | Self::Time(Some(v)) | Self::Timestamp(Some(v)) => {
                Json::String(v.clone())
            }
            Self::Binary(Some(v)) => Json::String(Base64::encode_string(v)),
            _ => Json::Null,
        }
    }
}

impl From<bool> for DataType {
    fn from(value: bool) -> Self {
        Self::Boolean(Some(value))
    }
}

impl From<i32> for DataType {
    fn from(value: i32) -> Self {
        Self::Int32(Some(value))
    }
}

impl From<i64> for DataType {
    fn from(value: i64) -> Self {
        Self::Int64(Some(value))
    }
}

impl From<f64> for DataType {
    fn from(value: f64) -> Self {
        Self::Double(Some(value))
    }
}

impl From<&str> for DataType {
    fn from(value: &str) -> Self {
        Self::Str(Some(value.to_string()))
    }
}

impl From<String> for DataType {
    fn from(value: String) -> Self {
        Self::Str(Some(value))
    }
}

impl<T: Into<Self>> From<Option<T>> for DataType {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::NULL, Into::into)
    }
}

/// A named column value in a result row.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Output column name (the alias when one was selected).
    pub name: String,

    /// Column value.
    pub value: DataType,
}

/// A result row: an ordered set of named column values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    /// Column values in select order.
    pub fields: Vec<Field>,

    /// Position of the row in its result set.
    pub index: String,
}

impl Row {
    /// Returns the value of the named column, if the row has it.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DataType> {
        self.fields.iter().find(|field| field.name == name).map(|field| &field.value)
    }

    /// Returns the JSON value of the named column. Missing columns read as
    /// `null`.
    #[must_use]
    pub fn value(&self, name: &str) -> Json {
        self.get(name).map_or(Json::Null, DataType::to_json)
    }

    /// Converts the row to a flat JSON object keyed by column name.
    #[must_use]
    pub fn to_json(&self) -> Json {
        Json::Object(
            self.fields.iter().map(|field| (field.name.clone(), field.value.to_json())).collect(),
        )
    }
}

impl<K: Into<String>, V: Into<DataType>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let fields = iter
            .into_iter()
            .map(|(name, value)| Field {
                name: name.into(),
                value: value.into(),
            })
            .collect();
        Self {
            fields,
            index: String::new(),
        }
    }
}

/// Converts a scalar JSON value to a `SeaQuery` value. Returns `None` for
/// arrays and objects.
pub(crate) fn json_to_value(json: &Json) -> Option<Value> {
    let value = match json {
        Json::Null => Value::String(None),
        Json::Bool(v) => Value::Bool(Some(*v)),
        Json::Number(n) => {
            if let Some(v) = n.as_i64() {
                Value::BigInt(Some(v))
            } else if let Some(v) = n.as_u64() {
                Value::BigUnsigned(Some(v))
            } else {
                Value::Double(n.as_f64())
            }
        }
        Json::String(v) => Value::String(Some(Box::new(v.clone()))),
        Json::Array(_) | Json::Object(_) => return None,
    };
    Some(value)
}

/// Converts the parameters collected by a statement builder into
/// [`DataType`]s.
pub(crate) fn values_to_datatypes(values: Values) -> anyhow::Result<Vec<DataType>> {
    values.into_iter().map(value_to_datatype).collect()
}

fn value_to_datatype(value: Value) -> anyhow::Result<DataType> {
    let data_type = match value {
        Value::Bool(v) => DataType::Boolean(v),
        Value::TinyInt(v) => DataType::Int32(v.map(i32::from)),
        Value::SmallInt(v) => DataType::Int32(v.map(i32::from)),
        Value::Int(v) => DataType::Int32(v),
        Value::BigInt(v) => DataType::Int64(v),
        Value::TinyUnsigned(v) => DataType::Uint32(v.map(u32::from)),
        Value::SmallUnsigned(v) => DataType::Uint32(v.map(u32::from)),
        Value::Unsigned(v) => DataType::Uint32(v),
        Value::BigUnsigned(v) => DataType::Uint64(v),
        Value::Float(v) => DataType::Float(v),
        Value::Double(v) => DataType::Double(v),
        Value::String(v) => DataType::Str(v.map(|value| *value)),
        Value::Char(v) => DataType::Str(v.map(|ch| ch.to_string())),
        Value::Bytes(v) => DataType::Binary(v.map(|bytes| *bytes)),
        Value::ChronoDate(v) => DataType::Date(v.map(|value| value.to_string())),
        Value::ChronoTime(v) => DataType::Time(v.map(|value| value.to_string())),
        Value::ChronoDateTime(v) => DataType::Timestamp(v.map(|value| value.to_string())),
        Value::ChronoDateTimeUtc(v) => DataType::Timestamp(v.map(|value| {
            let dt: DateTime<Utc> = *value;
            dt.to_rfc3339()
        })),
        _ => bail!("unsupported value type in statement parameters"),
    };
    Ok(data_type)
}
