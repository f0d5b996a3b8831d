//! Runtime property values checked against declared property types.

use crate::error::{OntologyError, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use kindgraph_dsl::PropertyType;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum PropertyValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    #[serde(rename = "datetime")]
    DateTime(NaiveDateTime),
}

impl PropertyValue {
    /// The scalar type this value carries at runtime.
    pub fn property_type(&self) -> PropertyType {
        match self {
            PropertyValue::String(_) => PropertyType::String,
            PropertyValue::Integer(_) => PropertyType::Integer,
            PropertyValue::Float(_) => PropertyType::Float,
            PropertyValue::Boolean(_) => PropertyType::Boolean,
            PropertyValue::Date(_) => PropertyType::Date,
            PropertyValue::Time(_) => PropertyType::Time,
            PropertyValue::DateTime(_) => PropertyType::DateTime,
        }
    }

    /// Decode a JSON scalar.
    ///
    /// JSON has no temporal types, so strings are only read as dates/times
    /// when `hint` asks for one; otherwise they stay strings. Integral numbers
    /// decode as `Integer` unless `hint` is `float`, everything else numeric
    /// as `Float`.
    pub fn from_json(value: &serde_json::Value, hint: Option<PropertyType>) -> Result<Self> {
        use serde_json::Value;
        match value {
            Value::Bool(b) => Ok(PropertyValue::Boolean(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) if hint != Some(PropertyType::Float) => Ok(PropertyValue::Integer(i)),
                _ => n.as_f64().map(PropertyValue::Float).ok_or_else(|| {
                    OntologyError::InvalidArgument(format!("unrepresentable number {n}"))
                }),
            },
            Value::String(s) => match hint {
                Some(PropertyType::Date) => parse_temporal(s, PropertyType::Date),
                Some(PropertyType::Time) => parse_temporal(s, PropertyType::Time),
                Some(PropertyType::DateTime) => parse_temporal(s, PropertyType::DateTime),
                _ => Ok(PropertyValue::String(s.clone())),
            },
            other => Err(OntologyError::InvalidArgument(format!(
                "expected a JSON scalar, got {other}"
            ))),
        }
    }
}

fn parse_temporal(s: &str, ty: PropertyType) -> Result<PropertyValue> {
    let parsed = match ty {
        PropertyType::Date => NaiveDate::parse_from_str(s, "%Y-%m-%d").map(PropertyValue::Date),
        PropertyType::Time => NaiveTime::parse_from_str(s, "%H:%M:%S%.f").map(PropertyValue::Time),
        _ => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").map(PropertyValue::DateTime),
    };
    parsed.map_err(|err| OntologyError::InvalidArgument(format!("`{s}` is not a valid {ty}: {err}")))
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(s) => write!(f, "{s:?}"),
            PropertyValue::Integer(i) => write!(f, "{i}"),
            PropertyValue::Float(x) => write!(f, "{x}"),
            PropertyValue::Boolean(b) => write!(f, "{b}"),
            PropertyValue::Date(d) => write!(f, "{d}"),
            PropertyValue::Time(t) => write!(f, "{t}"),
            PropertyValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.f")),
        }
    }
}
