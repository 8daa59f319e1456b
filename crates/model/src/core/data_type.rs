use crate::core::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fmt};

/// Column types understood by the loader and the destinations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Text,
    BigInt,
    Double,
    Boolean,
    Date,
    Timestamp,
    Json,
    /// A destination type this crate has no dedicated variant for.
    Custom(String),
}

impl DataType {
    /// Infers a column type from the first non-null value seen for it.
    pub fn infer(value: &Value) -> Option<DataType> {
        match value {
            Value::Null => None,
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Int(_) => Some(DataType::BigInt),
            Value::Float(_) => Some(DataType::Double),
            Value::String(_) => Some(DataType::Text),
        }
    }

    pub fn postgres_name(&self) -> Cow<'_, str> {
        match self {
            DataType::Text => Cow::Borrowed("TEXT"),
            DataType::BigInt => Cow::Borrowed("BIGINT"),
            DataType::Double => Cow::Borrowed("DOUBLE PRECISION"),
            DataType::Boolean => Cow::Borrowed("BOOLEAN"),
            DataType::Date => Cow::Borrowed("DATE"),
            DataType::Timestamp => Cow::Borrowed("TIMESTAMPTZ"),
            DataType::Json => Cow::Borrowed("JSONB"),
            DataType::Custom(name) => Cow::Borrowed(name),
        }
    }

    /// Maps a type name as reported by Postgres' `format_type`.
    pub fn from_postgres(type_name: &str) -> DataType {
        match type_name.trim().to_lowercase().as_str() {
            "text" | "character varying" | "varchar" => DataType::Text,
            "bigint" | "int8" => DataType::BigInt,
            "double precision" | "float8" => DataType::Double,
            "boolean" | "bool" => DataType::Boolean,
            "date" => DataType::Date,
            "timestamp with time zone" | "timestamptz" => DataType::Timestamp,
            "jsonb" | "json" => DataType::Json,
            _ => DataType::Custom(type_name.to_string()),
        }
    }

    /// Whether an existing column of this type can hold values inferred as
    /// `incoming` without being altered.
    pub fn accepts(&self, incoming: &DataType) -> bool {
        match (self, incoming) {
            (a, b) if a == b => true,
            (DataType::Text | DataType::Json | DataType::Custom(_), _) => true,
            (DataType::Double, DataType::BigInt) => true,
            (DataType::Timestamp, DataType::Date) => true,
            _ => false,
        }
    }

    /// Coerces a value to this type.
    ///
    /// Returns `None` when the value cannot represent this type; callers decide
    /// whether that becomes a NULL or an error.
    pub fn coerce(&self, value: Value) -> Option<Value> {
        if value.is_null() {
            return Some(Value::Null);
        }

        match self {
            DataType::Text | DataType::Json | DataType::Custom(_) => match value {
                Value::String(_) => Some(value),
                other => other.to_text().map(Value::String),
            },
            DataType::BigInt => value.as_i64().map(Value::Int),
            DataType::Double => value.as_f64().map(Value::Float),
            DataType::Boolean => value.as_bool().map(Value::Boolean),
            DataType::Date => coerce_date(&value),
            DataType::Timestamp => coerce_timestamp(&value),
        }
    }
}

fn coerce_date(value: &Value) -> Option<Value> {
    let text = value.as_str()?.trim();
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|ts| ts.date_naive()))?;
    Some(Value::String(date.format("%Y-%m-%d").to_string()))
}

fn coerce_timestamp(value: &Value) -> Option<Value> {
    let ts = match value {
        Value::Int(secs) => DateTime::<Utc>::from_timestamp(*secs, 0)?,
        Value::String(text) => {
            let text = text.trim();
            DateTime::parse_from_rfc3339(text)
                .map(|ts| ts.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
                        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
                        .ok()
                        .map(|naive| naive.and_utc())
                })?
        }
        _ => return None,
    };
    Some(Value::String(ts.to_rfc3339_opts(SecondsFormat::Micros, true)))
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.postgres_name())
    }
}
