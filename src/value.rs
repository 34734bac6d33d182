//! Loose JSON rows and the coercions applied to them.
//!
//! Rows arrive from the API as flat JSON objects whose fields may be numbers,
//! numeric strings, null or absent. Every read goes through [`to_number`] or
//! [`to_text`] so malformed fields degrade to a neutral value instead of an
//! error.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Coerce a JSON value to a finite number.
///
/// Missing, null, non-numeric and non-finite values all become `0.0`, which
/// keeps every ordering built on top of it total.
pub fn to_number(value: Option<&Value>) -> f64 {
    let number = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => parse_number(s),
        Some(Value::Bool(true)) => 1.0,
        _ => 0.0,
    };

    if number.is_finite() {
        number
    } else {
        0.0
    }
}

fn parse_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    trimmed.parse::<f64>().unwrap_or(0.0)
}

/// Coerce a JSON value to text. Missing and null become the empty string.
pub fn to_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// One flat row of an API list (an asset, a position, a fixed-income item, an
/// income event).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Build a record from any JSON value; anything but an object yields an
    /// empty record.
    pub fn from_value(value: Value) -> Record {
        match value {
            Value::Object(map) => Record(map),
            _ => Record::default(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// True when the field exists and is not null.
    pub fn has(&self, field: &str) -> bool {
        matches!(self.0.get(field), Some(v) if !v.is_null())
    }

    pub fn number(&self, field: &str) -> f64 {
        to_number(self.get(field))
    }

    pub fn text(&self, field: &str) -> String {
        to_text(self.get(field))
    }

    /// Fill `field` with `value` unless the row already carries a non-null one.
    pub fn set_if_missing(&mut self, field: &str, value: Value) {
        if !self.has(field) {
            self.0.insert(field.to_string(), value);
        }
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Record(map)
    }
}
