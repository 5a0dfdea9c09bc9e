//! Record and FieldValue
//!
//! A Record is one row of domain data (customer, medicine, supplier, user) as
//! returned by the API. The table layer treats it as an opaque mapping from
//! field name to a scalar value; only display formatting looks at types.
//!
//! Values are converted to and from `serde_json::Value` so records can be
//! deserialized directly from API envelopes. Non-scalar JSON (objects,
//! arrays) is kept as its JSON text rather than rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;

/// Scalar value of a single record field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "JsonValue", into = "JsonValue")]
pub enum FieldValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view of the value. Numeric strings are parsed, since PHP
    /// backends frequently send decimals as strings ("12.50").
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            FieldValue::Text(v) => v.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        }
    }

    /// Lowercased text used for case-insensitive search and text sorting.
    /// Returns None for Null so that nulls never match a search.
    pub fn search_text(&self) -> Option<String> {
        if self.is_null() {
            None
        } else {
            Some(self.to_string().to_lowercase())
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(v) => f.write_str(v),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Null => Ok(()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<JsonValue> for FieldValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => FieldValue::Null,
            JsonValue::Bool(b) => FieldValue::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Int(i)
                } else if let Some(f) = n.as_f64() {
                    FieldValue::Float(f)
                } else {
                    FieldValue::Text(n.to_string())
                }
            }
            JsonValue::String(s) => FieldValue::Text(s),
            other => FieldValue::Text(other.to_string()),
        }
    }
}

impl From<FieldValue> for JsonValue {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Text(v) => JsonValue::String(v),
            FieldValue::Int(v) => JsonValue::Number(v.into()),
            FieldValue::Float(v) => serde_json::Number::from_f64(v)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            FieldValue::Bool(v) => JsonValue::Bool(v),
            FieldValue::Null => JsonValue::Null,
        }
    }
}

/// Identifier of a record, normalized to its string form so that `7` and
/// `"7"` from different endpoints identify the same row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "JsonValue", into = "String")]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        RecordId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Builds an id from a field value. Null and empty text have no identity.
    pub fn from_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Null => None,
            FieldValue::Text(s) if s.trim().is_empty() => None,
            FieldValue::Text(s) => Some(RecordId(s.trim().to_string())),
            other => Some(RecordId(other.to_string())),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<JsonValue> for RecordId {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::String(s) => RecordId(s),
            other => RecordId(other.to_string()),
        }
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

impl From<&str> for RecordId {
    fn from(v: &str) -> Self {
        RecordId(v.to_string())
    }
}

impl From<i64> for RecordId {
    fn from(v: i64) -> Self {
        RecordId(v.to_string())
    }
}

impl From<i32> for RecordId {
    fn from(v: i32) -> Self {
        RecordId(v.to_string())
    }
}

/// One row of domain data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: HashMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Record {
            fields: HashMap::new(),
        }
    }

    /// Builder-style insert, handy for fixtures and form submissions.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<FieldValue> {
        self.fields.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Returns the record's identifier read from `id_field`
    pub fn id(&self, id_field: &str) -> Option<RecordId> {
        self.fields.get(id_field).and_then(RecordId::from_value)
    }

    /// Overwrites fields of `self` with every field present in `other`
    pub fn merge(&mut self, other: &Record) {
        for (k, v) in &other.fields {
            self.fields.insert(k.clone(), v.clone());
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_json(&self) -> JsonValue {
        let map: serde_json::Map<String, JsonValue> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), JsonValue::from(v.clone())))
            .collect();
        JsonValue::Object(map)
    }
}

impl FromIterator<(String, FieldValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Record {
            fields: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_from_json() {
        let json = r#"{"id": 7, "name": "Paracetamol", "price": "12.50", "stock": 40,
                       "discount": 0.5, "active": true, "notes": null, "tags": ["otc"]}"#;
        let record: Record = serde_json::from_str(json).unwrap();

        assert_eq!(record.get("id"), Some(&FieldValue::Int(7)));
        assert_eq!(record.get("name").unwrap().as_str(), Some("Paracetamol"));
        assert_eq!(record.get("price").unwrap().as_f64(), Some(12.5));
        assert_eq!(record.get("discount"), Some(&FieldValue::Float(0.5)));
        assert_eq!(record.get("active").unwrap().as_bool(), Some(true));
        assert!(record.get("notes").unwrap().is_null());
        assert_eq!(record.get("tags").unwrap().as_str(), Some(r#"["otc"]"#));
    }

    #[test]
    fn test_record_id_normalization() {
        let numeric = Record::new().with("id", 7i64);
        let textual = Record::new().with("id", " 7 ");
        assert_eq!(numeric.id("id"), textual.id("id"));
        assert_eq!(numeric.id("id").unwrap().as_str(), "7");

        let missing = Record::new().with("id", FieldValue::Null);
        assert_eq!(missing.id("id"), None);
        assert_eq!(Record::new().id("id"), None);

        let parsed: RecordId = serde_json::from_str("42").unwrap();
        assert_eq!(parsed, RecordId::from(42));
    }

    #[test]
    fn test_search_text() {
        assert_eq!(FieldValue::text("Jane DOE").search_text().as_deref(), Some("jane doe"));
        assert_eq!(FieldValue::Int(15).search_text().as_deref(), Some("15"));
        assert_eq!(FieldValue::Null.search_text(), None);
    }

    #[test]
    fn test_record_merge_and_json() {
        let mut record = Record::new().with("id", 1i64).with("name", "Old");
        record.merge(&Record::new().with("name", "New").with("phone", "555"));

        assert_eq!(record.get("name").unwrap().as_str(), Some("New"));
        assert_eq!(record.get("phone").unwrap().as_str(), Some("555"));

        let json = record.to_json();
        assert_eq!(json["id"], serde_json::json!(1));
        assert_eq!(json["name"], serde_json::json!("New"));
    }

    #[test]
    fn test_nan_serializes_as_null() {
        let json = JsonValue::from(FieldValue::Float(f64::NAN));
        assert!(json.is_null());
    }
}
