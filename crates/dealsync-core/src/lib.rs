//! Core record model shared by the deal adapters and the reconciliation pipeline.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

pub mod codec;

pub use codec::{decode_external_ref, encode_external_ref, IdentifierError};

pub const CRATE_NAME: &str = "dealsync-core";

/// Scalar value of a source field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        value.map(FieldValue::Text).unwrap_or_default()
    }
}

/// Deal snapshot from the CRM store. Field set is not known statically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl SourceRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Stringified field value; absent and null fields yield an empty string.
    pub fn field_text(&self, name: &str) -> String {
        self.fields
            .get(name)
            .map(ToString::to_string)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowKind {
    Row,
    Other(String),
}

/// Typed property value as stored on a destination row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyValue {
    Title(String),
    Url(Option<String>),
    RichText(String),
    Other { kind: String },
}

pub type RowProperties = BTreeMap<String, PropertyValue>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationRow {
    pub row_id: String,
    pub kind: RowKind,
    pub archived: bool,
    pub properties: RowProperties,
}

impl DestinationRow {
    pub fn new(row_id: impl Into<String>) -> Self {
        Self {
            row_id: row_id.into(),
            kind: RowKind::Row,
            archived: false,
            properties: RowProperties::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(name.into(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Title,
    Url,
    RichText,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// One column mutation inside a schema-update call.
///
/// `existing` on the ensure variants tells the store whether to echo the
/// column's own name back (keeping it in place) or to create it fresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaChange {
    EnsureTitle { name: String, existing: bool },
    EnsureUrl { name: String, existing: bool },
    AddText { name: String },
    Remove { name: String },
}

/// Source id -> destination row id for a single run. First insert wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierMap {
    entries: HashMap<String, String>,
}

impl IdentifierMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts unless the source id is already mapped; on collision returns the
    /// row id that keeps the mapping.
    pub fn insert_first(&mut self, source_id: String, row_id: String) -> Result<(), String> {
        match self.entries.get(&source_id) {
            Some(existing) => Err(existing.clone()),
            None => {
                self.entries.insert(source_id, row_id);
                Ok(())
            }
        }
    }

    pub fn get(&self, source_id: &str) -> Option<&str> {
        self.entries.get(source_id).map(String::as_str)
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.entries.contains_key(source_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Collecting follows `insert_first`: a repeated source id keeps its first row.
impl FromIterator<(String, String)> for IdentifierMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut map = IdentifierMap::new();
        for (source_id, row_id) in iter {
            // Later duplicates are shadowed.
            let _ = map.insert_first(source_id, row_id);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_values_stringify_for_projection() {
        let record = SourceRecord::new("7")
            .with_field("amount", FieldValue::Number(1250.5))
            .with_field("closed", FieldValue::Bool(true))
            .with_field("stage", "won")
            .with_field("owner", FieldValue::Null);

        assert_eq!(record.field_text("amount"), "1250.5");
        assert_eq!(record.field_text("closed"), "true");
        assert_eq!(record.field_text("stage"), "won");
        assert_eq!(record.field_text("owner"), "");
        assert_eq!(record.field_text("missing"), "");
    }

    #[test]
    fn field_values_deserialize_untagged() {
        let record: SourceRecord = serde_json::from_str(
            r#"{"id":"1","fields":{"dealname":"Alpha","amount":10,"hot":false,"owner":null}}"#,
        )
        .unwrap();
        assert_eq!(record.fields["dealname"], FieldValue::Text("Alpha".into()));
        assert_eq!(record.fields["amount"], FieldValue::Number(10.0));
        assert_eq!(record.fields["hot"], FieldValue::Bool(false));
        assert!(record.fields["owner"].is_null());
    }

    #[test]
    fn identifier_map_keeps_first_mapping() {
        let mut map = IdentifierMap::new();
        assert!(map.insert_first("9".into(), "r1".into()).is_ok());
        assert_eq!(map.insert_first("9".into(), "r2".into()), Err("r1".to_string()));
        assert_eq!(map.get("9"), Some("r1"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn collecting_keeps_first_row_per_source_id() {
        let map: IdentifierMap = [("9", "r1"), ("3", "r2"), ("9", "r3")]
            .into_iter()
            .map(|(s, r)| (s.to_string(), r.to_string()))
            .collect();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("9"), Some("r1"));
        assert_eq!(map.get("3"), Some("r2"));
    }
}
