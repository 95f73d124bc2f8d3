// src/record.rs

use serde::{ser::SerializeMap, Serialize, Serializer};
use std::{borrow::Cow, collections::HashMap, fmt};

/// A single cell. `Null` is the explicit "missing" marker used across every stage.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Text form used for joining. Null keys never match anything.
    pub fn as_key(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(Cow::Borrowed(s.as_str())),
            other => Some(Cow::Owned(other.to_string())),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "None"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// Anything that can live in a [`RecordStore`].
pub trait Named {
    fn name(&self) -> &str;
}

/// Insertion-ordered, name-indexed collection of records.
///
/// Inserting a name that is already present replaces the earlier record in
/// place (last write wins) and bumps the duplicate counter.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordStore<R> {
    records: Vec<R>,
    index: HashMap<String, usize>,
    duplicates: usize,
}

impl<R> Default for RecordStore<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            index: HashMap::new(),
            duplicates: 0,
        }
    }
}

impl<R: Named> RecordStore<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when an existing record was replaced.
    pub fn insert(&mut self, record: R) -> bool {
        match self.index.get(record.name()) {
            Some(&pos) => {
                self.records[pos] = record;
                self.duplicates += 1;
                true
            }
            None => {
                self.index
                    .insert(record.name().to_string(), self.records.len());
                self.records.push(record);
                false
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&R> {
        self.index.get(name).map(|&pos| &self.records[pos])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of inserts that overwrote an existing name.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.records.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.name())
    }
}

impl<R: Named> FromIterator<R> for RecordStore<R> {
    fn from_iter<I: IntoIterator<Item = R>>(iter: I) -> Self {
        let mut store = RecordStore::new();
        for r in iter {
            store.insert(r);
        }
        store
    }
}

/// One row of the inner join of the two annotation tracks.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRecord {
    pub name: String,
    /// Hoisted from the first table, `Null` if that table has no such column.
    pub openset: Value,
    /// Hoisted from the second table, `Null` if that table has no such column.
    pub reason: Value,
    /// Every other merged column, in merged-column order.
    pub fields: Vec<(String, Value)>,
}

impl MergedRecord {
    pub fn field(&self, column: &str) -> Option<&Value> {
        match column {
            "openset" => Some(&self.openset),
            "reason" => Some(&self.reason),
            _ => self
                .fields
                .iter()
                .find(|(name, _)| name == column)
                .map(|(_, v)| v),
        }
    }

    pub fn keys(&self) -> Vec<&str> {
        let mut keys = vec!["name", "openset", "reason"];
        keys.extend(self.fields.iter().map(|(k, _)| k.as_str()));
        keys
    }

    fn serialize_entries<M: SerializeMap>(&self, map: &mut M) -> Result<(), M::Error> {
        map.serialize_entry("name", &self.name)?;
        map.serialize_entry("openset", &self.openset)?;
        map.serialize_entry("reason", &self.reason)?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        Ok(())
    }
}

impl Named for MergedRecord {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Serialize for MergedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3 + self.fields.len()))?;
        self.serialize_entries(&mut map)?;
        map.end()
    }
}

/// Subtitle text for one sample, sentinels already normalized to `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubtitleEntry {
    pub name: String,
    pub chinese: Option<String>,
    pub english: Option<String>,
}

impl Named for SubtitleEntry {
    fn name(&self) -> &str {
        &self.name
    }
}

/// A merged record plus its subtitles. Both subtitle fields are always
/// present; `None` means the sample had no subtitle row.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRecord {
    pub record: MergedRecord,
    pub chinese_subtitle: Option<String>,
    pub english_subtitle: Option<String>,
}

impl EnrichedRecord {
    pub fn has_subtitle(&self) -> bool {
        self.chinese_subtitle.is_some() || self.english_subtitle.is_some()
    }

    pub fn keys(&self) -> Vec<&str> {
        let mut keys = self.record.keys();
        keys.push("chinese_subtitle");
        keys.push("english_subtitle");
        keys
    }
}

impl Named for EnrichedRecord {
    fn name(&self) -> &str {
        &self.record.name
    }
}

impl Serialize for EnrichedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(5 + self.record.fields.len()))?;
        self.record.serialize_entries(&mut map)?;
        map.serialize_entry("chinese_subtitle", &self.chinese_subtitle)?;
        map.serialize_entry("english_subtitle", &self.english_subtitle)?;
        map.end()
    }
}

pub type MergedStore = RecordStore<MergedRecord>;
pub type SubtitleIndex = RecordStore<SubtitleEntry>;
pub type EnrichedStore = RecordStore<EnrichedRecord>;

#[cfg(test)]
mod tests {
    use super::*;

    fn merged(name: &str, openset: &str) -> MergedRecord {
        MergedRecord {
            name: name.into(),
            openset: openset.into(),
            reason: Value::Null,
            fields: vec![("label_track2".into(), Value::Int(3))],
        }
    }

    #[test]
    fn store_keeps_insertion_order_and_last_write() {
        let mut store = MergedStore::new();
        assert!(!store.insert(merged("a", "happy")));
        assert!(!store.insert(merged("b", "sad")));
        assert!(store.insert(merged("a", "angry")));

        assert_eq!(store.len(), 2);
        assert_eq!(store.duplicates(), 1);
        assert_eq!(store.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(store.get("a").unwrap().openset, Value::from("angry"));
    }

    #[test]
    fn key_text_ignores_nulls() {
        assert_eq!(Value::Null.as_key(), None);
        assert_eq!(Value::Int(7).as_key().as_deref(), Some("7"));
        assert_eq!(Value::from("v1").as_key().as_deref(), Some("v1"));
    }

    #[test]
    fn enriched_record_serializes_flat_with_explicit_nulls() -> anyhow::Result<()> {
        let rec = EnrichedRecord {
            record: merged("v1", "happy"),
            chinese_subtitle: None,
            english_subtitle: Some("hello".into()),
        };
        let json = serde_json::to_value(&rec)?;
        assert_eq!(json["name"], "v1");
        assert_eq!(json["openset"], "happy");
        assert!(json["reason"].is_null());
        assert_eq!(json["label_track2"], 3);
        assert!(json.get("chinese_subtitle").unwrap().is_null());
        assert_eq!(json["english_subtitle"], "hello");
        assert_eq!(
            rec.keys(),
            vec![
                "name",
                "openset",
                "reason",
                "label_track2",
                "chinese_subtitle",
                "english_subtitle"
            ]
        );
        Ok(())
    }
}
