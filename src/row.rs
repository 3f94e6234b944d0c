//! Row records passed between parsers, adapters and stringifiers.

use std::fmt;

use foldhash::fast::RandomState;
use indexmap::IndexMap;

/// An ordered mapping from column name to cell value.
///
/// Insertion order is kept, and a name appears at most once: inserting an
/// existing name replaces its value in place. Lookups by name are O(1).
#[derive(Debug, Clone, Default)]
pub struct Record {
    fields: IndexMap<String, String, RandomState>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty record with room for `capacity` fields.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: IndexMap::with_capacity_and_hasher(capacity, RandomState::default()),
        }
    }

    /// Pair `columns` with `values` positionally.
    ///
    /// Absent and empty values become `missing`; values beyond the last
    /// column are dropped.
    pub fn zip(columns: &[String], mut values: Vec<String>, missing: &str) -> Self {
        values.truncate(columns.len());
        let mut values = values.into_iter();
        let mut record = Self::with_capacity(columns.len());
        for column in columns {
            let value = match values.next() {
                Some(value) if !value.is_empty() => value,
                _ => missing.to_string(),
            };
            record.insert(column.clone(), value);
        }
        record
    }

    /// Returns the number of fields.
    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the record has no fields.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Look up a value by column name.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Set a field, replacing the value of an existing field with that name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Remove a field, returning its value. Later fields keep their order.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.fields.shift_remove(name)
    }

    /// Keep only the fields for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.fields.retain(|key, _| keep(key));
    }

    /// Iterate over column names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Iterate over `(name, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

/// Records are equal when they hold the same fields in the same order.
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len() && self.fields.iter().eq(other.fields.iter())
    }
}

impl Eq for Record {}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (key, value) in iter {
            record.insert(key, value);
        }
        record
    }
}

impl IntoIterator for Record {
    type Item = (String, String);
    type IntoIter = indexmap::map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

/// One row handed to a stringifier or produced by a row source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Row {
    /// Named cells, projected onto the column set when written.
    Record(Record),
    /// Positional cells, written as-is regardless of the column set.
    Values(Vec<String>),
    /// An already formatted line, written verbatim.
    Raw(String),
}

impl Row {
    /// Returns the record if this row is one.
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Row::Record(record) => Some(record),
            _ => None,
        }
    }
}

impl From<Record> for Row {
    fn from(record: Record) -> Self {
        Row::Record(record)
    }
}

impl From<Vec<String>> for Row {
    fn from(values: Vec<String>) -> Self {
        Row::Values(values)
    }
}

impl From<String> for Row {
    fn from(line: String) -> Self {
        Row::Raw(line)
    }
}

impl From<&str> for Row {
    fn from(line: &str) -> Self {
        Row::Raw(line.to_string())
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{key:?}: {value:?}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_zip_fills_missing() {
        let record = Record::zip(
            &columns(&["index", "name", "time"]),
            vec!["1".into(), "".into()],
            "NA",
        );
        assert_eq!(record.get("index"), Some("1"));
        assert_eq!(record.get("name"), Some("NA"));
        assert_eq!(record.get("time"), Some("NA"));
    }

    #[test]
    fn test_zip_drops_extra_cells() {
        let record = Record::zip(
            &columns(&["a"]),
            vec!["1".into(), "2".into(), "3".into()],
            "",
        );
        assert_eq!(record.len(), 1);
        assert_eq!(record.get("a"), Some("1"));
    }

    #[test]
    fn test_zip_duplicate_columns_keep_first_position() {
        let record = Record::zip(
            &columns(&["a", "", "b", ""]),
            vec!["1".into(), "x".into(), "2".into(), "y".into()],
            "",
        );
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["a", "", "b"]);
        assert_eq!(record.get(""), Some("y"));
    }

    #[test]
    fn test_insert_remove_retain() {
        let mut record: Record = [("a", "1"), ("b", "2"), ("c", "3")].into_iter().collect();
        record.insert("b", "20");
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(record.get("b"), Some("20"));

        assert_eq!(record.remove("a"), Some("1".to_string()));
        assert_eq!(record.remove("a"), None);

        record.retain(|key| key != "c");
        assert_eq!(record.iter().collect::<Vec<_>>(), vec![("b", "20")]);
    }

    #[test]
    fn test_equality_respects_order() {
        let ab: Record = [("a", "1"), ("b", "2")].into_iter().collect();
        let ba: Record = [("b", "2"), ("a", "1")].into_iter().collect();
        assert_ne!(ab, ba);
        assert_eq!(ab, ab.clone());
    }

    #[test]
    fn test_wide_record_lookups() {
        let names: Vec<String> = (0..20_000).map(|i| format!("c{i}")).collect();
        let values: Vec<String> = (0..20_000).map(|i| i.to_string()).collect();
        let mut record = Record::zip(&names, values, "");

        assert!(names
            .iter()
            .enumerate()
            .all(|(i, name)| record.get(name) == Some(i.to_string().as_str())));

        assert_eq!(record.remove("c0"), Some("0".to_string()));
        assert_eq!(record.keys().next(), Some("c1"));
        assert_eq!(record.len(), 19_999);
    }

    #[test]
    fn test_display() {
        let record: Record = [("name", "Lunch"), ("amount", "5.90")].into_iter().collect();
        assert_eq!(
            record.to_string(),
            r#"{"name": "Lunch", "amount": "5.90"}"#
        );
    }
}
