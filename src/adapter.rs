//! Row projections applied between a row source and a row sink.

use foldhash::{HashSet, HashSetExt};

use crate::row::{Record, Row};

/// A stateless, one-row-in, one-row-out transform.
pub trait RowAdapter {
    /// Transform one row.
    fn apply(&self, row: Row) -> Row;
}

/// Split a comma-separated field list, dropping empty names.
pub fn parse_field_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Keeps only the named fields of each record, in the requested order.
///
/// Names a record lacks are left out rather than filled in. Positional and
/// raw rows pass through untouched.
#[derive(Debug, Clone)]
pub struct Picker {
    fields: Vec<String>,
}

impl Picker {
    /// Create a picker for `fields`.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

impl RowAdapter for Picker {
    fn apply(&self, row: Row) -> Row {
        let mut record = match row {
            Row::Record(record) => record,
            other => return other,
        };
        let mut picked = Record::with_capacity(self.fields.len());
        for field in &self.fields {
            if let Some(value) = record.remove(field) {
                picked.insert(field.clone(), value);
            }
        }
        Row::Record(picked)
    }
}

/// Removes the named fields from each record.
///
/// Positional and raw rows pass through untouched.
#[derive(Debug, Clone)]
pub struct Omitter {
    fields: HashSet<String>,
}

impl Omitter {
    /// Create an omitter for `fields`.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = HashSet::new();
        set.extend(fields.into_iter().map(Into::into));
        Self { fields: set }
    }
}

impl RowAdapter for Omitter {
    fn apply(&self, row: Row) -> Row {
        match row {
            Row::Record(mut record) => {
                record.retain(|key| !self.fields.contains(key));
                Row::Record(record)
            }
            other => other,
        }
    }
}
