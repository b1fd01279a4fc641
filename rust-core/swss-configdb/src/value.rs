// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Typed column values and their raw hash encoding.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use swss_connector::NONE_LITERAL;

use crate::key::RowKey;

/// Placeholder column (and value) stored for a row with no columns.
pub const NULL_PLACEHOLDER: &str = "NULL";

/// Suffix marking a list-valued column in the store.
pub const LIST_MARKER: char = '@';

/// Separator between list items in a stored list column.
pub const LIST_SEPARATOR: char = ',';

/// The value of one column.
///
/// Serializes untagged: `null`, a string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnValue {
    /// Stored as the literal `"None"`.
    Null,
    /// A plain string.
    Scalar(String),
    /// Stored under `name@` as a comma-joined string.
    List(Vec<String>),
}

impl ColumnValue {
    /// The string, if this is a scalar.
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            ColumnValue::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// The items, if this is a list.
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            ColumnValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// True for [`ColumnValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }
}

impl From<&str> for ColumnValue {
    fn from(value: &str) -> Self {
        ColumnValue::Scalar(value.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(value: String) -> Self {
        ColumnValue::Scalar(value)
    }
}

impl From<Vec<String>> for ColumnValue {
    fn from(items: Vec<String>) -> Self {
        ColumnValue::List(items)
    }
}

impl From<Vec<&str>> for ColumnValue {
    fn from(items: Vec<&str>) -> Self {
        ColumnValue::List(items.into_iter().map(str::to_string).collect())
    }
}

/// A typed row: column name to value.
pub type Row = BTreeMap<String, ColumnValue>;

/// A typed table: row key to row.
pub type Table = BTreeMap<RowKey, Row>;

/// A whole configuration: table name to table.
pub type ConfigData = BTreeMap<String, Table>;

/// Decode a raw hash into a typed row.
///
/// The placeholder column is dropped, `name@` columns are split into
/// lists and the literal `"None"` becomes [`ColumnValue::Null`].
pub fn raw_to_typed(raw: HashMap<String, String>) -> Row {
    raw.into_iter()
        .filter(|(column, _)| column != NULL_PLACEHOLDER)
        .map(|(column, value)| match column.strip_suffix(LIST_MARKER) {
            Some(name) => (
                name.to_string(),
                ColumnValue::List(value.split(LIST_SEPARATOR).map(str::to_string).collect()),
            ),
            None if value == NONE_LITERAL => (column, ColumnValue::Null),
            None => (column, ColumnValue::Scalar(value)),
        })
        .collect()
}

/// Encode a typed row as a raw hash. An empty row becomes the
/// placeholder column alone.
pub fn typed_to_raw(row: &Row) -> BTreeMap<String, String> {
    if row.is_empty() {
        return BTreeMap::from([(NULL_PLACEHOLDER.to_string(), NULL_PLACEHOLDER.to_string())]);
    }
    row.iter()
        .map(|(column, value)| match value {
            ColumnValue::Null => (column.clone(), NONE_LITERAL.to_string()),
            ColumnValue::Scalar(value) => (column.clone(), value.clone()),
            ColumnValue::List(items) => (
                format!("{column}{LIST_MARKER}"),
                items.join(&LIST_SEPARATOR.to_string()),
            ),
        })
        .collect()
}
