// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Row keys and the `TABLE|row` key layout.
//!
//! The table separator and the composite key separator are the same
//! character, so a single-part key that itself contains `|` reads back as
//! a composite key.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Separator between the table name and the row key.
pub const TABLE_NAME_SEPARATOR: char = '|';

/// Separator between the parts of a composite row key.
pub const KEY_SEPARATOR: char = '|';

/// The key of a row within its table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RowKey {
    /// A plain key, e.g. `Ethernet0`.
    Single(String),
    /// A multi-part key, e.g. `("Vlan100", "Ethernet0")`.
    Composite(Vec<String>),
}

impl RowKey {
    /// Build a composite key from its parts.
    pub fn composite<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RowKey::Composite(parts.into_iter().map(Into::into).collect())
    }

    /// The parts of the key. A single key has one part.
    pub fn parts(&self) -> Vec<&str> {
        match self {
            RowKey::Single(key) => vec![key.as_str()],
            RowKey::Composite(parts) => parts.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for RowKey {
    fn from(key: &str) -> Self {
        RowKey::Single(key.to_string())
    }
}

impl From<String> for RowKey {
    fn from(key: String) -> Self {
        RowKey::Single(key)
    }
}

impl From<(&str, &str)> for RowKey {
    fn from((first, second): (&str, &str)) -> Self {
        RowKey::composite([first, second])
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&serialize_key(self))
    }
}

/// Encode a row key: composite parts are joined with [`KEY_SEPARATOR`].
pub fn serialize_key(key: &RowKey) -> String {
    match key {
        RowKey::Single(key) => key.clone(),
        RowKey::Composite(parts) => parts.join(&KEY_SEPARATOR.to_string()),
    }
}

/// Decode a row key. More than one part after splitting gives a composite
/// key, otherwise a single one.
///
/// # Examples
///
/// ```rust
/// use swss_configdb::{deserialize_key, serialize_key, RowKey};
///
/// let key = RowKey::from(("Vlan100", "Ethernet0"));
/// assert_eq!(serialize_key(&key), "Vlan100|Ethernet0");
/// assert_eq!(deserialize_key("Vlan100|Ethernet0"), key);
/// assert_eq!(deserialize_key("Ethernet0"), RowKey::from("Ethernet0"));
/// ```
pub fn deserialize_key(raw: &str) -> RowKey {
    let parts: Vec<&str> = raw.split(KEY_SEPARATOR).collect();
    if parts.len() > 1 {
        RowKey::composite(parts)
    } else {
        RowKey::Single(raw.to_string())
    }
}

/// The store key of row `key` in `table`. Table names are upper-cased.
pub fn row_hash(table: &str, key: &RowKey) -> String {
    format!("{}{}{}", table.to_uppercase(), TABLE_NAME_SEPARATOR, serialize_key(key))
}

/// Glob pattern matching every row of `table`.
pub fn table_pattern(table: &str) -> String {
    format!("{}{}*", table.to_uppercase(), TABLE_NAME_SEPARATOR)
}

/// Split a store key into table name and raw row key. Keys without a
/// separator are not table rows.
pub fn split_table_key(raw: &str) -> Option<(&str, &str)> {
    raw.split_once(TABLE_NAME_SEPARATOR)
}

impl Serialize for RowKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&serialize_key(self))
    }
}

impl<'de> Deserialize<'de> for RowKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(deserialize_key(&raw))
    }
}
