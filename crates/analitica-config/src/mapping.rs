//! Logical → physical table mapping.
//!
//! The mapping arrives as one delimited string, e.g.
//! `incidentes=Incidentes,usuarios=Usuarios`. Entries are comma separated,
//! the first `=` splits logical from physical name, and both sides are
//! trimmed. Entries without `=` or with a blank side are skipped.

use std::fmt;

use serde::Serialize;

use crate::ConfigError;

/// One `logical=physical` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableEntry {
    /// External-facing alias; names the exported objects.
    pub logical: String,
    /// Actual source table identifier.
    pub physical: String,
}

/// Ordered, non-empty set of table pairs with unique logical names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TableMapping {
    entries: Vec<TableEntry>,
}

impl TableMapping {
    /// Parse a mapping string.
    ///
    /// A repeated logical name keeps its first position and takes the last
    /// physical name.
    ///
    /// # Errors
    ///
    /// [`ConfigError::EmptyMapping`] when no valid pair remains.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut entries: Vec<TableEntry> = Vec::new();

        for pair in raw.split(',') {
            let Some((logical, physical)) = pair.split_once('=') else {
                continue;
            };
            let (logical, physical) = (logical.trim(), physical.trim());
            if logical.is_empty() || physical.is_empty() {
                continue;
            }

            match entries.iter_mut().find(|e| e.logical == logical) {
                Some(existing) => existing.physical = physical.to_owned(),
                None => entries.push(TableEntry {
                    logical: logical.to_owned(),
                    physical: physical.to_owned(),
                }),
            }
        }

        if entries.is_empty() {
            return Err(ConfigError::EmptyMapping);
        }
        Ok(Self { entries })
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false` for a parsed mapping.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a TableMapping {
    type Item = &'a TableEntry;
    type IntoIter = std::slice::Iter<'a, TableEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl std::str::FromStr for TableMapping {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Canonical `logical=physical,...` form; parses back to the same mapping.
impl fmt::Display for TableMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", e.logical, e.physical)?;
        }
        Ok(())
    }
}
