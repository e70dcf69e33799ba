//! Line-oriented dependency tables.
//!
//! One record per line: `key|dep1,dep2,...`. Blank lines and lines starting
//! with `#` are ignored. The builder writes the bundle dependency index in
//! this format (`bundles.deps`), and accepts the same format as a static
//! per-asset dependency listing.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{FormatError, FormatResult};

/// File name of the bundle dependency index inside a bundle directory.
pub const INDEX_FILE_NAME: &str = "bundles.deps";

/// Map from a key to its ordered list of direct dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyTable {
    entries: BTreeMap<String, Vec<String>>,
}

impl DependencyTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a table from text.
    pub fn parse(text: &str) -> FormatResult<Self> {
        let mut table = Self::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, deps) = line.split_once('|').ok_or_else(|| FormatError::InvalidLine {
                line: idx + 1,
                message: "expected 'key|dep,dep'".to_string(),
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(FormatError::InvalidLine {
                    line: idx + 1,
                    message: "empty key".to_string(),
                });
            }

            let deps = deps
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(String::from);
            table.insert(key, deps);
        }

        Ok(table)
    }

    /// Set the dependencies of `key`, dropping duplicates while keeping order.
    pub fn insert(&mut self, key: impl Into<String>, deps: impl IntoIterator<Item = String>) {
        let mut seen = BTreeSet::new();
        let deps = deps.into_iter().filter(|d| seen.insert(d.clone())).collect();
        self.entries.insert(key.into(), deps);
    }

    /// Direct dependencies of `key`. Unknown keys have none.
    pub fn get(&self, key: &str) -> &[String] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Check whether `key` has a record.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterate all records in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table has no records.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Transitive dependencies of `key` in discovery order, excluding `key`.
    ///
    /// Cycles are tolerated.
    pub fn transitive(&self, key: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        seen.insert(key.to_string());
        let mut out = Vec::new();
        let mut stack: Vec<&str> = self.get(key).iter().rev().map(String::as_str).collect();

        while let Some(next) = stack.pop() {
            if !seen.insert(next.to_string()) {
                continue;
            }
            out.push(next.to_string());
            stack.extend(self.get(next).iter().rev().map(String::as_str));
        }

        out
    }
}

impl fmt::Display for DependencyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, deps) in &self.entries {
            writeln!(f, "{}|{}", key, deps.join(","))?;
        }
        Ok(())
    }
}
