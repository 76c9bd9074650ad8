//! Data models for multi-source collection.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Which record family a source produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Trial,
    Publication,
    Regulatory,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Trial       => "trial",
            SourceKind::Publication => "publication",
            SourceKind::Regulatory  => "regulatory",
        }
    }
}

/// One upstream record, normalized to a flat string field map.
///
/// Only keys the upstream actually supplied are present; an absent key is
/// not the same as an empty value, and `set` silently drops blanks to
/// keep it that way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    pub source: SourceKind,
    pub canonical_id: String,
    pub fields: BTreeMap<String, String>,
}

impl RawRecord {
    pub fn new(source: SourceKind, canonical_id: impl Into<String>) -> Self {
        Self {
            source,
            canonical_id: canonical_id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Inserts a field, dropping blank values.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if !value.trim().is_empty() {
            self.fields.insert(key.to_string(), value);
        }
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            source: self.source,
            canonical_id: self.canonical_id.clone(),
        }
    }
}

/// Identity of a record across the merged dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub source: SourceKind,
    pub canonical_id: String,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source.as_str(), self.canonical_id)
    }
}

/// Records merged across all sources for one run.
///
/// Invariant: no two records share a `RecordKey`. The first record seen
/// for a key wins; later duplicates are dropped and counted. Insertion
/// order is preserved.
#[derive(Debug, Clone, Default)]
pub struct MergedDataset {
    records: Vec<RawRecord>,
    seen: HashSet<RecordKey>,
    duplicates_dropped: usize,
}

impl MergedDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the key was already present (record dropped).
    pub fn insert(&mut self, record: RawRecord) -> bool {
        let key = record.key();
        if self.seen.contains(&key) {
            self.duplicates_dropped += 1;
            return false;
        }
        self.seen.insert(key);
        self.records.push(record);
        true
    }

    pub fn extend<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = RawRecord>,
    {
        for record in records {
            self.insert(record);
        }
    }

    /// Drops records failing the predicate, preserving order. Dropped keys
    /// stay claimed; this runs after all merging is done.
    pub fn retain<F>(&mut self, f: F)
    where
        F: FnMut(&RawRecord) -> bool,
    {
        self.records.retain(f);
    }

    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn duplicates_dropped(&self) -> usize {
        self.duplicates_dropped
    }

    /// Record counts per source family, for report summaries.
    pub fn counts_by_source(&self) -> BTreeMap<SourceKind, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.source).or_insert(0) += 1;
        }
        counts
    }
}
