//! Column mapping resolver.
//!
//! Derives the default source → target bindings for a freshly loaded sheet
//! and keeps the mapping set consistent while the caller edits it.
//!
//! The key column is a single reference held by the [`MappingSet`], so
//! "at most one key column" cannot be violated by any mutation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{MappingError, MappingResult};
use crate::models::{ColumnMapping, ColumnType};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Default target name: lowercase, whitespace runs collapsed to `_`.
///
/// ```
/// use sheetload::mapping::default_target_name;
/// assert_eq!(default_target_name("Unit  Price"), "unit_price");
/// ```
pub fn default_target_name(source: &str) -> String {
    WHITESPACE.replace_all(&source.to_lowercase(), "_").into_owned()
}

/// Ordered mapping set with an optional single key column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "MappingSetRepr", into = "MappingSetRepr")]
pub struct MappingSet {
    mappings: Vec<ColumnMapping>,
    key: Option<usize>,
}

/// Wire form: key referenced by source column name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MappingSetRepr {
    columns: Vec<ColumnMapping>,
    #[serde(default)]
    key_column: Option<String>,
}

impl TryFrom<MappingSetRepr> for MappingSet {
    type Error = MappingError;

    fn try_from(repr: MappingSetRepr) -> Result<Self, Self::Error> {
        let mut set = MappingSet::default();
        for mapping in repr.columns {
            set.push(mapping)?;
        }
        if let Some(key) = repr.key_column {
            set.set_key(&key)?;
        }
        Ok(set)
    }
}

impl From<MappingSet> for MappingSetRepr {
    fn from(set: MappingSet) -> Self {
        let key_column = set.key_mapping().map(|m| m.source_column.clone());
        MappingSetRepr {
            columns: set.mappings,
            key_column,
        }
    }
}

impl MappingSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// One string-typed mapping per column, no key column.
    ///
    /// Sources that collapse to the same default target get `_2`, `_3`, ...
    /// suffixes so target names stay unique.
    pub fn from_columns<S: AsRef<str>>(columns: &[S]) -> Self {
        let mut set = MappingSet::default();
        for column in columns {
            let source = column.as_ref();
            let base = default_target_name(source);
            let mut target = base.clone();
            let mut n = 2;
            while set.has_target(&target) {
                target = format!("{}_{}", base, n);
                n += 1;
            }
            set.mappings.push(ColumnMapping::new(source, target));
        }
        set
    }

    /// Append a mapping, rejecting duplicate or empty targets.
    pub fn push(&mut self, mapping: ColumnMapping) -> MappingResult<()> {
        if mapping.target_column.trim().is_empty() {
            return Err(MappingError::EmptyTarget(mapping.source_column));
        }
        if self.has_target(&mapping.target_column) {
            return Err(MappingError::DuplicateTarget(mapping.target_column));
        }
        self.mappings.push(mapping);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnMapping> {
        self.mappings.iter()
    }

    /// Mappings paired with their key flag, in order.
    pub fn entries(&self) -> impl Iterator<Item = (&ColumnMapping, bool)> {
        self.mappings
            .iter()
            .enumerate()
            .map(move |(i, m)| (m, self.is_key(i)))
    }

    pub fn get(&self, source: &str) -> Option<&ColumnMapping> {
        self.position(source).map(|i| &self.mappings[i])
    }

    pub fn is_key(&self, index: usize) -> bool {
        self.key == Some(index)
    }

    pub fn key_mapping(&self) -> Option<&ColumnMapping> {
        self.key.and_then(|i| self.mappings.get(i))
    }

    pub fn non_key_mappings(&self) -> impl Iterator<Item = &ColumnMapping> {
        self.entries().filter(|(_, is_key)| !is_key).map(|(m, _)| m)
    }

    /// Make `source` the key column, replacing any previous key.
    pub fn set_key(&mut self, source: &str) -> MappingResult<()> {
        let index = self.require(source)?;
        self.key = Some(index);
        Ok(())
    }

    pub fn clear_key(&mut self) {
        self.key = None;
    }

    pub fn rename_target(&mut self, source: &str, target: &str) -> MappingResult<()> {
        let index = self.require(source)?;
        let target = target.trim();
        if target.is_empty() {
            return Err(MappingError::EmptyTarget(source.to_string()));
        }
        let taken = self
            .mappings
            .iter()
            .enumerate()
            .any(|(i, m)| i != index && m.target_column == target);
        if taken {
            return Err(MappingError::DuplicateTarget(target.to_string()));
        }
        self.mappings[index].target_column = target.to_string();
        Ok(())
    }

    pub fn set_type(&mut self, source: &str, column_type: ColumnType) -> MappingResult<()> {
        let index = self.require(source)?;
        self.mappings[index].column_type = column_type;
        Ok(())
    }

    pub fn set_forced_string(&mut self, source: &str, forced: bool) -> MappingResult<()> {
        let index = self.require(source)?;
        self.mappings[index].forced_string = forced;
        Ok(())
    }

    /// Remove a mapping. Removing the key column clears the key.
    pub fn remove(&mut self, source: &str) -> MappingResult<ColumnMapping> {
        let index = self.require(source)?;
        self.key = match self.key {
            Some(k) if k == index => None,
            Some(k) if k > index => Some(k - 1),
            other => other,
        };
        Ok(self.mappings.remove(index))
    }

    fn has_target(&self, target: &str) -> bool {
        self.mappings.iter().any(|m| m.target_column == target)
    }

    fn position(&self, source: &str) -> Option<usize> {
        self.mappings.iter().position(|m| m.source_column == source)
    }

    fn require(&self, source: &str) -> MappingResult<usize> {
        self.position(source)
            .ok_or_else(|| MappingError::UnknownColumn(source.to_string()))
    }
}
