//! Column metadata resolved once per query from the shard cursors.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use shardmerge_common::error::{MergeError, MergeResult};
use shardmerge_common::types::DataType;

use crate::query_result::QueryResult;
use crate::shape::ColumnRef;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    /// 1-based ordinal.
    pub index: usize,
    pub label: String,
    pub data_type: DataType,
    #[serde(default = "default_case_sensitive")]
    pub case_sensitive: bool,
}

fn default_case_sensitive() -> bool {
    true
}

impl ColumnMetadata {
    pub fn new(index: usize, label: impl Into<String>, data_type: DataType) -> Self {
        Self {
            index,
            label: label.into(),
            data_type,
            case_sensitive: true,
        }
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }
}

/// Immutable snapshot of a result's columns with a case-insensitive
/// label lookup. A repeated label resolves to its first occurrence.
#[derive(Debug, Clone)]
pub struct ResultMetadata {
    columns: Vec<ColumnMetadata>,
    label_index: HashMap<String, usize>,
}

impl ResultMetadata {
    pub fn from_columns(columns: Vec<ColumnMetadata>) -> Self {
        let mut label_index = HashMap::with_capacity(columns.len());
        for column in &columns {
            label_index
                .entry(column.label.to_lowercase())
                .or_insert(column.index);
        }
        Self {
            columns,
            label_index,
        }
    }

    /// Read the columns of a single cursor.
    pub fn from_cursor(cursor: &dyn QueryResult) -> MergeResult<Self> {
        let count = cursor.column_count();
        let mut columns = Vec::with_capacity(count);
        for index in 1..=count {
            columns.push(ColumnMetadata {
                index,
                label: cursor.column_label(index)?,
                data_type: cursor.column_type(index)?,
                case_sensitive: cursor.is_case_sensitive(index)?,
            });
        }
        Ok(Self::from_columns(columns))
    }

    /// Resolve metadata from the first shard and check that every other
    /// shard reports the same column count and labels.
    pub fn resolve(shards: &[Box<dyn QueryResult>]) -> MergeResult<Self> {
        let first = shards
            .first()
            .ok_or_else(|| MergeError::config("no shard results to merge"))?;
        let metadata = Self::from_cursor(first.as_ref())?;
        for (shard, cursor) in shards.iter().enumerate().skip(1) {
            metadata.check_agrees(shard, cursor.as_ref())?;
        }
        Ok(metadata)
    }

    fn check_agrees(&self, shard: usize, cursor: &dyn QueryResult) -> MergeResult<()> {
        if cursor.column_count() != self.columns.len() {
            return Err(MergeError::SchemaMismatch {
                shard,
                reason: format!(
                    "expected {} columns, got {}",
                    self.columns.len(),
                    cursor.column_count()
                ),
            });
        }
        for column in &self.columns {
            let label = cursor.column_label(column.index)?;
            if !label.eq_ignore_ascii_case(&column.label) {
                return Err(MergeError::SchemaMismatch {
                    shard,
                    reason: format!(
                        "column {} is '{}', expected '{}'",
                        column.index, label, column.label
                    ),
                });
            }
        }
        Ok(())
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> MergeResult<&ColumnMetadata> {
        index
            .checked_sub(1)
            .and_then(|i| self.columns.get(i))
            .ok_or(MergeError::ColumnOutOfBounds {
                index,
                column_count: self.columns.len(),
            })
    }

    pub fn check_index(&self, index: usize) -> MergeResult<()> {
        self.column(index).map(|_| ())
    }

    pub fn index_of(&self, label: &str) -> MergeResult<usize> {
        self.label_index
            .get(&label.to_lowercase())
            .copied()
            .ok_or_else(|| MergeError::UnknownColumn(label.to_string()))
    }

    pub fn resolve_ref(&self, column: &ColumnRef) -> MergeResult<usize> {
        match column {
            ColumnRef::Index(index) => {
                self.check_index(*index)?;
                Ok(*index)
            }
            ColumnRef::Label(label) => self.index_of(label),
        }
    }

    pub fn is_case_sensitive(&self, index: usize) -> MergeResult<bool> {
        Ok(self.column(index)?.case_sensitive)
    }
}
