//! The per-shard cursor contract consumed by every merger, and an in-memory
//! implementation of it.

use shardmerge_common::datum::{Datum, OwnedRow};
use shardmerge_common::error::{MergeError, MergeResult};
use shardmerge_common::types::{CursorState, DataType};

use crate::metadata::ColumnMetadata;

/// A forward-only, single-consumer cursor over one shard's rows.
///
/// Column indices are 1-based. Implementations belong to the execution
/// layer; the merge engine only drives them.
pub trait QueryResult {
    /// Move to the next row. `false` once the shard has no more rows.
    fn next(&mut self) -> MergeResult<bool>;

    /// Read the value at `index` of the current row, converted to `target`.
    fn get_value(&mut self, index: usize, target: DataType) -> MergeResult<Datum>;

    /// Whether the last value read was SQL NULL.
    fn was_null(&self) -> bool;

    fn column_count(&self) -> usize;

    fn column_label(&self, index: usize) -> MergeResult<String>;

    fn column_type(&self, index: usize) -> MergeResult<DataType>;

    /// Whether text in this column compares case-sensitively.
    fn is_case_sensitive(&self, _index: usize) -> MergeResult<bool> {
        Ok(true)
    }

    /// Read the value at `index` in its declared kind.
    fn get_datum(&mut self, index: usize) -> MergeResult<Datum> {
        let data_type = self.column_type(index)?;
        self.get_value(index, data_type)
    }

    /// Read every column of the current row in declared kinds.
    fn read_row(&mut self) -> MergeResult<OwnedRow> {
        let count = self.column_count();
        let mut values = Vec::with_capacity(count);
        for index in 1..=count {
            values.push(self.get_datum(index)?);
        }
        Ok(OwnedRow::new(values))
    }
}

/// A shard cursor backed by rows already held in memory.
#[derive(Debug, Clone)]
pub struct MemoryQueryResult {
    columns: Vec<ColumnMetadata>,
    rows: Vec<OwnedRow>,
    /// 0-based position of the current row once iterating.
    position: usize,
    state: CursorState,
    was_null: bool,
}

impl MemoryQueryResult {
    pub fn new(columns: Vec<ColumnMetadata>, rows: Vec<OwnedRow>) -> Self {
        Self {
            columns,
            rows,
            position: 0,
            state: CursorState::Fresh,
            was_null: false,
        }
    }

    /// Build from `(label, kind)` pairs and raw rows; every column is
    /// case-sensitive.
    pub fn from_rows(columns: &[(&str, DataType)], rows: Vec<Vec<Datum>>) -> Self {
        let columns = columns
            .iter()
            .enumerate()
            .map(|(i, (label, data_type))| ColumnMetadata::new(i + 1, *label, *data_type))
            .collect();
        Self::new(columns, rows.into_iter().map(OwnedRow::new).collect())
    }

    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn into_parts(self) -> (Vec<ColumnMetadata>, Vec<OwnedRow>) {
        (self.columns, self.rows)
    }

    fn column(&self, index: usize) -> MergeResult<&ColumnMetadata> {
        index
            .checked_sub(1)
            .and_then(|i| self.columns.get(i))
            .ok_or(MergeError::ColumnOutOfBounds {
                index,
                column_count: self.columns.len(),
            })
    }
}

impl QueryResult for MemoryQueryResult {
    fn next(&mut self) -> MergeResult<bool> {
        let has_row = match self.state {
            CursorState::Exhausted => false,
            CursorState::Fresh => !self.rows.is_empty(),
            CursorState::Iterating => {
                self.position += 1;
                self.position < self.rows.len()
            }
        };
        Ok(self.state.advance(has_row))
    }

    fn get_value(&mut self, index: usize, target: DataType) -> MergeResult<Datum> {
        self.state.ensure_readable()?;
        self.column(index)?;
        let value = self.rows[self.position]
            .column(index)
            .cloned()
            .unwrap_or(Datum::Null);
        self.was_null = value.is_null();
        value.coerce_to(target)
    }

    fn was_null(&self) -> bool {
        self.was_null
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_label(&self, index: usize) -> MergeResult<String> {
        Ok(self.column(index)?.label.clone())
    }

    fn column_type(&self, index: usize) -> MergeResult<DataType> {
        Ok(self.column(index)?.data_type)
    }

    fn is_case_sensitive(&self, index: usize) -> MergeResult<bool> {
        Ok(self.column(index)?.case_sensitive)
    }
}
