//! DISTINCT row cursors used by the divide access mode.

use std::collections::HashSet;

use shardmerge_common::datum::Datum;
use shardmerge_common::error::{MergeError, MergeResult};
use shardmerge_common::types::{CursorState, DataType};

use crate::memory::aggregation::ResolvedAggregation;
use crate::merged_result::shard_failure;
use crate::metadata::ColumnMetadata;
use crate::query_result::{MemoryQueryResult, QueryResult};

/// Holds every distinct row of the shard cursors once, in first-seen
/// order.
#[derive(Debug, Clone)]
pub struct DistinctQueryResult {
    inner: MemoryQueryResult,
}

impl DistinctQueryResult {
    pub fn new(mut shards: Vec<Box<dyn QueryResult>>) -> MergeResult<Self> {
        let first = shards
            .first()
            .ok_or_else(|| MergeError::config("no shard results to merge"))?;
        let mut columns = Vec::with_capacity(first.column_count());
        for index in 1..=first.column_count() {
            columns.push(ColumnMetadata {
                index,
                label: first.column_label(index)?,
                data_type: first.column_type(index)?,
                case_sensitive: first.is_case_sensitive(index)?,
            });
        }

        let mut seen: HashSet<Vec<u8>> = HashSet::new();
        let mut rows = Vec::new();
        let mut state = CursorState::Fresh;
        for (shard, cursor) in shards.iter_mut().enumerate() {
            loop {
                let row = match cursor.next() {
                    Ok(true) => cursor.read_row(),
                    Ok(false) => break,
                    Err(e) => Err(e),
                }
                .map_err(|e| shard_failure(&mut state, shard, e))?;
                let mut key = Vec::new();
                for (value, column) in row.values.iter().zip(&columns) {
                    value.encode_key(column.case_sensitive, &mut key);
                }
                if seen.insert(key) {
                    rows.push(row);
                }
            }
        }
        tracing::debug!(distinct_rows = rows.len(), "distinct rows collected");
        Ok(Self {
            inner: MemoryQueryResult::new(columns, rows),
        })
    }

    pub fn row_count(&self) -> usize {
        self.inner.row_count()
    }

    /// Split into one single-row cursor per distinct row.
    pub fn divide(self) -> Vec<DistinctQueryResult> {
        let (columns, rows) = self.inner.into_parts();
        rows.into_iter()
            .map(|row| DistinctQueryResult {
                inner: MemoryQueryResult::new(columns.clone(), vec![row]),
            })
            .collect()
    }
}

impl QueryResult for DistinctQueryResult {
    fn next(&mut self) -> MergeResult<bool> {
        self.inner.next()
    }

    fn get_value(&mut self, index: usize, target: DataType) -> MergeResult<Datum> {
        self.inner.get_value(index, target)
    }

    fn was_null(&self) -> bool {
        self.inner.was_null()
    }

    fn column_count(&self) -> usize {
        self.inner.column_count()
    }

    fn column_label(&self, index: usize) -> MergeResult<String> {
        self.inner.column_label(index)
    }

    fn column_type(&self, index: usize) -> MergeResult<DataType> {
        self.inner.column_type(index)
    }

    fn is_case_sensitive(&self, index: usize) -> MergeResult<bool> {
        self.inner.is_case_sensitive(index)
    }
}

/// Where a derived column of a DISTINCT aggregate reads from.
#[derive(Debug, Clone, Copy)]
enum DerivedValue {
    /// Constant 1: each divided row counts once.
    One,
    /// The value of another column of the same row.
    ColumnOf(usize),
}

/// A divided distinct row seen through DISTINCT aggregates: every derived
/// COUNT column reads 1 and every derived SUM column reads the row's value
/// of the aggregated column.
pub struct AggregationDistinctQueryResult {
    inner: DistinctQueryResult,
    /// Indexed by 0-based column; `None` reads through.
    derived: Vec<Option<DerivedValue>>,
    was_null: bool,
}

impl AggregationDistinctQueryResult {
    pub fn new(inner: DistinctQueryResult, aggregations: &[ResolvedAggregation]) -> Self {
        let mut derived = vec![None; inner.column_count()];
        for agg in aggregations.iter().filter(|a| a.distinct) {
            if let Some((count_col, sum_col)) = agg.derived {
                if let Some(slot) = derived.get_mut(count_col - 1) {
                    *slot = Some(DerivedValue::One);
                }
                if let Some(slot) = derived.get_mut(sum_col - 1) {
                    *slot = Some(DerivedValue::ColumnOf(agg.column));
                }
            }
        }
        Self {
            inner,
            derived,
            was_null: false,
        }
    }
}

impl QueryResult for AggregationDistinctQueryResult {
    fn next(&mut self) -> MergeResult<bool> {
        self.inner.next()
    }

    fn get_value(&mut self, index: usize, target: DataType) -> MergeResult<Datum> {
        let derived = index
            .checked_sub(1)
            .and_then(|i| self.derived.get(i))
            .copied()
            .flatten();
        let value = match derived {
            Some(DerivedValue::One) => {
                // Still enforce the cursor contract on the synthetic column.
                self.inner.get_value(index, DataType::Int64)?;
                Datum::Int64(1).coerce_to(target)?
            }
            Some(DerivedValue::ColumnOf(source)) => self.inner.get_value(source, target)?,
            None => self.inner.get_value(index, target)?,
        };
        self.was_null = value.is_null();
        Ok(value)
    }

    fn was_null(&self) -> bool {
        self.was_null
    }

    fn column_count(&self) -> usize {
        self.inner.column_count()
    }

    fn column_label(&self, index: usize) -> MergeResult<String> {
        self.inner.column_label(index)
    }

    fn column_type(&self, index: usize) -> MergeResult<DataType> {
        self.inner.column_type(index)
    }

    fn is_case_sensitive(&self, index: usize) -> MergeResult<bool> {
        self.inner.is_case_sensitive(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ResultMetadata;
    use crate::shape::AggregationItem;
    use crate::test_util::{failing_shard, int_shard, shard};
    use shardmerge_common::datum::OwnedRow;

    #[test]
    fn test_distinct_rows_first_seen() {
        let distinct =
            DistinctQueryResult::new(vec![int_shard(&[3, 1, 3]), int_shard(&[1, 2])]).unwrap();
        assert_eq!(distinct.row_count(), 3);
        let mut cursor = distinct;
        let mut ids = Vec::new();
        while cursor.next().unwrap() {
            ids.push(cursor.get_value(1, DataType::Int64).unwrap().as_i64().unwrap());
        }
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn test_divide_yields_single_row_cursors() {
        let parts = DistinctQueryResult::new(vec![int_shard(&[7, 7, 8])])
            .unwrap()
            .divide();
        assert_eq!(parts.len(), 2);
        for mut part in parts {
            assert!(part.next().unwrap());
            assert!(!part.next().unwrap());
        }
    }

    #[test]
    fn test_case_insensitive_rows_collapse() {
        let columns = vec![ColumnMetadata::new(1, "name", DataType::Text).case_insensitive()];
        let a: Box<dyn QueryResult> = Box::new(MemoryQueryResult::new(
            columns.clone(),
            vec![OwnedRow::new(vec![Datum::Text("Bob".into())])],
        ));
        let b: Box<dyn QueryResult> = Box::new(MemoryQueryResult::new(
            columns,
            vec![OwnedRow::new(vec![Datum::Text("BOB".into())])],
        ));
        assert_eq!(DistinctQueryResult::new(vec![a, b]).unwrap().row_count(), 1);
    }

    #[test]
    fn test_derived_columns_answer_one_and_value() {
        let columns = [
            ("avg_v", DataType::Int64),
            ("cnt", DataType::Int64),
            ("sum_v", DataType::Int64),
        ];
        let shards = vec![shard(
            &columns,
            vec![vec![Datum::Int64(4), Datum::Int64(9), Datum::Int64(99)]],
        )];
        let metadata = ResultMetadata::resolve(&shards).unwrap();
        let aggs = ResolvedAggregation::resolve_all(
            &[AggregationItem::avg(1, 2, 3).distinct()],
            &metadata,
        )
        .unwrap();
        let mut parts = DistinctQueryResult::new(shards).unwrap().divide();
        let mut cursor = AggregationDistinctQueryResult::new(parts.remove(0), &aggs);
        assert!(matches!(
            cursor.get_value(2, DataType::Int64),
            Err(MergeError::InvalidCursorState(_))
        ));
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get_value(2, DataType::Int64).unwrap(), Datum::Int64(1));
        assert_eq!(cursor.get_value(3, DataType::Int64).unwrap(), Datum::Int64(4));
        assert_eq!(cursor.get_value(1, DataType::Float64).unwrap(), Datum::Float64(4.0));
    }

    #[test]
    fn test_upstream_failure_propagates() {
        match DistinctQueryResult::new(vec![int_shard(&[1]), failing_shard(0)]) {
            Err(MergeError::Upstream { shard, .. }) => assert_eq!(shard, Some(1)),
            other => panic!("expected Upstream, got {:?}", other.map(|d| d.row_count())),
        }
    }
}
