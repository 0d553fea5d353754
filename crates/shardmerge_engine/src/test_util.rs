//! Shard fixtures shared by the unit tests.

use shardmerge_common::datum::Datum;
use shardmerge_common::error::{MergeError, MergeResult};
use shardmerge_common::types::DataType;

use crate::query_result::{MemoryQueryResult, QueryResult};

/// Single `id BIGINT` column.
pub fn int_shard(ids: &[i64]) -> Box<dyn QueryResult> {
    Box::new(MemoryQueryResult::from_rows(
        &[("id", DataType::Int64)],
        ids.iter().map(|id| vec![Datum::Int64(*id)]).collect(),
    ))
}

pub fn shard(columns: &[(&str, DataType)], rows: Vec<Vec<Datum>>) -> Box<dyn QueryResult> {
    Box::new(MemoryQueryResult::from_rows(columns, rows))
}

/// Yields `rows_before_failure` rows of `id = 0`, then fails on `next()`.
pub fn failing_shard(rows_before_failure: usize) -> Box<dyn QueryResult> {
    Box::new(FailingQueryResult {
        remaining: rows_before_failure,
    })
}

struct FailingQueryResult {
    remaining: usize,
}

impl QueryResult for FailingQueryResult {
    fn next(&mut self) -> MergeResult<bool> {
        if self.remaining == 0 {
            return Err(MergeError::upstream("connection reset by peer"));
        }
        self.remaining -= 1;
        Ok(true)
    }

    fn get_value(&mut self, _index: usize, target: DataType) -> MergeResult<Datum> {
        Datum::Int64(0).coerce_to(target)
    }

    fn was_null(&self) -> bool {
        false
    }

    fn column_count(&self) -> usize {
        1
    }

    fn column_label(&self, _index: usize) -> MergeResult<String> {
        Ok("id".to_string())
    }

    fn column_type(&self, _index: usize) -> MergeResult<DataType> {
        Ok(DataType::Int64)
    }
}
