//! Pagination decorators. Each wraps a merged cursor, skips the offset rows
//! up front and caps the rows it lets through.

pub mod limit;
pub mod row_number;
pub mod top_and_row_number;

pub use limit::LimitDecoratorMergedResult;
pub use row_number::RowNumberDecoratorMergedResult;
pub use top_and_row_number::TopAndRowNumberDecoratorMergedResult;

use shardmerge_common::error::{MergeError, MergeResult};
use shardmerge_common::types::CursorState;

use crate::merged_result::MergedResult;
use crate::shape::PaginationValue;

/// Consume `skip` rows of `inner`. Returns true when the inner cursor ran
/// out first, i.e. every row was skipped.
fn skip_rows(inner: &mut dyn MergedResult, skip: u64) -> MergeResult<bool> {
    let mut skipped = 0u64;
    while skipped < skip {
        if !inner.next()? {
            return Ok(true);
        }
        skipped += 1;
    }
    Ok(false)
}

/// ROWNUM-style offset: an open bound keeps the boundary row itself.
fn row_number_skip(offset: Option<PaginationValue>) -> u64 {
    match offset {
        Some(o) if o.bound_open => o.value.saturating_sub(1),
        Some(o) => o.value,
        None => 0,
    }
}

/// Decorators stop for good once the wrapped cursor fails.
fn inner_failure(state: &mut CursorState, err: MergeError) -> MergeError {
    *state = CursorState::Exhausted;
    err
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::merged_result::MergedResult;
    use crate::metadata::ResultMetadata;
    use crate::stream::IteratorStreamMergedResult;
    use crate::test_util::int_shard;

    /// Four shards of two rows each, ids 1..=8 in order.
    pub fn eight_rows() -> Box<dyn MergedResult> {
        let shards = vec![
            int_shard(&[1, 2]),
            int_shard(&[3, 4]),
            int_shard(&[5, 6]),
            int_shard(&[7, 8]),
        ];
        let metadata = ResultMetadata::resolve(&shards).unwrap();
        Box::new(IteratorStreamMergedResult::new(shards, metadata))
    }

    pub fn drain_ids(result: &mut dyn MergedResult) -> Vec<i64> {
        let mut ids = Vec::new();
        while result.next().unwrap() {
            ids.push(
                result
                    .get_value(1, shardmerge_common::types::DataType::Int64)
                    .unwrap()
                    .as_i64()
                    .unwrap(),
            );
        }
        ids
    }
}
