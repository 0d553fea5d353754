use shardmerge_common::datum::Datum;
use shardmerge_common::error::MergeResult;
use shardmerge_common::types::{CursorState, DataType};

use super::{inner_failure, row_number_skip, skip_rows};
use crate::merged_result::{MergedResult, MergedResultKind};
use crate::metadata::ResultMetadata;
use crate::shape::PaginationValue;

/// `SELECT TOP n ... ROW_NUMBER() OVER (..) > offset`: the offset follows
/// ROWNUM boundary rules, TOP is an inclusive cap on the row position.
pub struct TopAndRowNumberDecoratorMergedResult {
    inner: Box<dyn MergedResult>,
    top: Option<u64>,
    row_number: u64,
    skip_all: bool,
    state: CursorState,
}

impl TopAndRowNumberDecoratorMergedResult {
    pub fn new(
        mut inner: Box<dyn MergedResult>,
        offset: Option<PaginationValue>,
        top: Option<PaginationValue>,
    ) -> MergeResult<Self> {
        let skip = row_number_skip(offset);
        let skip_all = skip_rows(inner.as_mut(), skip)?;
        tracing::debug!(skip, skip_all, "top/row_number decorator positioned");
        Ok(Self {
            inner,
            top: top.map(|t| t.value),
            row_number: skip.saturating_add(1),
            skip_all,
            state: CursorState::Fresh,
        })
    }
}

impl MergedResult for TopAndRowNumberDecoratorMergedResult {
    fn next(&mut self) -> MergeResult<bool> {
        if self.state.is_exhausted() || self.skip_all {
            return Ok(self.state.advance(false));
        }
        let within = self.top.map_or(true, |top| self.row_number <= top);
        self.row_number = self.row_number.saturating_add(1);
        let has_row = within
            && self
                .inner
                .next()
                .map_err(|e| inner_failure(&mut self.state, e))?;
        Ok(self.state.advance(has_row))
    }

    fn get_value(&mut self, index: usize, target: DataType) -> MergeResult<Datum> {
        self.state.ensure_readable()?;
        self.inner.get_value(index, target)
    }

    fn was_null(&self) -> bool {
        self.inner.was_null()
    }

    fn metadata(&self) -> &ResultMetadata {
        self.inner.metadata()
    }

    fn state(&self) -> CursorState {
        self.state
    }

    fn kind(&self) -> MergedResultKind {
        MergedResultKind::TopAndRowNumber
    }

    fn decorated(&self) -> Option<&dyn MergedResult> {
        Some(self.inner.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::testing::{drain_ids, eight_rows};

    fn top(offset: Option<PaginationValue>, top: Option<u64>) -> TopAndRowNumberDecoratorMergedResult {
        TopAndRowNumberDecoratorMergedResult::new(
            eight_rows(),
            offset,
            top.map(|t| PaginationValue::new(t, false)),
        )
        .unwrap()
    }

    #[test]
    fn test_open_offset_with_top() {
        let mut result = top(Some(PaginationValue::new(2, true)), Some(4));
        assert_eq!(drain_ids(&mut result), vec![2, 3, 4]);
        assert_eq!(result.state(), CursorState::Exhausted);
    }

    #[test]
    fn test_closed_offset_with_top() {
        assert_eq!(drain_ids(&mut top(Some(PaginationValue::new(2, false)), Some(4))), vec![3, 4]);
        assert_eq!(drain_ids(&mut top(None, Some(3))), vec![1, 2, 3]);
        assert_eq!(drain_ids(&mut top(Some(PaginationValue::new(5, false)), None)), vec![6, 7, 8]);
    }

    #[test]
    fn test_zero_top_and_skip_all() {
        assert!(drain_ids(&mut top(None, Some(0))).is_empty());
        assert!(drain_ids(&mut top(Some(PaginationValue::new(20, false)), Some(30))).is_empty());
    }
}
