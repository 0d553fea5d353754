use shardmerge_common::datum::Datum;
use shardmerge_common::error::MergeResult;
use shardmerge_common::types::{CursorState, DataType};

use super::{inner_failure, row_number_skip, skip_rows};
use crate::merged_result::{MergedResult, MergedResultKind};
use crate::metadata::ResultMetadata;
use crate::shape::PaginationValue;

/// ROWNUM-style bounds, e.g. `ROWNUM >= 3 AND ROWNUM < 6`.
///
/// Both bounds are absolute 1-based row positions; an open bound includes
/// the boundary row.
pub struct RowNumberDecoratorMergedResult {
    inner: Box<dyn MergedResult>,
    row_count: Option<PaginationValue>,
    /// Position of the next row that would be handed out.
    row_number: u64,
    skip_all: bool,
    state: CursorState,
}

impl RowNumberDecoratorMergedResult {
    pub fn new(
        mut inner: Box<dyn MergedResult>,
        offset: Option<PaginationValue>,
        row_count: Option<PaginationValue>,
    ) -> MergeResult<Self> {
        let skip = row_number_skip(offset);
        let skip_all = skip_rows(inner.as_mut(), skip)?;
        tracing::debug!(skip, skip_all, "rownum decorator positioned");
        Ok(Self {
            inner,
            row_count,
            row_number: skip.saturating_add(1),
            skip_all,
            state: CursorState::Fresh,
        })
    }

    fn within_cap(&self) -> bool {
        match self.row_count {
            None => true,
            Some(cap) if cap.bound_open => self.row_number <= cap.value,
            Some(cap) => self.row_number < cap.value,
        }
    }
}

impl MergedResult for RowNumberDecoratorMergedResult {
    fn next(&mut self) -> MergeResult<bool> {
        if self.state.is_exhausted() || self.skip_all {
            return Ok(self.state.advance(false));
        }
        let within = self.within_cap();
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
        MergedResultKind::RowNumber
    }

    fn decorated(&self) -> Option<&dyn MergedResult> {
        Some(self.inner.as_ref())
    }
}
