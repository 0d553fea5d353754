use shardmerge_common::datum::Datum;
use shardmerge_common::error::MergeResult;
use shardmerge_common::types::{CursorState, DataType};

use super::{inner_failure, skip_rows};
use crate::merged_result::{MergedResult, MergedResultKind};
use crate::metadata::ResultMetadata;
use crate::shape::PaginationValue;

/// `LIMIT row_count OFFSET offset`. Boundary flags do not apply.
pub struct LimitDecoratorMergedResult {
    inner: Box<dyn MergedResult>,
    row_count: Option<u64>,
    /// Rows handed out so far.
    row_number: u64,
    skip_all: bool,
    state: CursorState,
}

impl LimitDecoratorMergedResult {
    pub fn new(
        mut inner: Box<dyn MergedResult>,
        offset: Option<PaginationValue>,
        row_count: Option<PaginationValue>,
    ) -> MergeResult<Self> {
        let skip = offset.map(|o| o.value).unwrap_or(0);
        let skip_all = skip_rows(inner.as_mut(), skip)?;
        tracing::debug!(skip, skip_all, "limit/offset decorator positioned");
        Ok(Self {
            inner,
            row_count: row_count.map(|r| r.value),
            row_number: 0,
            skip_all,
            state: CursorState::Fresh,
        })
    }
}

impl MergedResult for LimitDecoratorMergedResult {
    fn next(&mut self) -> MergeResult<bool> {
        if self.state.is_exhausted() || self.skip_all {
            return Ok(self.state.advance(false));
        }
        let has_row = match self.row_count {
            Some(cap) => {
                self.row_number += 1;
                self.row_number <= cap
                    && self
                        .inner
                        .next()
                        .map_err(|e| inner_failure(&mut self.state, e))?
            }
            None => self
                .inner
                .next()
                .map_err(|e| inner_failure(&mut self.state, e))?,
        };
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
        MergedResultKind::LimitOffset
    }

    fn decorated(&self) -> Option<&dyn MergedResult> {
        Some(self.inner.as_ref())
    }
}
