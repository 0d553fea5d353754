use std::fmt;

use shardmerge_common::datum::{Datum, OwnedRow};
use shardmerge_common::error::{MergeError, MergeResult};
use shardmerge_common::types::{CursorState, DataType};

use crate::metadata::ResultMetadata;

/// Which merger or decorator a `MergedResult` is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergedResultKind {
    PlainStream,
    OrderedStream,
    Memory,
    LimitOffset,
    RowNumber,
    TopAndRowNumber,
}

impl MergedResultKind {
    pub fn name(&self) -> &'static str {
        match self {
            MergedResultKind::PlainStream => "plain_stream",
            MergedResultKind::OrderedStream => "ordered_stream",
            MergedResultKind::Memory => "memory",
            MergedResultKind::LimitOffset => "limit_offset",
            MergedResultKind::RowNumber => "row_number",
            MergedResultKind::TopAndRowNumber => "top_and_row_number",
        }
    }

    pub fn is_decorator(&self) -> bool {
        matches!(
            self,
            MergedResultKind::LimitOffset
                | MergedResultKind::RowNumber
                | MergedResultKind::TopAndRowNumber
        )
    }
}

impl fmt::Display for MergedResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The single logical cursor handed back to the hosting layer.
///
/// Same shape as the shard cursor: `next`, 1-based typed value access,
/// `was_null`, column metadata. Value access is only valid in
/// `CursorState::Iterating`.
pub trait MergedResult {
    fn next(&mut self) -> MergeResult<bool>;

    fn get_value(&mut self, index: usize, target: DataType) -> MergeResult<Datum>;

    fn get_value_by_label(&mut self, label: &str, target: DataType) -> MergeResult<Datum> {
        let index = self.metadata().index_of(label)?;
        self.get_value(index, target)
    }

    fn was_null(&self) -> bool;

    fn metadata(&self) -> &ResultMetadata;

    fn state(&self) -> CursorState;

    fn kind(&self) -> MergedResultKind;

    /// The cursor a decorator wraps; `None` for base mergers.
    fn decorated(&self) -> Option<&dyn MergedResult> {
        None
    }
}

/// Drain the remaining rows of a merged cursor, each column in its declared
/// kind.
pub fn collect_rows(result: &mut dyn MergedResult) -> MergeResult<Vec<OwnedRow>> {
    let types: Vec<DataType> = result
        .metadata()
        .columns()
        .iter()
        .map(|c| c.data_type)
        .collect();
    let mut rows = Vec::new();
    while result.next()? {
        let mut values = Vec::with_capacity(types.len());
        for (i, data_type) in types.iter().enumerate() {
            values.push(result.get_value(i + 1, *data_type)?);
        }
        rows.push(OwnedRow::new(values));
    }
    Ok(rows)
}

/// Names of the composed chain, outermost first.
pub fn describe_chain(result: &dyn MergedResult) -> Vec<MergedResultKind> {
    let mut chain = vec![result.kind()];
    let mut current = result.decorated();
    while let Some(inner) = current {
        chain.push(inner.kind());
        current = inner.decorated();
    }
    chain
}

/// Tag a shard cursor failure with its shard and move `state` to
/// `Exhausted`. The shard has already moved past the failed row, so the
/// merge cannot continue without losing rows.
pub(crate) fn shard_failure(state: &mut CursorState, shard: usize, err: MergeError) -> MergeError {
    let err = err.with_shard(shard);
    tracing::warn!(shard, error = %err, "shard cursor failed, aborting merge");
    *state = CursorState::Exhausted;
    err
}
