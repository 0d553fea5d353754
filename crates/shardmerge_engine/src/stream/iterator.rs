use shardmerge_common::datum::Datum;
use shardmerge_common::error::MergeResult;
use shardmerge_common::types::{CursorState, DataType};

use crate::merged_result::{shard_failure, MergedResult, MergedResultKind};
use crate::metadata::ResultMetadata;
use crate::query_result::QueryResult;

/// Concatenates shard cursors in submission order.
pub struct IteratorStreamMergedResult {
    shards: Vec<Box<dyn QueryResult>>,
    current: usize,
    metadata: ResultMetadata,
    state: CursorState,
}

impl IteratorStreamMergedResult {
    pub fn new(shards: Vec<Box<dyn QueryResult>>, metadata: ResultMetadata) -> Self {
        Self {
            shards,
            current: 0,
            metadata,
            state: CursorState::Fresh,
        }
    }
}

impl MergedResult for IteratorStreamMergedResult {
    fn next(&mut self) -> MergeResult<bool> {
        if self.state.is_exhausted() {
            return Ok(false);
        }
        while self.current < self.shards.len() {
            match self.shards[self.current].next() {
                Ok(true) => return Ok(self.state.advance(true)),
                Ok(false) => self.current += 1,
                Err(e) => return Err(shard_failure(&mut self.state, self.current, e)),
            }
        }
        Ok(self.state.advance(false))
    }

    fn get_value(&mut self, index: usize, target: DataType) -> MergeResult<Datum> {
        self.state.ensure_readable()?;
        self.metadata.check_index(index)?;
        let shard = self.current;
        self.shards[shard]
            .get_value(index, target)
            .map_err(|e| shard_failure(&mut self.state, shard, e))
    }

    fn was_null(&self) -> bool {
        self.shards
            .get(self.current)
            .map(|s| s.was_null())
            .unwrap_or(false)
    }

    fn metadata(&self) -> &ResultMetadata {
        &self.metadata
    }

    fn state(&self) -> CursorState {
        self.state
    }

    fn kind(&self) -> MergedResultKind {
        MergedResultKind::PlainStream
    }
}
