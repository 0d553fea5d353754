//! K-way merge of shard cursors into one globally sorted stream.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

use shardmerge_common::datum::Datum;
use shardmerge_common::error::{MergeError, MergeResult};
use shardmerge_common::types::{CursorState, DataType};

use crate::compare::RowComparator;
use crate::merged_result::{shard_failure, MergedResult, MergedResultKind};
use crate::metadata::ResultMetadata;
use crate::query_result::QueryResult;

/// The pending (not yet emitted) row of one shard. Only its sort key is
/// held; values are read from the shard cursor once it is emitted.
struct PendingRow {
    key: Vec<Datum>,
    shard: usize,
    comparator: Arc<RowComparator>,
}

impl PartialEq for PendingRow {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PendingRow {}

impl PartialOrd for PendingRow {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingRow {
    fn cmp(&self, other: &Self) -> Ordering {
        // Equal keys: the earlier-submitted shard goes first.
        self.comparator
            .compare_keys(&self.key, &other.key)
            .then(self.shard.cmp(&other.shard))
    }
}

pub struct OrderByStreamMergedResult {
    shards: Vec<Box<dyn QueryResult>>,
    comparator: Arc<RowComparator>,
    heap: BinaryHeap<Reverse<PendingRow>>,
    /// Shard whose cursor is positioned on the row being exposed.
    current: Option<usize>,
    primed: bool,
    metadata: ResultMetadata,
    state: CursorState,
}

impl OrderByStreamMergedResult {
    pub fn new(
        shards: Vec<Box<dyn QueryResult>>,
        metadata: ResultMetadata,
        comparator: RowComparator,
    ) -> Self {
        let heap = BinaryHeap::with_capacity(shards.len());
        Self {
            shards,
            comparator: Arc::new(comparator),
            heap,
            current: None,
            primed: false,
            metadata,
            state: CursorState::Fresh,
        }
    }

    /// Advance one shard and queue its next row, if any.
    fn refill(&mut self, shard: usize) -> MergeResult<()> {
        let cursor = self.shards[shard].as_mut();
        let key = match cursor.next() {
            Ok(true) => self.comparator.read_key(cursor),
            Ok(false) => return Ok(()),
            Err(e) => Err(e),
        };
        match key {
            Ok(key) => {
                self.heap.push(Reverse(PendingRow {
                    key,
                    shard,
                    comparator: Arc::clone(&self.comparator),
                }));
                Ok(())
            }
            Err(e) => Err(shard_failure(&mut self.state, shard, e)),
        }
    }
}

impl MergedResult for OrderByStreamMergedResult {
    fn next(&mut self) -> MergeResult<bool> {
        if self.state.is_exhausted() {
            return Ok(false);
        }
        if !self.primed {
            self.primed = true;
            for shard in 0..self.shards.len() {
                self.refill(shard)?;
            }
        } else if let Some(shard) = self.current.take() {
            self.refill(shard)?;
        }
        match self.heap.pop() {
            Some(Reverse(pending)) => {
                self.current = Some(pending.shard);
                Ok(self.state.advance(true))
            }
            None => Ok(self.state.advance(false)),
        }
    }

    fn get_value(&mut self, index: usize, target: DataType) -> MergeResult<Datum> {
        self.state.ensure_readable()?;
        self.metadata.check_index(index)?;
        let shard = self.current.ok_or_else(|| {
            MergeError::Internal("ordered merge has no current shard while iterating".into())
        })?;
        self.shards[shard]
            .get_value(index, target)
            .map_err(|e| shard_failure(&mut self.state, shard, e))
    }

    fn was_null(&self) -> bool {
        self.current
            .map(|shard| self.shards[shard].was_null())
            .unwrap_or(false)
    }

    fn metadata(&self) -> &ResultMetadata {
        &self.metadata
    }

    fn state(&self) -> CursorState {
        self.state
    }

    fn kind(&self) -> MergedResultKind {
        MergedResultKind::OrderedStream
    }
}
