//! Full-materialization merger for GROUP BY and aggregate queries.
//!
//! All shard rows are drained into memory, bucketed by group key in
//! first-seen order, folded, and finally sorted when the query orders its
//! groups.

use std::collections::{HashMap, HashSet};

use shardmerge_common::config::{DistinctScope, MergeConfig};
use shardmerge_common::datum::{Datum, OwnedRow};
use shardmerge_common::error::{MergeError, MergeResult};
use shardmerge_common::types::{CursorState, DataType};

use crate::compare::RowComparator;
use crate::memory::aggregation::{AggregationUnit, ResolvedAggregation};
use crate::merged_result::{shard_failure, MergedResult, MergedResultKind};
use crate::metadata::ResultMetadata;
use crate::query_result::QueryResult;
use crate::shape::{OrderByItem, QueryShape};

struct Group {
    /// First row seen for the group; supplies the non-aggregated columns.
    row: OwnedRow,
    units: Vec<AggregationUnit>,
    seen: Vec<HashSet<Vec<u8>>>,
}

impl Group {
    fn new(row: OwnedRow, aggregations: &[ResolvedAggregation]) -> Self {
        Self {
            row,
            units: aggregations
                .iter()
                .map(|a| AggregationUnit::new(a.kind))
                .collect(),
            seen: vec![HashSet::new(); aggregations.len()],
        }
    }

    fn finish(self, aggregations: &[ResolvedAggregation]) -> OwnedRow {
        let mut row = self.row;
        for (unit, agg) in self.units.into_iter().zip(aggregations) {
            unit.finish(agg, &mut row);
        }
        row
    }
}

pub struct GroupByMemoryMergedResult {
    rows: Vec<OwnedRow>,
    /// Index of the next row to expose.
    cursor: usize,
    metadata: ResultMetadata,
    state: CursorState,
    was_null: bool,
}

impl GroupByMemoryMergedResult {
    pub fn new(
        mut shards: Vec<Box<dyn QueryResult>>,
        metadata: ResultMetadata,
        shape: &QueryShape,
        config: &MergeConfig,
    ) -> MergeResult<Self> {
        let aggregations = ResolvedAggregation::resolve_all(&shape.aggregations, &metadata)?;
        let mut group_columns = Vec::with_capacity(shape.group_by.len());
        for item in &shape.group_by {
            let index = metadata.resolve_ref(&item.column)?;
            group_columns.push((index, metadata.is_case_sensitive(index)?));
        }
        let limit = config.gather.max_rows_buffered;

        let mut groups: Vec<Group> = Vec::new();
        let mut group_index: HashMap<Vec<u8>, usize> = HashMap::new();
        let mut shared_seen = vec![HashSet::new(); aggregations.len()];
        let mut drained = 0usize;
        let mut state = CursorState::Fresh;

        for (shard, cursor) in shards.iter_mut().enumerate() {
            loop {
                let row = match cursor.next() {
                    Ok(true) => cursor.read_row(),
                    Ok(false) => break,
                    Err(e) => Err(e),
                }
                .map_err(|e| shard_failure(&mut state, shard, e))?;

                drained += 1;
                if limit > 0 && drained > limit {
                    tracing::warn!(limit, "memory merge exceeds max_rows_buffered, aborting");
                    return Err(MergeError::ResourceLimit {
                        rows: drained,
                        limit,
                    });
                }

                let mut key = Vec::new();
                for (index, case_sensitive) in &group_columns {
                    row.column(*index)
                        .unwrap_or(&Datum::Null)
                        .encode_key(*case_sensitive, &mut key);
                }
                let slot = match group_index.get(&key) {
                    Some(slot) => *slot,
                    None => {
                        group_index.insert(key, groups.len());
                        groups.push(Group::new(row.clone(), &aggregations));
                        groups.len() - 1
                    }
                };
                let group = &mut groups[slot];
                for (i, agg) in aggregations.iter().enumerate() {
                    let seen = match config.distinct_scope {
                        DistinctScope::PerGroup => &mut group.seen[i],
                        DistinctScope::WholeResult => &mut shared_seen[i],
                    };
                    group.units[i].merge(agg, &row, seen)?;
                }
            }
        }

        // A bare aggregate over nothing still yields one row, as a single
        // database would.
        if groups.is_empty() && group_columns.is_empty() && !aggregations.is_empty() {
            let blank = OwnedRow::new(vec![Datum::Null; metadata.column_count()]);
            groups.push(Group::new(blank, &aggregations));
        }

        let group_count = groups.len();
        let mut rows: Vec<OwnedRow> = groups
            .into_iter()
            .map(|g| g.finish(&aggregations))
            .collect();

        let null_ordering = config.effective_null_ordering();
        if shape.has_order_by() {
            let comparator = RowComparator::new(&shape.order_by, &metadata, null_ordering)?;
            rows.sort_by(|a, b| comparator.compare_rows(a, b));
        } else if config.gather.sort_unordered_groups && !shape.group_by.is_empty() {
            let by_key: Vec<OrderByItem> = shape
                .group_by
                .iter()
                .map(|g| OrderByItem::asc(g.column.clone()))
                .collect();
            let comparator = RowComparator::new(&by_key, &metadata, null_ordering)?;
            rows.sort_by(|a, b| comparator.compare_rows(a, b));
        }

        tracing::debug!(
            rows_drained = drained,
            groups = group_count,
            "memory merge materialized"
        );
        shardmerge_observability::record_rows_buffered(drained, group_count);

        Ok(Self {
            rows,
            cursor: 0,
            metadata,
            state: CursorState::Fresh,
            was_null: false,
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn current_row(&self) -> MergeResult<&OwnedRow> {
        self.rows
            .get(self.cursor.wrapping_sub(1))
            .ok_or_else(|| MergeError::Internal("memory merge cursor out of range".into()))
    }
}

impl MergedResult for GroupByMemoryMergedResult {
    fn next(&mut self) -> MergeResult<bool> {
        if self.state.is_exhausted() {
            return Ok(false);
        }
        let has_row = self.cursor < self.rows.len();
        if has_row {
            self.cursor += 1;
        }
        Ok(self.state.advance(has_row))
    }

    fn get_value(&mut self, index: usize, target: DataType) -> MergeResult<Datum> {
        self.state.ensure_readable()?;
        self.metadata.check_index(index)?;
        let value = self
            .current_row()?
            .column(index)
            .cloned()
            .unwrap_or(Datum::Null);
        self.was_null = value.is_null();
        value.coerce_to(target)
    }

    fn was_null(&self) -> bool {
        self.was_null
    }

    fn metadata(&self) -> &ResultMetadata {
        &self.metadata
    }

    fn state(&self) -> CursorState {
        self.state
    }

    fn kind(&self) -> MergedResultKind {
        MergedResultKind::Memory
    }
}
