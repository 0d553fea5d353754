//! Strategy selection: picks the merger for a query shape and wraps it with
//! the pagination decorator of the dialect.

use std::fmt;

use shardmerge_common::config::{MergeConfig, PaginationShape};
use shardmerge_common::error::MergeResult;

use crate::compare::RowComparator;
use crate::memory::aggregation::ResolvedAggregation;
use crate::memory::{AggregationDistinctQueryResult, DistinctQueryResult, GroupByMemoryMergedResult};
use crate::merged_result::MergedResult;
use crate::metadata::ResultMetadata;
use crate::pagination::{
    LimitDecoratorMergedResult, RowNumberDecoratorMergedResult,
    TopAndRowNumberDecoratorMergedResult,
};
use crate::query_result::{MemoryQueryResult, QueryResult};
use crate::shape::{DistinctAccess, PaginationSpec, QueryShape};
use crate::stream::{IteratorStreamMergedResult, OrderByStreamMergedResult};

/// Base merger chosen for a query shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Concatenate shards; nothing to order or group.
    PlainStream,
    /// K-way merge of individually sorted shards.
    OrderedStream,
    /// Drain everything, group and fold in memory.
    Memory,
}

impl MergeStrategy {
    pub fn select(shape: &QueryShape) -> Self {
        if shape.has_group_by() || shape.has_aggregation() {
            MergeStrategy::Memory
        } else if shape.has_order_by() {
            MergeStrategy::OrderedStream
        } else {
            MergeStrategy::PlainStream
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MergeStrategy::PlainStream => "plain_stream",
            MergeStrategy::OrderedStream => "ordered_stream",
            MergeStrategy::Memory => "memory",
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Builds the logical cursor of one query from its shard cursors.
#[derive(Debug, Clone, Default)]
pub struct MergeEngine {
    config: MergeConfig,
}

impl MergeEngine {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Compose the merged cursor for `shards` (in submission order).
    ///
    /// Any failure fails the whole query: there is no partial result.
    pub fn merge(
        &self,
        shards: Vec<Box<dyn QueryResult>>,
        shape: &QueryShape,
    ) -> MergeResult<Box<dyn MergedResult>> {
        self.compose(shards, shape).map_err(|e| {
            tracing::warn!(error = %e, "merge failed");
            shardmerge_observability::record_merge_failure(e.kind().label());
            e
        })
    }

    fn compose(
        &self,
        shards: Vec<Box<dyn QueryResult>>,
        shape: &QueryShape,
    ) -> MergeResult<Box<dyn MergedResult>> {
        let shard_count = shards.len();
        let metadata = ResultMetadata::resolve(&shards)?;

        if self.config.single_shard_passthrough && shard_count == 1 {
            tracing::debug!("single shard, passing rows through");
            shardmerge_observability::record_merge(MergeStrategy::PlainStream.name(), "none", 1);
            return Ok(Box::new(IteratorStreamMergedResult::new(shards, metadata)));
        }

        let strategy = MergeStrategy::select(shape);
        let base = self.build_base(strategy, shards, metadata, shape)?;
        let merged = match &shape.pagination {
            Some(spec) => self.decorate(base, spec)?,
            None => base,
        };
        let decorator = if merged.kind().is_decorator() {
            merged.kind().name()
        } else {
            "none"
        };
        tracing::debug!(
            strategy = %strategy,
            decorator,
            shards = shard_count,
            "merge strategy selected"
        );
        shardmerge_observability::record_merge(strategy.name(), decorator, shard_count);
        Ok(merged)
    }

    fn build_base(
        &self,
        strategy: MergeStrategy,
        shards: Vec<Box<dyn QueryResult>>,
        metadata: ResultMetadata,
        shape: &QueryShape,
    ) -> MergeResult<Box<dyn MergedResult>> {
        let shards = match shape.distinct_access {
            DistinctAccess::Grouped => shards,
            DistinctAccess::Divided => divide_distinct(shards, &metadata, shape)?,
        };
        let null_ordering = self.config.effective_null_ordering();
        let merged: Box<dyn MergedResult> = match strategy {
            MergeStrategy::PlainStream => Box::new(IteratorStreamMergedResult::new(shards, metadata)),
            MergeStrategy::OrderedStream => {
                let comparator = RowComparator::new(&shape.order_by, &metadata, null_ordering)?;
                Box::new(OrderByStreamMergedResult::new(shards, metadata, comparator))
            }
            MergeStrategy::Memory => Box::new(GroupByMemoryMergedResult::new(
                shards,
                metadata,
                shape,
                &self.config,
            )?),
        };
        Ok(merged)
    }

    fn decorate(
        &self,
        inner: Box<dyn MergedResult>,
        spec: &PaginationSpec,
    ) -> MergeResult<Box<dyn MergedResult>> {
        let shape = spec
            .shape
            .unwrap_or_else(|| self.config.dialect.pagination_shape());
        let decorated: Box<dyn MergedResult> = match shape {
            PaginationShape::LimitOffset => Box::new(LimitDecoratorMergedResult::new(
                inner,
                spec.offset,
                spec.row_count,
            )?),
            PaginationShape::RowNumber => Box::new(RowNumberDecoratorMergedResult::new(
                inner,
                spec.offset,
                spec.row_count,
            )?),
            PaginationShape::TopAndRowNumber => Box::new(
                TopAndRowNumberDecoratorMergedResult::new(inner, spec.offset, spec.row_count)?,
            ),
        };
        Ok(decorated)
    }
}

/// De-duplicate all shard rows and split them into one synthetic cursor per
/// distinct row, with DISTINCT aggregates' derived columns filled in.
fn divide_distinct(
    shards: Vec<Box<dyn QueryResult>>,
    metadata: &ResultMetadata,
    shape: &QueryShape,
) -> MergeResult<Vec<Box<dyn QueryResult>>> {
    let aggregations = ResolvedAggregation::resolve_all(&shape.aggregations, metadata)?;
    let parts = DistinctQueryResult::new(shards)?.divide();
    tracing::debug!(parts = parts.len(), "distinct rows divided");
    let divided: Vec<Box<dyn QueryResult>> = parts
        .into_iter()
        .map(|part| {
            Box::new(AggregationDistinctQueryResult::new(part, &aggregations)) as Box<dyn QueryResult>
        })
        .collect();
    if divided.is_empty() {
        // One empty cursor keeps the column metadata for the merger.
        let empty: Box<dyn QueryResult> =
            Box::new(MemoryQueryResult::new(metadata.columns().to_vec(), Vec::new()));
        return Ok(vec![empty]);
    }
    Ok(divided)
}
