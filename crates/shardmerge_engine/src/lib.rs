//! Sharded result merging: turns N per-shard cursors of one routed query
//! into a single logical cursor with the ordering, grouping, aggregation and
//! pagination a single database would have produced.
//!
//! Entry point is [`MergeEngine::merge`].

pub mod compare;
pub mod engine;
pub mod memory;
pub mod merged_result;
pub mod metadata;
pub mod pagination;
pub mod query_result;
pub mod shape;
pub mod stream;

#[cfg(test)]
mod test_util;

pub use engine::{MergeEngine, MergeStrategy};
pub use merged_result::{collect_rows, describe_chain, MergedResult, MergedResultKind};
pub use metadata::{ColumnMetadata, ResultMetadata};
pub use query_result::{MemoryQueryResult, QueryResult};
pub use shape::{
    AggregationItem, AggregationKind, ColumnRef, DerivedColumns, DistinctAccess, GroupByItem,
    NullPlacement, OrderByItem, OrderDirection, PaginationSpec, PaginationValue, QueryShape,
};
