//! Mergers that materialize every shard row before emitting.

pub mod aggregation;
pub mod distinct;
pub mod group_by;

pub use distinct::{AggregationDistinctQueryResult, DistinctQueryResult};
pub use group_by::GroupByMemoryMergedResult;
