//! Streaming mergers: rows flow from the shard cursors without buffering.

pub mod iterator;
pub mod order_by;

pub use iterator::IteratorStreamMergedResult;
pub use order_by::OrderByStreamMergedResult;
