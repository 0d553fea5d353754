//! Already-resolved description of the logical query: grouping, ordering,
//! aggregates and pagination. Built upstream by the SQL binder.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use shardmerge_common::config::PaginationShape;
use shardmerge_common::error::MergeError;

/// A column referenced by 1-based ordinal or by label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnRef {
    Index(usize),
    Label(String),
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::Index(i) => write!(f, "#{}", i),
            ColumnRef::Label(l) => write!(f, "{}", l),
        }
    }
}

impl From<usize> for ColumnRef {
    fn from(index: usize) -> Self {
        ColumnRef::Index(index)
    }
}

impl From<&str> for ColumnRef {
    fn from(label: &str) -> Self {
        ColumnRef::Label(label.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

/// Explicit `NULLS FIRST` / `NULLS LAST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullPlacement {
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderByItem {
    pub column: ColumnRef,
    #[serde(default)]
    pub direction: OrderDirection,
    /// `None` falls back to the configured NULL ordering.
    #[serde(default)]
    pub nulls: Option<NullPlacement>,
}

impl OrderByItem {
    pub fn asc(column: impl Into<ColumnRef>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Asc,
            nulls: None,
        }
    }

    pub fn desc(column: impl Into<ColumnRef>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Desc,
            nulls: None,
        }
    }

    pub fn nulls(mut self, placement: NullPlacement) -> Self {
        self.nulls = Some(placement);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupByItem {
    pub column: ColumnRef,
}

impl GroupByItem {
    pub fn new(column: impl Into<ColumnRef>) -> Self {
        Self {
            column: column.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregationKind {
    Count,
    Sum,
    Max,
    Min,
    Avg,
    BitXor,
}

impl AggregationKind {
    pub fn name(&self) -> &'static str {
        match self {
            AggregationKind::Count => "COUNT",
            AggregationKind::Sum => "SUM",
            AggregationKind::Max => "MAX",
            AggregationKind::Min => "MIN",
            AggregationKind::Avg => "AVG",
            AggregationKind::BitXor => "BIT_XOR",
        }
    }
}

impl fmt::Display for AggregationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AggregationKind {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "COUNT" => Ok(AggregationKind::Count),
            "SUM" => Ok(AggregationKind::Sum),
            "MAX" => Ok(AggregationKind::Max),
            "MIN" => Ok(AggregationKind::Min),
            "AVG" => Ok(AggregationKind::Avg),
            "BIT_XOR" => Ok(AggregationKind::BitXor),
            other => Err(MergeError::UnsupportedAggregation(other.to_string())),
        }
    }
}

/// Extra per-shard columns requested so AVG can be re-aggregated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedColumns {
    pub count: ColumnRef,
    pub sum: ColumnRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationItem {
    pub kind: AggregationKind,
    /// Column the aggregate's result is written to, and the value it
    /// folds (or de-duplicates on, for DISTINCT).
    pub column: ColumnRef,
    #[serde(default)]
    pub distinct: bool,
    /// Required for AVG.
    #[serde(default)]
    pub derived: Option<DerivedColumns>,
}

impl AggregationItem {
    pub fn new(kind: AggregationKind, column: impl Into<ColumnRef>) -> Self {
        Self {
            kind,
            column: column.into(),
            distinct: false,
            derived: None,
        }
    }

    pub fn avg(
        column: impl Into<ColumnRef>,
        count: impl Into<ColumnRef>,
        sum: impl Into<ColumnRef>,
    ) -> Self {
        Self {
            kind: AggregationKind::Avg,
            column: column.into(),
            distinct: false,
            derived: Some(DerivedColumns {
                count: count.into(),
                sum: sum.into(),
            }),
        }
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
}

/// One pagination bound. `bound_open` marks the boundary row itself as
/// included (`ROWNUM <= n`) rather than excluded (`ROWNUM < n`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationValue {
    pub value: u64,
    #[serde(default)]
    pub bound_open: bool,
}

impl PaginationValue {
    pub fn new(value: u64, bound_open: bool) -> Self {
        Self { value, bound_open }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationSpec {
    /// `None` uses the configured dialect's shape.
    #[serde(default)]
    pub shape: Option<PaginationShape>,
    #[serde(default)]
    pub offset: Option<PaginationValue>,
    #[serde(default)]
    pub row_count: Option<PaginationValue>,
}

impl PaginationSpec {
    /// `LIMIT row_count OFFSET offset`.
    pub fn limit(offset: Option<u64>, row_count: Option<u64>) -> Self {
        Self {
            shape: Some(PaginationShape::LimitOffset),
            offset: offset.map(|v| PaginationValue::new(v, false)),
            row_count: row_count.map(|v| PaginationValue::new(v, false)),
        }
    }

    /// `ROWNUM > offset AND ROWNUM < row_count` style bounds.
    pub fn row_number(offset: Option<PaginationValue>, row_count: Option<PaginationValue>) -> Self {
        Self {
            shape: Some(PaginationShape::RowNumber),
            offset,
            row_count,
        }
    }

    /// `TOP n` with a `ROW_NUMBER()` offset.
    pub fn top(offset: Option<PaginationValue>, top: Option<u64>) -> Self {
        Self {
            shape: Some(PaginationShape::TopAndRowNumber),
            offset,
            row_count: top.map(|v| PaginationValue::new(v, false)),
        }
    }
}

/// How DISTINCT aggregate inputs reach the memory merger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistinctAccess {
    /// Shard rows are fed to the merger as they are.
    #[default]
    Grouped,
    /// Shard rows are de-duplicated and split into one synthetic row per
    /// distinct value before merging.
    Divided,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryShape {
    pub group_by: Vec<GroupByItem>,
    pub order_by: Vec<OrderByItem>,
    pub aggregations: Vec<AggregationItem>,
    pub pagination: Option<PaginationSpec>,
    pub distinct_access: DistinctAccess,
}

impl QueryShape {
    pub fn has_group_by(&self) -> bool {
        !self.group_by.is_empty()
    }

    pub fn has_aggregation(&self) -> bool {
        !self.aggregations.is_empty()
    }

    pub fn has_order_by(&self) -> bool {
        !self.order_by.is_empty()
    }
}
