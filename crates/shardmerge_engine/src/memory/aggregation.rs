//! Folding of aggregate partials from shard rows into one value per group.

use std::collections::HashSet;

use shardmerge_common::datum::{Datum, OwnedRow};
use shardmerge_common::error::{MergeError, MergeResult};

use crate::metadata::ResultMetadata;
use crate::shape::{AggregationItem, AggregationKind};

/// An aggregation item with every column resolved to its 1-based index.
#[derive(Debug, Clone)]
pub struct ResolvedAggregation {
    pub kind: AggregationKind,
    pub distinct: bool,
    pub column: usize,
    /// (derived COUNT, derived SUM) for AVG.
    pub derived: Option<(usize, usize)>,
    case_sensitive: bool,
}

impl ResolvedAggregation {
    pub fn resolve(item: &AggregationItem, metadata: &ResultMetadata) -> MergeResult<Self> {
        let column = metadata.resolve_ref(&item.column)?;
        if item.kind == AggregationKind::BitXor && item.distinct {
            return Err(MergeError::UnsupportedAggregation(format!(
                "{}(DISTINCT ..) on column {}",
                item.kind, item.column
            )));
        }
        let derived = match (&item.derived, item.kind) {
            (Some(d), _) => Some((metadata.resolve_ref(&d.count)?, metadata.resolve_ref(&d.sum)?)),
            (None, AggregationKind::Avg) => {
                return Err(MergeError::config(format!(
                    "AVG on column {} has no derived COUNT/SUM columns",
                    item.column
                )))
            }
            (None, _) => None,
        };
        Ok(Self {
            kind: item.kind,
            distinct: item.distinct,
            column,
            derived,
            case_sensitive: metadata.is_case_sensitive(column)?,
        })
    }

    pub fn resolve_all(
        items: &[AggregationItem],
        metadata: &ResultMetadata,
    ) -> MergeResult<Vec<Self>> {
        items
            .iter()
            .map(|item| Self::resolve(item, metadata))
            .collect()
    }
}

/// Running state of one aggregate within one group.
#[derive(Debug, Clone)]
pub enum AggregationUnit {
    Count(Option<Datum>),
    Sum(Option<Datum>),
    Extreme { max: bool, value: Option<Datum> },
    BitXor(Option<Datum>),
    Avg { count: Option<Datum>, sum: Option<Datum> },
}

impl AggregationUnit {
    pub fn new(kind: AggregationKind) -> Self {
        match kind {
            AggregationKind::Count => AggregationUnit::Count(None),
            AggregationKind::Sum => AggregationUnit::Sum(None),
            AggregationKind::Max => AggregationUnit::Extreme {
                max: true,
                value: None,
            },
            AggregationKind::Min => AggregationUnit::Extreme {
                max: false,
                value: None,
            },
            AggregationKind::BitXor => AggregationUnit::BitXor(None),
            AggregationKind::Avg => AggregationUnit::Avg {
                count: None,
                sum: None,
            },
        }
    }

    /// Fold one shard row. For DISTINCT items, `seen` holds the values
    /// already counted; a row whose value is NULL or already seen is skipped.
    pub fn merge(
        &mut self,
        agg: &ResolvedAggregation,
        row: &OwnedRow,
        seen: &mut HashSet<Vec<u8>>,
    ) -> MergeResult<()> {
        let value = row.column(agg.column).unwrap_or(&Datum::Null);
        if agg.distinct {
            if value.is_null() {
                return Ok(());
            }
            let mut key = Vec::new();
            value.encode_key(agg.case_sensitive, &mut key);
            if !seen.insert(key) {
                return Ok(());
            }
        }
        match self {
            AggregationUnit::Count(acc) if agg.distinct => {
                accumulate(acc, &Datum::Int64(1), Datum::add)?;
            }
            AggregationUnit::Count(acc) | AggregationUnit::Sum(acc) => {
                accumulate(acc, value, Datum::add)?;
            }
            AggregationUnit::BitXor(acc) => {
                accumulate(acc, value, Datum::bit_xor)?;
            }
            AggregationUnit::Extreme { max, value: acc } => {
                if !value.is_null() {
                    let replace = match acc {
                        None => true,
                        Some(current) => {
                            let ord = value.cmp_values(current, agg.case_sensitive);
                            if *max {
                                ord.is_gt()
                            } else {
                                ord.is_lt()
                            }
                        }
                    };
                    if replace {
                        *acc = Some(value.clone());
                    }
                }
            }
            AggregationUnit::Avg { count, sum } => {
                if let Some((count_col, sum_col)) = agg.derived {
                    accumulate(count, row.column(count_col).unwrap_or(&Datum::Null), Datum::add)?;
                    accumulate(sum, row.column(sum_col).unwrap_or(&Datum::Null), Datum::add)?;
                }
            }
        }
        Ok(())
    }

    /// Write the final value into `row`. AVG also writes its summed derived
    /// COUNT and SUM back into their columns.
    pub fn finish(self, agg: &ResolvedAggregation, row: &mut OwnedRow) {
        match self {
            AggregationUnit::Count(acc) => {
                row.set_column(agg.column, acc.unwrap_or(Datum::Int64(0)));
            }
            AggregationUnit::Sum(acc)
            | AggregationUnit::BitXor(acc)
            | AggregationUnit::Extreme { value: acc, .. } => {
                row.set_column(agg.column, acc.unwrap_or(Datum::Null));
            }
            AggregationUnit::Avg { count, sum } => {
                let avg = match (&sum, &count) {
                    (Some(s), Some(c)) => s.div_count(c).unwrap_or(Datum::Null),
                    _ => Datum::Null,
                };
                if let Some((count_col, sum_col)) = agg.derived {
                    row.set_column(count_col, count.unwrap_or(Datum::Int64(0)));
                    row.set_column(sum_col, sum.unwrap_or(Datum::Null));
                }
                row.set_column(agg.column, avg);
            }
        }
    }
}

/// Add a non-NULL partial into the accumulator.
fn accumulate(
    acc: &mut Option<Datum>,
    value: &Datum,
    op: fn(&Datum, &Datum) -> Option<Datum>,
) -> MergeResult<()> {
    if value.is_null() {
        return Ok(());
    }
    let next = match acc.as_ref() {
        None => match value.as_i64() {
            // Normalise integer partials so every shard folds at one width.
            Some(v) if !matches!(value, Datum::Decimal(_, _)) => Some(Datum::Int64(v)),
            _ => Some(value.clone()),
        },
        Some(current) => op(current, value),
    };
    match next {
        Some(next) => {
            *acc = Some(next);
            Ok(())
        }
        None if is_numeric(value) && acc.as_ref().map_or(false, is_numeric) => {
            Err(MergeError::TypeMismatch {
                expected: "value within numeric range".into(),
                got: format!("overflow adding {}", value.type_name()),
            })
        }
        None => Err(MergeError::TypeMismatch {
            expected: "numeric".into(),
            got: value.type_name().into(),
        }),
    }
}

fn is_numeric(value: &Datum) -> bool {
    value.data_type().map_or(false, |t| t.is_numeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ColumnMetadata;
    use shardmerge_common::types::DataType;

    fn metadata() -> ResultMetadata {
        ResultMetadata::from_columns(vec![
            ColumnMetadata::new(1, "v", DataType::Int64),
            ColumnMetadata::new(2, "cnt", DataType::Int64),
            ColumnMetadata::new(3, "total", DataType::Decimal),
        ])
    }

    fn fold(item: AggregationItem, rows: &[Vec<Datum>]) -> OwnedRow {
        let agg = ResolvedAggregation::resolve(&item, &metadata()).unwrap();
        let mut unit = AggregationUnit::new(agg.kind);
        let mut seen = HashSet::new();
        for values in rows {
            unit.merge(&agg, &OwnedRow::new(values.clone()), &mut seen).unwrap();
        }
        let mut out = OwnedRow::new(vec![Datum::Null, Datum::Null, Datum::Null]);
        unit.finish(&agg, &mut out);
        out
    }

    fn v(x: i64) -> Vec<Datum> {
        vec![Datum::Int64(x), Datum::Null, Datum::Null]
    }

    #[test]
    fn test_count_sums_partials() {
        let out = fold(AggregationItem::new(AggregationKind::Count, 1), &[v(3), v(4), vec![Datum::Null; 3]]);
        assert_eq!(out.column(1), Some(&Datum::Int64(7)));
        let empty = fold(AggregationItem::new(AggregationKind::Count, 1), &[]);
        assert_eq!(empty.column(1), Some(&Datum::Int64(0)));
    }

    #[test]
    fn test_sum_skips_nulls_and_empty_is_null() {
        let out = fold(AggregationItem::new(AggregationKind::Sum, 1), &[v(3), vec![Datum::Null; 3], v(-1)]);
        assert_eq!(out.column(1), Some(&Datum::Int64(2)));
        let empty = fold(AggregationItem::new(AggregationKind::Sum, 1), &[vec![Datum::Null; 3]]);
        assert!(empty.column(1).unwrap().is_null());
    }

    #[test]
    fn test_sum_overflow_is_an_error() {
        let agg = ResolvedAggregation::resolve(
            &AggregationItem::new(AggregationKind::Sum, 3),
            &metadata(),
        )
        .unwrap();
        let mut unit = AggregationUnit::new(agg.kind);
        let mut seen = HashSet::new();
        let row = |d: Datum| OwnedRow::new(vec![Datum::Null, Datum::Null, d]);
        unit.merge(&agg, &row(Datum::Decimal(12345678901, 0)), &mut seen).unwrap();
        match unit.merge(&agg, &row(Datum::Decimal(1, 30)), &mut seen) {
            Err(MergeError::TypeMismatch { got, .. }) => assert!(got.contains("overflow")),
            other => panic!("expected overflow error, got {:?}", other),
        }
    }

    #[test]
    fn test_max_min() {
        let rows = [v(3), v(9), vec![Datum::Null; 3], v(-2)];
        let max = fold(AggregationItem::new(AggregationKind::Max, 1), &rows);
        let min = fold(AggregationItem::new(AggregationKind::Min, 1), &rows);
        assert_eq!(max.column(1), Some(&Datum::Int64(9)));
        assert_eq!(min.column(1), Some(&Datum::Int64(-2)));
    }

    #[test]
    fn test_bit_xor() {
        let out = fold(AggregationItem::new(AggregationKind::BitXor, 1), &[v(0b1100), v(0b1010)]);
        assert_eq!(out.column(1), Some(&Datum::Int64(0b0110)));
    }

    #[test]
    fn test_count_distinct() {
        let out = fold(
            AggregationItem::new(AggregationKind::Count, 1).distinct(),
            &[v(5), v(5), v(6), vec![Datum::Null; 3], v(5)],
        );
        assert_eq!(out.column(1), Some(&Datum::Int64(2)));
    }

    #[test]
    fn test_avg_uses_derived_columns() {
        // shard A: 2 rows summing to 10.00, shard B: 3 rows summing to 5.00
        let rows = [
            vec![Datum::Float64(5.0), Datum::Int64(2), Datum::Decimal(1000, 2)],
            vec![Datum::Float64(1.67), Datum::Int64(3), Datum::Decimal(500, 2)],
        ];
        let out = fold(AggregationItem::avg(1, 2, 3), &rows);
        assert_eq!(out.column(2), Some(&Datum::Int64(5)));
        assert_eq!(out.column(3), Some(&Datum::Decimal(1500, 2)));
        assert_eq!(out.column(1), Some(&Datum::Decimal(30000, 4)));
    }

    #[test]
    fn test_invalid_items() {
        let meta = metadata();
        assert!(matches!(
            ResolvedAggregation::resolve(&AggregationItem::new(AggregationKind::BitXor, 1).distinct(), &meta),
            Err(MergeError::UnsupportedAggregation(_))
        ));
        assert!(matches!(
            ResolvedAggregation::resolve(&AggregationItem::new(AggregationKind::Avg, 1), &meta),
            Err(MergeError::Config(_))
        ));
    }

    #[test]
    fn test_sum_of_text_is_type_mismatch() {
        let meta = ResultMetadata::from_columns(vec![ColumnMetadata::new(1, "s", DataType::Text)]);
        let agg = ResolvedAggregation::resolve(&AggregationItem::new(AggregationKind::Sum, 1), &meta).unwrap();
        let mut unit = AggregationUnit::new(agg.kind);
        let mut seen = HashSet::new();
        unit.merge(&agg, &OwnedRow::new(vec![Datum::Text("a".into())]), &mut seen).unwrap();
        let err = unit
            .merge(&agg, &OwnedRow::new(vec![Datum::Text("b".into())]), &mut seen)
            .unwrap_err();
        assert!(matches!(err, MergeError::TypeMismatch { .. }));
    }
}
