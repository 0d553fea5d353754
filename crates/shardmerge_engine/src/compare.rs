//! Multi-key row comparison shared by the ordered stream merger and the
//! group sort of the memory merger.

use std::cmp::Ordering;

use shardmerge_common::config::NullOrdering;
use shardmerge_common::datum::{Datum, OwnedRow};
use shardmerge_common::error::MergeResult;

use crate::metadata::ResultMetadata;
use crate::query_result::QueryResult;
use crate::shape::{NullPlacement, OrderByItem, OrderDirection};

/// One ORDER BY key with its column resolved and NULL placement fixed.
#[derive(Debug, Clone)]
struct SortKey {
    index: usize,
    descending: bool,
    nulls_first: bool,
    case_sensitive: bool,
}

#[derive(Debug, Clone)]
pub struct RowComparator {
    keys: Vec<SortKey>,
}

impl RowComparator {
    pub fn new(
        items: &[OrderByItem],
        metadata: &ResultMetadata,
        null_ordering: NullOrdering,
    ) -> MergeResult<Self> {
        let mut keys = Vec::with_capacity(items.len());
        for item in items {
            let index = metadata.resolve_ref(&item.column)?;
            let descending = item.direction == OrderDirection::Desc;
            let nulls_first = match item.nulls {
                Some(NullPlacement::First) => true,
                Some(NullPlacement::Last) => false,
                None => match null_ordering {
                    NullOrdering::NullsLow => !descending,
                    NullOrdering::NullsHigh => descending,
                },
            };
            keys.push(SortKey {
                index,
                descending,
                nulls_first,
                case_sensitive: metadata.is_case_sensitive(index)?,
            });
        }
        Ok(Self { keys })
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Read the sort key of the cursor's current row.
    pub fn read_key(&self, cursor: &mut dyn QueryResult) -> MergeResult<Vec<Datum>> {
        let mut key = Vec::with_capacity(self.keys.len());
        for k in &self.keys {
            key.push(cursor.get_datum(k.index)?);
        }
        Ok(key)
    }

    /// Compare two keys produced by `read_key`.
    pub fn compare_keys(&self, a: &[Datum], b: &[Datum]) -> Ordering {
        for (i, k) in self.keys.iter().enumerate() {
            let ord = k.compare(
                a.get(i).unwrap_or(&Datum::Null),
                b.get(i).unwrap_or(&Datum::Null),
            );
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Compare two full rows on the ORDER BY columns.
    pub fn compare_rows(&self, a: &OwnedRow, b: &OwnedRow) -> Ordering {
        for k in &self.keys {
            let ord = k.compare(
                a.column(k.index).unwrap_or(&Datum::Null),
                b.column(k.index).unwrap_or(&Datum::Null),
            );
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

impl SortKey {
    fn compare(&self, a: &Datum, b: &Datum) -> Ordering {
        match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) if self.nulls_first => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, true) if self.nulls_first => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ord = a.cmp_values(b, self.case_sensitive);
                if self.descending {
                    ord.reverse()
                } else {
                    ord
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ColumnMetadata;
    use shardmerge_common::types::DataType;

    fn metadata() -> ResultMetadata {
        ResultMetadata::from_columns(vec![
            ColumnMetadata::new(1, "id", DataType::Int64),
            ColumnMetadata::new(2, "name", DataType::Text).case_insensitive(),
            ColumnMetadata::new(3, "code", DataType::Text),
        ])
    }

    fn row(id: Datum, name: &str, code: &str) -> OwnedRow {
        OwnedRow::new(vec![id, Datum::Text(name.into()), Datum::Text(code.into())])
    }

    #[test]
    fn test_lexicographic_keys() {
        let cmp = RowComparator::new(
            &[OrderByItem::asc(3), OrderByItem::desc("id")],
            &metadata(),
            NullOrdering::NullsLow,
        )
        .unwrap();
        let a = row(Datum::Int64(1), "x", "a");
        let b = row(Datum::Int64(2), "x", "a");
        let c = row(Datum::Int64(0), "x", "b");
        assert_eq!(cmp.compare_rows(&a, &b), Ordering::Greater);
        assert_eq!(cmp.compare_rows(&b, &c), Ordering::Less);
        assert_eq!(cmp.compare_rows(&a, &a), Ordering::Equal);
    }

    #[test]
    fn test_null_ordering_follows_direction() {
        let meta = metadata();
        let null_row = row(Datum::Null, "x", "a");
        let one = row(Datum::Int64(1), "x", "a");

        let asc_low = RowComparator::new(&[OrderByItem::asc(1)], &meta, NullOrdering::NullsLow).unwrap();
        assert_eq!(asc_low.compare_rows(&null_row, &one), Ordering::Less);
        let desc_low = RowComparator::new(&[OrderByItem::desc(1)], &meta, NullOrdering::NullsLow).unwrap();
        assert_eq!(desc_low.compare_rows(&null_row, &one), Ordering::Greater);
        let asc_high = RowComparator::new(&[OrderByItem::asc(1)], &meta, NullOrdering::NullsHigh).unwrap();
        assert_eq!(asc_high.compare_rows(&null_row, &one), Ordering::Greater);
    }

    #[test]
    fn test_explicit_null_placement_wins() {
        let cmp = RowComparator::new(
            &[OrderByItem::desc(1).nulls(NullPlacement::First)],
            &metadata(),
            NullOrdering::NullsLow,
        )
        .unwrap();
        let null_row = row(Datum::Null, "x", "a");
        let one = row(Datum::Int64(1), "x", "a");
        assert_eq!(cmp.compare_rows(&null_row, &one), Ordering::Less);
    }

    #[test]
    fn test_case_insensitive_column() {
        let meta = metadata();
        let by_name = RowComparator::new(&[OrderByItem::asc(2)], &meta, NullOrdering::NullsLow).unwrap();
        let by_code = RowComparator::new(&[OrderByItem::asc(3)], &meta, NullOrdering::NullsLow).unwrap();
        let a = row(Datum::Int64(1), "apple", "apple");
        let b = row(Datum::Int64(1), "Banana", "Banana");
        assert_eq!(by_name.compare_rows(&a, &b), Ordering::Less);
        // Byte order puts uppercase first.
        assert_eq!(by_code.compare_rows(&a, &b), Ordering::Greater);
    }

    #[test]
    fn test_mixed_numeric_widths() {
        let cmp = RowComparator::new(&[OrderByItem::asc(1)], &metadata(), NullOrdering::NullsLow).unwrap();
        assert_eq!(
            cmp.compare_keys(&[Datum::Int32(2)], &[Datum::Decimal(150, 2)]),
            Ordering::Greater
        );
        assert_eq!(
            cmp.compare_keys(&[Datum::Int64(2)], &[Datum::Float64(2.0)]),
            Ordering::Equal
        );
    }

    #[test]
    fn test_unknown_column_rejected() {
        assert!(RowComparator::new(&[OrderByItem::asc("nope")], &metadata(), NullOrdering::NullsLow).is_err());
    }
}
