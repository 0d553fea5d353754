//! JSON shard fixtures: a column list plus rows of plain JSON values.
//!
//! ```json
//! {
//!   "columns": [{"label": "id", "type": "bigint"}, {"label": "name", "type": "text", "case_sensitive": false}],
//!   "rows": [[1, "alice"], [2, null]]
//! }
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use shardmerge_common::datum::{Datum, OwnedRow};
use shardmerge_common::types::DataType;
use shardmerge_engine::{ColumnMetadata, MemoryQueryResult};

#[derive(Debug, Deserialize)]
struct FixtureColumn {
    label: String,
    #[serde(rename = "type")]
    data_type: String,
    #[serde(default = "default_true")]
    case_sensitive: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ShardFixture {
    columns: Vec<FixtureColumn>,
    #[serde(default)]
    rows: Vec<Vec<serde_json::Value>>,
}

pub fn load_shard(path: &Path) -> Result<MemoryQueryResult> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading shard fixture {}", path.display()))?;
    parse_shard(&text).with_context(|| format!("parsing shard fixture {}", path.display()))
}

pub fn parse_shard(text: &str) -> Result<MemoryQueryResult> {
    let fixture: ShardFixture = serde_json::from_str(text)?;
    let mut columns = Vec::with_capacity(fixture.columns.len());
    for (i, c) in fixture.columns.into_iter().enumerate() {
        let data_type: DataType = c.data_type.parse()?;
        columns.push(ColumnMetadata {
            index: i + 1,
            label: c.label,
            data_type,
            case_sensitive: c.case_sensitive,
        });
    }

    let mut rows = Vec::with_capacity(fixture.rows.len());
    for (r, raw) in fixture.rows.into_iter().enumerate() {
        if raw.len() != columns.len() {
            bail!(
                "row {} has {} values, expected {}",
                r + 1,
                raw.len(),
                columns.len()
            );
        }
        let mut values = Vec::with_capacity(raw.len());
        for (value, column) in raw.into_iter().zip(&columns) {
            let datum = json_to_datum(value)?
                .coerce_to(column.data_type)
                .with_context(|| format!("row {} column '{}'", r + 1, column.label))?;
            values.push(datum);
        }
        rows.push(OwnedRow::new(values));
    }
    Ok(MemoryQueryResult::new(columns, rows))
}

fn json_to_datum(value: serde_json::Value) -> Result<Datum> {
    use serde_json::Value;
    Ok(match value {
        Value::Null => Datum::Null,
        Value::Bool(b) => Datum::Boolean(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Datum::Int64(i),
            None => match n.as_f64() {
                Some(f) => Datum::Float64(f),
                None => bail!("number {} out of range", n),
            },
        },
        Value::String(s) => Datum::Text(s),
        other => bail!("unsupported fixture value {}", other),
    })
}
