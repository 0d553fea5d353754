use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MergeError, MergeResult};

/// Top-level merge engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// SQL dialect of the logical query. Decides the pagination shape and
    /// the default NULL ordering.
    pub dialect: SqlDialect,
    /// Overrides the dialect's NULL ordering when set.
    pub null_ordering: Option<NullOrdering>,
    /// Scope of DISTINCT inside aggregates.
    pub distinct_scope: DistinctScope,
    /// With exactly one shard, hand its rows through without any merger or
    /// pagination decorator (the shard already applied them).
    pub single_shard_passthrough: bool,
    pub gather: GatherConfig,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            dialect: SqlDialect::default(),
            null_ordering: None,
            distinct_scope: DistinctScope::default(),
            single_shard_passthrough: false,
            gather: GatherConfig::default(),
        }
    }
}

impl MergeConfig {
    pub fn from_toml_str(s: &str) -> MergeResult<Self> {
        toml::from_str(s).map_err(|e| MergeError::Config(format!("invalid merge config: {}", e)))
    }

    pub fn load(path: impl AsRef<Path>) -> MergeResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MergeError::Config(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content).map_err(|e| e.with_context(path.display().to_string()))
    }

    pub fn to_toml_string(&self) -> MergeResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| MergeError::Config(format!("cannot serialize merge config: {}", e)))
    }

    /// NULL ordering in effect: the explicit override, else the dialect's.
    pub fn effective_null_ordering(&self) -> NullOrdering {
        self.null_ordering
            .unwrap_or_else(|| self.dialect.default_null_ordering())
    }
}

/// Limits for the memory (full-materialization) mergers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatherConfig {
    /// Max rows drained into memory across all shards. 0 = unlimited.
    pub max_rows_buffered: usize,
    /// Sort groups by their key when the query has GROUP BY but no ORDER BY.
    /// Off keeps first-seen order.
    pub sort_unordered_groups: bool,
}

impl Default for GatherConfig {
    fn default() -> Self {
        Self {
            max_rows_buffered: 1_000_000,
            sort_unordered_groups: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SqlDialect {
    #[default]
    Mysql,
    Postgresql,
    Oracle,
    Sqlserver,
    Sql92,
}

impl SqlDialect {
    pub fn pagination_shape(&self) -> PaginationShape {
        match self {
            SqlDialect::Mysql | SqlDialect::Postgresql | SqlDialect::Sql92 => {
                PaginationShape::LimitOffset
            }
            SqlDialect::Oracle => PaginationShape::RowNumber,
            SqlDialect::Sqlserver => PaginationShape::TopAndRowNumber,
        }
    }

    /// Where the database itself places NULL when no NULLS FIRST/LAST is given.
    pub fn default_null_ordering(&self) -> NullOrdering {
        match self {
            SqlDialect::Postgresql | SqlDialect::Oracle => NullOrdering::NullsHigh,
            SqlDialect::Mysql | SqlDialect::Sqlserver | SqlDialect::Sql92 => {
                NullOrdering::NullsLow
            }
        }
    }
}

impl FromStr for SqlDialect {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(SqlDialect::Mysql),
            "postgresql" | "postgres" | "pg" => Ok(SqlDialect::Postgresql),
            "oracle" => Ok(SqlDialect::Oracle),
            "sqlserver" | "mssql" => Ok(SqlDialect::Sqlserver),
            "sql92" => Ok(SqlDialect::Sql92),
            other => Err(MergeError::Config(format!("unknown dialect '{}'", other))),
        }
    }
}

/// NULL compared against a non-NULL value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NullOrdering {
    /// NULL sorts below every value: first under ASC, last under DESC.
    NullsLow,
    /// NULL sorts above every value: last under ASC, first under DESC.
    NullsHigh,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistinctScope {
    /// `COUNT(DISTINCT x)` counts distinct values within each group.
    #[default]
    PerGroup,
    /// One seen-set shared by every group of the result.
    WholeResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaginationShape {
    LimitOffset,
    RowNumber,
    TopAndRowNumber,
}

impl FromStr for PaginationShape {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "limit-offset" | "limit" => Ok(PaginationShape::LimitOffset),
            "row-number" | "rownum" => Ok(PaginationShape::RowNumber),
            "top-and-row-number" | "top" => Ok(PaginationShape::TopAndRowNumber),
            other => Err(MergeError::Config(format!(
                "unknown pagination shape '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = MergeConfig::default();
        assert_eq!(cfg.dialect, SqlDialect::Mysql);
        assert_eq!(cfg.gather.max_rows_buffered, 1_000_000);
        assert!(!cfg.single_shard_passthrough);
        assert_eq!(cfg.effective_null_ordering(), NullOrdering::NullsLow);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg = MergeConfig::from_toml_str(
            r#"
            dialect = "postgresql"
            distinct_scope = "whole-result"

            [gather]
            max_rows_buffered = 10
            "#,
        )
        .unwrap();
        assert_eq!(cfg.dialect, SqlDialect::Postgresql);
        assert_eq!(cfg.distinct_scope, DistinctScope::WholeResult);
        assert_eq!(cfg.gather.max_rows_buffered, 10);
        assert!(!cfg.gather.sort_unordered_groups);
        assert_eq!(cfg.effective_null_ordering(), NullOrdering::NullsHigh);
    }

    #[test]
    fn test_null_ordering_override() {
        let cfg = MergeConfig::from_toml_str(
            r#"
            dialect = "oracle"
            null_ordering = "nulls-low"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.dialect.pagination_shape(), PaginationShape::RowNumber);
        assert_eq!(cfg.effective_null_ordering(), NullOrdering::NullsLow);
    }

    #[test]
    fn test_load_from_file_and_roundtrip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "dialect = \"sqlserver\"\nsingle_shard_passthrough = true").unwrap();
        let cfg = MergeConfig::load(file.path()).unwrap();
        assert_eq!(cfg.dialect, SqlDialect::Sqlserver);
        assert!(cfg.single_shard_passthrough);
        assert_eq!(
            cfg.dialect.pagination_shape(),
            PaginationShape::TopAndRowNumber
        );

        let text = cfg.to_toml_string().unwrap();
        let back = MergeConfig::from_toml_str(&text).unwrap();
        assert_eq!(back.dialect, SqlDialect::Sqlserver);
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = MergeConfig::load("/nonexistent/merge.toml").unwrap_err();
        assert!(matches!(err, MergeError::Config(_)));
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("MSSQL".parse::<SqlDialect>().unwrap(), SqlDialect::Sqlserver);
        assert_eq!(
            "rownum".parse::<PaginationShape>().unwrap(),
            PaginationShape::RowNumber
        );
        assert!("db2".parse::<SqlDialect>().is_err());
    }
}
