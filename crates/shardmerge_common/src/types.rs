use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MergeError, MergeResult};

/// Declared value kind of a result column, and the target kind requested
/// when reading a value back out of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Boolean,
    Int32,
    Int64,
    Float64,
    Decimal,
    Text,
    Timestamp,
    Date,
    Bytea,
}

impl DataType {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Int32 | DataType::Int64 | DataType::Float64 | DataType::Decimal
        )
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, DataType::Int32 | DataType::Int64)
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataType::Boolean => "boolean",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Float64 => "float64",
            DataType::Decimal => "decimal",
            DataType::Text => "text",
            DataType::Timestamp => "timestamp",
            DataType::Date => "date",
            DataType::Bytea => "bytea",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for DataType {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "boolean" | "bool" => Ok(DataType::Boolean),
            "int32" | "int" | "integer" => Ok(DataType::Int32),
            "int64" | "bigint" => Ok(DataType::Int64),
            "float64" | "double" | "float" => Ok(DataType::Float64),
            "decimal" | "numeric" => Ok(DataType::Decimal),
            "text" | "varchar" | "string" => Ok(DataType::Text),
            "timestamp" => Ok(DataType::Timestamp),
            "date" => Ok(DataType::Date),
            "bytea" | "bytes" => Ok(DataType::Bytea),
            other => Err(MergeError::Config(format!("unknown data type '{}'", other))),
        }
    }
}

/// Lifecycle of every merged cursor and decorator.
///
/// `Fresh` until the first `next()` returning true, `Iterating` while rows
/// are produced, `Exhausted` (terminal) after a `next()` returns false.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CursorState {
    #[default]
    Fresh,
    Iterating,
    Exhausted,
}

impl CursorState {
    /// Record the outcome of a `next()` call and hand it back.
    pub fn advance(&mut self, has_row: bool) -> bool {
        *self = if has_row {
            CursorState::Iterating
        } else {
            CursorState::Exhausted
        };
        has_row
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, CursorState::Exhausted)
    }

    /// Value accessors are only valid right after a `next()` that returned true.
    pub fn ensure_readable(&self) -> MergeResult<()> {
        match self {
            CursorState::Iterating => Ok(()),
            other => Err(MergeError::InvalidCursorState(*other)),
        }
    }
}

impl fmt::Display for CursorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorState::Fresh => f.write_str("FRESH"),
            CursorState::Iterating => f.write_str("ITERATING"),
            CursorState::Exhausted => f.write_str("EXHAUSTED"),
        }
    }
}
