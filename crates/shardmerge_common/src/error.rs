use thiserror::Error;

use crate::types::CursorState;

/// Convenience alias for `Result<T, MergeError>`.
pub type MergeResult<T> = Result<T, MergeError>;

/// Error classification for the hosting layer.
///
/// - `UserError`: bad query shape, bad column reference, cursor misuse
/// - `Upstream`: a shard cursor failed or shards disagree on their schema
/// - `Transient`: a resource budget was exceeded; the query may succeed later
/// - `InternalBug`: should never happen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UserError,
    Upstream,
    Transient,
    InternalBug,
}

impl ErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::UserError => "user_error",
            ErrorKind::Upstream => "upstream",
            ErrorKind::Transient => "transient",
            ErrorKind::InternalBug => "internal",
        }
    }
}

/// Every failure of the merge engine. Any of these fails the whole logical
/// query; no partial rows are ever handed out as a result.
#[derive(Error, Debug)]
pub enum MergeError {
    /// Shard cursors disagree on column count or labels.
    #[error("Schema mismatch on shard {shard}: {reason}")]
    SchemaMismatch { shard: usize, reason: String },

    /// A shard cursor raised an error from `next()` or a value read.
    #[error("Upstream read failed ({}): {reason}", shard_label(.shard))]
    Upstream { shard: Option<usize>, reason: String },

    /// A value accessor was called while FRESH or after EXHAUSTED.
    #[error("Invalid cursor state: value accessed while {0}")]
    InvalidCursorState(CursorState),

    #[error("Unsupported aggregation: {0}")]
    UnsupportedAggregation(String),

    #[error("Column index {index} out of bounds (column count {column_count})")]
    ColumnOutOfBounds { index: usize, column_count: usize },

    #[error("Unknown column label: {0}")]
    UnknownColumn(String),

    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Gather aborted: {rows} rows exceeds max_rows_buffered limit of {limit}")]
    ResourceLimit { rows: usize, limit: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

fn shard_label(shard: &Option<usize>) -> String {
    match shard {
        Some(idx) => format!("shard {}", idx),
        None => "shard unknown".to_string(),
    }
}

impl MergeError {
    /// Construct an upstream error from inside a shard cursor implementation.
    /// The merger that drives the cursor tags it with the shard index.
    pub fn upstream(reason: impl Into<String>) -> Self {
        MergeError::Upstream {
            shard: None,
            reason: reason.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        MergeError::Config(reason.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MergeError::Upstream { .. } | MergeError::SchemaMismatch { .. } => ErrorKind::Upstream,
            MergeError::InvalidCursorState(_)
            | MergeError::UnsupportedAggregation(_)
            | MergeError::ColumnOutOfBounds { .. }
            | MergeError::UnknownColumn(_)
            | MergeError::TypeMismatch { .. }
            | MergeError::Config(_) => ErrorKind::UserError,
            MergeError::ResourceLimit { .. } => ErrorKind::Transient,
            MergeError::Internal(_) => ErrorKind::InternalBug,
        }
    }

    pub fn is_upstream(&self) -> bool {
        matches!(self.kind(), ErrorKind::Upstream)
    }

    pub fn is_user_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::UserError)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
    }

    /// Map to a SQLSTATE code for the hosting protocol layer.
    pub fn sqlstate(&self) -> &'static str {
        match self {
            MergeError::SchemaMismatch { .. } => "42804", // datatype_mismatch
            MergeError::Upstream { .. } => "58000",       // system_error
            MergeError::InvalidCursorState(_) => "24000", // invalid_cursor_state
            MergeError::UnsupportedAggregation(_) => "0A000", // feature_not_supported
            MergeError::ColumnOutOfBounds { .. } => "22023", // invalid_parameter_value
            MergeError::UnknownColumn(_) => "42703",      // undefined_column
            MergeError::TypeMismatch { .. } => "22000",   // data_exception
            MergeError::Config(_) => "F0000",             // config_file_error
            MergeError::ResourceLimit { .. } => "53000",  // insufficient_resources
            MergeError::Internal(_) => "XX000",
        }
    }

    /// Tag an upstream error with the submission index of the shard it came
    /// from. Errors already tagged, and non-upstream errors, are unchanged.
    pub fn with_shard(self, shard: usize) -> Self {
        match self {
            MergeError::Upstream {
                shard: None,
                reason,
            } => MergeError::Upstream {
                shard: Some(shard),
                reason,
            },
            other => other,
        }
    }

    /// Add context to an error, preserving its classification.
    pub fn with_context(self, ctx: impl Into<String>) -> Self {
        let ctx = ctx.into();
        match self {
            MergeError::Upstream { shard, reason } => MergeError::Upstream {
                shard,
                reason: format!("{ctx}: {reason}"),
            },
            MergeError::SchemaMismatch { shard, reason } => MergeError::SchemaMismatch {
                shard,
                reason: format!("{ctx}: {reason}"),
            },
            MergeError::Config(msg) => MergeError::Config(format!("{ctx}: {msg}")),
            MergeError::Internal(msg) => MergeError::Internal(format!("{ctx}: {msg}")),
            other => other,
        }
    }
}
