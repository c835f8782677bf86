//! Service error types.

use thiserror::Error;

/// Errors from the table service layer.
///
/// These are recovered per entry: the dispatcher captures them into the
/// entry's modification result and continues with the rest of the batch.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("tablespace not found: {tablespace}")]
    TablespaceNotFound { tablespace: String },

    #[error("table not found: {tablespace}.{table}")]
    TableNotFound { tablespace: String, table: String },

    #[error("entry already exists: {entry_hash}")]
    EntryExists { entry_hash: String },

    #[error("entry not found for old hash: {old_hash}")]
    EntryNotFound { old_hash: String },

    #[error("version conflict: stored {stored}, proposed {proposed}")]
    VersionConflict { stored: String, proposed: String },

    #[error("schema violation: {reason}")]
    SchemaViolation { reason: String },

    #[error("service unavailable: {reason}")]
    Unavailable { reason: String },
}

impl ServiceError {
    /// Returns a stable code for protocol responses and logs.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::TablespaceNotFound { .. } => "TABLESPACE_NOT_FOUND",
            ServiceError::TableNotFound { .. } => "TABLE_NOT_FOUND",
            ServiceError::EntryExists { .. } => "ENTRY_EXISTS",
            ServiceError::EntryNotFound { .. } => "ENTRY_NOT_FOUND",
            ServiceError::VersionConflict { .. } => "VERSION_CONFLICT",
            ServiceError::SchemaViolation { .. } => "SCHEMA_VIOLATION",
            ServiceError::Unavailable { .. } => "UNAVAILABLE",
        }
    }

    /// Returns whether the operation may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Unavailable { .. })
    }
}
