//! # Table Errors
//!
//! Error types for structural table operations.
//!
//! Per-record failures never show up here: they are counted inside the
//! descriptor scheduler and reported once per column.

use thiserror::Error;

use crate::descriptor::DescriptorError;

use super::flags::FlagId;

/// Result type for table operations
pub type TableResult<T> = Result<T, TableError>;

/// Table errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    // ==================
    // Flag Space
    // ==================
    /// All 64 flag bits are owned
    #[error("No flag available: all {0} flag bits are in use")]
    NoFlagAvailable(usize),

    /// Flag was freed or never allocated
    #[error("Flag {0} is not allocated")]
    FlagNotAllocated(FlagId),

    /// Flag is owned by the table itself or by a hitlist
    #[error("Flag {0} is reserved")]
    ReservedFlag(FlagId),

    // ==================
    // Indexing
    // ==================
    /// Row index beyond the row count
    #[error("Row {row} out of range (row count {count})")]
    RowOutOfRange { row: usize, count: usize },

    /// Column index beyond the column count
    #[error("Column {column} out of range (column count {count})")]
    ColumnOutOfRange { column: usize, count: usize },

    /// No column with this name or alias
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    // ==================
    // Hitlists
    // ==================
    /// No hitlist with this name
    #[error("Hitlist not found: {0}")]
    HitlistNotFound(String),

    /// Hitlist name already used
    #[error("Hitlist already exists: {0}")]
    HitlistExists(String),

    // ==================
    // Descriptors
    // ==================
    /// Column has no descriptor handler
    #[error("Column {0} is not a descriptor column")]
    NotDescriptorColumn(usize),

    /// Parent link cannot be resolved or is itself derived
    #[error("Invalid parent column: {0}")]
    InvalidParentColumn(String),

    /// Cells of a descriptor column are computed, neither edited nor sorted
    #[error("Column {0} holds derived values")]
    DerivedColumn(usize),

    /// Worker pool failure
    #[error("Descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    // ==================
    // Owner Context
    // ==================
    /// The owner thread has shut down
    #[error("Table owner context is gone")]
    OwnerGone,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TableError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            TableError::NoFlagAvailable(_) => "CT_NO_FLAG_AVAILABLE",
            TableError::FlagNotAllocated(_) => "CT_FLAG_NOT_ALLOCATED",
            TableError::ReservedFlag(_) => "CT_RESERVED_FLAG",
            TableError::RowOutOfRange { .. } => "CT_ROW_OUT_OF_RANGE",
            TableError::ColumnOutOfRange { .. } => "CT_COLUMN_OUT_OF_RANGE",
            TableError::ColumnNotFound(_) => "CT_COLUMN_NOT_FOUND",
            TableError::HitlistNotFound(_) => "CT_HITLIST_NOT_FOUND",
            TableError::HitlistExists(_) => "CT_HITLIST_EXISTS",
            TableError::NotDescriptorColumn(_) => "CT_NOT_DESCRIPTOR_COLUMN",
            TableError::InvalidParentColumn(_) => "CT_INVALID_PARENT_COLUMN",
            TableError::DerivedColumn(_) => "CT_DERIVED_COLUMN",
            TableError::Descriptor(err) => err.code(),
            TableError::OwnerGone => "CT_OWNER_GONE",
            TableError::Internal(_) => "CT_INTERNAL",
        }
    }

    /// Index errors and internal errors are programming errors
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TableError::RowOutOfRange { .. }
                | TableError::ColumnOutOfRange { .. }
                | TableError::Internal(_)
        )
    }

    /// Resource exhaustion is a refusal the caller may recover from
    pub fn is_refusal(&self) -> bool {
        matches!(self, TableError::NoFlagAvailable(_))
    }
}
