//! # Compound table
//!
//! Row storage, column metadata, the flag space and everything built on it.
//!
//! Single-writer: structural mutation takes `&mut CompoundTable`. Share a
//! table between threads through [`TableOwner`].

pub mod column;
pub mod errors;
pub mod events;
pub mod flags;
pub mod hitlist;
pub mod model;
pub mod owner;
pub mod record;
pub mod visibility;

pub use column::{
    Column, ColumnId, ColumnProperties, ColumnRegistry, ColumnSummary, ColumnType,
    DescriptorBinding, DescriptorSummary, SummaryMode, SPECIAL_TYPE_COORDINATES_PREFIX,
    SPECIAL_TYPE_STRUCTURE,
};
pub(crate) use column::TypeEvidence;
pub use errors::{TableError, TableResult};
pub use events::{drain, ChangeKind, EventBus, EventReceiver, TableEvent};
pub use flags::{FlagId, FlagSpace, FLAG_COUNT};
pub use hitlist::{Hitlist, HitlistOperation, HitlistRegistry, HitlistSource};
pub use model::CompoundTable;
pub use owner::{OwnerHandle, TableOwner};
pub use record::{CellValue, Record, RecordStore};
pub use visibility::{VisibilityCompiler, VisibleRows};
