//! Lifecycle events of the table engine
//!
//! Events are explicit and typed; each maps to one stable log event name.

use std::fmt;

/// Observable engine events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Loader finished a table and analysis ran
    TableFinalized,
    /// Rows appended and analysed
    RowsAdded,
    /// Rows removed and storage compacted
    RowsDeleted,
    /// Columns appended and analysed
    ColumnsAdded,
    /// Columns removed, including dependent columns
    ColumnsRemoved,
    /// Category list dropped because of too many distinct values
    CategoryLimitExceeded,
    /// Column reclassified as binned range categories
    RangeCategoryDetected,
    /// Descriptor generation spawned its workers
    DescriptorGenerationStart,
    /// Descriptor generation drained and was integrated
    DescriptorGenerationComplete,
    /// Descriptor generation was stopped and discarded
    DescriptorGenerationCancelled,
    /// A descriptor job produced per-record failures
    DescriptorJobFailed,
    /// A descriptor worker thread panicked outside the per-record guard
    DescriptorWorkerPanicked,
    /// Full row storage reordered
    SortComplete,
    /// Flag space exhausted
    FlagSpaceExhausted,
    /// Config file loaded
    ConfigLoaded,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::TableFinalized => "TABLE_FINALIZED",
            Event::RowsAdded => "ROWS_ADDED",
            Event::RowsDeleted => "ROWS_DELETED",
            Event::ColumnsAdded => "COLUMNS_ADDED",
            Event::ColumnsRemoved => "COLUMNS_REMOVED",
            Event::CategoryLimitExceeded => "CATEGORY_LIMIT_EXCEEDED",
            Event::RangeCategoryDetected => "RANGE_CATEGORY_DETECTED",
            Event::DescriptorGenerationStart => "DESCRIPTOR_GENERATION_START",
            Event::DescriptorGenerationComplete => "DESCRIPTOR_GENERATION_COMPLETE",
            Event::DescriptorGenerationCancelled => "DESCRIPTOR_GENERATION_CANCELLED",
            Event::DescriptorJobFailed => "DESCRIPTOR_JOB_FAILED",
            Event::DescriptorWorkerPanicked => "DESCRIPTOR_WORKER_PANICKED",
            Event::SortComplete => "SORT_COMPLETE",
            Event::FlagSpaceExhausted => "FLAG_SPACE_EXHAUSTED",
            Event::ConfigLoaded => "CONFIG_LOADED",
        }
    }

    /// Returns the severity this event is logged at
    pub fn severity(&self) -> super::Severity {
        use super::Severity;
        match self {
            Event::DescriptorJobFailed | Event::FlagSpaceExhausted => Severity::Warn,
            Event::CategoryLimitExceeded | Event::RangeCategoryDetected => Severity::Trace,
            Event::DescriptorWorkerPanicked => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::Severity;

    #[test]
    fn test_event_names_are_upper_snake() {
        for event in [Event::TableFinalized, Event::DescriptorJobFailed, Event::SortComplete] {
            assert!(event
                .as_str()
                .chars()
                .all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_failure_events_warn() {
        assert_eq!(Event::DescriptorJobFailed.severity(), Severity::Warn);
        assert_eq!(Event::SortComplete.severity(), Severity::Info);
    }
}
