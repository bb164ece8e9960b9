//! Observability for the table engine
//!
//! - Structured logging (JSON lines)
//! - Atomic counters
//! - Lifecycle events and scoped begin/complete logging
//!
//! Observability is read-only: nothing here feeds back into table state.
//!
//! ```ignore
//! use compound_table::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::SortComplete, &[("column", "3")]);
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsSnapshot, TableMetrics};
pub use scope::ObservationScope;

/// Log a lifecycle event
pub fn log_event(event: Event) {
    Logger::log(event.severity(), event.as_str(), &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        log_event(Event::TableFinalized);
    }

    #[test]
    fn test_log_event_with_fields() {
        log_event_with_fields(Event::RowsAdded, &[("rows", "5")]);
    }
}
