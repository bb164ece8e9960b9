//! # Table Change Events
//!
//! Typed change notifications fanned out to external consumers.
//!
//! Each subscriber owns an unbounded channel receiver. Publishing never
//! blocks; subscribers that dropped their receiver are pruned on the next
//! publish.

use serde::Serialize;
use tokio::sync::mpsc;

/// Kind of table change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    NewTable,
    AddRows,
    DeleteRows,
    AddColumns,
    RemoveColumns,
    ChangeColumnData,
    ChangeColumnName,
    ChangeSelection,
    ChangeExcluded,
    ChangeSortOrder,
    ChangeActiveRow,
    ChangeExtensionData,
}

/// One change notification
///
/// `specifier` is a column index, first new row/column, flag id or -1
/// depending on the kind. `mapping` carries old→new indices (-1 removed)
/// for deletions, column removals and reorders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableEvent {
    pub kind: ChangeKind,
    pub specifier: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping: Option<Vec<i64>>,
}

impl TableEvent {
    /// Event without specifier or mapping
    pub fn new(kind: ChangeKind) -> Self {
        Self {
            kind,
            specifier: -1,
            mapping: None,
        }
    }

    /// Event carrying an integer specifier
    pub fn with_specifier(kind: ChangeKind, specifier: i64) -> Self {
        Self {
            kind,
            specifier,
            mapping: None,
        }
    }

    /// Event carrying an old→new index mapping
    pub fn with_mapping(kind: ChangeKind, mapping: Vec<i64>) -> Self {
        Self {
            kind,
            specifier: -1,
            mapping: Some(mapping),
        }
    }
}

/// Receiving end of a subscription
pub type EventReceiver = mpsc::UnboundedReceiver<TableEvent>;

/// Fan-out of table change events
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<mpsc::UnboundedSender<TableEvent>>,
    published: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber
    pub fn subscribe(&mut self) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber
    ///
    /// Returns the number of subscribers reached.
    pub fn publish(&mut self, event: TableEvent) -> usize {
        self.published += 1;
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
        self.subscribers.len()
    }

    /// Live subscriber count as of the last publish
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Total events published
    pub fn published(&self) -> u64 {
        self.published
    }
}

/// Drain every pending event of `receiver` without blocking
pub fn drain(receiver: &mut EventReceiver) -> Vec<TableEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out() {
        let mut bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        let reached = bus.publish(TableEvent::with_specifier(ChangeKind::ChangeColumnData, 2));

        assert_eq!(reached, 2);
        assert_eq!(drain(&mut first).len(), 1);
        let events = drain(&mut second);
        assert_eq!(events[0].kind, ChangeKind::ChangeColumnData);
        assert_eq!(events[0].specifier, 2);
    }

    #[test]
    fn test_dropped_subscriber_pruned() {
        let mut bus = EventBus::new();
        let receiver = bus.subscribe();
        drop(receiver);

        assert_eq!(bus.publish(TableEvent::new(ChangeKind::NewTable)), 0);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.published(), 1);
    }

    #[test]
    fn test_event_serializes() {
        let event = TableEvent::with_mapping(ChangeKind::DeleteRows, vec![0, -1, 1]);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "DELETE_ROWS");
        assert_eq!(json["mapping"][1], -1);
    }
}
