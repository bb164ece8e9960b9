//! Owner context
//!
//! Runs a [`CompoundTable`] on a dedicated thread. Callers on other threads
//! submit closures and block until the owner has applied them, so every
//! structural mutation happens on one thread.
//!
//! Between tasks the owner integrates finished descriptor generations. A
//! completing generation queues an empty task so an idle owner wakes up and
//! integrates it without waiting for the next caller.
//!
//! The blocking calls must not be made from inside an async runtime.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::{mpsc, oneshot};

use crate::observability::Logger;

use super::errors::{TableError, TableResult};
use super::model::CompoundTable;

type Task = Box<dyn FnOnce(&mut CompoundTable) + Send>;

/// Spawns owner threads
pub struct TableOwner;

impl TableOwner {
    /// Move `table` onto a new owner thread
    pub fn spawn(table: CompoundTable) -> TableResult<OwnerHandle> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Task>();
        let wake = sender.downgrade();

        let thread = thread::Builder::new()
            .name("table-owner".to_string())
            .spawn(move || {
                let mut table = table;
                table.set_drain_notifier(Some(Arc::new(move || {
                    if let Some(sender) = wake.upgrade() {
                        let nudge: Task = Box::new(|_: &mut CompoundTable| {});
                        sender.send(nudge).ok();
                    }
                })));
                while let Some(task) = receiver.blocking_recv() {
                    task(&mut table);
                    if let Err(err) = table.poll_descriptors() {
                        Logger::error("OWNER_DESCRIPTOR_POLL_FAILED", &[("error", &err.to_string())]);
                    }
                }
                table.set_drain_notifier(None);
                table
            })
            .map_err(|err| TableError::Internal(format!("cannot spawn owner thread: {}", err)))?;

        Ok(OwnerHandle {
            sender: Some(sender),
            thread: Some(thread),
        })
    }
}

/// Cloneless handle to an owner thread
pub struct OwnerHandle {
    sender: Option<mpsc::UnboundedSender<Task>>,
    thread: Option<JoinHandle<CompoundTable>>,
}

impl OwnerHandle {
    /// Apply `operation` on the owner thread and wait for its result
    pub fn run<R, F>(&self, operation: F) -> TableResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut CompoundTable) -> R + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(TableError::OwnerGone)?;
        let (reply, result) = oneshot::channel();
        let task: Task = Box::new(move |table| {
            reply.send(operation(table)).ok();
        });
        sender.send(task).map_err(|_| TableError::OwnerGone)?;
        result.blocking_recv().map_err(|_| TableError::OwnerGone)
    }

    /// Stop the owner thread and take the table back
    pub fn shutdown(mut self) -> TableResult<CompoundTable> {
        self.sender.take();
        let thread = self.thread.take().ok_or(TableError::OwnerGone)?;
        thread.join().map_err(|_| TableError::OwnerGone)
    }
}

impl Drop for OwnerHandle {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(thread) = self.thread.take() {
            thread.join().ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableConfig;

    #[test]
    fn test_mutations_applied_on_owner() {
        let handle = TableOwner::spawn(CompoundTable::new(TableConfig::default())).unwrap();

        handle
            .run(|table| {
                table.initialize_table(2, 1);
                table.set_total_data_at("7", 1, 0)?;
                table.finalize_table()
            })
            .unwrap()
            .unwrap();

        let name = handle
            .run(|_| std::thread::current().name().map(str::to_string))
            .unwrap();
        assert_eq!(name.as_deref(), Some("table-owner"));

        let table = handle.shutdown().unwrap();
        assert_eq!(table.total_row_count(), 2);
        assert_eq!(table.get_total_value_at(1, 0), "7");
    }

    #[test]
    fn test_panicking_task_reports_owner_gone() {
        let handle = TableOwner::spawn(CompoundTable::default()).unwrap();
        let result: TableResult<()> = handle.run(|_| panic!("boom"));
        assert_eq!(result, Err(TableError::OwnerGone));
        assert_eq!(handle.run(|table| table.total_row_count()), Err(TableError::OwnerGone));
    }
}
