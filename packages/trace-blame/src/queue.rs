//! Records waiting to be shown to the user.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::record::BugRecord;

/// Insertion-ordered queue shared between workers and the presentation layer.
#[derive(Debug, Default)]
pub struct PendingQueue {
    records: Mutex<Vec<Arc<BugRecord>>>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: Arc<BugRecord>) {
        self.records.lock().push(record);
    }

    /// Drops `record` if it is still queued. Returns whether it was found.
    pub fn remove(&self, record: &Arc<BugRecord>) -> bool {
        let mut records = self.records.lock();
        match records.iter().position(|queued| Arc::ptr_eq(queued, record)) {
            Some(index) => {
                records.remove(index);
                true
            }
            None => false,
        }
    }

    /// Removes and returns the first record whose resolution has finished.
    pub fn take_next_ready(&self) -> Option<Arc<BugRecord>> {
        let mut records = self.records.lock();
        let index = records.iter().position(|record| record.is_ready())?;
        Some(records.remove(index))
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}
