//! Bounded store of unbound records kept for reuse.

use super::MessageRecord;
use crate::error::{Error, Result};

/// What happened to a batch handed to `RecyclablePool::release`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseOutcome {
    pub retained: usize,
    pub disposed: usize,
}

/// Keeps up to `max_recycled` unbound records around; disposes the rest.
///
/// A capacity of zero turns recycling off: every released record is disposed.
#[derive(Debug, Default)]
pub struct RecyclablePool {
    max_recycled: usize,
    records: Vec<MessageRecord>,
}

impl RecyclablePool {
    pub fn new(max_recycled: usize) -> Self {
        Self {
            max_recycled,
            records: Vec::with_capacity(max_recycled),
        }
    }

    pub fn max_recycled(&self) -> usize {
        self.max_recycled
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// A pooled record, or `None` when a new one must be constructed.
    pub fn acquire(&mut self) -> Option<MessageRecord> {
        self.records.pop()
    }

    /// Take back evicted records. They must already be unbound.
    pub fn release(&mut self, records: Vec<MessageRecord>) -> Result<ReleaseOutcome> {
        if let Some(bound) = records.iter().find(|r| r.is_bound()) {
            return Err(Error::InvalidState(format!(
                "record {:?} released while still bound",
                bound.surface()
            )));
        }

        let mut outcome = ReleaseOutcome::default();
        for mut record in records {
            if record.is_disposed() {
                continue;
            }
            if self.records.len() < self.max_recycled {
                self.records.push(record);
                outcome.retained += 1;
            } else {
                record.dispose()?;
                outcome.disposed += 1;
            }
        }
        tracing::debug!(
            "pool release: {} retained, {} disposed, {} pooled",
            outcome.retained,
            outcome.disposed,
            self.records.len()
        );
        Ok(outcome)
    }

    /// Dispose every pooled record.
    pub fn drain_dispose(&mut self) -> Result<usize> {
        let count = self.records.len();
        for mut record in self.records.drain(..) {
            record.dispose()?;
        }
        Ok(count)
    }
}
