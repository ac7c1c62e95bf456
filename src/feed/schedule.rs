//! Per-tick deferred callbacks (animation-frame batching).

use std::collections::VecDeque;

use super::SurfaceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRequestId(u64);

#[derive(Debug)]
struct FrameRequest {
    id: FrameRequestId,
    surface: SurfaceId,
}

/// Queue of callbacks to run on the next rendering tick.
///
/// Requests made while a tick is being processed land in the following tick,
/// because `take_due` empties the queue before any callback runs.
#[derive(Debug, Default)]
pub struct FrameScheduler {
    next_id: u64,
    queue: VecDeque<FrameRequest>,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, surface: SurfaceId) -> FrameRequestId {
        self.next_id += 1;
        let id = FrameRequestId(self.next_id);
        self.queue.push_back(FrameRequest { id, surface });
        id
    }

    /// Cancel a request. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, id: FrameRequestId) -> bool {
        let before = self.queue.len();
        self.queue.retain(|r| r.id != id);
        self.queue.len() != before
    }

    pub fn is_pending(&self, id: FrameRequestId) -> bool {
        self.queue.iter().any(|r| r.id == id)
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    pub fn take_due(&mut self) -> Vec<(FrameRequestId, SurfaceId)> {
        self.queue.drain(..).map(|r| (r.id, r.surface)).collect()
    }

    /// Like `take_due`, restricted to `surfaces`. Other requests stay queued.
    pub fn take_due_for(&mut self, surfaces: &[SurfaceId]) -> Vec<(FrameRequestId, SurfaceId)> {
        let mut due = Vec::new();
        self.queue.retain(|r| {
            if surfaces.contains(&r.surface) {
                due.push((r.id, r.surface));
                false
            } else {
                true
            }
        });
        due
    }
}
