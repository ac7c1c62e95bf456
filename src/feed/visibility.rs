//! Viewport intersection tracking for record surfaces.
//!
//! The platform reports geometry through `report`; transitions are queued and
//! handed out in batches by `take_entries`, mirroring an intersection
//! observer's asynchronous callback.

use std::collections::HashMap;

use super::SurfaceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityEntry {
    pub surface: SurfaceId,
    pub is_intersecting: bool,
}

#[derive(Debug)]
pub struct VisibilityTracker {
    /// Observed surfaces and the last state reported for each.
    observed: HashMap<SurfaceId, Option<bool>>,
    queue: Vec<VisibilityEntry>,
    connected: bool,
}

impl Default for VisibilityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl VisibilityTracker {
    pub fn new() -> Self {
        Self {
            observed: HashMap::new(),
            queue: Vec::new(),
            connected: true,
        }
    }

    pub fn observe(&mut self, surface: SurfaceId) {
        if !self.connected {
            tracing::warn!("observe({:?}) on a disconnected tracker", surface);
            return;
        }
        self.observed.insert(surface, None);
    }

    /// Stop observing; queued entries for the surface are dropped.
    pub fn unobserve(&mut self, surface: SurfaceId) {
        self.observed.remove(&surface);
        self.queue.retain(|e| e.surface != surface);
    }

    pub fn is_observed(&self, surface: SurfaceId) -> bool {
        self.observed.contains_key(&surface)
    }

    pub fn observed_count(&self) -> usize {
        self.observed.len()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Record a measurement. Queues an entry only when the state changed.
    pub fn report(&mut self, surface: SurfaceId, is_intersecting: bool) -> bool {
        let Some(last) = self.observed.get_mut(&surface) else {
            return false;
        };
        if *last == Some(is_intersecting) {
            return false;
        }
        *last = Some(is_intersecting);
        self.queue.push(VisibilityEntry {
            surface,
            is_intersecting,
        });
        true
    }

    pub fn take_entries(&mut self) -> Vec<VisibilityEntry> {
        std::mem::take(&mut self.queue)
    }

    /// Unobserve everything. Returns how many surfaces were still observed.
    pub fn disconnect(&mut self) -> usize {
        let count = self.observed.len();
        self.observed.clear();
        self.queue.clear();
        self.connected = false;
        count
    }
}
