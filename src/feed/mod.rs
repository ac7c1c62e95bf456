//! The live message feed: records, recycling, visibility and the list itself.

mod list;
mod pool;
mod record;
mod schedule;
mod visibility;

pub use list::{MessageList, TickReport};
pub use pool::{RecyclablePool, ReleaseOutcome};
pub use record::{MessageRecord, OverflowMenu, Playback, RecordState};
pub use schedule::{FrameRequestId, FrameScheduler};
pub use visibility::{VisibilityEntry, VisibilityTracker};

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::avatar::{AvatarRenderer, IdenticonRenderer};
use crate::clock::{LocalTimeFormatter, TimeFormatter};
use crate::export::{
    DEFAULT_FRAME_COUNT, DownloadSink, ImageExporter, MemoryDownloads, UnsupportedExporter,
};
use crate::media::MediaBackend;
use crate::telemetry::{LogTracker, UsageTracker};
use crate::theme::Theme;

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identifier of a record's rendered surface.
///
/// Assigned once when a record is constructed and kept across rebinds, so it
/// keys every side table (visibility, view attachment, pending work).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u64);

pub(crate) fn next_surface_id() -> SurfaceId {
    SurfaceId(NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed))
}

/// The live view hosting record surfaces.
pub trait FeedView {
    fn attach(&self, surface: SurfaceId);
    fn detach(&self, surface: SurfaceId);
}

/// View that tracks attached surfaces in display order.
#[derive(Debug, Default)]
pub struct MemoryView {
    attached: RefCell<Vec<SurfaceId>>,
}

impl MemoryView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attached(&self) -> Vec<SurfaceId> {
        self.attached.borrow().clone()
    }
}

impl FeedView for MemoryView {
    fn attach(&self, surface: SurfaceId) {
        self.attached.borrow_mut().push(surface);
    }

    fn detach(&self, surface: SurfaceId) {
        self.attached.borrow_mut().retain(|s| *s != surface);
    }
}

/// Set of muted user ids, shared by reference with the owning view.
///
/// Clones share the same set. `MessageList` is the only writer; everyone else
/// reads it (e.g. to pre-filter message sources).
#[derive(Debug, Clone, Default)]
pub struct MuteSet(Rc<RefCell<HashSet<String>>>);

impl MuteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_users<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(Rc::new(RefCell::new(users.into_iter().map(Into::into).collect())))
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.0.borrow().contains(user_id)
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Sorted copy of the muted ids.
    pub fn snapshot(&self) -> Vec<String> {
        let mut users: Vec<String> = self.0.borrow().iter().cloned().collect();
        users.sort();
        users
    }

    pub(crate) fn insert(&self, user_id: &str) -> bool {
        self.0.borrow_mut().insert(user_id.to_string())
    }
}

/// External collaborators used by the feed.
#[derive(Clone)]
pub struct Collaborators {
    pub media: Rc<dyn MediaBackend>,
    pub avatars: Rc<dyn AvatarRenderer>,
    pub clock: Rc<dyn TimeFormatter>,
    pub exporter: Rc<dyn ImageExporter>,
    pub downloads: Rc<dyn DownloadSink>,
    pub tracker: Rc<dyn UsageTracker>,
    pub view: Rc<dyn FeedView>,
}

impl Collaborators {
    /// Headless defaults around the given media backend.
    pub fn new(media: Rc<dyn MediaBackend>) -> Self {
        Self {
            media,
            avatars: Rc::new(IdenticonRenderer::default()),
            clock: Rc::new(LocalTimeFormatter),
            exporter: Rc::new(UnsupportedExporter),
            downloads: Rc::new(MemoryDownloads::new()),
            tracker: Rc::new(LogTracker::new()),
            view: Rc::new(MemoryView::new()),
        }
    }

    pub fn with_avatars(mut self, avatars: Rc<dyn AvatarRenderer>) -> Self {
        self.avatars = avatars;
        self
    }

    pub fn with_clock(mut self, clock: Rc<dyn TimeFormatter>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_exporter(mut self, exporter: Rc<dyn ImageExporter>) -> Self {
        self.exporter = exporter;
        self
    }

    pub fn with_downloads(mut self, downloads: Rc<dyn DownloadSink>) -> Self {
        self.downloads = downloads;
        self
    }

    pub fn with_tracker(mut self, tracker: Rc<dyn UsageTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_view(mut self, view: Rc<dyn FeedView>) -> Self {
        self.view = view;
        self
    }
}

/// State shared between a list and all of its records.
pub struct FeedContext {
    pub(crate) services: Collaborators,
    pub(crate) theme: Cell<Theme>,
    pub(crate) frames: RefCell<FrameScheduler>,
    pub(crate) export_frame_count: u32,
}

impl FeedContext {
    pub fn new(services: Collaborators, theme: Theme) -> Rc<Self> {
        Self::with_frame_count(services, theme, DEFAULT_FRAME_COUNT)
    }

    pub(crate) fn with_frame_count(
        services: Collaborators,
        theme: Theme,
        frame_count: u32,
    ) -> Rc<Self> {
        Rc::new(Self {
            services,
            theme: Cell::new(theme),
            frames: RefCell::new(FrameScheduler::new()),
            export_frame_count: frame_count,
        })
    }

    pub fn theme(&self) -> Theme {
        self.theme.get()
    }

    /// Number of coalesced transitions waiting for the next tick.
    pub fn pending_frames(&self) -> usize {
        self.frames.borrow().pending_count()
    }

    /// Run one rendering tick for records outside a list.
    ///
    /// Fires the due transitions of `records`; requests belonging to other
    /// surfaces stay queued.
    pub fn run_frame<'a>(
        &self,
        records: impl IntoIterator<Item = &'a mut MessageRecord>,
    ) -> usize {
        let mut records: Vec<&'a mut MessageRecord> = records.into_iter().collect();
        let surfaces: Vec<SurfaceId> = records.iter().map(|r| r.surface()).collect();
        let due = self.frames.borrow_mut().take_due_for(&surfaces);
        let mut fired = 0;
        for (request, surface) in due {
            let transition = records
                .iter_mut()
                .find(|r| r.surface() == surface)
                .and_then(|r| r.fire_visibility(request));
            if transition.is_some() {
                fired += 1;
            }
        }
        fired
    }
}
