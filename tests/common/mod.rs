//! Shared test helpers.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use chrono::{TimeZone, Utc};
use clipfeed::avatar::{Avatar, AvatarRenderer, IdenticonRenderer};
use clipfeed::clock::UtcTimeFormatter;
use clipfeed::export::{
    ExportError, ExportReceiver, ExportRequest, ExportedImage, ImageExporter, MemoryDownloads,
};
use clipfeed::media::{InMemoryMedia, MediaPayload};
use clipfeed::telemetry::{TelemetryError, UsageTracker};
use clipfeed::theme::{Theme, ThemeBus};
use clipfeed::{ChatMessage, Collaborators, FeedConfig, MessageList, MuteSet};
use tokio::sync::oneshot;

pub const SELF_ID: &str = "me";

/// A valid chat message with a small webm payload.
pub fn chat(key: &str, user_id: &str) -> ChatMessage {
    let sent = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
    ChatMessage::new(
        key,
        user_id,
        format!("<p>{key}</p>"),
        sent,
        MediaPayload::new(vec![0x1a, 0x45, 0xdf, 0xa3], "video/webm"),
    )
}

pub fn config(capacity: usize, max_recycled: usize) -> FeedConfig {
    let mut config = FeedConfig::default();
    config.capacity = capacity;
    config.max_recycled = max_recycled;
    config.self_id = SELF_ID.to_string();
    config
}

/// Everything a test needs to poke at a mounted feed.
#[allow(dead_code)]
pub struct Harness {
    pub list: MessageList,
    pub media: Rc<InMemoryMedia>,
    pub bus: ThemeBus,
    pub mutes: MuteSet,
    pub exporter: Rc<ManualExporter>,
    pub downloads: Rc<MemoryDownloads>,
    pub avatars: Rc<CountingAvatars>,
}

#[allow(dead_code)]
pub fn setup(capacity: usize, max_recycled: usize) -> Harness {
    setup_with(config(capacity, max_recycled), |services| services)
}

/// Like `setup`, with a hook to swap collaborators.
#[allow(dead_code)]
pub fn setup_with(
    config: FeedConfig,
    customize: impl FnOnce(Collaborators) -> Collaborators,
) -> Harness {
    let media = Rc::new(InMemoryMedia::new());
    let exporter = Rc::new(ManualExporter::default());
    let downloads = Rc::new(MemoryDownloads::new());
    let avatars = Rc::new(CountingAvatars::default());
    let services = Collaborators::new(media.clone())
        .with_clock(Rc::new(UtcTimeFormatter))
        .with_exporter(exporter.clone())
        .with_downloads(downloads.clone())
        .with_avatars(avatars.clone());
    let bus = ThemeBus::new(config.theme);
    let mutes = MuteSet::new();
    let list = MessageList::new(&config, customize(services), mutes.clone(), &bus);
    Harness {
        list,
        media,
        bus,
        mutes,
        exporter,
        downloads,
        avatars,
    }
}

#[allow(dead_code)]
pub fn keys(list: &MessageList) -> Vec<String> {
    list.iter()
        .filter_map(|r| r.key().map(str::to_string))
        .collect()
}

type ExportSender = oneshot::Sender<Result<ExportedImage, ExportError>>;

/// Exporter whose requests stay pending until the test completes them.
#[derive(Default)]
pub struct ManualExporter {
    pending: RefCell<Vec<(ExportRequest, ExportSender)>>,
}

#[allow(dead_code)]
impl ManualExporter {
    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn requests(&self) -> Vec<ExportRequest> {
        self.pending.borrow().iter().map(|(r, _)| r.clone()).collect()
    }

    /// Complete the oldest pending export.
    pub fn complete(&self, result: Result<ExportedImage, ExportError>) {
        let (_, tx) = self.pending.borrow_mut().remove(0);
        let _ = tx.send(result);
    }

    /// Drop every pending sender without answering.
    pub fn abandon_all(&self) {
        self.pending.borrow_mut().clear();
    }
}

impl ImageExporter for ManualExporter {
    fn export(&self, request: ExportRequest) -> ExportReceiver {
        let (tx, rx) = oneshot::channel();
        self.pending.borrow_mut().push((request, tx));
        rx
    }
}

/// Identicon renderer that counts how often it ran.
#[derive(Default)]
pub struct CountingAvatars {
    calls: Cell<usize>,
    last_theme: Cell<Option<Theme>>,
}

#[allow(dead_code)]
impl CountingAvatars {
    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn last_theme(&self) -> Option<Theme> {
        self.last_theme.get()
    }
}

impl AvatarRenderer for CountingAvatars {
    fn generate(&self, user_id: &str, theme: Theme) -> Avatar {
        self.calls.set(self.calls.get() + 1);
        self.last_theme.set(Some(theme));
        IdenticonRenderer::default().generate(user_id, theme)
    }
}

/// Usage tracker that always fails.
#[allow(dead_code)]
pub struct FailingTracker;

impl UsageTracker for FailingTracker {
    fn on_user_muted(&self) -> Result<(), TelemetryError> {
        Err(TelemetryError("offline".into()))
    }

    fn on_save_gif(&self) -> Result<(), TelemetryError> {
        Err(TelemetryError("offline".into()))
    }
}
