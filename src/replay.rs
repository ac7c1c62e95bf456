//! Headless replay of a scripted feed session.
//!
//! A script is a JSON array of `FeedEvent`s. Each event is applied to a
//! `MessageList` wired to in-memory collaborators, and the resulting feed can
//! be dumped as text.

use std::fmt::Write as _;
use std::path::Path;
use std::rc::Rc;

use serde::Deserialize;

use crate::chat::{ChatMessage, RawChat};
use crate::config::FeedConfig;
use crate::error::{Error, Result};
use crate::export::{DownloadSink, ImageExporter};
use crate::feed::{Collaborators, MessageList, MuteSet};
use crate::media::{InMemoryMedia, MediaStats};
use crate::telemetry::LogTracker;
use crate::theme::{Theme, ThemeBus};

fn default_true() -> bool { true }
fn default_ticks() -> u32 { 1 }

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    Message {
        chat: RawChat,
        #[serde(default = "default_true")]
        enforce_limit: bool,
    },
    Mute {
        user_id: String,
    },
    /// The mute action from a message's moderation menu.
    MuteMessage {
        key: String,
    },
    Visibility {
        key: String,
        visible: bool,
    },
    Theme {
        theme: Theme,
    },
    Tick {
        #[serde(default = "default_ticks")]
        count: u32,
    },
    SaveGif {
        key: String,
    },
    SelfId {
        user_id: String,
    },
}

pub fn parse_script(json: &str) -> Result<Vec<FeedEvent>> {
    Ok(serde_json::from_str(json)?)
}

pub fn load_script(path: &Path) -> Result<Vec<FeedEvent>> {
    let contents = std::fs::read_to_string(path)?;
    parse_script(&contents)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub added: usize,
    pub rejected: usize,
    pub malformed: usize,
    pub muted_away: usize,
    pub transitions: usize,
    pub exports_started: usize,
}

pub struct Replay {
    list: MessageList,
    media: Rc<InMemoryMedia>,
    bus: ThemeBus,
    tracker: Rc<LogTracker>,
    stats: ReplayStats,
}

impl Replay {
    pub fn new(
        config: &FeedConfig,
        exporter: Rc<dyn ImageExporter>,
        downloads: Rc<dyn DownloadSink>,
    ) -> Self {
        let media = Rc::new(InMemoryMedia::new());
        let tracker = Rc::new(LogTracker::new());
        let services = Collaborators::new(media.clone())
            .with_exporter(exporter)
            .with_downloads(downloads)
            .with_tracker(tracker.clone());
        let bus = ThemeBus::new(config.theme);
        let list = MessageList::new(config, services, MuteSet::new(), &bus);
        Self {
            list,
            media,
            bus,
            tracker,
            stats: ReplayStats::default(),
        }
    }

    pub fn list(&self) -> &MessageList {
        &self.list
    }

    pub fn media(&self) -> &InMemoryMedia {
        &self.media
    }

    pub fn tracker(&self) -> &LogTracker {
        &self.tracker
    }

    pub fn stats(&self) -> ReplayStats {
        self.stats
    }

    pub fn run(&mut self, events: Vec<FeedEvent>) -> Result<()> {
        for event in events {
            self.apply(event)?;
        }
        Ok(())
    }

    pub fn apply(&mut self, event: FeedEvent) -> Result<()> {
        match event {
            FeedEvent::Message { chat, enforce_limit } => {
                let chat = match ChatMessage::try_from(chat) {
                    Ok(chat) => chat,
                    Err(Error::MalformedMessage(reason)) => {
                        tracing::warn!("Rejected malformed message: {}", reason);
                        self.stats.malformed += 1;
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                };
                if self.list.add_message(&chat, enforce_limit)?.is_some() {
                    self.stats.added += 1;
                } else {
                    self.stats.rejected += 1;
                }
            }
            FeedEvent::Mute { user_id } => {
                self.stats.muted_away += self.list.mute_user(&user_id)?;
            }
            FeedEvent::MuteMessage { key } => {
                if let Some(surface) = self.surface_for(&key) {
                    self.stats.muted_away += self.list.mute_record(surface)?;
                }
            }
            FeedEvent::Visibility { key, visible } => {
                if let Some(surface) = self.surface_for(&key) {
                    self.list.report_visibility(surface, visible);
                }
            }
            FeedEvent::Theme { theme } => {
                self.bus.emit(theme);
            }
            FeedEvent::Tick { count } => {
                for _ in 0..count {
                    self.stats.transitions += self.list.tick()?.transitions;
                }
            }
            FeedEvent::SaveGif { key } => {
                let Some(surface) = self.surface_for(&key) else {
                    return Ok(());
                };
                if self.list.save_gif(surface)? {
                    self.stats.exports_started += 1;
                }
            }
            FeedEvent::SelfId { user_id } => self.list.set_self_id(user_id),
        }
        Ok(())
    }

    /// Text dump of the feed, one line per record in display order.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let muted = self.list.mutes().snapshot();
        let _ = writeln!(
            out,
            "feed {}/{} (pooled {}, theme {}, muted [{}])",
            self.list.len(),
            self.list.capacity(),
            self.list.pooled(),
            self.list.context().theme().as_str(),
            muted.join(", ")
        );
        for (i, record) in self.list.iter().enumerate() {
            let media = record
                .media_id()
                .map(|id| {
                    let state = if self.media.is_playing(id) { "playing" } else { "paused" };
                    format!("#{} {}", id.0, state)
                })
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                out,
                "{:>3}. {} user={} media={}{}{}",
                i + 1,
                record.key().unwrap_or("?"),
                record.user_id().unwrap_or("?"),
                media,
                if record.is_visible() { " visible" } else { "" },
                if record.menu().is_disabled() { " self" } else { "" },
            );
        }
        out
    }

    /// Tear the feed down and return the final media counters.
    pub fn finish(mut self) -> Result<MediaStats> {
        self.list.teardown()?;
        Ok(self.media.stats())
    }

    fn surface_for(&self, key: &str) -> Option<crate::feed::SurfaceId> {
        self.list.record(key).map(|r| r.surface())
    }
}
