//! The feed's ordered, bounded, de-duplicated list of bound records.

use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use chrono::Utc;
use tokio::sync::oneshot::error::TryRecvError;

use super::pool::RecyclablePool;
use super::record::MessageRecord;
use super::visibility::VisibilityTracker;
use super::{Collaborators, FeedContext, MuteSet, SurfaceId};
use crate::chat::ChatMessage;
use crate::config::FeedConfig;
use crate::error::{Error, Result};
use crate::export::{ExportError, ExportReceiver, ExportedImage};
use crate::media::MediaResourceHandle;
use crate::theme::{Theme, ThemeBus, ThemeSubscription};

/// Work done by one `MessageList::tick`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Coalesced play/pause transitions that fired.
    pub transitions: usize,
    /// Visibility entries delivered to records.
    pub visibility_entries: usize,
    pub theme_refreshed: bool,
    pub exports_finished: usize,
}

struct PendingExport {
    surface: SurfaceId,
    generation: u64,
    rx: ExportReceiver,
}

pub struct MessageList {
    ctx: Rc<FeedContext>,
    capacity: usize,
    /// Display order (oldest first).
    order: VecDeque<SurfaceId>,
    /// Bound records by surface.
    records: HashMap<SurfaceId, MessageRecord>,
    keys: HashSet<String>,
    mutes: MuteSet,
    self_id: String,
    pool: RecyclablePool,
    visibility: VisibilityTracker,
    theme_subscription: Option<ThemeSubscription>,
    exports: Vec<PendingExport>,
    torn_down: bool,
}

impl std::fmt::Debug for MessageList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageList")
            .field("capacity", &self.capacity)
            .field("len", &self.order.len())
            .field("pooled", &self.pool.len())
            .field("self_id", &self.self_id)
            .finish()
    }
}

impl MessageList {
    /// Mount a feed. Subscribes to `theme_bus` until `teardown`.
    pub fn new(
        config: &FeedConfig,
        services: Collaborators,
        mutes: MuteSet,
        theme_bus: &ThemeBus,
    ) -> Self {
        let ctx = FeedContext::with_frame_count(
            services,
            theme_bus.current(),
            config.export_frame_count,
        );
        let capacity = config.capacity.max(1);
        Self {
            ctx,
            capacity,
            order: VecDeque::with_capacity(capacity),
            records: HashMap::with_capacity(capacity),
            keys: HashSet::with_capacity(capacity),
            mutes,
            self_id: config.self_id.clone(),
            pool: RecyclablePool::new(config.max_recycled),
            visibility: VisibilityTracker::new(),
            theme_subscription: Some(theme_bus.subscribe()),
            exports: Vec::new(),
            torn_down: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn has_messages(&self) -> bool {
        !self.order.is_empty()
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    /// The local user id becomes known once the client is connected.
    pub fn set_self_id(&mut self, self_id: impl Into<String>) {
        self.self_id = self_id.into();
    }

    pub fn mutes(&self) -> &MuteSet {
        &self.mutes
    }

    pub fn keys(&self) -> &HashSet<String> {
        &self.keys
    }

    /// Records kept for reuse.
    pub fn pooled(&self) -> usize {
        self.pool.len()
    }

    pub fn visibility(&self) -> &VisibilityTracker {
        &self.visibility
    }

    pub fn pending_exports(&self) -> usize {
        self.exports.len()
    }

    pub fn context(&self) -> &Rc<FeedContext> {
        &self.ctx
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Bound records in display order.
    pub fn iter(&self) -> impl Iterator<Item = &MessageRecord> {
        self.order.iter().filter_map(|s| self.records.get(s))
    }

    pub fn record(&self, key: &str) -> Option<&MessageRecord> {
        self.iter().find(|r| r.key() == Some(key))
    }

    pub fn record_by_surface(&self, surface: SurfaceId) -> Option<&MessageRecord> {
        self.records.get(&surface)
    }

    /// Add a message to the end of the feed.
    ///
    /// Returns `None` if the author is muted, the key is already shown, or
    /// the media could not be loaded. With `enforce_limit` the oldest records
    /// are evicted first so the capacity is never exceeded.
    pub fn add_message(
        &mut self,
        chat: &ChatMessage,
        enforce_limit: bool,
    ) -> Result<Option<&MessageRecord>> {
        self.ensure_not_torn_down()?;
        if self.mutes.contains(&chat.user_id) {
            tracing::trace!("dropping {} from muted user {}", chat.key, chat.user_id);
            return Ok(None);
        }
        if self.keys.contains(&chat.key) {
            tracing::trace!("dropping duplicate {}", chat.key);
            return Ok(None);
        }

        // a rejected payload must leave the feed unchanged
        let media = match MediaResourceHandle::create(&self.ctx.services.media, &chat.media) {
            Ok(media) => media,
            Err(e) => {
                tracing::warn!("Skipping {}: media unavailable: {}", chat.key, e);
                return Ok(None);
            }
        };

        let new_count = self.order.len() + 1;
        if enforce_limit && new_count > self.capacity {
            let overflow = (new_count - self.capacity).min(self.order.len());
            let evicted: Vec<SurfaceId> = self.order.drain(..overflow).collect();
            self.evict(evicted)?;
        }

        let mut record = self
            .pool
            .acquire()
            .unwrap_or_else(|| MessageRecord::new(Rc::clone(&self.ctx)));
        record.bind_with_media(chat, media, &self.self_id)?;

        let surface = record.surface();
        self.keys.insert(chat.key.clone());
        self.order.push_back(surface);
        self.visibility.observe(surface);
        self.ctx.services.view.attach(surface);
        self.records.insert(surface, record);
        tracing::debug!("added {} ({}/{})", chat.key, self.order.len(), self.capacity);
        Ok(self.records.get(&surface))
    }

    /// Mute `user_id` and evict all of their messages. Muting yourself is a no-op.
    ///
    /// Returns the number of records evicted.
    pub fn mute_user(&mut self, user_id: &str) -> Result<usize> {
        self.ensure_not_torn_down()?;
        if user_id == self.self_id {
            // don't mute me, me
            return Ok(0);
        }
        self.mutes.insert(user_id);
        if let Err(e) = self.ctx.services.tracker.on_user_muted() {
            tracing::debug!("mute tracking failed: {}", e);
        }

        let (evicted, kept): (Vec<SurfaceId>, Vec<SurfaceId>) =
            self.order.iter().partition(|s| {
                self.records
                    .get(*s)
                    .is_some_and(|r| r.user_id() == Some(user_id))
            });
        self.order = kept.into();
        let count = evicted.len();
        self.evict(evicted)?;
        tracing::debug!("muted {} ({} messages removed)", user_id, count);
        Ok(count)
    }

    /// The moderation menu's "mute" action on one record.
    pub fn mute_record(&mut self, surface: SurfaceId) -> Result<usize> {
        let user_id = match self.records.get(&surface) {
            Some(record) => record.mute()?,
            None => None,
        };
        match user_id {
            Some(user_id) => self.mute_user(&user_id),
            None => Ok(0),
        }
    }

    /// Re-render every avatar for `theme`, leaving bindings untouched.
    pub fn on_theme_change(&mut self, theme: Theme) -> Result<()> {
        self.ctx.theme.set(theme);
        for surface in &self.order {
            if let Some(record) = self.records.get_mut(surface) {
                record.refresh_identicon()?;
            }
        }
        Ok(())
    }

    pub fn track_save_gif(&self) {
        if let Err(e) = self.ctx.services.tracker.on_save_gif() {
            tracing::debug!("save tracking failed: {}", e);
        }
    }

    /// Start an animated-image export of a record's video.
    ///
    /// Returns false if the record is unknown or an export is already running.
    pub fn save_gif(&mut self, surface: SurfaceId) -> Result<bool> {
        let Some(record) = self.records.get_mut(&surface) else {
            return Ok(false);
        };
        let Some(rx) = record.save_as_animated_image()? else {
            return Ok(false);
        };
        let generation = record.generation();
        self.track_save_gif();
        self.exports.push(PendingExport {
            surface,
            generation,
            rx,
        });
        Ok(true)
    }

    /// Platform hook: a surface's intersection with the viewport was measured.
    pub fn report_visibility(&mut self, surface: SurfaceId, is_intersecting: bool) -> bool {
        self.visibility.report(surface, is_intersecting)
    }

    /// Run one rendering tick.
    ///
    /// Transitions scheduled during an earlier tick fire first; visibility
    /// entries delivered afterwards schedule theirs for the next tick.
    pub fn tick(&mut self) -> Result<TickReport> {
        let mut report = TickReport::default();

        let due = self.ctx.frames.borrow_mut().take_due();
        for (request, surface) in due {
            let fired = self
                .records
                .get_mut(&surface)
                .and_then(|record| record.fire_visibility(request));
            if fired.is_some() {
                report.transitions += 1;
            }
        }

        for entry in self.visibility.take_entries() {
            if let Some(record) = self.records.get_mut(&entry.surface) {
                record.update_visibility(entry.is_intersecting)?;
                report.visibility_entries += 1;
            }
        }

        let theme = self
            .theme_subscription
            .as_mut()
            .and_then(ThemeSubscription::latest);
        if let Some(theme) = theme {
            self.on_theme_change(theme)?;
            report.theme_refreshed = true;
        }

        report.exports_finished = self.poll_exports();
        Ok(report)
    }

    /// Unmount: stop observing, unsubscribe, evict and dispose everything.
    pub fn teardown(&mut self) -> Result<()> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;

        let observed = self.visibility.disconnect();
        if let Some(subscription) = self.theme_subscription.take() {
            subscription.unsubscribe();
        }
        self.exports.clear();

        let all: Vec<SurfaceId> = self.order.drain(..).collect();
        let count = all.len();
        self.evict(all)?;
        let pooled = self.pool.drain_dispose()?;
        tracing::debug!(
            "feed torn down: {} records, {} pooled, {} observed",
            count,
            pooled,
            observed
        );
        Ok(())
    }

    /// Shared eviction path for overflow, mutes and teardown.
    fn evict(&mut self, surfaces: Vec<SurfaceId>) -> Result<()> {
        let mut batch = Vec::with_capacity(surfaces.len());
        for surface in surfaces {
            let Some(mut record) = self.records.remove(&surface) else {
                continue;
            };
            if let Some(key) = record.key() {
                self.keys.remove(key);
            }
            self.visibility.unobserve(surface);
            self.ctx.services.view.detach(surface);
            record.unbind()?;
            batch.push(record);
        }
        if !batch.is_empty() {
            self.pool.release(batch)?;
        }
        Ok(())
    }

    fn poll_exports(&mut self) -> usize {
        let mut finished = 0;
        let mut still_pending = Vec::new();
        for mut pending in std::mem::take(&mut self.exports) {
            let result = match pending.rx.try_recv() {
                Ok(result) => result,
                Err(TryRecvError::Empty) => {
                    still_pending.push(pending);
                    continue;
                }
                Err(TryRecvError::Closed) => Err(ExportError::Abandoned),
            };
            finished += 1;
            self.finish_export(pending.surface, pending.generation, result);
        }
        self.exports = still_pending;
        finished
    }

    fn finish_export(
        &mut self,
        surface: SurfaceId,
        generation: u64,
        result: std::result::Result<ExportedImage, ExportError>,
    ) {
        match result {
            Ok(image) => {
                let file_name = format!("{}.gif", Utc::now().timestamp_millis());
                self.ctx.services.downloads.deliver(&file_name, &image);
                tracing::debug!("export delivered as {}", file_name);
            }
            // TODO: surface export failures to the user once there is UI for it
            Err(e) => tracing::error!("Error creating GIF: {}", e),
        }
        if let Some(record) = self.records.get_mut(&surface) {
            record.finish_export(generation);
        }
    }

    fn ensure_not_torn_down(&self) -> Result<()> {
        if self.torn_down {
            return Err(Error::InvalidState("feed has been torn down".into()));
        }
        Ok(())
    }
}

impl Drop for MessageList {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            tracing::warn!("feed teardown failed: {}", e);
        }
    }
}
