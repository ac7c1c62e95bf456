//! A reusable presentation record for one chat message.
//!
//! Records are constructed once and then cycle between Bound and Unbound any
//! number of times. While Bound a record exclusively owns the media resource
//! of its message. Disposal is terminal.
//!
//! ```text
//! Unbound --bind--> Bound --unbind--> Unbound --dispose--> Disposed
//! Bound --bind (implicit unbind)--> Bound
//! ```

use std::rc::Rc;

use chrono::{DateTime, SecondsFormat, Utc};

use super::schedule::FrameRequestId;
use super::{FeedContext, SurfaceId, next_surface_id};
use crate::avatar::Avatar;
use crate::chat::ChatMessage;
use crate::error::{Error, Result};
use crate::export::{ExportReceiver, ExportRequest};
use crate::media::{MediaId, MediaResourceHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Unbound,
    Bound,
    Disposed,
}

/// Playback change applied by a coalesced visibility transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playback {
    Play,
    Pause,
}

/// State of the per-message moderation dropdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverflowMenu {
    disabled: bool,
    open: bool,
}

impl OverflowMenu {
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn close(&mut self) {
        self.open = false;
    }
}

pub struct MessageRecord {
    ctx: Rc<FeedContext>,
    surface: SurfaceId,
    state: RecordState,
    key: Option<String>,
    user_id: Option<String>,
    text: String,
    sent_at: Option<DateTime<Utc>>,
    time_label: String,
    time_attr: String,
    media: Option<MediaResourceHandle>,
    avatar: Option<Avatar>,
    is_visible: bool,
    pending_visibility: Option<FrameRequestId>,
    menu: OverflowMenu,
    save_enabled: bool,
    /// Bumped on every bind; lets late callbacks tell which binding they belong to.
    generation: u64,
}

impl std::fmt::Debug for MessageRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRecord")
            .field("surface", &self.surface)
            .field("state", &self.state)
            .field("key", &self.key)
            .field("user_id", &self.user_id)
            .field("media", &self.media)
            .field("is_visible", &self.is_visible)
            .finish()
    }
}

impl MessageRecord {
    pub fn new(ctx: Rc<FeedContext>) -> Self {
        let surface = next_surface_id();
        tracing::trace!("record {:?} constructed", surface);
        Self {
            ctx,
            surface,
            state: RecordState::Unbound,
            key: None,
            user_id: None,
            text: String::new(),
            sent_at: None,
            time_label: String::new(),
            time_attr: String::new(),
            media: None,
            avatar: None,
            is_visible: false,
            pending_visibility: None,
            menu: OverflowMenu::default(),
            save_enabled: true,
            generation: 0,
        }
    }

    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    pub fn is_bound(&self) -> bool {
        self.state == RecordState::Bound
    }

    pub fn is_disposed(&self) -> bool {
        self.state == RecordState::Disposed
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.sent_at
    }

    /// Human-readable send time.
    pub fn time_label(&self) -> &str {
        &self.time_label
    }

    /// Machine-readable (RFC 3339) send time.
    pub fn time_attr(&self) -> &str {
        &self.time_attr
    }

    pub fn media_id(&self) -> Option<MediaId> {
        self.media.as_ref().map(MediaResourceHandle::id)
    }

    pub fn avatar(&self) -> Option<&Avatar> {
        self.avatar.as_ref()
    }

    pub fn is_visible(&self) -> bool {
        self.is_visible
    }

    pub fn has_pending_visibility(&self) -> bool {
        self.pending_visibility.is_some()
    }

    pub fn menu(&self) -> &OverflowMenu {
        &self.menu
    }

    pub fn save_enabled(&self) -> bool {
        self.save_enabled
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Bind `chat` to this record, replacing any current binding.
    ///
    /// If the media resource cannot be created the record is left Unbound.
    pub fn bind(&mut self, chat: &ChatMessage, local_user_id: &str) -> Result<()> {
        self.ensure_not_disposed()?;
        self.unbind()?;
        let media = MediaResourceHandle::create(&self.ctx.services.media, &chat.media)?;
        self.attach(chat, media, local_user_id);
        Ok(())
    }

    /// Bind `chat` with a media resource the caller already created.
    pub(crate) fn bind_with_media(
        &mut self,
        chat: &ChatMessage,
        media: MediaResourceHandle,
        local_user_id: &str,
    ) -> Result<()> {
        self.ensure_not_disposed()?;
        self.unbind()?;
        self.attach(chat, media, local_user_id);
        Ok(())
    }

    fn attach(&mut self, chat: &ChatMessage, media: MediaResourceHandle, local_user_id: &str) {
        self.media = Some(media);

        self.text = chat.text.clone();
        self.sent_at = Some(chat.sent_at);
        self.time_attr = chat.sent_at.to_rfc3339_opts(SecondsFormat::Millis, true);
        self.time_label = self.ctx.services.clock.format(chat.sent_at);

        if chat.user_id == local_user_id {
            // no mute menu for yourself
            self.menu.disabled = true;
        }
        self.user_id = Some(chat.user_id.clone());
        self.render_avatar();

        self.key = Some(chat.key.clone());
        self.state = RecordState::Bound;
        self.generation += 1;
        tracing::trace!("record {:?} bound to {}", self.surface, chat.key);
    }

    /// Re-render the avatar for the current user and theme.
    pub fn refresh_identicon(&mut self) -> Result<()> {
        self.ensure_not_disposed()?;
        if !self.is_bound() {
            return Err(Error::InvalidState(
                "identicon refresh requires a bound record".into(),
            ));
        }
        self.render_avatar();
        Ok(())
    }

    pub fn unbind(&mut self) -> Result<()> {
        self.ensure_not_disposed()?;

        if let Some(request) = self.pending_visibility.take() {
            self.ctx.frames.borrow_mut().cancel(request);
        }

        self.user_id = None;
        self.key = None;
        self.menu.close();
        self.is_visible = false;

        if let Some(media) = self.media.take() {
            media.release();
        }

        self.text.clear();
        self.sent_at = None;
        self.time_label.clear();
        self.time_attr.clear();
        self.avatar = None;
        self.menu.disabled = false;
        self.save_enabled = true;
        if self.state == RecordState::Bound {
            tracing::trace!("record {:?} unbound", self.surface);
        }
        self.state = RecordState::Unbound;
        Ok(())
    }

    /// Permanently retire an Unbound record.
    pub fn dispose(&mut self) -> Result<()> {
        self.ensure_not_disposed()?;
        if self.is_bound() {
            return Err(Error::InvalidState("cannot dispose a bound record".into()));
        }
        self.state = RecordState::Disposed;
        tracing::trace!("record {:?} disposed", self.surface);
        Ok(())
    }

    /// Set the target visibility and schedule one coalesced play/pause.
    ///
    /// The transition reads `is_visible` when it fires, so any number of flips
    /// before the next tick result in a single toggle to the final value.
    pub fn update_visibility(&mut self, visible: bool) -> Result<()> {
        self.ensure_not_disposed()?;
        self.is_visible = visible;

        if self.pending_visibility.is_none() {
            let request = self.ctx.frames.borrow_mut().request(self.surface);
            self.pending_visibility = Some(request);
        }
        Ok(())
    }

    /// Run the coalesced transition `request` if it is still the pending one.
    pub(crate) fn fire_visibility(&mut self, request: FrameRequestId) -> Option<Playback> {
        if self.pending_visibility != Some(request) {
            return None;
        }
        self.pending_visibility = None;
        let media = self.media.as_ref()?;

        if self.is_visible {
            if let Err(e) = media.play() {
                tracing::warn!("Failed to play media for {:?}: {}", self.key, e);
            }
            Some(Playback::Play)
        } else {
            media.pause();
            Some(Playback::Pause)
        }
    }

    /// Start exporting the bound video as an animated image.
    ///
    /// Returns `None` when there is nothing to export or an export is already
    /// running (the trigger is disabled until it finishes).
    pub fn save_as_animated_image(&mut self) -> Result<Option<ExportReceiver>> {
        self.ensure_not_disposed()?;
        if !self.save_enabled {
            return Ok(None);
        }
        let Some(media) = self.media.as_ref() else {
            tracing::warn!("save requested on unbound record {:?}", self.surface);
            return Ok(None);
        };

        let request = ExportRequest {
            media: media.id(),
            mime: media.mime().to_string(),
            frame_count: self.ctx.export_frame_count,
        };
        self.save_enabled = false;
        Ok(Some(self.ctx.services.exporter.export(request)))
    }

    /// Re-enable the save trigger once the export started under `generation` ends.
    pub(crate) fn finish_export(&mut self, generation: u64) {
        if self.is_bound() && self.generation == generation {
            self.save_enabled = true;
        }
    }

    /// Open the moderation menu. Returns false if it is disabled.
    pub fn open_menu(&mut self) -> Result<bool> {
        self.ensure_not_disposed()?;
        if !self.is_bound() || self.menu.disabled {
            return Ok(false);
        }
        self.menu.open = true;
        Ok(true)
    }

    /// The moderation "mute" action: the author to report, if any.
    pub fn mute(&self) -> Result<Option<String>> {
        self.ensure_not_disposed()?;
        if self.menu.disabled {
            return Ok(None);
        }
        Ok(self.user_id.clone())
    }

    fn render_avatar(&mut self) {
        if let Some(user_id) = &self.user_id {
            let theme = self.ctx.theme.get();
            self.avatar = Some(self.ctx.services.avatars.generate(user_id, theme));
        }
    }

    fn ensure_not_disposed(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatMessage;
    use crate::feed::Collaborators;
    use crate::media::{InMemoryMedia, MediaPayload};
    use crate::theme::Theme;
    use chrono::TimeZone;

    fn setup() -> (Rc<InMemoryMedia>, Rc<FeedContext>) {
        let media = Rc::new(InMemoryMedia::new());
        let ctx = FeedContext::new(Collaborators::new(media.clone()), Theme::Light);
        (media, ctx)
    }

    fn chat(key: &str, user: &str) -> ChatMessage {
        ChatMessage::new(
            key,
            user,
            "hello",
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            MediaPayload::new(vec![1, 2, 3], "video/webm"),
        )
    }

    #[test]
    fn test_bind_sets_fields() {
        let (media, ctx) = setup();
        let mut record = MessageRecord::new(ctx);
        record.bind(&chat("k1", "u1"), "me").unwrap();
        assert!(record.is_bound());
        assert_eq!(record.key(), Some("k1"));
        assert_eq!(record.user_id(), Some("u1"));
        assert_eq!(record.text(), "hello");
        assert_eq!(record.time_attr(), "2024-01-02T03:04:05.000Z");
        assert!(record.avatar().is_some());
        assert!(!record.menu().is_disabled());
        assert_eq!(media.live_count(), 1);
        assert_eq!(record.generation(), 1);
    }

    #[test]
    fn test_self_message_disables_menu() {
        let (_, ctx) = setup();
        let mut record = MessageRecord::new(ctx);
        record.bind(&chat("k1", "me"), "me").unwrap();
        assert!(record.menu().is_disabled());
        assert!(!record.open_menu().unwrap());
        assert_eq!(record.mute().unwrap(), None);
        record.unbind().unwrap();
        assert!(!record.menu().is_disabled());
    }

    #[test]
    fn test_rebind_releases_previous_media() {
        let (media, ctx) = setup();
        let mut record = MessageRecord::new(ctx);
        record.bind(&chat("k1", "u1"), "me").unwrap();
        let first = record.media_id().unwrap();
        record.bind(&chat("k2", "u2"), "me").unwrap();
        assert_ne!(record.media_id(), Some(first));
        assert!(media.get(first).is_none());
        assert_eq!(media.live_count(), 1);
        assert_eq!(media.stats().released, 1);
    }

    #[test]
    fn test_unbind_closes_menu() {
        let (_, ctx) = setup();
        let mut record = MessageRecord::new(ctx);
        record.bind(&chat("k1", "u1"), "me").unwrap();
        assert!(record.open_menu().unwrap());
        assert!(record.menu().is_open());
        record.unbind().unwrap();
        assert!(!record.menu().is_open());
        assert_eq!(record.key(), None);
        assert_eq!(record.user_id(), None);
        assert!(record.avatar().is_none());
    }

    #[test]
    fn test_bind_failure_leaves_record_unbound() {
        let (media, ctx) = setup();
        let mut record = MessageRecord::new(ctx);
        let mut bad = chat("k1", "u1");
        bad.media.mime = "text/plain".into();
        assert!(matches!(record.bind(&bad, "me"), Err(Error::Media(_))));
        assert_eq!(record.state(), RecordState::Unbound);
        assert_eq!(media.live_count(), 0);
        record.bind(&chat("k2", "u1"), "me").unwrap();
        assert!(record.is_bound());
    }

    #[test]
    fn test_refresh_identicon_requires_bound() {
        let (_, ctx) = setup();
        let mut record = MessageRecord::new(ctx);
        assert!(matches!(record.refresh_identicon(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_export_guard() {
        let (_, ctx) = setup();
        let mut record = MessageRecord::new(ctx);
        assert!(record.save_as_animated_image().unwrap().is_none());
        record.bind(&chat("k1", "u1"), "me").unwrap();
        let rx = record.save_as_animated_image().unwrap();
        assert!(rx.is_some());
        assert!(!record.save_enabled());
        assert!(record.save_as_animated_image().unwrap().is_none());
        record.finish_export(record.generation());
        assert!(record.save_enabled());
    }

    #[test]
    fn test_stale_export_does_not_reenable_new_binding() {
        let (_, ctx) = setup();
        let mut record = MessageRecord::new(ctx);
        record.bind(&chat("k1", "u1"), "me").unwrap();
        let first_generation = record.generation();
        let _rx = record.save_as_animated_image().unwrap();
        record.bind(&chat("k2", "u1"), "me").unwrap();
        let _rx2 = record.save_as_animated_image().unwrap();
        record.finish_export(first_generation);
        assert!(!record.save_enabled());
    }

    #[test]
    fn test_disposed_record_rejects_everything() {
        let (_, ctx) = setup();
        let mut record = MessageRecord::new(ctx);
        record.bind(&chat("k1", "u1"), "me").unwrap();
        assert!(matches!(record.dispose(), Err(Error::InvalidState(_))));
        record.unbind().unwrap();
        record.dispose().unwrap();
        assert!(record.is_disposed());

        assert!(matches!(record.bind(&chat("k2", "u1"), "me"), Err(Error::Disposed)));
        assert!(matches!(record.unbind(), Err(Error::Disposed)));
        assert!(matches!(record.dispose(), Err(Error::Disposed)));
        assert!(matches!(record.update_visibility(true), Err(Error::Disposed)));
        assert!(matches!(record.save_as_animated_image(), Err(Error::Disposed)));
        assert!(matches!(record.refresh_identicon(), Err(Error::Disposed)));
        assert!(matches!(record.mute(), Err(Error::Disposed)));
    }

    #[test]
    fn test_frame_for_one_record_keeps_others_pending() {
        let (media, ctx) = setup();
        let mut a = MessageRecord::new(Rc::clone(&ctx));
        let mut b = MessageRecord::new(Rc::clone(&ctx));
        a.bind(&chat("k1", "u1"), "me").unwrap();
        b.bind(&chat("k2", "u2"), "me").unwrap();
        a.update_visibility(true).unwrap();
        b.update_visibility(true).unwrap();

        assert_eq!(ctx.run_frame([&mut a]), 1);
        assert!(b.has_pending_visibility());
        assert_eq!(ctx.pending_frames(), 1);

        b.update_visibility(true).unwrap();
        assert_eq!(ctx.run_frame([&mut b]), 1);
        assert!(media.is_playing(b.media_id().unwrap()));
        assert!(!b.has_pending_visibility());
    }

    #[test]
    fn test_visibility_coalesces_until_frame() {
        let (media, ctx) = setup();
        let mut record = MessageRecord::new(Rc::clone(&ctx));
        record.bind(&chat("k1", "u1"), "me").unwrap();
        let id = record.media_id().unwrap();

        record.update_visibility(true).unwrap();
        record.update_visibility(false).unwrap();
        record.update_visibility(true).unwrap();
        assert_eq!(ctx.pending_frames(), 1);
        assert!(!media.is_playing(id));

        assert_eq!(ctx.run_frame([&mut record]), 1);
        assert!(media.is_playing(id));
        assert!(!record.has_pending_visibility());
        assert_eq!(ctx.run_frame([&mut record]), 0);
    }

    #[test]
    fn test_unbind_cancels_pending_transition() {
        let (media, ctx) = setup();
        let mut record = MessageRecord::new(Rc::clone(&ctx));
        record.bind(&chat("k1", "u1"), "me").unwrap();
        record.update_visibility(true).unwrap();
        record.unbind().unwrap();
        assert_eq!(ctx.pending_frames(), 0);
        assert_eq!(ctx.run_frame([&mut record]), 0);
        assert_eq!(media.stats().plays, 0);
    }
}
