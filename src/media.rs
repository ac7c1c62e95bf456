//! Playable media resources backing message videos.
//!
//! A `MediaBackend` turns raw bytes into a playable resource (an object URL
//! and a video element in a browser, a decoder sink natively). Resources are
//! external to the feed and must be released explicitly; `MediaResourceHandle`
//! guarantees that happens exactly once.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

/// Identifier of a live media resource inside its backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediaId(pub u64);

/// Raw media carried by a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl MediaPayload {
    pub fn new(bytes: impl Into<Vec<u8>>, mime: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime: mime.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("empty media payload")]
    Empty,

    #[error("unsupported media type: {0}")]
    Unsupported(String),

    #[error("unknown media resource {0:?}")]
    Unknown(MediaId),

    #[error("{0}")]
    Backend(String),
}

/// Resource manager for playable media.
pub trait MediaBackend {
    fn create(&self, payload: &MediaPayload) -> Result<MediaId, MediaError>;
    fn release(&self, id: MediaId);
    fn play(&self, id: MediaId) -> Result<(), MediaError>;
    fn pause(&self, id: MediaId);
}

/// Exclusive ownership of one media resource.
///
/// `release` consumes the handle; dropping an unreleased handle releases it
/// as well, so a resource can neither leak nor be released twice.
pub struct MediaResourceHandle {
    id: MediaId,
    mime: String,
    backend: Rc<dyn MediaBackend>,
    released: bool,
}

impl std::fmt::Debug for MediaResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaResourceHandle")
            .field("id", &self.id)
            .field("mime", &self.mime)
            .finish()
    }
}

impl MediaResourceHandle {
    pub fn create(
        backend: &Rc<dyn MediaBackend>,
        payload: &MediaPayload,
    ) -> Result<Self, MediaError> {
        let id = backend.create(payload)?;
        tracing::trace!("media {:?} created ({}, {} bytes)", id, payload.mime, payload.bytes.len());
        Ok(Self {
            id,
            mime: payload.mime.clone(),
            backend: Rc::clone(backend),
            released: false,
        })
    }

    pub fn id(&self) -> MediaId {
        self.id
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn play(&self) -> Result<(), MediaError> {
        self.backend.play(self.id)
    }

    pub fn pause(&self) {
        self.backend.pause(self.id);
    }

    pub fn release(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if !self.released {
            self.released = true;
            self.backend.release(self.id);
            tracing::trace!("media {:?} released", self.id);
        }
    }
}

impl Drop for MediaResourceHandle {
    fn drop(&mut self) {
        self.release_now();
    }
}

/// State of one resource held by `InMemoryMedia`.
#[derive(Debug, Clone)]
pub struct LiveMedia {
    pub mime: String,
    pub len: usize,
    pub playing: bool,
}

/// Counters kept by `InMemoryMedia`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaStats {
    pub created: u64,
    pub released: u64,
    pub double_releases: u64,
    pub plays: u64,
    pub pauses: u64,
}

#[derive(Debug, Default)]
struct InMemoryState {
    next_id: u64,
    live: HashMap<MediaId, LiveMedia>,
    stats: MediaStats,
}

/// Headless media backend that keeps resources in memory.
///
/// Accepts `video/*` and `image/*` payloads. Used by the CLI replay and as the
/// resource-tracking backend in tests.
#[derive(Debug, Default)]
pub struct InMemoryMedia {
    state: RefCell<InMemoryState>,
}

impl InMemoryMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> MediaStats {
        self.state.borrow().stats
    }

    /// Number of resources created and not yet released.
    pub fn live_count(&self) -> usize {
        self.state.borrow().live.len()
    }

    pub fn get(&self, id: MediaId) -> Option<LiveMedia> {
        self.state.borrow().live.get(&id).cloned()
    }

    pub fn is_playing(&self, id: MediaId) -> bool {
        self.state.borrow().live.get(&id).is_some_and(|m| m.playing)
    }
}

impl MediaBackend for InMemoryMedia {
    fn create(&self, payload: &MediaPayload) -> Result<MediaId, MediaError> {
        if payload.bytes.is_empty() {
            return Err(MediaError::Empty);
        }
        if !(payload.mime.starts_with("video/") || payload.mime.starts_with("image/")) {
            return Err(MediaError::Unsupported(payload.mime.clone()));
        }
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = MediaId(state.next_id);
        state.live.insert(
            id,
            LiveMedia {
                mime: payload.mime.clone(),
                len: payload.bytes.len(),
                playing: false,
            },
        );
        state.stats.created += 1;
        Ok(id)
    }

    fn release(&self, id: MediaId) {
        let mut state = self.state.borrow_mut();
        if state.live.remove(&id).is_some() {
            state.stats.released += 1;
        } else {
            tracing::warn!("release of unknown media {:?}", id);
            state.stats.double_releases += 1;
        }
    }

    fn play(&self, id: MediaId) -> Result<(), MediaError> {
        let mut state = self.state.borrow_mut();
        let media = state.live.get_mut(&id).ok_or(MediaError::Unknown(id))?;
        media.playing = true;
        state.stats.plays += 1;
        Ok(())
    }

    fn pause(&self, id: MediaId) {
        let mut state = self.state.borrow_mut();
        if let Some(media) = state.live.get_mut(&id) {
            media.playing = false;
            state.stats.pauses += 1;
        }
    }
}
