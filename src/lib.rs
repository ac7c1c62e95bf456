//! clipfeed
//!
//! Lifecycle core for a live chat feed of looping video messages: bounded,
//! de-duplicated message records with recycling, mute moderation and
//! visibility-driven playback.

pub mod avatar;
pub mod chat;
pub mod clock;
pub mod config;
pub mod error;
pub mod export;
pub mod feed;
pub mod media;
pub mod replay;
pub mod telemetry;
pub mod theme;

pub use chat::ChatMessage;
pub use config::FeedConfig;
pub use error::{Error, Result};
pub use feed::{Collaborators, MessageList, MessageRecord, MuteSet};
