//! Chat payloads entering the feed.
//!
//! Payloads arrive loosely shaped (`RawChat`, straight from the message
//! source) and are validated into `ChatMessage` before they reach any record.
//! Everything past this module can rely on the required fields being present.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::media::MediaPayload;

/// A chat message as delivered by the feed source, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawChat {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// Unix milliseconds.
    #[serde(default)]
    pub sent: Option<i64>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub video: Option<Vec<u8>>,
    #[serde(default)]
    pub video_mime: Option<String>,
}

/// A validated chat message, ready to be bound to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub key: String,
    /// Pre-rendered markup; opaque to the feed.
    pub text: String,
    pub sent_at: DateTime<Utc>,
    pub user_id: String,
    pub media: MediaPayload,
}

impl ChatMessage {
    pub fn new(
        key: impl Into<String>,
        user_id: impl Into<String>,
        text: impl Into<String>,
        sent_at: DateTime<Utc>,
        media: MediaPayload,
    ) -> Self {
        Self {
            key: key.into(),
            user_id: user_id.into(),
            text: text.into(),
            sent_at,
            media,
        }
    }

    /// Parse and validate a JSON payload.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawChat = serde_json::from_str(json)?;
        Self::try_from(raw)
    }
}

impl TryFrom<RawChat> for ChatMessage {
    type Error = Error;

    fn try_from(raw: RawChat) -> Result<Self> {
        let key = required(raw.key, "key")?;
        let user_id = required(raw.user_id, "userId")?;
        let mime = required(raw.video_mime, "videoMime")?;
        let bytes = match raw.video {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => return Err(Error::MalformedMessage("missing video".into())),
        };
        let sent_ms = raw
            .sent
            .ok_or_else(|| Error::MalformedMessage("missing sent".into()))?;
        let sent_at = Utc
            .timestamp_millis_opt(sent_ms)
            .single()
            .ok_or_else(|| Error::MalformedMessage(format!("sent out of range: {sent_ms}")))?;

        Ok(Self {
            key,
            text: raw.text.unwrap_or_default(),
            sent_at,
            user_id,
            media: MediaPayload { bytes, mime },
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::MalformedMessage(format!("missing {field}"))),
    }
}
