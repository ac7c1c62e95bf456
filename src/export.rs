//! Animated-image export of message videos and delivery of the result.
//!
//! Exporting is asynchronous: the exporter hands back a oneshot receiver and
//! the feed polls it on each tick. Failures are soft and only logged.

use std::cell::RefCell;
use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::oneshot;

use crate::media::MediaId;

/// Frames sampled from the source video per export.
pub const DEFAULT_FRAME_COUNT: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    pub media: MediaId,
    pub mime: String,
    pub frame_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedImage {
    pub bytes: Vec<u8>,
    pub mime: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExportError {
    #[error("export not supported: {0}")]
    Unsupported(String),

    #[error("export failed: {0}")]
    Failed(String),

    #[error("exporter went away before completing")]
    Abandoned,
}

pub type ExportReceiver = oneshot::Receiver<Result<ExportedImage, ExportError>>;

pub trait ImageExporter {
    fn export(&self, request: ExportRequest) -> ExportReceiver;
}

/// Client-side "download" of a finished export.
pub trait DownloadSink {
    fn deliver(&self, file_name: &str, image: &ExportedImage);
}

/// Exporter for environments without a video decoder; every request fails.
#[derive(Debug, Clone, Default)]
pub struct UnsupportedExporter;

impl ImageExporter for UnsupportedExporter {
    fn export(&self, request: ExportRequest) -> ExportReceiver {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(ExportError::Unsupported(request.mime)));
        rx
    }
}

/// Keeps delivered downloads in memory.
#[derive(Debug, Default)]
pub struct MemoryDownloads {
    delivered: RefCell<Vec<(String, ExportedImage)>>,
}

impl MemoryDownloads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<(String, ExportedImage)> {
        self.delivered.borrow().clone()
    }
}

impl DownloadSink for MemoryDownloads {
    fn deliver(&self, file_name: &str, image: &ExportedImage) {
        self.delivered
            .borrow_mut()
            .push((file_name.to_string(), image.clone()));
    }
}

/// Writes downloads into a directory.
#[derive(Debug, Clone)]
pub struct DirectoryDownloads {
    dir: PathBuf,
}

impl DirectoryDownloads {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DownloadSink for DirectoryDownloads {
    fn deliver(&self, file_name: &str, image: &ExportedImage) {
        let path = self.dir.join(file_name);
        if let Err(e) = std::fs::create_dir_all(&self.dir)
            .and_then(|_| std::fs::write(&path, &image.bytes))
        {
            tracing::error!("Failed to write download {}: {}", path.display(), e);
        }
    }
}
