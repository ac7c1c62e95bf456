//! Usage tracking hooks. Failures here never affect the feed.

use std::cell::Cell;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("telemetry failed: {0}")]
pub struct TelemetryError(pub String);

pub trait UsageTracker {
    fn on_user_muted(&self) -> Result<(), TelemetryError>;
    fn on_save_gif(&self) -> Result<(), TelemetryError>;
}

/// Tracker that only logs and counts.
#[derive(Debug, Default)]
pub struct LogTracker {
    mutes: Cell<u64>,
    saves: Cell<u64>,
}

impl LogTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mutes(&self) -> u64 {
        self.mutes.get()
    }

    pub fn saves(&self) -> u64 {
        self.saves.get()
    }
}

impl UsageTracker for LogTracker {
    fn on_user_muted(&self) -> Result<(), TelemetryError> {
        self.mutes.set(self.mutes.get() + 1);
        tracing::info!("usage: user muted");
        Ok(())
    }

    fn on_save_gif(&self) -> Result<(), TelemetryError> {
        self.saves.set(self.saves.get() + 1);
        tracing::info!("usage: save gif");
        Ok(())
    }
}
