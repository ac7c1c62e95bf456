//! Process-wide theme and its change notifications.
//!
//! `ThemeBus` is a cheap-to-clone handle; every clone talks to the same set
//! of subscribers. Subscribers receive changes through an unbounded channel
//! and drain it on their own schedule, so emitting never re-enters a
//! subscriber.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

#[derive(Debug, Default)]
struct BusInner {
    current: Theme,
    next_id: u64,
    subscribers: HashMap<u64, UnboundedSender<Theme>>,
}

#[derive(Debug, Clone, Default)]
pub struct ThemeBus {
    inner: Rc<RefCell<BusInner>>,
}

impl ThemeBus {
    pub fn new(initial: Theme) -> Self {
        Self {
            inner: Rc::new(RefCell::new(BusInner {
                current: initial,
                ..Default::default()
            })),
        }
    }

    pub fn current(&self) -> Theme {
        self.inner.borrow().current
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    pub fn subscribe(&self) -> ThemeSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.subscribers.insert(id, tx);
        ThemeSubscription {
            id,
            rx,
            bus: Rc::downgrade(&self.inner),
        }
    }

    /// Set the current theme and notify subscribers. Returns how many were reached.
    pub fn emit(&self, theme: Theme) -> usize {
        let mut inner = self.inner.borrow_mut();
        inner.current = theme;
        inner.subscribers.retain(|_, tx| tx.send(theme).is_ok());
        tracing::debug!(
            "theme changed to {} ({} subscribers)",
            theme.as_str(),
            inner.subscribers.len()
        );
        inner.subscribers.len()
    }
}

/// A live subscription to a `ThemeBus`. Dropping it unsubscribes.
#[derive(Debug)]
pub struct ThemeSubscription {
    id: u64,
    rx: UnboundedReceiver<Theme>,
    bus: Weak<RefCell<BusInner>>,
}

impl ThemeSubscription {
    /// Drain pending changes, returning only the most recent one.
    pub fn latest(&mut self) -> Option<Theme> {
        let mut latest = None;
        while let Ok(theme) = self.rx.try_recv() {
            latest = Some(theme);
        }
        latest
    }

    pub fn unsubscribe(self) {}
}

impl Drop for ThemeSubscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.borrow_mut().subscribers.remove(&self.id);
        }
    }
}
