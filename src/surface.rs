//! Scrollable containers and their touch listener registry.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::tracker::TouchPhase;

static NEXT_LISTENER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn next() -> Self {
        Self(NEXT_LISTENER.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone)]
pub struct Surface {
    name: String,
    scroll_top: f32,
    listeners: Vec<(ListenerId, TouchPhase)>,
}

impl Default for Surface {
    fn default() -> Self {
        Self::document()
    }
}

impl Surface {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scroll_top: 0.0,
            listeners: Vec::new(),
        }
    }

    /// The whole-document container used when the caller registers none.
    pub fn document() -> Self {
        Self::new("document")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scroll_top(&self) -> f32 {
        self.scroll_top
    }

    pub fn scroll_to(&mut self, offset: f32) {
        self.scroll_top = offset.max(0.0);
    }

    /// Registers `id` for every touch phase. Returns false if nothing changed.
    pub fn attach(&mut self, id: ListenerId) -> bool {
        let mut added = false;
        for phase in TouchPhase::ALL {
            if !self.listeners.contains(&(id, phase)) {
                self.listeners.push((id, phase));
                added = true;
            }
        }
        added
    }

    pub fn detach(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(l, _)| *l != id);
        self.listeners.len() != before
    }

    pub fn is_attached(&self, id: ListenerId) -> bool {
        self.listeners.iter().any(|(l, _)| *l == id)
    }

    pub fn accepts(&self, id: ListenerId, phase: TouchPhase) -> bool {
        self.listeners.contains(&(id, phase))
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}
