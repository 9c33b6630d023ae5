//! In-process pub/sub for screen state changes
//!
//! Two independent channels deliver the same notification: one per entity
//! (each manager instance owns an [`EventHandler`]) and one per type
//! ([`ClassEventHub`], one handler per [`EventScope`]).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::screen::ScreenId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScreenEventType {
    Update,
    Visible,
    Instance,
    DisplayId,
    ColorNote,
    Selected,
    Resize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenEvent {
    pub event_type: ScreenEventType,
    /// None for registry-wide events
    pub screen_id: Option<ScreenId>,
}

/// Which type-level channel an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventScope {
    Screen,
    Background,
    Slide,
    FullText,
    Alert,
    Effect,
}

pub type Listener = Arc<dyn Fn(&ScreenEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    events: Vec<ScreenEventType>,
    listener: Listener,
}

#[derive(Default)]
pub struct EventHandler {
    next_id: AtomicU64,
    listeners: Mutex<Vec<Registration>>,
}

impl std::fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandler")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl EventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, events: &[ScreenEventType], listener: F) -> ListenerId
    where
        F: Fn(&ScreenEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(Registration {
                id,
                events: events.to_vec(),
                listener: Arc::new(listener),
            });
        }
        id
    }

    pub fn unregister(&self, id: ListenerId) -> bool {
        let Ok(mut listeners) = self.listeners.lock() else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|r| r.id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn fire(&self, event_type: ScreenEventType, screen_id: Option<ScreenId>) {
        // Snapshot first so a listener may register or unregister while being called
        let matching: Vec<Listener> = match self.listeners.lock() {
            Ok(listeners) => listeners
                .iter()
                .filter(|r| r.events.contains(&event_type))
                .map(|r| r.listener.clone())
                .collect(),
            Err(_) => return,
        };
        let event = ScreenEvent {
            event_type,
            screen_id,
        };
        for listener in matching {
            listener(&event);
        }
    }
}

/// Type-level channels, shared by every instance of the same manager type
#[derive(Debug, Default)]
pub struct ClassEventHub {
    channels: Mutex<HashMap<EventScope, Arc<EventHandler>>>,
}

impl ClassEventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(&self, scope: EventScope) -> Arc<EventHandler> {
        match self.channels.lock() {
            Ok(mut channels) => channels.entry(scope).or_default().clone(),
            Err(_) => Arc::new(EventHandler::new()),
        }
    }

    pub fn fire(&self, scope: EventScope, event_type: ScreenEventType, screen_id: Option<ScreenId>) {
        self.channel(scope).fire(event_type, screen_id);
    }
}
