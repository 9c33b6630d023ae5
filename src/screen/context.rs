//! Collaborators every screen manager reaches through
//!
//! A [`ScreenContext`] is cloned into each manager instead of living in
//! globals, so a registry (and its tests) can be built against any store,
//! bus, display host and clock.

use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

use super::types::ScreenMessage;
use crate::bus::{SharedDisplayController, SharedMessageBus};
use crate::constants::{channels, timing};
use crate::error::{LogErrorReporter, SharedErrorReporter};
use crate::events::ClassEventHub;
use crate::settings::SharedSettingStore;
use crate::time_source::{RealTimeSource, SharedTimeSource};

/// Which side of the bus this process is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessRole {
    /// Owns the authoritative state and broadcasts every change
    Controller,
    /// Mirrors state from inbound messages and never broadcasts
    Renderer,
}

#[derive(Clone)]
pub struct ScreenContext {
    pub store: SharedSettingStore,
    pub bus: SharedMessageBus,
    pub displays: SharedDisplayController,
    pub clock: SharedTimeSource,
    pub errors: SharedErrorReporter,
    pub class_events: Arc<ClassEventHub>,
    pub scroll_mute: Duration,
    pub role: ProcessRole,
}

impl std::fmt::Debug for ScreenContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScreenContext")
            .field("role", &self.role)
            .field("scroll_mute", &self.scroll_mute)
            .finish_non_exhaustive()
    }
}

impl ScreenContext {
    pub fn new(
        store: SharedSettingStore,
        bus: SharedMessageBus,
        displays: SharedDisplayController,
    ) -> Self {
        Self {
            store,
            bus,
            displays,
            clock: RealTimeSource::shared(),
            errors: Arc::new(LogErrorReporter),
            class_events: Arc::new(ClassEventHub::new()),
            scroll_mute: Duration::from_millis(timing::SCROLL_MUTE_MS),
            role: ProcessRole::Controller,
        }
    }

    pub fn with_clock(mut self, clock: SharedTimeSource) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_errors(mut self, errors: SharedErrorReporter) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_scroll_mute(mut self, scroll_mute: Duration) -> Self {
        self.scroll_mute = scroll_mute;
        self
    }

    pub fn with_role(mut self, role: ProcessRole) -> Self {
        self.role = role;
        self
    }

    /// Send a sync message to renderer windows. Renderers only ever apply
    /// what they receive, which keeps cross-process traffic acyclic.
    pub fn broadcast(&self, message: &ScreenMessage) {
        if self.role == ProcessRole::Renderer {
            return;
        }
        match serde_json::to_value(message) {
            Ok(payload) => {
                trace!(screen_id = message.screen_id, kind = %message.message_type, "Broadcasting");
                self.bus.send_data(channels::SCREEN_SYNC, payload);
            }
            Err(e) => self.report(anyhow::Error::new(e).context("Failed to encode sync message")),
        }
    }

    pub fn report(&self, err: anyhow::Error) {
        self.errors.report(&err);
    }
}
