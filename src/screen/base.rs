//! Plumbing shared by the content sub-managers

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::context::ScreenContext;
use super::effect::{StyleAnim, TransitionStage};
use super::surface::{NodeId, RenderNode, RenderSurface};
use super::types::{ScreenId, ScreenMessage};
use crate::events::{EventHandler, EventScope, ScreenEventType};
use crate::settings::codec;

/// Snapshot handed to a render call. The style is captured once, so an
/// effect change halfway through a transition cannot swap the handlers of
/// nodes already animating.
#[derive(Debug, Clone)]
pub struct RenderEnv {
    pub anim: StyleAnim,
    pub width: u32,
    pub height: u32,
    pub now: Instant,
    pub wall_clock: DateTime<Utc>,
}

pub struct ManagerBase {
    pub screen_id: ScreenId,
    pub ctx: ScreenContext,
    scope: EventScope,
    events: Arc<EventHandler>,
    surface: Option<Box<dyn RenderSurface>>,
    pub stage: TransitionStage,
}

impl std::fmt::Debug for ManagerBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerBase")
            .field("screen_id", &self.screen_id)
            .field("scope", &self.scope)
            .field("bound", &self.surface.is_some())
            .field("layers", &self.stage.len())
            .finish()
    }
}

impl ManagerBase {
    pub fn new(screen_id: ScreenId, ctx: ScreenContext, scope: EventScope) -> Self {
        Self {
            screen_id,
            ctx,
            scope,
            events: Arc::new(EventHandler::new()),
            surface: None,
            stage: TransitionStage::new(),
        }
    }

    pub fn events(&self) -> &Arc<EventHandler> {
        &self.events
    }

    /// Fire on the instance channel, then on the type channel
    pub fn fire(&self, event_type: ScreenEventType) {
        self.events.fire(event_type, Some(self.screen_id));
        self.ctx
            .class_events
            .fire(self.scope, event_type, Some(self.screen_id));
    }

    pub fn fire_update(&self) {
        self.fire(ScreenEventType::Update);
    }

    pub fn broadcast(&self, message: &ScreenMessage) {
        self.ctx.broadcast(message);
    }

    /// Read this screen's entry of a `{ [screenId]: T }` setting
    pub fn load_entry<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        codec::load_map_entry(self.ctx.store.as_ref(), self.ctx.errors.as_ref(), key, self.screen_id)
    }

    /// Write this screen's entry; `None` drops the entry from the map
    pub fn persist_entry<T: Serialize>(&self, key: &str, value: Option<&T>) {
        codec::save_map_entry(
            self.ctx.store.as_ref(),
            self.ctx.errors.as_ref(),
            key,
            self.screen_id,
            value,
        );
    }

    /// Decode the `data` of an inbound message. `null` is a valid "cleared"
    /// payload; anything that does not fit `T` is reported and dropped.
    pub fn decode_data<T: DeserializeOwned>(&self, message: &ScreenMessage) -> Option<Option<T>> {
        if message.data.is_null() {
            return Some(None);
        }
        match serde_json::from_value::<T>(message.data.clone()).with_context(|| {
            format!(
                "Invalid '{}' payload for screen {}",
                message.message_type, message.screen_id
            )
        }) {
            Ok(value) => Some(Some(value)),
            Err(e) => {
                debug!(screen_id = self.screen_id, kind = %message.message_type, "Dropping payload");
                self.ctx.report(e);
                None
            }
        }
    }

    pub fn is_bound(&self) -> bool {
        self.surface.is_some()
    }

    /// Swap the surface; layers on the old one are dropped immediately
    pub fn bind_surface(&mut self, surface: Option<Box<dyn RenderSurface>>) {
        match self.surface.as_deref_mut() {
            Some(old) => self.stage.clear(old),
            None => self.stage.forget(),
        }
        self.surface = surface;
    }

    /// Present on the main stage. Without a bound surface this is a no-op.
    pub fn present(&mut self, node: Option<RenderNode>, env: &RenderEnv) -> Option<NodeId> {
        let surface = self.surface.as_deref_mut()?;
        self.stage.present(surface, node, &env.anim, env.now)
    }

    /// Present on a secondary stage owned by the manager
    pub fn present_on(
        &mut self,
        stage: &mut TransitionStage,
        node: Option<RenderNode>,
        env: &RenderEnv,
    ) -> Option<NodeId> {
        let surface = self.surface.as_deref_mut()?;
        stage.present(surface, node, &env.anim, env.now)
    }

    pub fn surface_mut(&mut self) -> Option<&mut (dyn RenderSurface + 'static)> {
        self.surface.as_deref_mut()
    }

    pub fn settle(&mut self, now: Instant) -> usize {
        match self.surface.as_deref_mut() {
            Some(surface) => self.stage.settle(surface, now),
            None => 0,
        }
    }

    pub fn settle_stage(&mut self, stage: &mut TransitionStage, now: Instant) -> usize {
        match self.surface.as_deref_mut() {
            Some(surface) => stage.settle(surface, now),
            None => 0,
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.stage.next_deadline()
    }
}
