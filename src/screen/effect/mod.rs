//! Transition effect engine
//!
//! One [`ScreenEffectManager`] per `(screen, target)` holds the selected
//! effect name, persisted under `pt-effect-<screenId>-<target>`.

mod stage;
mod styles;

pub use stage::{LayerState, TransitionStage};
pub use styles::{EffectTarget, EffectType, StyleAnim};

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use super::context::ScreenContext;
use super::types::{ScreenId, ScreenMessage, ScreenMessageType};
use crate::constants::settings;
use crate::events::{EventHandler, EventScope, ScreenEventType};

/// `effect` message payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectMessageData {
    pub target: String,
    pub effect: String,
}

#[derive(Debug)]
pub struct ScreenEffectManager {
    screen_id: ScreenId,
    target: EffectTarget,
    effect_type: EffectType,
    ctx: ScreenContext,
    events: Arc<EventHandler>,
}

impl ScreenEffectManager {
    pub fn load(screen_id: ScreenId, target: EffectTarget, ctx: ScreenContext) -> Self {
        let key = settings::effect_key(screen_id, target.as_str());
        let effect_type = match ctx.store.get_setting(&key) {
            Some(name) => EffectType::parse(&name).unwrap_or_else(|| {
                warn!(screen_id, target = target.as_str(), name = %name, "Unknown effect, using default");
                target.default_effect()
            }),
            None => target.default_effect(),
        };
        Self {
            screen_id,
            target,
            effect_type,
            ctx,
            events: Arc::new(EventHandler::new()),
        }
    }

    pub fn target(&self) -> EffectTarget {
        self.target
    }

    pub fn effect_type(&self) -> EffectType {
        self.effect_type
    }

    pub fn events(&self) -> &Arc<EventHandler> {
        &self.events
    }

    /// Fresh style for a render that starts now
    pub fn style_anim(&self) -> StyleAnim {
        StyleAnim::for_effect(self.effect_type, self.target)
    }

    /// Persist, broadcast and notify; false when nothing changed
    pub fn set_effect_type(&mut self, effect_type: EffectType) -> bool {
        if !self.apply(effect_type) {
            return false;
        }
        self.ctx.store.set_setting(
            &settings::effect_key(self.screen_id, self.target.as_str()),
            Some(effect_type.as_str()),
        );
        self.send_sync_screen();
        self.fire_update();
        true
    }

    /// Apply an inbound `effect` message for this target
    pub fn apply_received(&mut self, data: &EffectMessageData) -> bool {
        let Some(effect_type) = EffectType::parse(&data.effect) else {
            warn!(screen_id = self.screen_id, effect = %data.effect, "Ignoring unknown effect");
            return false;
        };
        if !self.apply(effect_type) {
            return false;
        }
        self.fire_update();
        true
    }

    pub fn to_sync_message(&self) -> ScreenMessage {
        ScreenMessage::new(
            self.screen_id,
            ScreenMessageType::Effect,
            json!({
                "target": self.target.as_str(),
                "effect": self.effect_type.as_str(),
            }),
        )
    }

    pub fn send_sync_screen(&self) {
        self.ctx.broadcast(&self.to_sync_message());
    }

    fn apply(&mut self, effect_type: EffectType) -> bool {
        if self.effect_type == effect_type {
            return false;
        }
        debug!(
            screen_id = self.screen_id,
            target = self.target.as_str(),
            from = self.effect_type.as_str(),
            to = effect_type.as_str(),
            "Effect changed"
        );
        self.effect_type = effect_type;
        true
    }

    fn fire_update(&self) {
        self.events.fire(ScreenEventType::Update, Some(self.screen_id));
        self.ctx
            .class_events
            .fire(EventScope::Effect, ScreenEventType::Update, Some(self.screen_id));
    }
}

/// The three effect targets of one screen
#[derive(Debug)]
pub struct ScreenEffects {
    pub background: ScreenEffectManager,
    pub slide: ScreenEffectManager,
    pub foreground: ScreenEffectManager,
}

impl ScreenEffects {
    pub fn load(screen_id: ScreenId, ctx: &ScreenContext) -> Self {
        Self {
            background: ScreenEffectManager::load(screen_id, EffectTarget::Background, ctx.clone()),
            slide: ScreenEffectManager::load(screen_id, EffectTarget::Slide, ctx.clone()),
            foreground: ScreenEffectManager::load(screen_id, EffectTarget::Foreground, ctx.clone()),
        }
    }

    pub fn get(&self, target: EffectTarget) -> &ScreenEffectManager {
        match target {
            EffectTarget::Background => &self.background,
            EffectTarget::Slide => &self.slide,
            EffectTarget::Foreground => &self.foreground,
        }
    }

    pub fn get_mut(&mut self, target: EffectTarget) -> &mut ScreenEffectManager {
        match target {
            EffectTarget::Background => &mut self.background,
            EffectTarget::Slide => &mut self.slide,
            EffectTarget::Foreground => &mut self.foreground,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScreenEffectManager> {
        [&self.background, &self.slide, &self.foreground].into_iter()
    }
}
