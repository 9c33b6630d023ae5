//! One logical screen: identity, placement and its content sub-managers

use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::alert::{AlertData, CountdownData, MarqueeData, ScreenAlertManager};
use super::background::{BackgroundSrc, ScreenBackgroundManager};
use super::base::RenderEnv;
use super::bible::{BibleItemData, ScreenBibleManager};
use super::context::{ProcessRole, ScreenContext};
use super::effect::{EffectMessageData, EffectTarget, EffectType, ScreenEffects};
use super::slide::{ScreenSlideManager, SlideItemData};
use super::surface::RenderSurface;
use super::types::{ManagerKind, ScreenId, ScreenManagerSetting, ScreenMessage, ScreenMessageType};
use crate::constants::settings;
use crate::events::{EventHandler, EventScope, ScreenEventType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleData {
    pub is_showing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayChangeData {
    pub display_id: u32,
}

/// Effect target a content manager animates on
pub fn effect_target(kind: ManagerKind) -> EffectTarget {
    match kind {
        ManagerKind::Background => EffectTarget::Background,
        ManagerKind::Slide => EffectTarget::Slide,
        ManagerKind::FullText | ManagerKind::Alert => EffectTarget::Foreground,
    }
}

#[derive(Debug)]
pub struct ScreenManager {
    screen_id: ScreenId,
    ctx: ScreenContext,
    width: u32,
    height: u32,
    display_id: u32,
    is_selected: bool,
    is_showing: bool,
    color_note: Option<String>,
    /// Manager types that currently do not fan out to the sync group
    no_sync_group: BTreeSet<ManagerKind>,
    events: Arc<EventHandler>,
    background: ScreenBackgroundManager,
    slide: ScreenSlideManager,
    bible: ScreenBibleManager,
    alert: ScreenAlertManager,
    effects: ScreenEffects,
}

impl ScreenManager {
    pub fn new(
        screen_id: ScreenId,
        ctx: ScreenContext,
        setting: Option<&ScreenManagerSetting>,
        is_showing: bool,
    ) -> Self {
        let (display_id, width, height) = load_display(&ctx, screen_id);
        Self {
            screen_id,
            width,
            height,
            display_id,
            is_selected: setting.is_some_and(|s| s.is_selected),
            is_showing,
            color_note: setting.and_then(|s| s.color_note.clone()),
            no_sync_group: BTreeSet::new(),
            events: Arc::new(EventHandler::new()),
            background: ScreenBackgroundManager::load(screen_id, ctx.clone()),
            slide: ScreenSlideManager::load(screen_id, ctx.clone()),
            bible: ScreenBibleManager::load(screen_id, ctx.clone()),
            alert: ScreenAlertManager::load(screen_id, ctx.clone()),
            effects: ScreenEffects::load(screen_id, &ctx),
            ctx,
        }
    }

    pub fn screen_id(&self) -> ScreenId {
        self.screen_id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn display_id(&self) -> u32 {
        self.display_id
    }

    pub fn is_selected(&self) -> bool {
        self.is_selected
    }

    pub fn is_showing(&self) -> bool {
        self.is_showing
    }

    pub fn color_note(&self) -> Option<&str> {
        self.color_note.as_deref()
    }

    pub fn events(&self) -> &Arc<EventHandler> {
        &self.events
    }

    pub fn background(&self) -> &ScreenBackgroundManager {
        &self.background
    }

    pub fn slide(&self) -> &ScreenSlideManager {
        &self.slide
    }

    pub fn bible(&self) -> &ScreenBibleManager {
        &self.bible
    }

    pub fn alert(&self) -> &ScreenAlertManager {
        &self.alert
    }

    pub fn effects(&self) -> &ScreenEffects {
        &self.effects
    }

    pub fn to_setting(&self) -> ScreenManagerSetting {
        ScreenManagerSetting {
            screen_id: self.screen_id,
            is_selected: self.is_selected,
            color_note: self.color_note.clone(),
        }
    }

    fn fire(&self, event_type: ScreenEventType) {
        self.events.fire(event_type, Some(self.screen_id));
        self.ctx
            .class_events
            .fire(EventScope::Screen, event_type, Some(self.screen_id));
    }

    /// Update events on the screen and on every sub-manager
    pub fn fire_update_all(&self) {
        self.fire(ScreenEventType::Update);
        self.background.base().fire_update();
        self.slide.base().fire_update();
        self.bible.base().fire_update();
        self.alert.base().fire_update();
    }

    pub fn render_env(&self, target: EffectTarget) -> RenderEnv {
        RenderEnv {
            anim: self.effects.get(target).style_anim(),
            width: self.width,
            height: self.height,
            now: self.ctx.clock.now(),
            wall_clock: self.ctx.clock.wall_clock(),
        }
    }

    fn env_for(&self, kind: ManagerKind) -> RenderEnv {
        self.render_env(effect_target(kind))
    }

    // Sync group opt-outs

    pub fn check_is_sync_group_enabled(&self, kind: ManagerKind) -> bool {
        !self.no_sync_group.contains(&kind)
    }

    pub fn enable_sync_group(&mut self, kind: ManagerKind) {
        self.no_sync_group.remove(&kind);
    }

    pub fn disable_sync_group(&mut self, kind: ManagerKind) {
        debug!(screen_id = self.screen_id, kind = kind.as_str(), "Sync group muted");
        self.no_sync_group.insert(kind);
    }

    // Identity and placement

    /// Join (or leave, with `None`) a sync group. Joining always resumes
    /// fan-out for every manager type.
    pub fn set_color_note(&mut self, color_note: Option<String>) {
        let color_note = color_note.filter(|c| !c.trim().is_empty());
        info!(screen_id = self.screen_id, color = ?color_note, "Set color note");
        self.color_note = color_note;
        self.no_sync_group.clear();
        self.fire(ScreenEventType::ColorNote);
    }

    pub fn set_is_selected(&mut self, is_selected: bool) {
        if self.is_selected == is_selected {
            return;
        }
        self.is_selected = is_selected;
        self.fire(ScreenEventType::Selected);
    }

    /// Show or hide the OS window and tell renderers
    pub fn set_is_showing(&mut self, is_showing: bool) {
        if self.is_showing == is_showing {
            return;
        }
        if self.ctx.role == ProcessRole::Controller {
            if is_showing {
                if let Err(e) = self.ctx.displays.show_screen(self.screen_id, self.display_id) {
                    self.ctx.report(e);
                    return;
                }
            } else {
                self.ctx.displays.hide_screen(self.screen_id);
            }
        }
        self.is_showing = is_showing;
        self.ctx.broadcast(&self.visible_message());
        self.fire(ScreenEventType::Visible);
    }

    /// Inbound `visible`: the sender already drove the OS window
    pub fn apply_received_visible(&mut self, is_showing: bool) {
        if self.is_showing == is_showing {
            return;
        }
        self.is_showing = is_showing;
        self.fire(ScreenEventType::Visible);
    }

    pub fn set_display_id(&mut self, display_id: u32) {
        if self.display_id == display_id {
            return;
        }
        info!(screen_id = self.screen_id, display_id, "Set display");
        self.ctx.store.set_setting(
            &settings::display_key(self.screen_id),
            Some(&display_id.to_string()),
        );
        self.display_id = display_id;
        if self.is_showing && self.ctx.role == ProcessRole::Controller {
            self.ctx.displays.set_display(self.screen_id, display_id);
        }
        self.ctx.broadcast(&self.display_message());
        self.fire(ScreenEventType::DisplayId);
    }

    /// Inbound `display-change`
    pub fn apply_received_display(&mut self, display_id: u32) {
        if self.display_id == display_id {
            return;
        }
        self.display_id = display_id;
        self.fire(ScreenEventType::DisplayId);
    }

    /// Window resized: re-render everything at the new size
    pub fn set_dimensions(&mut self, width: u32, height: u32) {
        if self.width == width && self.height == height {
            return;
        }
        self.width = width;
        self.height = height;
        self.render_all();
        self.fire(ScreenEventType::Resize);
    }

    // Content setters (local only, no sync group)

    pub fn set_background_src(&mut self, src: Option<BackgroundSrc>) {
        let env = self.env_for(ManagerKind::Background);
        self.background.set_background_src(&env, src);
    }

    pub fn set_slide_item_data(&mut self, data: Option<SlideItemData>) {
        let env = self.env_for(ManagerKind::Slide);
        self.slide.set_slide_item_data(&env, data);
    }

    pub fn set_bible_item_data(&mut self, data: Option<BibleItemData>) {
        let env = self.env_for(ManagerKind::FullText);
        self.bible.set_bible_item_data(&env, data);
    }

    pub fn set_alert_data(&mut self, data: AlertData) -> bool {
        let env = self.env_for(ManagerKind::Alert);
        self.alert.set_alert_data(&env, data)
    }

    pub fn set_marquee_data(&mut self, marquee: Option<MarqueeData>) -> bool {
        let env = self.env_for(ManagerKind::Alert);
        self.alert.set_marquee_data(&env, marquee)
    }

    pub fn set_countdown_data(&mut self, countdown: Option<CountdownData>) -> bool {
        let env = self.env_for(ManagerKind::Alert);
        self.alert.set_countdown_data(&env, countdown)
    }

    pub fn set_selected_verse(&mut self, verse_key: Option<String>) -> bool {
        self.bible.set_selected_index(verse_key)
    }

    pub fn handle_local_scroll(&mut self, scroll: f64) -> bool {
        self.bible.handle_local_scroll(scroll)
    }

    /// Current payload of `kind` as a sync message
    pub fn manager_message(&self, kind: ManagerKind) -> ScreenMessage {
        match kind {
            ManagerKind::Background => self.background.to_sync_message(),
            ManagerKind::Slide => self.slide.to_sync_message(),
            ManagerKind::FullText => self.bible.to_sync_message(),
            ManagerKind::Alert => self.alert.to_sync_message(),
        }
    }

    // Effects

    pub fn set_effect(&mut self, target: EffectTarget, effect: EffectType) -> bool {
        if !self.effects.get_mut(target).set_effect_type(effect) {
            return false;
        }
        self.render_target(target);
        true
    }

    pub fn apply_received_effect(&mut self, data: &EffectMessageData) -> bool {
        let Some(target) = EffectTarget::parse(&data.target) else {
            warn!(screen_id = self.screen_id, target = %data.target, "Ignoring effect for unknown target");
            return false;
        };
        if !self.effects.get_mut(target).apply_received(data) {
            return false;
        }
        self.render_target(target);
        true
    }

    // Inbound messages

    /// Apply a content message through the plain setters. Returns false for
    /// tags that are not content messages.
    pub fn receive_manager_message(&mut self, message: &ScreenMessage) -> bool {
        let Some(message_type) = message.kind() else {
            return false;
        };
        let Some(kind) = message_type.manager_kind() else {
            return false;
        };
        let env = self.env_for(kind);
        match message_type {
            ScreenMessageType::Background => self.background.receive_sync_screen(&env, message),
            ScreenMessageType::VaryAppDocument => self.slide.receive_sync_screen(&env, message),
            ScreenMessageType::BibleScreenView => self.bible.receive_sync_screen(&env, message),
            ScreenMessageType::BibleScreenViewScroll => self.bible.receive_sync_scroll(message),
            ScreenMessageType::BibleScreenViewSelectedIndex => {
                self.bible.receive_sync_selected_index(message)
            }
            ScreenMessageType::Alert => self.alert.receive_sync_screen(&env, message),
            _ => return false,
        }
        true
    }

    // Outbound state

    fn visible_message(&self) -> ScreenMessage {
        ScreenMessage::new(
            self.screen_id,
            ScreenMessageType::Visible,
            json!({ "isShowing": self.is_showing }),
        )
    }

    fn display_message(&self) -> ScreenMessage {
        ScreenMessage::new(
            self.screen_id,
            ScreenMessageType::DisplayChange,
            json!({ "displayId": self.display_id }),
        )
    }

    /// Broadcast every sub-manager's state and the transition effects
    pub fn send_sync_screen(&self) {
        self.background.send_sync_screen();
        self.slide.send_sync_screen();
        self.bible.send_sync_screen();
        self.alert.send_sync_screen();
        for effect in self.effects.iter() {
            effect.send_sync_screen();
        }
    }

    /// Everything a freshly opened renderer window needs
    pub fn send_full_state(&self) {
        self.ctx.broadcast(&self.visible_message());
        self.ctx.broadcast(&self.display_message());
        self.send_sync_screen();
    }

    // Rendering

    pub fn bind_surface(&mut self, kind: ManagerKind, surface: Option<Box<dyn RenderSurface>>) {
        let env = self.env_for(kind);
        match kind {
            ManagerKind::Background => self.background.bind_surface(&env, surface),
            ManagerKind::Slide => self.slide.bind_surface(&env, surface),
            ManagerKind::FullText => self.bible.bind_surface(&env, surface),
            ManagerKind::Alert => self.alert.bind_surface(&env, surface),
        }
    }

    pub fn render_all(&mut self) {
        for target in EffectTarget::ALL {
            self.render_target(target);
        }
    }

    fn render_target(&mut self, target: EffectTarget) {
        let env = self.render_env(target);
        match target {
            EffectTarget::Background => self.background.render(&env),
            EffectTarget::Slide => self.slide.render(&env),
            EffectTarget::Foreground => {
                self.bible.render(&env);
                self.alert.render(&env);
            }
        }
    }

    /// Text style is global; refresh the visible text without a transition
    pub fn refresh_text_style(&mut self) {
        self.bible.refresh_in_place();
        self.bible.base().fire_update();
    }

    /// Finish due animations and advance the countdown clock
    pub fn settle(&mut self) -> usize {
        let now = self.ctx.clock.now();
        let env = self.env_for(ManagerKind::Alert);
        self.alert.tick(&env);
        self.background.base_mut().settle(now)
            + self.slide.base_mut().settle(now)
            + self.bible.base_mut().settle(now)
            + self.alert.settle(now)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.background.base().next_deadline(),
            self.slide.base().next_deadline(),
            self.bible.base().next_deadline(),
            self.alert.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }
}

/// Stored display if it still exists, otherwise the primary display
fn load_display(ctx: &ScreenContext, screen_id: ScreenId) -> (u32, u32, u32) {
    let stored = ctx
        .store
        .get_setting(&settings::display_key(screen_id))
        .and_then(|raw| raw.trim().parse::<u32>().ok());
    match ctx.displays.get_all_displays() {
        Ok(all) => {
            let info = stored
                .and_then(|id| all.find(id))
                .unwrap_or(&all.primary_display);
            (info.id, info.bounds.width, info.bounds.height)
        }
        Err(e) => {
            ctx.report(e.context(format!("Failed to resolve display for screen {screen_id}")));
            (stored.unwrap_or_default(), 0, 0)
        }
    }
}
