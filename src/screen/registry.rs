//! Process-wide screen registry and sync group coordinator
//!
//! Screens are only reached through the registry: at most one live
//! [`ScreenManager`] exists per id, deleted ids are remembered as tombstones
//! so views that still hold an id can tell "gone" from "never existed".
//!
//! Sync groups: screens sharing a color note mirror each other's content.
//! A group-aware apply enables fan-out on the origin, applies locally and
//! pushes the same message to each sibling through its plain setters. Every
//! sibling pushed to is then muted for that manager type until it applies
//! something group-aware itself or its color note is set again, which keeps
//! A -> B -> A echoes out of the group.

use serde::Deserialize;
use serde_json::Value;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use super::alert::{AlertData, CountdownData, MarqueeData};
use super::background::{BackgroundKind, BackgroundSrc};
use super::bible::{BibleItemData, BibleTextStyle};
use super::context::ScreenContext;
use super::effect::{EffectMessageData, EffectTarget, EffectType};
use super::manager::{DisplayChangeData, ScreenManager, VisibleData};
use super::slide::{self, SlideItemData};
use super::surface::RenderSurface;
use super::types::{ManagerKind, ScreenId, ScreenManagerSetting, ScreenMessage, ScreenMessageType};
use crate::constants::settings;
use crate::events::{EventScope, ScreenEventType};
use crate::settings::codec;

/// What a view holding a screen id gets back
#[derive(Debug, Clone, Copy)]
pub enum ScreenManagerRef<'a> {
    Live(&'a ScreenManager),
    Tombstoned(ScreenId),
}

impl ScreenManagerRef<'_> {
    pub fn screen_id(&self) -> ScreenId {
        match self {
            ScreenManagerRef::Live(manager) => manager.screen_id(),
            ScreenManagerRef::Tombstoned(screen_id) => *screen_id,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, ScreenManagerRef::Live(_))
    }
}

fn showing_ids(ctx: &ScreenContext) -> BTreeSet<ScreenId> {
    match ctx.displays.get_all_showing_screen_ids() {
        Ok(ids) => ids.into_iter().collect(),
        Err(e) => {
            ctx.report(e);
            BTreeSet::new()
        }
    }
}

/// Drag-and-drop payload `{ type, item }`
#[derive(Debug, Clone, Deserialize)]
struct DroppedData {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    item: Value,
}

#[derive(Debug)]
pub struct ScreenRegistry {
    ctx: ScreenContext,
    managers: BTreeMap<ScreenId, ScreenManager>,
    tombstones: BTreeSet<ScreenId>,
}

impl ScreenRegistry {
    pub fn new(ctx: ScreenContext) -> Self {
        Self {
            ctx,
            managers: BTreeMap::new(),
            tombstones: BTreeSet::new(),
        }
    }

    pub fn ctx(&self) -> &ScreenContext {
        &self.ctx
    }

    /// Restore screens from the persisted list, falling back to whatever
    /// the display host reports as showing. Returns the live count.
    pub fn init(&mut self) -> usize {
        self.reset();
        let showing = showing_ids(&self.ctx);
        let persisted: Vec<ScreenManagerSetting> = codec::load_json(
            self.ctx.store.as_ref(),
            self.ctx.errors.as_ref(),
            settings::MANAGERS,
        )
        .unwrap_or_default();

        for setting in &persisted {
            if self.managers.contains_key(&setting.screen_id) {
                warn!(screen_id = setting.screen_id, "Duplicate screen in persisted list");
                continue;
            }
            let is_showing = showing.contains(&setting.screen_id);
            self.insert(ScreenManager::new(
                setting.screen_id,
                self.ctx.clone(),
                Some(setting),
                is_showing,
            ));
        }
        if self.managers.is_empty() {
            self.bootstrap_from_showing(&showing);
        }
        info!(screens = self.managers.len(), "Screen registry initialized");
        self.managers.len()
    }

    /// Drop every instance and tombstone; the store is left untouched
    pub fn reset(&mut self) {
        self.managers.clear();
        self.tombstones.clear();
    }

    fn bootstrap_from_showing(&mut self, showing: &BTreeSet<ScreenId>) {
        for screen_id in showing {
            self.insert(ScreenManager::new(*screen_id, self.ctx.clone(), None, true));
        }
    }

    fn insert(&mut self, manager: ScreenManager) {
        let screen_id = manager.screen_id();
        self.tombstones.remove(&screen_id);
        manager.fire_update_all();
        self.managers.insert(screen_id, manager);
    }

    /// Existing screen or a new one; new screens are persisted
    pub fn create_instance(&mut self, screen_id: ScreenId) -> &mut ScreenManager {
        if !self.managers.contains_key(&screen_id) {
            let mut list = self.manager_settings();
            list.push(ScreenManagerSetting {
                screen_id,
                is_selected: false,
                color_note: None,
            });
            list.sort_by_key(|setting| setting.screen_id);
            self.persist_manager_list(&list);
        }
        match self.managers.entry(screen_id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(slot) => {
                debug!(screen_id, "Creating screen");
                let is_showing = showing_ids(&self.ctx).contains(&screen_id);
                self.tombstones.remove(&screen_id);
                let manager = slot.insert(ScreenManager::new(screen_id, self.ctx.clone(), None, is_showing));
                manager.fire_update_all();
                manager
            }
        }
    }

    pub fn get_instance(&self, screen_id: ScreenId) -> Option<&ScreenManager> {
        self.managers.get(&screen_id)
    }

    pub fn get_instance_mut(&mut self, screen_id: ScreenId) -> Option<&mut ScreenManager> {
        self.managers.get_mut(&screen_id)
    }

    pub fn lookup(&self, screen_id: ScreenId) -> Option<ScreenManagerRef<'_>> {
        if let Some(manager) = self.managers.get(&screen_id) {
            return Some(ScreenManagerRef::Live(manager));
        }
        self.tombstones
            .contains(&screen_id)
            .then_some(ScreenManagerRef::Tombstoned(screen_id))
    }

    /// Live screens; an empty registry first adopts the showing screens
    pub fn get_all_instances(&mut self) -> Vec<&ScreenManager> {
        if self.managers.is_empty() {
            let showing = showing_ids(&self.ctx);
            self.bootstrap_from_showing(&showing);
        }
        self.managers.values().collect()
    }

    pub fn screen_ids(&self) -> Vec<ScreenId> {
        self.managers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    /// Create a screen on the smallest unused id
    pub fn gen_new_instance(&mut self) -> ScreenId {
        let screen_id = (0..)
            .find(|id| !self.managers.contains_key(id))
            .unwrap_or_default();
        self.create_instance(screen_id);
        info!(screen_id, "Added screen");
        self.fire_instance(screen_id);
        screen_id
    }

    /// Clear (with its group), hide and forget a screen. Deleting twice is
    /// a no-op.
    pub fn delete(&mut self, screen_id: ScreenId) -> bool {
        if !self.clear_all(screen_id) {
            debug!(screen_id, "Delete of unknown screen ignored");
            return false;
        }
        let Some(mut manager) = self.managers.remove(&screen_id) else {
            return false;
        };
        self.tombstones.insert(screen_id);
        manager.set_is_showing(false);
        self.save_managers();
        info!(screen_id, "Deleted screen");
        self.fire_instance(screen_id);
        true
    }

    fn fire_instance(&self, screen_id: ScreenId) {
        self.ctx
            .class_events
            .fire(EventScope::Screen, ScreenEventType::Instance, Some(screen_id));
    }

    fn manager_settings(&self) -> Vec<ScreenManagerSetting> {
        self.managers.values().map(ScreenManager::to_setting).collect()
    }

    fn save_managers(&self) {
        self.persist_manager_list(&self.manager_settings());
    }

    fn persist_manager_list(&self, list: &[ScreenManagerSetting]) {
        codec::save_json(
            self.ctx.store.as_ref(),
            self.ctx.errors.as_ref(),
            settings::MANAGERS,
            Some(&list),
        );
    }

    /// Screens in the `color_note` group, optionally leaving one out
    pub fn get_all_instances_by_color_note(
        &self,
        color_note: &str,
        exclude: Option<ScreenId>,
    ) -> Vec<ScreenId> {
        self.managers
            .values()
            .filter(|m| m.color_note() == Some(color_note) && Some(m.screen_id()) != exclude)
            .map(ScreenManager::screen_id)
            .collect()
    }

    pub fn get_selected(&self) -> Vec<ScreenId> {
        self.managers
            .values()
            .filter(|m| m.is_selected())
            .map(ScreenManager::screen_id)
            .collect()
    }

    pub fn set_selected(&mut self, screen_id: ScreenId, is_selected: bool) -> bool {
        let Some(manager) = self.managers.get_mut(&screen_id) else {
            return false;
        };
        manager.set_is_selected(is_selected);
        self.save_managers();
        true
    }

    /// Run `f` on every selected screen
    pub fn apply_to_selected<F>(&mut self, mut f: F) -> usize
    where
        F: FnMut(&mut Self, ScreenId),
    {
        let selected = self.get_selected();
        for screen_id in &selected {
            f(self, *screen_id);
        }
        selected.len()
    }

    pub fn set_color_note(&mut self, screen_id: ScreenId, color_note: Option<String>) -> bool {
        let Some(manager) = self.managers.get_mut(&screen_id) else {
            return false;
        };
        manager.set_color_note(color_note);
        self.save_managers();
        if let Some(manager) = self.managers.get(&screen_id) {
            manager.send_sync_screen();
        }
        true
    }

    pub fn set_showing(&mut self, screen_id: ScreenId, is_showing: bool) -> bool {
        let Some(manager) = self.managers.get_mut(&screen_id) else {
            return false;
        };
        manager.set_is_showing(is_showing);
        true
    }

    pub fn set_display_id(&mut self, screen_id: ScreenId, display_id: u32) -> bool {
        let Some(manager) = self.managers.get_mut(&screen_id) else {
            return false;
        };
        manager.set_display_id(display_id);
        true
    }

    pub fn set_dimensions(&mut self, screen_id: ScreenId, width: u32, height: u32) -> bool {
        let Some(manager) = self.managers.get_mut(&screen_id) else {
            return false;
        };
        manager.set_dimensions(width, height);
        true
    }

    pub fn bind_surface(
        &mut self,
        screen_id: ScreenId,
        kind: ManagerKind,
        surface: Option<Box<dyn RenderSurface>>,
    ) -> bool {
        let Some(manager) = self.managers.get_mut(&screen_id) else {
            return false;
        };
        manager.bind_surface(kind, surface);
        true
    }

    pub fn set_effect(&mut self, screen_id: ScreenId, target: EffectTarget, effect: EffectType) -> bool {
        self.managers
            .get_mut(&screen_id)
            .is_some_and(|m| m.set_effect(target, effect))
    }

    pub fn send_sync_screen(&self, screen_id: ScreenId) -> bool {
        let Some(manager) = self.managers.get(&screen_id) else {
            return false;
        };
        manager.send_sync_screen();
        true
    }

    // Sync group

    /// Push `message` (already applied on `origin_id`) to the rest of the
    /// origin's group. Returns the siblings that received it.
    pub fn sync_group(&mut self, origin_id: ScreenId, message: &ScreenMessage) -> Vec<ScreenId> {
        let Some(kind) = message.kind().and_then(|k| k.manager_kind()) else {
            return Vec::new();
        };
        let Some(origin) = self.managers.get(&origin_id) else {
            return Vec::new();
        };
        let Some(color_note) = origin.color_note().map(str::to_string) else {
            return Vec::new();
        };
        if !origin.check_is_sync_group_enabled(kind) {
            debug!(screen_id = origin_id, kind = kind.as_str(), "Sync group muted, not propagating");
            return Vec::new();
        }

        let siblings = self.get_all_instances_by_color_note(&color_note, Some(origin_id));
        for sibling_id in &siblings {
            if let Some(sibling) = self.managers.get_mut(sibling_id) {
                sibling.receive_manager_message(&message.retarget(*sibling_id));
                sibling.disable_sync_group(kind);
            }
        }
        if !siblings.is_empty() {
            debug!(
                screen_id = origin_id,
                kind = kind.as_str(),
                color = %color_note,
                siblings = siblings.len(),
                "Propagated to sync group"
            );
        }
        siblings
    }

    /// Enable fan-out on the origin, apply with `apply` and push the
    /// resulting message (if any) to the group
    fn apply_with_sync_group<F>(&mut self, screen_id: ScreenId, kind: ManagerKind, apply: F) -> bool
    where
        F: FnOnce(&mut ScreenManager) -> Option<ScreenMessage>,
    {
        let Some(manager) = self.managers.get_mut(&screen_id) else {
            warn!(screen_id, kind = kind.as_str(), "No screen to apply to");
            return false;
        };
        manager.enable_sync_group(kind);
        let Some(message) = apply(manager) else {
            return false;
        };
        self.sync_group(screen_id, &message);
        true
    }

    /// Selecting the background already shown clears it
    pub fn apply_background_src_with_sync_group(
        &mut self,
        screen_id: ScreenId,
        src: Option<BackgroundSrc>,
    ) -> bool {
        self.apply_with_sync_group(screen_id, ManagerKind::Background, |m| {
            let src = m.background().toggled(src);
            m.set_background_src(src);
            Some(m.manager_message(ManagerKind::Background))
        })
    }

    pub fn apply_slide_item_with_sync_group(
        &mut self,
        screen_id: ScreenId,
        data: Option<SlideItemData>,
    ) -> bool {
        self.apply_with_sync_group(screen_id, ManagerKind::Slide, |m| {
            m.set_slide_item_data(data);
            Some(m.manager_message(ManagerKind::Slide))
        })
    }

    pub fn apply_bible_item_with_sync_group(
        &mut self,
        screen_id: ScreenId,
        data: Option<BibleItemData>,
    ) -> bool {
        self.apply_with_sync_group(screen_id, ManagerKind::FullText, |m| {
            m.set_bible_item_data(data);
            Some(m.manager_message(ManagerKind::FullText))
        })
    }

    pub fn apply_marquee_with_sync_group(
        &mut self,
        screen_id: ScreenId,
        marquee: Option<MarqueeData>,
    ) -> bool {
        self.apply_with_sync_group(screen_id, ManagerKind::Alert, |m| {
            m.set_marquee_data(marquee)
                .then(|| m.manager_message(ManagerKind::Alert))
        })
    }

    pub fn apply_countdown_with_sync_group(
        &mut self,
        screen_id: ScreenId,
        countdown: Option<CountdownData>,
    ) -> bool {
        self.apply_with_sync_group(screen_id, ManagerKind::Alert, |m| {
            m.set_countdown_data(countdown)
                .then(|| m.manager_message(ManagerKind::Alert))
        })
    }

    pub fn apply_alert_with_sync_group(&mut self, screen_id: ScreenId, data: AlertData) -> bool {
        self.apply_with_sync_group(screen_id, ManagerKind::Alert, |m| {
            m.set_alert_data(data)
                .then(|| m.manager_message(ManagerKind::Alert))
        })
    }

    pub fn apply_selected_verse_with_sync_group(
        &mut self,
        screen_id: ScreenId,
        verse_key: Option<String>,
    ) -> bool {
        self.apply_with_sync_group(screen_id, ManagerKind::FullText, |m| {
            m.set_selected_verse(verse_key)
                .then(|| m.bible().selected_index_message())
        })
    }

    /// Operator scroll in a window; muted while an inbound scroll settles
    pub fn handle_local_scroll(&mut self, screen_id: ScreenId, scroll: f64) -> bool {
        self.apply_with_sync_group(screen_id, ManagerKind::FullText, |m| {
            m.handle_local_scroll(scroll)
                .then(|| m.bible().scroll_message())
        })
    }

    pub fn clear_background(&mut self, screen_id: ScreenId) -> bool {
        self.apply_with_sync_group(screen_id, ManagerKind::Background, |m| {
            m.set_background_src(None);
            Some(m.manager_message(ManagerKind::Background))
        })
    }

    pub fn clear_slide(&mut self, screen_id: ScreenId) -> bool {
        self.apply_slide_item_with_sync_group(screen_id, None)
    }

    pub fn clear_bible(&mut self, screen_id: ScreenId) -> bool {
        self.apply_bible_item_with_sync_group(screen_id, None)
    }

    pub fn clear_marquee(&mut self, screen_id: ScreenId) -> bool {
        self.apply_marquee_with_sync_group(screen_id, None)
    }

    pub fn clear_countdown(&mut self, screen_id: ScreenId) -> bool {
        self.apply_countdown_with_sync_group(screen_id, None)
    }

    pub fn clear_alert(&mut self, screen_id: ScreenId) -> bool {
        self.apply_alert_with_sync_group(screen_id, AlertData::default())
    }

    /// Clear all content on a screen (and its group)
    pub fn clear_all(&mut self, screen_id: ScreenId) -> bool {
        if !self.managers.contains_key(&screen_id) {
            return false;
        }
        self.clear_background(screen_id);
        self.clear_slide(screen_id);
        self.clear_bible(screen_id);
        self.clear_alert(screen_id);
        true
    }

    // Global settings

    pub fn set_pdf_full_width(&mut self, full_width: bool) {
        slide::save_pdf_full_width(self.ctx.store.as_ref(), full_width);
        for manager in self.managers.values_mut() {
            manager.render_all();
        }
    }

    /// Store the global text style and push it to every screen
    pub fn set_bible_text_style(&mut self, style: &BibleTextStyle) {
        style.save(self.ctx.store.as_ref(), self.ctx.errors.as_ref());
        let data = serde_json::to_value(style).unwrap_or_default();
        for manager in self.managers.values_mut() {
            manager.refresh_text_style();
            self.ctx.broadcast(&ScreenMessage::new(
                manager.screen_id(),
                ScreenMessageType::BibleScreenViewTextStyle,
                data.clone(),
            ));
        }
        self.ctx
            .class_events
            .fire(EventScope::FullText, ScreenEventType::Update, None);
    }

    // Inbound

    /// Drag-and-drop onto a screen, dispatched by the payload's `type`
    pub fn receive_screen_dropped(&mut self, screen_id: ScreenId, dropped: &Value) -> bool {
        if !self.accepts(screen_id, "drop") {
            return false;
        }
        let dropped: DroppedData = match serde_json::from_value(dropped.clone()) {
            Ok(dropped) => dropped,
            Err(e) => {
                warn!(screen_id, error = %e, "Ignoring malformed drop");
                return false;
            }
        };
        match dropped.kind.as_str() {
            "background-color" | "background-image" | "background-video" => {
                let kind = match dropped.kind.as_str() {
                    "background-color" => BackgroundKind::Color,
                    "background-image" => BackgroundKind::Image,
                    _ => BackgroundKind::Video,
                };
                let Some(src) = dropped.item.as_str() else {
                    warn!(screen_id, kind = %dropped.kind, "Background drop without a source");
                    return false;
                };
                self.apply_background_src_with_sync_group(screen_id, Some(BackgroundSrc::new(kind, src)))
            }
            "slide-item" => match self.decode_drop::<SlideItemData>(&dropped) {
                Some(data) => self.apply_slide_item_with_sync_group(screen_id, Some(data)),
                None => false,
            },
            "bible-item" | "lyric-item" => match self.decode_drop::<BibleItemData>(&dropped) {
                Some(data) => self.apply_bible_item_with_sync_group(screen_id, Some(data)),
                None => false,
            },
            other => {
                warn!(screen_id, kind = %other, "Unknown drop type");
                false
            }
        }
    }

    fn decode_drop<T: serde::de::DeserializeOwned>(&self, dropped: &DroppedData) -> Option<T> {
        match serde_json::from_value(dropped.item.clone()) {
            Ok(value) => Some(value),
            Err(e) => {
                self.ctx.report(
                    anyhow::Error::new(e).context(format!("Invalid '{}' drop payload", dropped.kind)),
                );
                None
            }
        }
    }

    /// Inbound sync message dispatcher. Never fails: unknown tags and
    /// messages for screens that do not exist here are logged and dropped.
    pub fn receive_sync_screen(&mut self, message: &ScreenMessage) {
        let Some(message_type) = message.kind() else {
            warn!(
                screen_id = message.screen_id,
                kind = %message.message_type,
                "Ignoring unknown sync message type"
            );
            return;
        };

        if message_type == ScreenMessageType::BibleScreenViewTextStyle {
            self.receive_text_style(message);
            return;
        }

        if !self.accepts(message.screen_id, message_type.as_str()) {
            return;
        }
        let Some(manager) = self.managers.get_mut(&message.screen_id) else {
            return;
        };

        if message_type.manager_kind().is_some() {
            manager.receive_manager_message(message);
            return;
        }

        match message_type {
            ScreenMessageType::Init => manager.send_full_state(),
            ScreenMessageType::Visible => {
                match serde_json::from_value::<VisibleData>(message.data.clone()) {
                    Ok(data) => manager.apply_received_visible(data.is_showing),
                    Err(e) => warn!(screen_id = message.screen_id, error = %e, "Bad visible payload"),
                }
            }
            ScreenMessageType::DisplayChange => {
                match serde_json::from_value::<DisplayChangeData>(message.data.clone()) {
                    Ok(data) => manager.apply_received_display(data.display_id),
                    Err(e) => warn!(screen_id = message.screen_id, error = %e, "Bad display payload"),
                }
            }
            ScreenMessageType::Effect => {
                match serde_json::from_value::<EffectMessageData>(message.data.clone()) {
                    Ok(data) => {
                        manager.apply_received_effect(&data);
                    }
                    Err(e) => warn!(screen_id = message.screen_id, error = %e, "Bad effect payload"),
                }
            }
            other => debug!(kind = other.as_str(), "Unhandled sync message"),
        }
    }

    /// Whether inbound traffic for `screen_id` has a live screen to land on
    fn accepts(&self, screen_id: ScreenId, kind: &str) -> bool {
        match self.lookup(screen_id) {
            Some(ScreenManagerRef::Live(_)) => true,
            Some(ScreenManagerRef::Tombstoned(_)) => {
                info!(screen_id, kind, "Dropping inbound for deleted screen");
                false
            }
            None => {
                debug!(screen_id, kind, "No local screen for inbound");
                false
            }
        }
    }

    fn receive_text_style(&mut self, message: &ScreenMessage) {
        let style = match serde_json::from_value::<BibleTextStyle>(message.data.clone()) {
            Ok(style) => style,
            Err(e) => {
                warn!(screen_id = message.screen_id, error = %e, "Bad text style payload");
                return;
            }
        };
        style.save(self.ctx.store.as_ref(), self.ctx.errors.as_ref());
        for manager in self.managers.values_mut() {
            manager.refresh_text_style();
        }
    }

    // Rendering

    /// Settle every screen's transitions; returns removed node count
    pub fn settle_all(&mut self) -> usize {
        self.managers.values_mut().map(ScreenManager::settle).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::DisplayController;
    use crate::events::ScreenEventType;
    use crate::screen::surface::RecordingSurface;
    use crate::screen::test_support::{bible_item, slide_item, Fixture};
    use crate::settings::SettingStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn marquee(text: &str) -> Option<MarqueeData> {
        Some(MarqueeData {
            text: text.to_string(),
        })
    }

    fn grouped(fixture: &Fixture, ids: &[ScreenId], color: &str) -> ScreenRegistry {
        let mut registry = fixture.registry();
        for id in ids {
            registry.create_instance(*id);
            registry.set_color_note(*id, Some(color.to_string()));
        }
        fixture.bus.clear();
        registry
    }

    #[test]
    fn test_create_instance_is_idempotent() {
        let fixture = Fixture::new();
        let mut registry = fixture.registry();
        let first: *const ScreenManager = registry.create_instance(4);
        let second: *const ScreenManager = registry.create_instance(4);
        assert_eq!(first, second);
        assert_eq!(registry.screen_ids(), vec![4]);
    }

    #[test]
    fn test_gen_new_instance_recycles_smallest_free_id() {
        let fixture = Fixture::new();
        let mut registry = fixture.registry();
        for id in [0, 1, 3] {
            registry.create_instance(id);
        }
        assert_eq!(registry.gen_new_instance(), 2);
        assert_eq!(registry.gen_new_instance(), 4);

        registry.delete(1);
        assert_eq!(registry.gen_new_instance(), 1);
        assert!(registry.lookup(1).is_some_and(|r| r.is_live()));
    }

    #[test]
    fn test_get_instance_never_constructs() {
        let fixture = Fixture::new();
        let registry = fixture.registry();
        assert!(registry.get_instance(0).is_none());
        assert!(registry.lookup(0).is_none());
    }

    #[test]
    fn test_get_all_instances_bootstraps_from_showing() {
        let fixture = Fixture::with_showing(&[0, 2]);
        let mut registry = fixture.registry();
        let ids: Vec<ScreenId> = registry.get_all_instances().iter().map(|m| m.screen_id()).collect();
        assert_eq!(ids, vec![0, 2]);
        assert!(registry.get_instance(2).is_some_and(ScreenManager::is_showing));
    }

    #[test]
    fn test_delete_tombstones_clears_hides_and_persists() {
        let fixture = Fixture::new();
        let mut registry = fixture.registry();
        registry.create_instance(0);
        registry.create_instance(1);
        registry.set_showing(1, true);
        registry.apply_slide_item_with_sync_group(1, Some(slide_item(1, 800)));

        assert!(registry.delete(1));
        assert!(!registry.delete(1));

        assert!(matches!(registry.lookup(1), Some(ScreenManagerRef::Tombstoned(1))));
        assert!(fixture.displays.get_all_showing_screen_ids().unwrap().is_empty());
        let slides: serde_json::Map<String, Value> =
            serde_json::from_str(&fixture.store.get_setting(settings::SLIDE).unwrap()).unwrap();
        assert!(!slides.contains_key("1"));
        let persisted: Vec<ScreenManagerSetting> =
            serde_json::from_str(&fixture.store.get_setting(settings::MANAGERS).unwrap()).unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].screen_id, 0);
    }

    #[test]
    fn test_delete_clears_group_siblings() {
        let fixture = Fixture::new();
        let mut registry = grouped(&fixture, &[0, 1], "red");
        registry.apply_slide_item_with_sync_group(0, Some(slide_item(1, 800)));
        assert!(registry.get_instance(1).unwrap().slide().slide_item_data().is_some());

        assert!(registry.delete(0));
        assert!(registry.get_instance(1).unwrap().slide().slide_item_data().is_none());
    }

    #[test]
    fn test_inbound_for_deleted_screen_is_dropped() {
        let fixture = Fixture::new();
        let mut registry = fixture.registry();
        registry.create_instance(0);
        registry.create_instance(1);
        assert!(registry.delete(1));
        fixture.bus.clear();

        registry.receive_sync_screen(&ScreenMessage::new(
            1,
            ScreenMessageType::Background,
            json!({"type": "color", "src": "red"}),
        ));
        assert!(!registry.receive_screen_dropped(1, &json!({"type": "background-image", "item": "/a.png"})));

        assert!(registry.get_instance(1).is_none());
        assert!(matches!(registry.lookup(1), Some(ScreenManagerRef::Tombstoned(1))));
        assert!(fixture.sync_messages().is_empty());
    }

    #[test]
    fn test_instance_event_on_registry_hub() {
        let fixture = Fixture::new();
        let mut registry = fixture.registry();
        let instance_events = Arc::new(AtomicUsize::new(0));
        let counter = instance_events.clone();
        registry
            .ctx()
            .class_events
            .channel(EventScope::Screen)
            .register(&[ScreenEventType::Instance], move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        let id = registry.gen_new_instance();
        registry.delete(id);
        assert_eq!(instance_events.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_init_restores_persisted_screens() {
        let fixture = Fixture::with_showing(&[3]);
        {
            let mut registry = fixture.registry();
            registry.create_instance(1);
            registry.create_instance(3);
            registry.set_selected(1, true);
            registry.set_color_note(3, Some("blue".to_string()));
        }

        let mut registry = fixture.registry();
        assert_eq!(registry.init(), 2);
        assert_eq!(registry.get_selected(), vec![1]);
        assert_eq!(registry.get_instance(3).and_then(|m| m.color_note()), Some("blue"));
        assert!(registry.get_instance(3).is_some_and(ScreenManager::is_showing));
        assert!(!registry.get_instance(1).is_some_and(ScreenManager::is_showing));
    }

    #[test]
    fn test_init_with_malformed_manager_list_falls_back() {
        let fixture = Fixture::with_showing(&[0]);
        fixture.store.set_setting(settings::MANAGERS, Some("[{\"screenId\": \"x\"}"));
        let mut registry = fixture.registry();

        assert_eq!(registry.init(), 1);
        assert_eq!(fixture.errors.messages().len(), 1);
        assert_eq!(fixture.store.get_setting(settings::MANAGERS), None);
    }

    #[test]
    fn test_content_round_trips_through_store() {
        let fixture = Fixture::new();
        let mut registry = fixture.registry();
        registry.create_instance(0);
        let slide = slide_item(9, 1024);
        let bible = bible_item("In the beginning");
        registry.apply_slide_item_with_sync_group(0, Some(slide.clone()));
        registry.apply_bible_item_with_sync_group(0, Some(bible.clone()));
        registry.apply_marquee_with_sync_group(0, marquee("Service at 10"));

        let mut fresh = fixture.registry();
        let manager = fresh.create_instance(0);
        assert_eq!(manager.slide().slide_item_data(), Some(&slide));
        assert_eq!(manager.bible().bible_item_data(), Some(&bible));
        assert_eq!(
            manager.alert().alert_data().marquee_data.as_ref().map(|m| m.text.as_str()),
            Some("Service at 10")
        );

        fresh.clear_slide(0);
        let raw: serde_json::Map<String, Value> =
            serde_json::from_str(&fixture.store.get_setting(settings::SLIDE).unwrap()).unwrap();
        assert!(!raw.contains_key("0"));
    }

    #[test]
    fn test_sync_group_fans_out_once_without_echo() {
        let fixture = Fixture::new();
        let mut registry = grouped(&fixture, &[0, 1], "red");
        registry.create_instance(2);
        let a_updates = Arc::new(AtomicUsize::new(0));
        let b_updates = Arc::new(AtomicUsize::new(0));
        for (id, counter) in [(0, a_updates.clone()), (1, b_updates.clone())] {
            registry
                .get_instance(id)
                .unwrap()
                .slide()
                .events()
                .register(&[ScreenEventType::Update], move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
        }

        let payload = slide_item(5, 1920);
        assert!(registry.apply_slide_item_with_sync_group(0, Some(payload.clone())));

        assert_eq!(registry.get_instance(1).unwrap().slide().slide_item_data(), Some(&payload));
        assert_eq!(registry.get_instance(2).unwrap().slide().slide_item_data(), None);
        assert_eq!(a_updates.load(Ordering::SeqCst), 1);
        assert_eq!(b_updates.load(Ordering::SeqCst), 1);
        // One broadcast per screen, for its own renderer
        let slides = fixture.sync_messages_of("vary-app-document");
        assert_eq!(slides.len(), 2);
        assert_eq!(slides[1]["screenId"], json!(1));

        // B is muted: re-propagating its copy does not touch A
        let b = registry.get_instance(1).unwrap();
        assert!(!b.check_is_sync_group_enabled(ManagerKind::Slide));
        let echo = b.manager_message(ManagerKind::Slide);
        assert!(registry.sync_group(1, &echo).is_empty());
        assert_eq!(a_updates.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_group_aware_apply_on_muted_sibling_reenables_it() {
        let fixture = Fixture::new();
        let mut registry = grouped(&fixture, &[0, 1], "green");
        registry.apply_slide_item_with_sync_group(0, Some(slide_item(1, 100)));

        registry.apply_slide_item_with_sync_group(1, Some(slide_item(2, 100)));
        assert_eq!(
            registry.get_instance(0).unwrap().slide().slide_item_data().map(|d| d.slide_item_json.id),
            Some(2)
        );
        // A is now the muted side
        assert!(!registry.get_instance(0).unwrap().check_is_sync_group_enabled(ManagerKind::Slide));
        assert!(registry.get_instance(1).unwrap().check_is_sync_group_enabled(ManagerKind::Slide));
    }

    #[test]
    fn test_set_color_note_unmutes_and_resyncs() {
        let fixture = Fixture::new();
        let mut registry = grouped(&fixture, &[0, 1], "red");
        registry.apply_marquee_with_sync_group(0, marquee("Hi"));
        assert!(!registry.get_instance(1).unwrap().check_is_sync_group_enabled(ManagerKind::Alert));
        fixture.bus.clear();

        registry.set_color_note(1, Some("red".to_string()));
        assert!(registry.get_instance(1).unwrap().check_is_sync_group_enabled(ManagerKind::Alert));
        // Full state: four content messages plus three effects
        assert_eq!(fixture.sync_messages().len(), 7);
    }

    #[test]
    fn test_ungrouped_screen_stays_local() {
        let fixture = Fixture::new();
        let mut registry = fixture.registry();
        registry.create_instance(0);
        registry.create_instance(1);
        registry.apply_bible_item_with_sync_group(0, Some(bible_item("Gen 1:1")));
        assert!(registry.get_instance(1).unwrap().bible().bible_item_data().is_none());
    }

    #[test]
    fn test_idempotent_marquee_does_not_fan_out_again() {
        let fixture = Fixture::new();
        let mut registry = grouped(&fixture, &[0, 1], "red");
        assert!(registry.apply_marquee_with_sync_group(0, marquee("Hello")));
        let sent = fixture.sync_messages().len();

        assert!(!registry.apply_marquee_with_sync_group(0, marquee("Hello")));
        assert_eq!(fixture.sync_messages().len(), sent);
    }

    #[test]
    fn test_clear_all_clears_whole_group() {
        let fixture = Fixture::new();
        let mut registry = grouped(&fixture, &[0, 1], "red");
        registry.apply_background_src_with_sync_group(0, Some(BackgroundSrc::new(BackgroundKind::Color, "#000")));
        registry.apply_marquee_with_sync_group(0, marquee("Hello"));

        registry.clear_all(0);
        let b = registry.get_instance(1).unwrap();
        assert!(b.background().background_src().is_none());
        assert!(b.alert().alert_data().is_empty());
    }

    #[test]
    fn test_unknown_message_type_is_ignored() {
        let fixture = Fixture::new();
        let mut registry = fixture.registry();
        registry.create_instance(0);
        registry.apply_slide_item_with_sync_group(0, Some(slide_item(1, 100)));
        let before = fixture.store.get_setting(settings::SLIDE);
        fixture.bus.clear();

        let message: ScreenMessage =
            serde_json::from_value(json!({"screenId": 0, "type": "bogus-type", "data": {}})).unwrap();
        registry.receive_sync_screen(&message);

        assert_eq!(fixture.store.get_setting(settings::SLIDE), before);
        assert!(registry.get_instance(0).unwrap().slide().slide_item_data().is_some());
        assert!(fixture.sync_messages().is_empty());
        assert!(fixture.errors.messages().is_empty());
    }

    #[test]
    fn test_receive_for_missing_screen_is_noop() {
        let fixture = Fixture::new();
        let mut registry = fixture.registry();
        let message = ScreenMessage::new(9, ScreenMessageType::Alert, json!({"marqueeData": {"text": "x"}}));
        registry.receive_sync_screen(&message);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_receive_sync_screen_dispatches_by_type() {
        let fixture = Fixture::new();
        let mut registry = fixture.registry();
        registry.create_instance(0);
        fixture.bus.clear();

        registry.receive_sync_screen(&ScreenMessage::new(
            0,
            ScreenMessageType::Background,
            json!({"type": "video", "src": "/loop.mp4"}),
        ));
        registry.receive_sync_screen(&ScreenMessage::new(
            0,
            ScreenMessageType::Visible,
            json!({"isShowing": true}),
        ));
        registry.receive_sync_screen(&ScreenMessage::new(
            0,
            ScreenMessageType::Effect,
            json!({"target": "foreground", "effect": "zoom"}),
        ));
        registry.receive_sync_screen(&ScreenMessage::new(
            0,
            ScreenMessageType::DisplayChange,
            json!({"displayId": 2}),
        ));

        let manager = registry.get_instance(0).unwrap();
        assert_eq!(
            manager.background().background_src(),
            Some(&BackgroundSrc::new(BackgroundKind::Video, "/loop.mp4"))
        );
        assert!(manager.is_showing());
        assert_eq!(manager.effects().foreground.effect_type(), EffectType::Zoom);
        assert_eq!(manager.display_id(), 2);
        // Received visible makes no OS call
        assert!(fixture.displays.placements().is_empty());
    }

    #[test]
    fn test_legacy_tags_still_dispatch() {
        let fixture = Fixture::new();
        let mut registry = fixture.registry();
        registry.create_instance(0);
        let message: ScreenMessage = serde_json::from_value(json!({
            "screenId": 0,
            "type": "slide",
            "data": serde_json::to_value(slide_item(3, 640)).unwrap()
        }))
        .unwrap();
        registry.receive_sync_screen(&message);
        assert!(registry.get_instance(0).unwrap().slide().slide_item_data().is_some());
    }

    #[test]
    fn test_init_replies_with_full_state() {
        let fixture = Fixture::new();
        let mut registry = fixture.registry();
        registry.create_instance(0);
        fixture.bus.clear();

        registry.receive_sync_screen(&ScreenMessage::new(0, ScreenMessageType::Init, Value::Null));
        let types: Vec<Value> = fixture.sync_messages().into_iter().map(|m| m["type"].clone()).collect();
        assert_eq!(types[0], json!("visible"));
        assert_eq!(types[1], json!("display-change"));
        assert_eq!(types.len(), 9);
    }

    #[test]
    fn test_scroll_mute_window_across_registry() {
        let fixture = Fixture::new();
        let mut registry = fixture.registry();
        registry.create_instance(0);
        registry.apply_bible_item_with_sync_group(0, Some(bible_item("Ps 1:1")));
        registry.receive_sync_screen(&ScreenMessage::new(
            0,
            ScreenMessageType::BibleScreenViewScroll,
            json!({"scroll": 0.4}),
        ));
        fixture.bus.clear();

        fixture.clock.advance(Duration::from_secs(1));
        assert!(!registry.handle_local_scroll(0, 0.7));
        assert!(fixture.sync_messages_of("bible-screen-view-scroll").is_empty());

        fixture.clock.advance(Duration::from_secs(2));
        assert!(registry.handle_local_scroll(0, 0.7));
        assert_eq!(fixture.sync_messages_of("bible-screen-view-scroll").len(), 1);
    }

    #[test]
    fn test_scroll_propagates_to_group_and_mutes_sibling() {
        let fixture = Fixture::new();
        let mut registry = grouped(&fixture, &[0, 1], "red");
        registry.apply_bible_item_with_sync_group(0, Some(bible_item("Ps 1:1")));

        assert!(registry.handle_local_scroll(0, 0.3));
        assert_eq!(registry.get_instance(1).unwrap().bible().scroll(), 0.3);
        // The sibling's own scroll listener is muted for the window
        assert!(!registry.handle_local_scroll(1, 0.9));
    }

    #[test]
    fn test_text_style_is_global_and_broadcast_per_screen() {
        let fixture = Fixture::new();
        let mut registry = fixture.registry();
        registry.create_instance(0);
        registry.create_instance(1);
        fixture.bus.clear();
        let style = BibleTextStyle {
            font_size: 80,
            ..BibleTextStyle::default()
        };

        registry.set_bible_text_style(&style);
        assert_eq!(
            BibleTextStyle::load(fixture.store.as_ref(), fixture.errors.as_ref()).font_size,
            80
        );
        assert_eq!(fixture.sync_messages_of("bible-screen-view-text-style").len(), 2);
    }

    #[test]
    fn test_inbound_text_style_is_stored_for_both_tags() {
        let fixture = Fixture::new();
        let mut registry = fixture.registry();
        registry.create_instance(0);

        for (tag, size) in [("bible-screen-view-text-style", 72), ("full-text-text-style", 90)] {
            let style = BibleTextStyle {
                font_size: size,
                ..BibleTextStyle::default()
            };
            let message: ScreenMessage = serde_json::from_value(json!({
                "screenId": 0,
                "type": tag,
                "data": serde_json::to_value(&style).unwrap()
            }))
            .unwrap();
            registry.receive_sync_screen(&message);
            assert_eq!(
                BibleTextStyle::load(fixture.store.as_ref(), fixture.errors.as_ref()).font_size,
                size
            );
        }
    }

    #[test]
    fn test_inbound_selected_index_for_both_tags() {
        let fixture = Fixture::new();
        let mut registry = fixture.registry();
        registry.create_instance(0);
        registry.apply_bible_item_with_sync_group(0, Some(bible_item("John 3:16")));

        for (tag, key) in [
            ("bible-screen-view-selected-index", "JHN.3.16"),
            ("full-text-selected-index", "JHN.3.17"),
        ] {
            let message: ScreenMessage = serde_json::from_value(json!({
                "screenId": 0,
                "type": tag,
                "data": {"selectedKJVVerseKey": key}
            }))
            .unwrap();
            registry.receive_sync_screen(&message);
            assert_eq!(registry.get_instance(0).unwrap().bible().selected_verse_key(), Some(key));
        }
    }

    #[test]
    fn test_drop_dispatch() {
        let fixture = Fixture::new();
        let mut registry = fixture.registry();
        registry.create_instance(0);

        assert!(registry.receive_screen_dropped(0, &json!({"type": "background-image", "item": "/a.png"})));
        assert!(registry.receive_screen_dropped(
            0,
            &json!({"type": "slide-item", "item": serde_json::to_value(slide_item(2, 800)).unwrap()})
        ));
        assert!(registry.receive_screen_dropped(
            0,
            &json!({"type": "lyric-item", "item": {
                "locale": "en",
                "type": "lyric",
                "lyricItemData": {"renderedList": [{"text": "Amazing grace"}], "lyricItem": {}}
            }})
        ));
        assert!(!registry.receive_screen_dropped(0, &json!({"type": "playlist-item", "item": {}})));
        assert!(!registry.receive_screen_dropped(0, &json!({"type": "slide-item", "item": 5})));

        let manager = registry.get_instance(0).unwrap();
        assert_eq!(manager.background().background_src().map(|b| b.src.as_str()), Some("/a.png"));
        assert!(manager.slide().slide_item_data().is_some());
        assert_eq!(manager.bible().bible_item_data().map(|d| d.rendered_list().len()), Some(1));
        assert_eq!(fixture.errors.messages().len(), 1);
    }

    #[test]
    fn test_selection_bulk_apply() {
        let fixture = Fixture::new();
        let mut registry = fixture.registry();
        for id in 0..3 {
            registry.create_instance(id);
        }
        registry.set_selected(0, true);
        registry.set_selected(2, true);

        let applied = registry.apply_to_selected(|registry, id| {
            registry.apply_marquee_with_sync_group(id, marquee("Selected"));
        });
        assert_eq!(applied, 2);
        assert!(registry.get_instance(1).unwrap().alert().alert_data().is_empty());
        assert!(!registry.get_instance(2).unwrap().alert().alert_data().is_empty());
    }

    #[test]
    fn test_rendering_and_settle_through_registry() {
        let fixture = Fixture::new();
        let mut registry = fixture.registry();
        registry.create_instance(0);
        let surface = RecordingSurface::new("bg");
        registry.bind_surface(0, ManagerKind::Background, Some(Box::new(surface.clone())));

        registry.apply_background_src_with_sync_group(0, Some(BackgroundSrc::new(BackgroundKind::Color, "red")));
        registry.apply_background_src_with_sync_group(0, Some(BackgroundSrc::new(BackgroundKind::Color, "blue")));
        assert_eq!(surface.nodes().len(), 2);

        fixture.clock.advance(Duration::from_millis(500));
        assert_eq!(registry.settle_all(), 1);
        assert_eq!(surface.nodes().len(), 1);
    }
}
