//! Full-text view: bible passages and lyrics
//!
//! The payload is replaced as a whole by `bible-screen-view`, but `scroll`
//! and `selectedKJVVerseKey` travel in their own messages and are merged into
//! the stored payload, so a scroll update never clobbers a newer copy of the
//! rest of the view.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

use super::base::{ManagerBase, RenderEnv};
use super::context::ScreenContext;
use super::surface::{NodeContent, RenderNode, RenderSurface};
use super::types::{ScreenId, ScreenMessage, ScreenMessageType};
use crate::constants::settings;
use crate::error::ErrorReporter;
use crate::events::{EventHandler, EventScope};
use crate::settings::{codec, SettingStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BibleItemKind {
    Bible,
    Lyric,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BibleRenderedData {
    #[serde(default)]
    pub rendered_list: Vec<Value>,
    #[serde(default)]
    pub bible_item: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricRenderedData {
    #[serde(default)]
    pub rendered_list: Vec<Value>,
    #[serde(default)]
    pub lyric_item: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BibleItemData {
    #[serde(default)]
    pub locale: String,
    #[serde(rename = "type")]
    pub kind: BibleItemKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bible_item_data: Option<BibleRenderedData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyric_item_data: Option<LyricRenderedData>,
    #[serde(default)]
    pub scroll: f64,
    #[serde(rename = "selectedKJVVerseKey", default)]
    pub selected_kjv_verse_key: Option<String>,
}

impl BibleItemData {
    pub fn rendered_list(&self) -> &[Value] {
        match self.kind {
            BibleItemKind::Bible => self
                .bible_item_data
                .as_ref()
                .map(|d| d.rendered_list.as_slice())
                .unwrap_or_default(),
            BibleItemKind::Lyric => self
                .lyric_item_data
                .as_ref()
                .map(|d| d.rendered_list.as_slice())
                .unwrap_or_default(),
        }
    }
}

/// Global text style shared by every screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BibleTextStyle {
    pub font_size: u32,
    pub color: String,
    pub text_shadow: String,
}

impl Default for BibleTextStyle {
    fn default() -> Self {
        Self {
            font_size: 65,
            color: "#ffffff".to_string(),
            text_shadow: "rgba(0,0,0,0.5) 0px 0px 4px".to_string(),
        }
    }
}

impl BibleTextStyle {
    pub fn load(store: &dyn SettingStore, errors: &dyn ErrorReporter) -> Self {
        codec::load_json(store, errors, settings::BIBLE_TEXT_STYLE).unwrap_or_default()
    }

    pub fn save(&self, store: &dyn SettingStore, errors: &dyn ErrorReporter) {
        codec::save_json(store, errors, settings::BIBLE_TEXT_STYLE, Some(self));
    }

    fn css(&self) -> String {
        format!(
            "font-size:{}px;color:{};text-shadow:{};overflow-y:auto;",
            self.font_size, self.color, self.text_shadow
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
struct ScrollData {
    scroll: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct SelectedIndexData {
    #[serde(rename = "selectedKJVVerseKey", default)]
    selected_kjv_verse_key: Option<String>,
}

#[derive(Debug)]
pub struct ScreenBibleManager {
    base: ManagerBase,
    bible_item_data: Option<BibleItemData>,
    scroll_muted_until: Option<Instant>,
}

impl ScreenBibleManager {
    pub fn load(screen_id: ScreenId, ctx: ScreenContext) -> Self {
        let base = ManagerBase::new(screen_id, ctx, EventScope::FullText);
        let bible_item_data = base.load_entry(settings::FULL_TEXT);
        Self {
            base,
            bible_item_data,
            scroll_muted_until: None,
        }
    }

    /// Every stored full-text payload, keyed by screen id string
    pub fn load_all(
        store: &dyn SettingStore,
        errors: &dyn ErrorReporter,
    ) -> std::collections::BTreeMap<String, BibleItemData> {
        codec::load_map(store, errors, settings::FULL_TEXT)
    }

    pub fn bible_item_data(&self) -> Option<&BibleItemData> {
        self.bible_item_data.as_ref()
    }

    pub fn scroll(&self) -> f64 {
        self.bible_item_data.as_ref().map_or(0.0, |d| d.scroll)
    }

    pub fn selected_verse_key(&self) -> Option<&str> {
        self.bible_item_data
            .as_ref()
            .and_then(|d| d.selected_kjv_verse_key.as_deref())
    }

    pub fn events(&self) -> &Arc<EventHandler> {
        self.base.events()
    }

    pub fn set_bible_item_data(&mut self, env: &RenderEnv, data: Option<BibleItemData>) {
        debug!(
            screen_id = self.base.screen_id,
            kind = ?data.as_ref().map(|d| d.kind),
            "Set full text"
        );
        self.bible_item_data = data;
        self.render(env);
        self.persist();
        self.send_sync_screen();
        self.base.fire_update();
    }

    /// Merge a new scroll position; no-op without a payload
    pub fn set_scroll(&mut self, scroll: f64) -> bool {
        let Some(data) = self.bible_item_data.as_mut() else {
            return false;
        };
        data.scroll = scroll.clamp(0.0, 1.0);
        self.persist();
        self.base.broadcast(&self.scroll_message());
        self.base.fire_update();
        true
    }

    /// Merge the highlighted verse key and refresh the visible text in place
    pub fn set_selected_index(&mut self, verse_key: Option<String>) -> bool {
        let Some(data) = self.bible_item_data.as_mut() else {
            return false;
        };
        data.selected_kjv_verse_key = verse_key;
        self.refresh_in_place();
        self.persist();
        self.base.broadcast(&self.selected_index_message());
        self.base.fire_update();
        true
    }

    pub fn is_scroll_muted(&self, now: Instant) -> bool {
        self.scroll_muted_until.is_some_and(|until| now < until)
    }

    /// A scroll made by the operator in this window. Ignored while an
    /// inbound scroll is still settling, so it is not echoed back.
    pub fn handle_local_scroll(&mut self, scroll: f64) -> bool {
        let now = self.base.ctx.clock.now();
        if self.is_scroll_muted(now) {
            trace!(screen_id = self.base.screen_id, "Local scroll muted");
            return false;
        }
        self.scroll_muted_until = None;
        self.set_scroll(scroll)
    }

    pub fn receive_sync_screen(&mut self, env: &RenderEnv, message: &ScreenMessage) {
        if let Some(data) = self.base.decode_data::<BibleItemData>(message) {
            self.set_bible_item_data(env, data);
        }
    }

    pub fn receive_sync_scroll(&mut self, message: &ScreenMessage) {
        let Some(Some(data)) = self.base.decode_data::<ScrollData>(message) else {
            return;
        };
        // A newer inbound scroll replaces the pending unmute
        let until = self.base.ctx.clock.now() + self.base.ctx.scroll_mute;
        self.scroll_muted_until = Some(until);
        if !self.set_scroll(data.scroll) {
            self.base.fire_update();
        }
    }

    pub fn receive_sync_selected_index(&mut self, message: &ScreenMessage) {
        let Some(Some(data)) = self.base.decode_data::<SelectedIndexData>(message) else {
            return;
        };
        if !self.set_selected_index(data.selected_kjv_verse_key) {
            self.base.fire_update();
        }
    }

    pub fn render(&mut self, env: &RenderEnv) {
        if !self.base.is_bound() {
            return;
        }
        let node = self.render_node();
        self.base.present(node, env);
    }

    /// Re-render text after a style or highlight change without a transition
    pub fn refresh_in_place(&mut self) {
        let Some(node) = self.render_node() else {
            return;
        };
        let Some(current) = self.base.stage.current() else {
            return;
        };
        let base = &mut self.base;
        if let Some(surface) = base.surface_mut() {
            surface.update(current, node.content);
            surface.set_style(current, &node.style);
        }
    }

    fn render_node(&self) -> Option<RenderNode> {
        let data = self.bible_item_data.as_ref()?;
        let style = BibleTextStyle::load(
            self.base.ctx.store.as_ref(),
            self.base.ctx.errors.as_ref(),
        );
        let selected = data.selected_kjv_verse_key.as_deref();
        let body: String = data
            .rendered_list()
            .iter()
            .map(|item| {
                let key = item.get("verseKey").and_then(Value::as_str);
                let text = item.get("text").and_then(Value::as_str).unwrap_or_default();
                let class = if key.is_some() && key == selected {
                    "verse selected"
                } else {
                    "verse"
                };
                format!("<div class=\"{class}\">{text}</div>")
            })
            .collect();
        Some(RenderNode::new(
            NodeContent::Html(format!("<div lang=\"{}\">{body}</div>", data.locale)),
            style.css(),
        ))
    }

    pub fn to_sync_message(&self) -> ScreenMessage {
        ScreenMessage::new(
            self.base.screen_id,
            ScreenMessageType::BibleScreenView,
            serde_json::to_value(&self.bible_item_data).unwrap_or_default(),
        )
    }

    pub fn scroll_message(&self) -> ScreenMessage {
        ScreenMessage::new(
            self.base.screen_id,
            ScreenMessageType::BibleScreenViewScroll,
            json!({ "scroll": self.scroll() }),
        )
    }

    pub fn selected_index_message(&self) -> ScreenMessage {
        ScreenMessage::new(
            self.base.screen_id,
            ScreenMessageType::BibleScreenViewSelectedIndex,
            json!({ "selectedKJVVerseKey": self.selected_verse_key() }),
        )
    }

    pub fn send_sync_screen(&self) {
        self.base.broadcast(&self.to_sync_message());
    }

    pub fn bind_surface(&mut self, env: &RenderEnv, surface: Option<Box<dyn RenderSurface>>) {
        self.base.bind_surface(surface);
        self.render(env);
    }

    pub fn base(&self) -> &ManagerBase {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut ManagerBase {
        &mut self.base
    }

    fn persist(&self) {
        self.base
            .persist_entry(settings::FULL_TEXT, self.bible_item_data.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screen::surface::RecordingSurface;
    use crate::screen::test_support::{bible_item, env, Fixture};
    use std::time::Duration;

    #[test]
    fn test_malformed_full_text_setting_resets() {
        let fixture = Fixture::new();
        fixture.store.set_setting(settings::FULL_TEXT, Some("{\"0\": [oops"));

        let all = ScreenBibleManager::load_all(fixture.store.as_ref(), fixture.errors.as_ref());
        assert!(all.is_empty());
        assert_eq!(fixture.store.get_setting(settings::FULL_TEXT).as_deref(), Some("{}"));
        assert_eq!(fixture.errors.messages().len(), 1);
    }

    #[test]
    fn test_scroll_merges_without_touching_payload() {
        let fixture = Fixture::new();
        let mut manager = ScreenBibleManager::load(0, fixture.ctx());
        manager.set_bible_item_data(&env(), Some(bible_item("John 3:16")));
        fixture.bus.clear();

        assert!(manager.set_scroll(0.25));
        let reloaded = ScreenBibleManager::load(0, fixture.ctx());
        let data = reloaded.bible_item_data().unwrap();
        assert_eq!(data.scroll, 0.25);
        assert_eq!(data.rendered_list().len(), 1);
        assert_eq!(
            fixture.sync_messages(),
            vec![json!({"screenId": 0, "type": "bible-screen-view-scroll", "data": {"scroll": 0.25}})]
        );
    }

    #[test]
    fn test_inbound_scroll_mutes_local_echo() {
        let fixture = Fixture::new();
        let mut manager = ScreenBibleManager::load(0, fixture.ctx());
        manager.set_bible_item_data(&env(), Some(bible_item("John 3:16")));

        let inbound = ScreenMessage::new(0, ScreenMessageType::BibleScreenViewScroll, json!({"scroll": 0.5}));
        manager.receive_sync_scroll(&inbound);
        assert_eq!(manager.scroll(), 0.5);
        fixture.bus.clear();

        fixture.clock.advance(Duration::from_millis(2999));
        assert!(!manager.handle_local_scroll(0.6));
        assert!(fixture.sync_messages().is_empty());

        fixture.clock.advance(Duration::from_millis(1));
        assert!(manager.handle_local_scroll(0.6));
        assert_eq!(fixture.sync_messages().len(), 1);
    }

    #[test]
    fn test_repeated_inbound_scroll_extends_mute() {
        let fixture = Fixture::new();
        let mut manager = ScreenBibleManager::load(0, fixture.ctx());
        manager.set_bible_item_data(&env(), Some(bible_item("Ps 23:1")));
        let inbound = ScreenMessage::new(0, ScreenMessageType::BibleScreenViewScroll, json!({"scroll": 0.1}));

        manager.receive_sync_scroll(&inbound);
        fixture.clock.advance(Duration::from_secs(2));
        manager.receive_sync_scroll(&inbound);
        fixture.clock.advance(Duration::from_secs(2));
        assert!(!manager.handle_local_scroll(0.9));
    }

    #[test]
    fn test_selected_verse_is_highlighted_in_place() {
        let fixture = Fixture::new();
        let surface = RecordingSurface::new("full-text");
        let mut manager = ScreenBibleManager::load(0, fixture.ctx());
        manager.bind_surface(&env(), Some(Box::new(surface.clone())));
        manager.set_bible_item_data(&env(), Some(bible_item("John 3:16")));

        assert!(manager.set_selected_index(Some("JHN.3.16".to_string())));
        assert_eq!(surface.mount_count(), 1);
        let (_, node) = surface.nodes().pop().unwrap();
        assert!(matches!(node.content, NodeContent::Html(ref html) if html.contains("verse selected")));
        assert_eq!(manager.selected_verse_key(), Some("JHN.3.16"));
    }

    #[test]
    fn test_text_style_default_and_css() {
        let fixture = Fixture::new();
        let style = BibleTextStyle::load(fixture.store.as_ref(), fixture.errors.as_ref());
        assert_eq!(style, BibleTextStyle::default());
        assert!(style.css().contains("font-size:65px"));
    }
}
