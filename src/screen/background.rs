//! Background layer: a solid color, an image or a looping video

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::base::{ManagerBase, RenderEnv};
use super::context::ScreenContext;
use super::surface::{NodeContent, RenderNode, RenderSurface};
use super::types::{ScreenId, ScreenMessage, ScreenMessageType};
use crate::constants::settings;
use crate::events::{EventHandler, EventScope};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundKind {
    Color,
    Image,
    Video,
}

impl BackgroundKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "color" => Some(BackgroundKind::Color),
            "image" => Some(BackgroundKind::Image),
            "video" => Some(BackgroundKind::Video),
            _ => None,
        }
    }
}

/// `{ type, src }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundSrc {
    #[serde(rename = "type")]
    pub kind: BackgroundKind,
    pub src: String,
}

impl BackgroundSrc {
    pub fn new(kind: BackgroundKind, src: impl Into<String>) -> Self {
        Self {
            kind,
            src: src.into(),
        }
    }
}

#[derive(Debug)]
pub struct ScreenBackgroundManager {
    base: ManagerBase,
    background_src: Option<BackgroundSrc>,
}

impl ScreenBackgroundManager {
    pub fn load(screen_id: ScreenId, ctx: ScreenContext) -> Self {
        let base = ManagerBase::new(screen_id, ctx, EventScope::Background);
        let background_src = base.load_entry(settings::BACKGROUND);
        Self {
            base,
            background_src,
        }
    }

    pub fn background_src(&self) -> Option<&BackgroundSrc> {
        self.background_src.as_ref()
    }

    pub fn events(&self) -> &Arc<EventHandler> {
        self.base.events()
    }

    /// What applying `src` should produce: selecting the current source
    /// again clears it.
    pub fn toggled(&self, src: Option<BackgroundSrc>) -> Option<BackgroundSrc> {
        match (&self.background_src, src) {
            (Some(current), Some(next)) if *current == next => None,
            (_, next) => next,
        }
    }

    pub fn set_background_src(&mut self, env: &RenderEnv, src: Option<BackgroundSrc>) {
        debug!(screen_id = self.base.screen_id, src = ?src.as_ref().map(|s| &s.src), "Set background");
        self.background_src = src;
        self.render(env);
        self.base
            .persist_entry(settings::BACKGROUND, self.background_src.as_ref());
        self.send_sync_screen();
        self.base.fire_update();
    }

    pub fn render(&mut self, env: &RenderEnv) {
        if !self.base.is_bound() {
            return;
        }
        let node = self.background_src.as_ref().map(|bg| match bg.kind {
            BackgroundKind::Color => RenderNode::new(
                NodeContent::Color(bg.src.clone()),
                format!("position:absolute;inset:0;background-color:{};", bg.src),
            ),
            BackgroundKind::Image => RenderNode::new(
                NodeContent::Image { src: bg.src.clone() },
                "position:absolute;inset:0;object-fit:cover;",
            ),
            BackgroundKind::Video => RenderNode::new(
                NodeContent::Video { src: bg.src.clone() },
                "position:absolute;inset:0;object-fit:cover;",
            ),
        });
        self.base.present(node, env);
    }

    pub fn to_sync_message(&self) -> ScreenMessage {
        ScreenMessage::new(
            self.base.screen_id,
            ScreenMessageType::Background,
            serde_json::to_value(&self.background_src).unwrap_or_default(),
        )
    }

    pub fn send_sync_screen(&self) {
        self.base.broadcast(&self.to_sync_message());
    }

    pub fn receive_sync_screen(&mut self, env: &RenderEnv, message: &ScreenMessage) {
        if let Some(src) = self.base.decode_data::<BackgroundSrc>(message) {
            self.set_background_src(env, src);
        }
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screen::test_support::{env, Fixture};
    use crate::screen::surface::RecordingSurface;
    use serde_json::json;

    #[test]
    fn test_reselecting_same_source_toggles_off() {
        let fixture = Fixture::new();
        let mut manager = ScreenBackgroundManager::load(0, fixture.ctx());
        let red = BackgroundSrc::new(BackgroundKind::Color, "red");

        assert_eq!(manager.toggled(Some(red.clone())), Some(red.clone()));
        manager.set_background_src(&env(), Some(red.clone()));
        assert_eq!(manager.toggled(Some(red)), None);
        let blue = BackgroundSrc::new(BackgroundKind::Color, "blue");
        assert_eq!(manager.toggled(Some(blue.clone())), Some(blue));
    }

    #[test]
    fn test_same_src_with_other_kind_replaces() {
        let fixture = Fixture::new();
        let mut manager = ScreenBackgroundManager::load(0, fixture.ctx());
        let image = BackgroundSrc::new(BackgroundKind::Image, "/media/intro.mp4");
        manager.set_background_src(&env(), Some(image));

        let video = BackgroundSrc::new(BackgroundKind::Video, "/media/intro.mp4");
        assert_eq!(manager.toggled(Some(video.clone())), Some(video));
    }

    #[test]
    fn test_set_renders_persists_and_broadcasts() {
        let fixture = Fixture::new();
        let surface = RecordingSurface::new("bg");
        let mut manager = ScreenBackgroundManager::load(1, fixture.ctx());
        manager.bind_surface(&env(), Some(Box::new(surface.clone())));

        let image = BackgroundSrc::new(BackgroundKind::Image, "/bg/sunrise.jpg");
        manager.set_background_src(&env(), Some(image.clone()));

        assert_eq!(surface.mount_count(), 1);
        assert_eq!(
            fixture.sync_messages(),
            vec![json!({"screenId": 1, "type": "background", "data": {"type": "image", "src": "/bg/sunrise.jpg"}})]
        );
        let reloaded = ScreenBackgroundManager::load(1, fixture.ctx());
        assert_eq!(reloaded.background_src(), Some(&image));
    }

    #[test]
    fn test_receive_rejects_malformed_payload() {
        let fixture = Fixture::new();
        let mut manager = ScreenBackgroundManager::load(0, fixture.ctx());
        let message = ScreenMessage::new(0, ScreenMessageType::Background, json!({"type": "hologram"}));

        manager.receive_sync_screen(&env(), &message);
        assert_eq!(manager.background_src(), None);
        assert_eq!(fixture.errors.messages().len(), 1);
    }
}
