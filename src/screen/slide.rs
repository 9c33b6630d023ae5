//! Projected slide: a pre-rendered PDF page or an HTML/canvas slide

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::base::{ManagerBase, RenderEnv};
use super::context::ScreenContext;
use super::surface::{NodeContent, RenderNode, RenderSurface};
use super::types::{ScreenId, ScreenMessage, ScreenMessageType};
use crate::constants::settings;
use crate::events::{EventHandler, EventScope};
use crate::settings::SettingStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideMetadata {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfImageData {
    pub src: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideItem {
    pub id: i64,
    #[serde(default)]
    pub metadata: SlideMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_image_data: Option<PdfImageData>,
    #[serde(default)]
    pub canvas_items: Vec<Value>,
}

/// `{ slideFilePath, slideItemJson }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideItemData {
    pub slide_file_path: String,
    pub slide_item_json: SlideItem,
}

/// Global layout toggle for PDF slides
pub fn is_pdf_full_width(store: &dyn SettingStore) -> bool {
    store.get_setting(settings::PDF_FULL_WIDTH).as_deref() == Some("true")
}

pub fn save_pdf_full_width(store: &dyn SettingStore, full_width: bool) {
    store.set_setting(
        settings::PDF_FULL_WIDTH,
        Some(if full_width { "true" } else { "false" }),
    );
}

/// `parent / content`, 1 when the content has no width
pub fn fit_scale(parent_width: u32, content_width: u32) -> f64 {
    if content_width == 0 {
        return 1.0;
    }
    f64::from(parent_width) / f64::from(content_width)
}

#[derive(Debug)]
pub struct ScreenSlideManager {
    base: ManagerBase,
    slide_item_data: Option<SlideItemData>,
}

impl ScreenSlideManager {
    pub fn load(screen_id: ScreenId, ctx: ScreenContext) -> Self {
        let base = ManagerBase::new(screen_id, ctx, EventScope::Slide);
        let slide_item_data = base.load_entry(settings::SLIDE);
        Self {
            base,
            slide_item_data,
        }
    }

    pub fn slide_item_data(&self) -> Option<&SlideItemData> {
        self.slide_item_data.as_ref()
    }

    pub fn events(&self) -> &Arc<EventHandler> {
        self.base.events()
    }

    pub fn set_slide_item_data(&mut self, env: &RenderEnv, data: Option<SlideItemData>) {
        debug!(
            screen_id = self.base.screen_id,
            slide = ?data.as_ref().map(|d| d.slide_item_json.id),
            "Set slide"
        );
        self.slide_item_data = data;
        self.render(env);
        self.base
            .persist_entry(settings::SLIDE, self.slide_item_data.as_ref());
        self.send_sync_screen();
        self.base.fire_update();
    }

    pub fn render(&mut self, env: &RenderEnv) {
        if !self.base.is_bound() {
            return;
        }
        let full_width = is_pdf_full_width(self.base.ctx.store.as_ref());
        let node = self
            .slide_item_data
            .as_ref()
            .map(|data| render_slide(&data.slide_item_json, env, full_width));
        self.base.present(node, env);
    }

    pub fn to_sync_message(&self) -> ScreenMessage {
        ScreenMessage::new(
            self.base.screen_id,
            ScreenMessageType::VaryAppDocument,
            serde_json::to_value(&self.slide_item_data).unwrap_or_default(),
        )
    }

    pub fn send_sync_screen(&self) {
        self.base.broadcast(&self.to_sync_message());
    }

    pub fn receive_sync_screen(&mut self, env: &RenderEnv, message: &ScreenMessage) {
        if let Some(data) = self.base.decode_data::<SlideItemData>(message) {
            self.set_slide_item_data(env, data);
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

fn render_slide(item: &SlideItem, env: &RenderEnv, full_width: bool) -> RenderNode {
    if let Some(pdf) = &item.pdf_image_data {
        let style = if full_width {
            "width:100%;height:auto;overflow-y:auto;"
        } else {
            "width:100%;height:100%;object-fit:contain;"
        };
        return RenderNode::new(NodeContent::Image { src: pdf.src.clone() }, style);
    }

    let scale = fit_scale(env.width, item.metadata.width);
    let body: String = item
        .canvas_items
        .iter()
        .map(|canvas_item| {
            let text = canvas_item
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default();
            format!("<div class=\"canvas-item\">{text}</div>")
        })
        .collect();
    RenderNode::new(
        NodeContent::Html(format!("<div class=\"slide\" data-id=\"{}\">{body}</div>", item.id)),
        format!(
            "position:absolute;left:50%;top:50%;width:{}px;height:{}px;transform:translate(-50%,-50%) scale({scale:.4});",
            item.metadata.width, item.metadata.height
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screen::surface::RecordingSurface;
    use crate::screen::test_support::{env, slide_item, Fixture};
    use crate::settings::SettingStore;
    use serde_json::json;

    #[test]
    fn test_fit_scale() {
        assert_eq!(fit_scale(1920, 960), 2.0);
        assert_eq!(fit_scale(1920, 0), 1.0);
    }

    #[test]
    fn test_html_slide_is_scaled_to_parent() {
        let fixture = Fixture::new();
        let surface = RecordingSurface::new("slide");
        let mut manager = ScreenSlideManager::load(0, fixture.ctx());
        manager.bind_surface(&env(), Some(Box::new(surface.clone())));

        manager.set_slide_item_data(&env(), Some(slide_item(7, 960)));
        let (_, node) = surface.nodes().pop().unwrap();
        assert!(node.style.contains("scale(2.0000)"));
        assert!(matches!(node.content, NodeContent::Html(ref html) if html.contains("data-id=\"7\"")));
    }

    #[test]
    fn test_pdf_slide_uses_full_width_toggle() {
        let fixture = Fixture::new();
        save_pdf_full_width(fixture.store.as_ref(), true);
        let surface = RecordingSurface::new("slide");
        let mut manager = ScreenSlideManager::load(0, fixture.ctx());
        manager.bind_surface(&env(), Some(Box::new(surface.clone())));

        let mut data = slide_item(1, 800);
        data.slide_item_json.pdf_image_data = Some(PdfImageData {
            src: "file:///deck/page-1.png".to_string(),
            width: 800,
            height: 600,
        });
        manager.set_slide_item_data(&env(), Some(data));

        let (_, node) = surface.nodes().pop().unwrap();
        assert!(node.style.starts_with("width:100%;height:auto;"));
    }

    #[test]
    fn test_set_none_removes_screen_key() {
        let fixture = Fixture::new();
        let mut manager = ScreenSlideManager::load(3, fixture.ctx());
        manager.set_slide_item_data(&env(), Some(slide_item(1, 100)));
        manager.set_slide_item_data(&env(), None);

        let raw: serde_json::Map<String, Value> =
            serde_json::from_str(&fixture.store.get_setting(settings::SLIDE).unwrap()).unwrap();
        assert!(!raw.contains_key("3"));
        assert_eq!(
            fixture.sync_messages().last(),
            Some(&json!({"screenId": 3, "type": "vary-app-document", "data": null}))
        );
    }
}
