//! Renderer process: mirrors one screen from the controller
//!
//! Holds a single [`ScreenManager`] built with the renderer role, so it
//! applies what arrives over the bus and never broadcasts. Rendering goes to
//! [`LogSurface`]s, one per sub-manager.
//!
//! [`ScreenManager`]: crate::screen::ScreenManager

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{forward_sync_messages, input_channel, run_loop, screen_label, Input};
use crate::bus::{BusDisplayController, MessageBus};
use crate::config::AppConfig;
use crate::constants::{channels, settings};
use crate::ipc::SocketMessageBus;
use crate::screen::{
    ManagerKind, NodeContent, NodeId, ProcessRole, RenderNode, RenderSurface, ScreenContext,
    ScreenId, ScreenMessage, ScreenMessageType, ScreenRegistry,
};
use crate::settings::{JsonFileSettingStore, MemorySettingStore, SettingStore};

/// Global settings a renderer reads locally instead of receiving per message
const SEEDED_KEYS: [&str; 2] = [settings::PDF_FULL_WIDTH, settings::BIBLE_TEXT_STYLE];

/// Surface that logs every node operation
#[derive(Debug)]
pub struct LogSurface {
    label: String,
    next_id: u64,
    live: usize,
}

impl LogSurface {
    pub fn new(screen_id: ScreenId, kind: ManagerKind) -> Self {
        Self {
            label: format!("{}/{}", screen_label(screen_id), kind.as_str()),
            next_id: 0,
            live: 0,
        }
    }

    pub fn live_nodes(&self) -> usize {
        self.live
    }
}

fn summarize(content: &NodeContent) -> String {
    const MAX: usize = 60;
    let text = match content {
        NodeContent::Color(color) => format!("color {color}"),
        NodeContent::Image { src } => format!("image {src}"),
        NodeContent::Video { src } => format!("video {src}"),
        NodeContent::Html(html) => format!("html {html}"),
        NodeContent::Text(text) => format!("text {text}"),
    };
    if text.chars().count() > MAX {
        let cut: String = text.chars().take(MAX).collect();
        format!("{cut}...")
    } else {
        text
    }
}

impl RenderSurface for LogSurface {
    fn mount(&mut self, node: RenderNode) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.live += 1;
        info!(surface = %self.label, node = id.0, content = %summarize(&node.content), "Mount");
        debug!(surface = %self.label, node = id.0, style = %node.style, "Mount style");
        id
    }

    fn update(&mut self, node: NodeId, content: NodeContent) {
        info!(surface = %self.label, node = node.0, content = %summarize(&content), "Update");
    }

    fn set_style(&mut self, node: NodeId, style: &str) {
        debug!(surface = %self.label, node = node.0, style = %style, "Style");
    }

    fn remove(&mut self, node: NodeId) {
        self.live = self.live.saturating_sub(1);
        info!(surface = %self.label, node = node.0, "Remove");
    }
}

/// Copy the global keys out of the controller's settings directory
pub fn seed_store(source: &dyn SettingStore) -> Arc<MemorySettingStore> {
    let store = MemorySettingStore::shared();
    for key in SEEDED_KEYS {
        if let Some(value) = source.get_setting(key) {
            store.set_setting(key, Some(&value));
        }
    }
    store
}

pub struct Renderer {
    screen_id: ScreenId,
    registry: ScreenRegistry,
}

impl Renderer {
    /// Build the mirrored screen and bind one surface per sub-manager
    pub fn new(screen_id: ScreenId, ctx: ScreenContext) -> Self {
        let ctx = ctx.with_role(ProcessRole::Renderer);
        let mut registry = ScreenRegistry::new(ctx);
        registry.create_instance(screen_id);
        for kind in ManagerKind::ALL {
            registry.bind_surface(screen_id, kind, Some(Box::new(LogSurface::new(screen_id, kind))));
        }
        Self {
            screen_id,
            registry,
        }
    }

    pub fn screen_id(&self) -> ScreenId {
        self.screen_id
    }

    pub fn registry(&self) -> &ScreenRegistry {
        &self.registry
    }

    /// Ask the controller for this screen's full state
    pub fn request_init(&self, bus: &dyn MessageBus) -> Result<()> {
        let message = ScreenMessage::new(self.screen_id, ScreenMessageType::Init, Value::Null);
        let payload = serde_json::to_value(&message).context("Failed to encode init request")?;
        bus.send_data(channels::SCREEN_SYNC, payload);
        Ok(())
    }

    pub fn handle_sync(&mut self, message: &ScreenMessage) {
        if message.screen_id != self.screen_id {
            return;
        }
        self.registry.receive_sync_screen(message);
    }

    pub fn tick(&mut self) -> usize {
        self.registry.settle_all()
    }
}

/// Run a renderer for `screen_id` until the controller goes away or a
/// termination signal arrives
pub fn run(
    config: &AppConfig,
    screen_id: ScreenId,
    socket_path: &Path,
    settings_dir: &Path,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let bus = SocketMessageBus::connect_to(socket_path)?;
    let store = match JsonFileSettingStore::open(settings_dir) {
        Ok(file_store) => seed_store(&file_store),
        Err(e) => {
            warn!(error = %e, "Settings unavailable, using defaults");
            MemorySettingStore::shared()
        }
    };
    let shared_bus: Arc<SocketMessageBus> = Arc::new(bus.clone());
    let displays = Arc::new(BusDisplayController::new(shared_bus.clone()));
    let ctx = ScreenContext::new(store, shared_bus, displays).with_scroll_mute(config.scroll_mute());

    let (tx, rx) = input_channel();
    forward_sync_messages(&bus, tx);
    let mut renderer = Renderer::new(screen_id, ctx);
    renderer.request_init(&bus)?;
    info!(screen_id, socket = %socket_path.display(), "Renderer ready");

    run_loop(&rx, &shutdown, |input| match input {
        Some(Input::Sync(message)) => {
            renderer.handle_sync(&message);
            true
        }
        Some(_) => true,
        None => {
            renderer.tick();
            if bus.peer_count() == 0 {
                info!(screen_id, "Controller disconnected");
                return false;
            }
            true
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screen::test_support::Fixture;
    use serde_json::json;

    #[test]
    fn test_log_surface_tracks_live_nodes() {
        let mut surface = LogSurface::new(0, ManagerKind::Slide);
        let a = surface.mount(RenderNode::new(NodeContent::Text("a".to_string()), ""));
        let b = surface.mount(RenderNode::new(NodeContent::Color("#000".to_string()), ""));
        assert_ne!(a, b);
        surface.remove(a);
        assert_eq!(surface.live_nodes(), 1);
    }

    #[test]
    fn test_summarize_truncates_long_content() {
        let long = NodeContent::Text("x".repeat(200));
        let summary = summarize(&long);
        assert!(summary.ends_with("..."));
        assert_eq!(summary.chars().count(), 63);
    }

    #[test]
    fn test_seed_store_copies_only_global_keys() {
        let source = MemorySettingStore::new();
        source.set_setting(settings::PDF_FULL_WIDTH, Some("true"));
        source.set_setting(settings::SLIDE, Some("{}"));

        let seeded = seed_store(&source);
        assert_eq!(seeded.keys(), vec![settings::PDF_FULL_WIDTH.to_string()]);
    }

    #[test]
    fn test_renderer_sends_init_but_never_broadcasts() {
        let fixture = Fixture::new();
        let mut renderer = Renderer::new(2, fixture.ctx());
        renderer.request_init(fixture.bus.as_ref()).unwrap();

        renderer.handle_sync(&ScreenMessage::new(
            2,
            ScreenMessageType::Alert,
            json!({"marqueeData": {"text": "Hi"}, "countdownData": null}),
        ));

        let manager = renderer.registry().get_instance(2).unwrap();
        assert_eq!(manager.alert().alert_data().marquee_data.as_ref().unwrap().text, "Hi");
        let sent = fixture.sync_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["type"], "init");
    }

    #[test]
    fn test_renderer_ignores_other_screens() {
        let fixture = Fixture::new();
        let mut renderer = Renderer::new(0, fixture.ctx());
        renderer.handle_sync(&ScreenMessage::new(
            1,
            ScreenMessageType::Background,
            json!({"type": "color", "src": "red"}),
        ));
        assert!(renderer.registry().get_instance(1).is_none());
        assert!(renderer
            .registry()
            .get_instance(0)
            .unwrap()
            .background()
            .background_src()
            .is_none());
    }
}
