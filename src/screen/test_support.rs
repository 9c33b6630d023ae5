//! Fakes wired together for screen tests

use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

use super::base::RenderEnv;
use super::bible::{BibleItemData, BibleItemKind, BibleRenderedData};
use super::context::ScreenContext;
use super::effect::{EffectTarget, EffectType, StyleAnim};
use super::registry::ScreenRegistry;
use super::slide::{SlideItem, SlideItemData, SlideMetadata};
use crate::bus::{HeadlessDisplayController, RecordingBus};
use crate::constants::channels;
use crate::error::CollectingErrorReporter;
use crate::settings::MemorySettingStore;
use crate::time_source::TestTimeSource;

pub struct Fixture {
    pub store: Arc<MemorySettingStore>,
    pub bus: Arc<RecordingBus>,
    pub displays: Arc<HeadlessDisplayController>,
    pub clock: Arc<TestTimeSource>,
    pub errors: Arc<CollectingErrorReporter>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_showing(&[])
    }

    pub fn with_showing(screen_ids: &[u32]) -> Self {
        Self {
            store: MemorySettingStore::shared(),
            bus: RecordingBus::shared(),
            displays: Arc::new(HeadlessDisplayController::default().with_showing(screen_ids)),
            clock: TestTimeSource::shared(),
            errors: Arc::new(CollectingErrorReporter::new()),
        }
    }

    pub fn ctx(&self) -> ScreenContext {
        ScreenContext::new(self.store.clone(), self.bus.clone(), self.displays.clone())
            .with_clock(self.clock.clone())
            .with_errors(self.errors.clone())
    }

    pub fn registry(&self) -> ScreenRegistry {
        ScreenRegistry::new(self.ctx())
    }

    /// Everything broadcast on the sync channel so far
    pub fn sync_messages(&self) -> Vec<Value> {
        self.bus.sent_on(channels::SCREEN_SYNC)
    }

    pub fn sync_messages_of(&self, message_type: &str) -> Vec<Value> {
        self.sync_messages()
            .into_iter()
            .filter(|m| m["type"] == message_type)
            .collect()
    }
}

pub fn env() -> RenderEnv {
    RenderEnv {
        anim: StyleAnim::for_effect(EffectType::Fade, EffectTarget::Slide),
        width: 1920,
        height: 1080,
        now: Instant::now(),
        wall_clock: Utc::now(),
    }
}

pub fn slide_item(id: i64, width: u32) -> SlideItemData {
    SlideItemData {
        slide_file_path: "/decks/sunday.slides".to_string(),
        slide_item_json: SlideItem {
            id,
            metadata: SlideMetadata { width, height: 600 },
            pdf_image_data: None,
            canvas_items: vec![json!({"type": "text", "text": "Welcome"})],
        },
    }
}

pub fn bible_item(text: &str) -> BibleItemData {
    BibleItemData {
        locale: "en".to_string(),
        kind: BibleItemKind::Bible,
        bible_item_data: Some(BibleRenderedData {
            rendered_list: vec![json!({"verseKey": "JHN.3.16", "text": text})],
            bible_item: json!({"bibleKey": "KJV", "target": {"bookKey": "JHN", "chapter": 3}}),
        }),
        lyric_item_data: None,
        scroll: 0.0,
        selected_kjv_verse_key: None,
    }
}
