//! OS display interface
//!
//! Showing, hiding and placing screen windows on physical displays.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::SharedMessageBus;
use crate::constants::channels;
use crate::screen::ScreenId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayBounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayInfo {
    pub id: u32,
    #[serde(default)]
    pub label: String,
    pub bounds: DisplayBounds,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllDisplays {
    pub primary_display: DisplayInfo,
    pub displays: Vec<DisplayInfo>,
}

impl AllDisplays {
    pub fn find(&self, display_id: u32) -> Option<&DisplayInfo> {
        self.displays.iter().find(|d| d.id == display_id)
    }
}

/// Payload of the show, hide and set-display requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenPlacement {
    pub screen_id: ScreenId,
    #[serde(default)]
    pub display_id: Option<u32>,
}

pub trait DisplayController: Send + Sync {
    fn get_all_displays(&self) -> Result<AllDisplays>;

    fn get_all_showing_screen_ids(&self) -> Result<Vec<ScreenId>>;

    fn show_screen(&self, screen_id: ScreenId, display_id: u32) -> Result<()>;

    fn hide_screen(&self, screen_id: ScreenId);

    fn set_display(&self, screen_id: ScreenId, display_id: u32);
}

pub type SharedDisplayController = Arc<dyn DisplayController>;

/// Display host reached over the message bus
pub struct BusDisplayController {
    bus: SharedMessageBus,
}

impl BusDisplayController {
    pub fn new(bus: SharedMessageBus) -> Self {
        Self { bus }
    }
}

impl DisplayController for BusDisplayController {
    fn get_all_displays(&self) -> Result<AllDisplays> {
        let reply = self
            .bus
            .send_data_sync(channels::GET_DISPLAYS, serde_json::Value::Null)
            .context("Failed to query displays")?;
        serde_json::from_value(reply).context("Invalid display list from display host")
    }

    fn get_all_showing_screen_ids(&self) -> Result<Vec<ScreenId>> {
        let reply = self
            .bus
            .send_data_sync(channels::GET_SHOWING_SCREEN_IDS, serde_json::Value::Null)
            .context("Failed to query showing screens")?;
        serde_json::from_value(reply).context("Invalid showing screen ids from display host")
    }

    fn show_screen(&self, screen_id: ScreenId, display_id: u32) -> Result<()> {
        self.bus
            .send_data_sync(
                channels::SHOW_SCREEN,
                json!({ "screenId": screen_id, "displayId": display_id }),
            )
            .map(|_| ())
            .with_context(|| format!("Failed to show screen {screen_id}"))
    }

    fn hide_screen(&self, screen_id: ScreenId) {
        self.bus
            .send_data(channels::HIDE_SCREEN, json!({ "screenId": screen_id }));
    }

    fn set_display(&self, screen_id: ScreenId, display_id: u32) {
        self.bus.send_data(
            channels::SET_DISPLAY,
            json!({ "screenId": screen_id, "displayId": display_id }),
        );
    }
}

/// In-memory display host: a fixed display list and a set of showing screens
#[derive(Debug)]
pub struct HeadlessDisplayController {
    displays: AllDisplays,
    showing: Mutex<BTreeMap<ScreenId, u32>>,
}

impl Default for HeadlessDisplayController {
    fn default() -> Self {
        let primary = DisplayInfo {
            id: 1,
            label: "Primary".to_string(),
            bounds: DisplayBounds {
                x: 0,
                y: 0,
                width: 1920,
                height: 1080,
            },
        };
        Self::new(AllDisplays {
            primary_display: primary.clone(),
            displays: vec![primary],
        })
    }
}

impl HeadlessDisplayController {
    pub fn new(displays: AllDisplays) -> Self {
        Self {
            displays,
            showing: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_showing(self, screen_ids: &[ScreenId]) -> Self {
        if let Ok(mut showing) = self.showing.lock() {
            for id in screen_ids {
                showing.insert(*id, self.displays.primary_display.id);
            }
        }
        self
    }

    /// Display each showing screen is placed on
    pub fn placements(&self) -> BTreeMap<ScreenId, u32> {
        self.showing.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl DisplayController for HeadlessDisplayController {
    fn get_all_displays(&self) -> Result<AllDisplays> {
        Ok(self.displays.clone())
    }

    fn get_all_showing_screen_ids(&self) -> Result<Vec<ScreenId>> {
        Ok(self.placements().keys().copied().collect())
    }

    fn show_screen(&self, screen_id: ScreenId, display_id: u32) -> Result<()> {
        info!(screen_id, display_id, "Showing screen");
        if let Ok(mut showing) = self.showing.lock() {
            showing.insert(screen_id, display_id);
        }
        Ok(())
    }

    fn hide_screen(&self, screen_id: ScreenId) {
        info!(screen_id, "Hiding screen");
        if let Ok(mut showing) = self.showing.lock() {
            showing.remove(&screen_id);
        }
    }

    fn set_display(&self, screen_id: ScreenId, display_id: u32) {
        debug!(screen_id, display_id, "Moving screen to display");
        if let Ok(mut showing) = self.showing.lock()
            && let Some(current) = showing.get_mut(&screen_id)
        {
            *current = display_id;
        }
    }
}
