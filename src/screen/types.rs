//! Wire envelope and tags shared by every screen manager

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::EventScope;

pub type ScreenId = u32;

/// Sub-manager types that own a slice of a screen's content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ManagerKind {
    Background,
    Slide,
    FullText,
    Alert,
}

impl ManagerKind {
    pub const ALL: [ManagerKind; 4] = [
        ManagerKind::Background,
        ManagerKind::Slide,
        ManagerKind::FullText,
        ManagerKind::Alert,
    ];

    pub fn scope(self) -> EventScope {
        match self {
            ManagerKind::Background => EventScope::Background,
            ManagerKind::Slide => EventScope::Slide,
            ManagerKind::FullText => EventScope::FullText,
            ManagerKind::Alert => EventScope::Alert,
        }
    }

    pub fn message_type(self) -> ScreenMessageType {
        match self {
            ManagerKind::Background => ScreenMessageType::Background,
            ManagerKind::Slide => ScreenMessageType::VaryAppDocument,
            ManagerKind::FullText => ScreenMessageType::BibleScreenView,
            ManagerKind::Alert => ScreenMessageType::Alert,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ManagerKind::Background => "background",
            ManagerKind::Slide => "slide",
            ManagerKind::FullText => "full-text",
            ManagerKind::Alert => "alert",
        }
    }
}

/// Closed set of sync message tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScreenMessageType {
    Background,
    VaryAppDocument,
    BibleScreenView,
    BibleScreenViewScroll,
    BibleScreenViewTextStyle,
    BibleScreenViewSelectedIndex,
    Alert,
    DisplayChange,
    Visible,
    Init,
    Effect,
}

impl ScreenMessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            ScreenMessageType::Background => "background",
            ScreenMessageType::VaryAppDocument => "vary-app-document",
            ScreenMessageType::BibleScreenView => "bible-screen-view",
            ScreenMessageType::BibleScreenViewScroll => "bible-screen-view-scroll",
            ScreenMessageType::BibleScreenViewTextStyle => "bible-screen-view-text-style",
            ScreenMessageType::BibleScreenViewSelectedIndex => "bible-screen-view-selected-index",
            ScreenMessageType::Alert => "alert",
            ScreenMessageType::DisplayChange => "display-change",
            ScreenMessageType::Visible => "visible",
            ScreenMessageType::Init => "init",
            ScreenMessageType::Effect => "effect",
        }
    }

    /// Accepts the current tags and the older slide / full-text spellings
    pub fn parse(tag: &str) -> Option<Self> {
        let parsed = match tag {
            "background" => ScreenMessageType::Background,
            "vary-app-document" | "slide" => ScreenMessageType::VaryAppDocument,
            "bible-screen-view" | "full-text" => ScreenMessageType::BibleScreenView,
            "bible-screen-view-scroll" | "full-text-scroll" => ScreenMessageType::BibleScreenViewScroll,
            "bible-screen-view-text-style" | "full-text-text-style" => {
                ScreenMessageType::BibleScreenViewTextStyle
            }
            "bible-screen-view-selected-index" | "full-text-selected-index" => {
                ScreenMessageType::BibleScreenViewSelectedIndex
            }
            "alert" => ScreenMessageType::Alert,
            "display-change" => ScreenMessageType::DisplayChange,
            "visible" => ScreenMessageType::Visible,
            "init" => ScreenMessageType::Init,
            "effect" => ScreenMessageType::Effect,
            _ => return None,
        };
        Some(parsed)
    }

    /// Sub-manager a sync-group fan-out of this tag lands on
    pub fn manager_kind(self) -> Option<ManagerKind> {
        match self {
            ScreenMessageType::Background => Some(ManagerKind::Background),
            ScreenMessageType::VaryAppDocument => Some(ManagerKind::Slide),
            ScreenMessageType::BibleScreenView
            | ScreenMessageType::BibleScreenViewScroll
            | ScreenMessageType::BibleScreenViewSelectedIndex => Some(ManagerKind::FullText),
            ScreenMessageType::Alert => Some(ManagerKind::Alert),
            _ => None,
        }
    }
}

/// `{ screenId, type, data }`
///
/// `type` stays a string on the wire so tags from newer peers still decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenMessage {
    #[serde(rename = "screenId")]
    pub screen_id: ScreenId,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub data: Value,
}

impl ScreenMessage {
    pub fn new(screen_id: ScreenId, message_type: ScreenMessageType, data: Value) -> Self {
        Self {
            screen_id,
            message_type: message_type.as_str().to_string(),
            data,
        }
    }

    pub fn kind(&self) -> Option<ScreenMessageType> {
        ScreenMessageType::parse(&self.message_type)
    }

    /// Same message addressed to another screen
    pub fn retarget(&self, screen_id: ScreenId) -> Self {
        Self {
            screen_id,
            ..self.clone()
        }
    }
}

/// Persisted registry entry, one per screen in the `MANAGERS` list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenManagerSetting {
    pub screen_id: ScreenId,
    #[serde(default)]
    pub is_selected: bool,
    #[serde(default)]
    pub color_note: Option<String>,
}
