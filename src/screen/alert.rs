//! Alert overlays: a scrolling marquee and a countdown clock
//!
//! Both overlays are independent. Re-applying the value already shown is
//! ignored, so sync-group fan-out that delivers the same alert twice does
//! not restart its animation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

use super::base::{ManagerBase, RenderEnv};
use super::context::ScreenContext;
use super::effect::TransitionStage;
use super::surface::{NodeContent, RenderNode, RenderSurface};
use super::types::{ScreenId, ScreenMessage, ScreenMessageType};
use crate::constants::settings;
use crate::events::{EventHandler, EventScope};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarqueeData {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountdownData {
    #[serde(rename = "dateTime")]
    pub date_time: DateTime<Utc>,
}

/// `{ marqueeData, countdownData }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertData {
    #[serde(default)]
    pub marquee_data: Option<MarqueeData>,
    #[serde(default)]
    pub countdown_data: Option<CountdownData>,
}

impl AlertData {
    pub fn is_empty(&self) -> bool {
        self.marquee_data.is_none() && self.countdown_data.is_none()
    }
}

/// `HH:MM:SS` until `target`, floored at zero
pub fn format_countdown(target: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let remaining = (target - now).num_seconds().max(0);
    format!(
        "{:02}:{:02}:{:02}",
        remaining / 3600,
        (remaining % 3600) / 60,
        remaining % 60
    )
}

#[derive(Debug)]
pub struct ScreenAlertManager {
    base: ManagerBase,
    alert_data: AlertData,
    countdown_stage: TransitionStage,
    countdown_text: Option<String>,
}

impl ScreenAlertManager {
    pub fn load(screen_id: ScreenId, ctx: ScreenContext) -> Self {
        let base = ManagerBase::new(screen_id, ctx, EventScope::Alert);
        let alert_data = base.load_entry(settings::ALERT).unwrap_or_default();
        Self {
            base,
            alert_data,
            countdown_stage: TransitionStage::new(),
            countdown_text: None,
        }
    }

    pub fn alert_data(&self) -> &AlertData {
        &self.alert_data
    }

    pub fn events(&self) -> &Arc<EventHandler> {
        self.base.events()
    }

    /// Returns false when `marquee` has the text already shown
    pub fn set_marquee_data(&mut self, env: &RenderEnv, marquee: Option<MarqueeData>) -> bool {
        self.set_alert_data(
            env,
            AlertData {
                marquee_data: marquee,
                countdown_data: self.alert_data.countdown_data.clone(),
            },
        )
    }

    /// Returns false when `countdown` targets the time already shown
    pub fn set_countdown_data(&mut self, env: &RenderEnv, countdown: Option<CountdownData>) -> bool {
        self.set_alert_data(
            env,
            AlertData {
                marquee_data: self.alert_data.marquee_data.clone(),
                countdown_data: countdown,
            },
        )
    }

    /// Apply both overlays; only the ones that differ are re-rendered
    pub fn set_alert_data(&mut self, env: &RenderEnv, data: AlertData) -> bool {
        let marquee_changed = self.alert_data.marquee_data.as_ref().map(|m| &m.text)
            != data.marquee_data.as_ref().map(|m| &m.text);
        let countdown_changed = self.alert_data.countdown_data.as_ref().map(|c| c.date_time)
            != data.countdown_data.as_ref().map(|c| c.date_time);
        if !marquee_changed && !countdown_changed {
            trace!(screen_id = self.base.screen_id, "Alert unchanged");
            return false;
        }
        debug!(
            screen_id = self.base.screen_id,
            marquee = marquee_changed,
            countdown = countdown_changed,
            "Set alert"
        );
        self.alert_data = data;
        if marquee_changed {
            self.render_marquee(env);
        }
        if countdown_changed {
            self.render_countdown(env);
        }
        self.persist();
        self.send_sync_screen();
        self.base.fire_update();
        true
    }

    pub fn render(&mut self, env: &RenderEnv) {
        self.render_marquee(env);
        self.render_countdown(env);
    }

    fn render_marquee(&mut self, env: &RenderEnv) {
        if !self.base.is_bound() {
            return;
        }
        let node = self.alert_data.marquee_data.as_ref().map(|m| {
            RenderNode::new(
                NodeContent::Text(m.text.clone()),
                "position:absolute;bottom:0;white-space:nowrap;animation:marquee-scroll 20s linear infinite;",
            )
        });
        self.base.present(node, env);
    }

    fn render_countdown(&mut self, env: &RenderEnv) {
        if !self.base.is_bound() {
            return;
        }
        self.countdown_text = self
            .alert_data
            .countdown_data
            .as_ref()
            .map(|c| format_countdown(c.date_time, env.wall_clock));
        let node = self.countdown_text.as_ref().map(|text| {
            RenderNode::new(
                NodeContent::Text(text.clone()),
                "position:absolute;top:50%;left:50%;transform:translate(-50%,-50%);",
            )
        });
        let mut stage = std::mem::take(&mut self.countdown_stage);
        self.base.present_on(&mut stage, node, env);
        self.countdown_stage = stage;
    }

    /// Refresh the countdown clock; returns whether the text changed
    pub fn tick(&mut self, env: &RenderEnv) -> bool {
        let Some(countdown) = &self.alert_data.countdown_data else {
            return false;
        };
        let text = format_countdown(countdown.date_time, env.wall_clock);
        if self.countdown_text.as_deref() == Some(text.as_str()) {
            return false;
        }
        let Some(surface) = self.base.surface_mut() else {
            return false;
        };
        if !self
            .countdown_stage
            .update_current(surface, NodeContent::Text(text.clone()))
        {
            return false;
        }
        self.countdown_text = Some(text);
        true
    }

    pub fn settle(&mut self, now: Instant) -> usize {
        let mut stage = std::mem::take(&mut self.countdown_stage);
        let removed = self.base.settle(now) + self.base.settle_stage(&mut stage, now);
        self.countdown_stage = stage;
        removed
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        [self.base.next_deadline(), self.countdown_stage.next_deadline()]
            .into_iter()
            .flatten()
            .min()
    }

    pub fn to_sync_message(&self) -> ScreenMessage {
        ScreenMessage::new(
            self.base.screen_id,
            ScreenMessageType::Alert,
            serde_json::to_value(&self.alert_data).unwrap_or_default(),
        )
    }

    pub fn send_sync_screen(&self) {
        self.base.broadcast(&self.to_sync_message());
    }

    pub fn receive_sync_screen(&mut self, env: &RenderEnv, message: &ScreenMessage) {
        if let Some(data) = self.base.decode_data::<AlertData>(message) {
            self.set_alert_data(env, data.unwrap_or_default());
        }
    }

    pub fn bind_surface(&mut self, env: &RenderEnv, surface: Option<Box<dyn RenderSurface>>) {
        match self.base.surface_mut() {
            Some(old) => self.countdown_stage.clear(old),
            None => self.countdown_stage.forget(),
        }
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
        let value = (!self.alert_data.is_empty()).then_some(&self.alert_data);
        self.base.persist_entry(settings::ALERT, value);
    }
}
