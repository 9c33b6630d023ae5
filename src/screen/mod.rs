//! Screen managers
//!
//! A screen is one projector output. [`ScreenRegistry`] owns one
//! [`ScreenManager`] per screen id; each manager owns the background, slide,
//! full-text and alert sub-managers plus the per-target transition effects.
//!
//! Every content setter runs the same sequence: mutate, render onto the bound
//! surface, persist into the setting store, broadcast a sync message, fire
//! update events.

mod alert;
mod background;
mod base;
mod bible;
mod context;
pub mod effect;
mod manager;
mod registry;
mod slide;
pub mod surface;
mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use alert::{format_countdown, AlertData, CountdownData, MarqueeData, ScreenAlertManager};
pub use background::{BackgroundKind, BackgroundSrc, ScreenBackgroundManager};
pub use base::RenderEnv;
pub use bible::{
    BibleItemData, BibleItemKind, BibleRenderedData, BibleTextStyle, LyricRenderedData,
    ScreenBibleManager,
};
pub use context::{ProcessRole, ScreenContext};
pub use effect::{EffectTarget, EffectType, ScreenEffectManager, ScreenEffects};
pub use manager::{effect_target, ScreenManager};
pub use registry::{ScreenManagerRef, ScreenRegistry};
pub use slide::{
    fit_scale, is_pdf_full_width, PdfImageData, ScreenSlideManager, SlideItem, SlideItemData,
    SlideMetadata,
};
pub use surface::{NodeContent, NodeId, RecordingSurface, RenderNode, RenderSurface};
pub use types::{ManagerKind, ScreenId, ScreenManagerSetting, ScreenMessage, ScreenMessageType};
