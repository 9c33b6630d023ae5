//! Named transition styles
//!
//! `StyleAnim::for_effect(effect, target)` plays the role of a style table
//! lookup: it yields the keyframe CSS, the duration, and enter/exit hooks
//! that tag a node and return the instant its animation settles.

use std::time::{Duration, Instant};

use crate::screen::surface::{NodeId, RenderSurface};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EffectTarget {
    Background,
    Slide,
    Foreground,
}

impl EffectTarget {
    pub const ALL: [EffectTarget; 3] = [
        EffectTarget::Background,
        EffectTarget::Slide,
        EffectTarget::Foreground,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EffectTarget::Background => "background",
            EffectTarget::Slide => "slide",
            EffectTarget::Foreground => "foreground",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    pub fn default_effect(self) -> EffectType {
        match self {
            EffectTarget::Background | EffectTarget::Slide => EffectType::Fade,
            EffectTarget::Foreground => EffectType::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectType {
    None,
    Fade,
    Move,
    Zoom,
}

impl EffectType {
    pub const ALL: [EffectType; 4] = [
        EffectType::None,
        EffectType::Fade,
        EffectType::Move,
        EffectType::Zoom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EffectType::None => "none",
            EffectType::Fade => "fade",
            EffectType::Move => "move",
            EffectType::Zoom => "zoom",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == name)
    }

    fn duration(self) -> Duration {
        match self {
            EffectType::None => Duration::ZERO,
            EffectType::Fade | EffectType::Move | EffectType::Zoom => Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StyleAnim {
    pub effect: EffectType,
    pub target: EffectTarget,
    /// Keyframes to install once per surface
    pub style: String,
    pub duration: Duration,
}

impl StyleAnim {
    pub fn for_effect(effect: EffectType, target: EffectTarget) -> Self {
        let name = animation_name(effect, target);
        let style = match effect {
            EffectType::None => String::new(),
            EffectType::Fade => format!(
                "@keyframes {name}-in {{ from {{ opacity: 0; }} to {{ opacity: 1; }} }}\n\
                 @keyframes {name}-out {{ from {{ opacity: 1; }} to {{ opacity: 0; }} }}"
            ),
            EffectType::Move => format!(
                "@keyframes {name}-in {{ from {{ transform: translateX(100%); }} to {{ transform: translateX(0); }} }}\n\
                 @keyframes {name}-out {{ from {{ transform: translateX(0); }} to {{ transform: translateX(-100%); }} }}"
            ),
            EffectType::Zoom => format!(
                "@keyframes {name}-in {{ from {{ transform: scale(0); }} to {{ transform: scale(1); }} }}\n\
                 @keyframes {name}-out {{ from {{ transform: scale(1); }} to {{ transform: scale(0); }} }}"
            ),
        };
        Self {
            effect,
            target,
            style,
            duration: effect.duration(),
        }
    }

    fn animation_style(&self, direction: &str) -> String {
        if self.effect == EffectType::None {
            return String::new();
        }
        format!(
            "animation: {}-{direction} {:.2}s ease-in-out forwards;",
            animation_name(self.effect, self.target),
            self.duration.as_secs_f32()
        )
    }

    /// Start the enter animation; returns when it settles
    pub fn anim_in(&self, surface: &mut dyn RenderSurface, node: NodeId, base_style: &str, now: Instant) -> Instant {
        surface.set_style(node, &join_style(base_style, &self.animation_style("in")));
        now + self.duration
    }

    /// Start the exit animation; the node may be removed once it settles
    pub fn anim_out(&self, surface: &mut dyn RenderSurface, node: NodeId, base_style: &str, now: Instant) -> Instant {
        surface.set_style(node, &join_style(base_style, &self.animation_style("out")));
        now + self.duration
    }
}

fn animation_name(effect: EffectType, target: EffectTarget) -> String {
    format!("{}-{}", target.as_str(), effect.as_str())
}

fn join_style(base: &str, extra: &str) -> String {
    match (base.is_empty(), extra.is_empty()) {
        (true, _) => extra.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{base} {extra}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screen::surface::{NodeContent, RecordingSurface, RenderNode};

    #[test]
    fn test_none_effect_is_instant() {
        let anim = StyleAnim::for_effect(EffectType::None, EffectTarget::Slide);
        assert_eq!(anim.duration, Duration::ZERO);
        assert!(anim.style.is_empty());
    }

    #[test]
    fn test_fade_tags_node_and_returns_deadline() {
        let anim = StyleAnim::for_effect(EffectType::Fade, EffectTarget::Background);
        let mut surface = RecordingSurface::new("bg");
        let node = surface.mount(RenderNode::new(NodeContent::Color("red".into()), "left:0;"));
        let now = Instant::now();

        let until = anim.anim_out(&mut surface, node, "left:0;", now);
        assert_eq!(until, now + Duration::from_millis(500));
        let style = surface.nodes()[0].1.style.clone();
        assert!(style.starts_with("left:0;"));
        assert!(style.contains("background-fade-out"));
    }

    #[test]
    fn test_names_parse_back() {
        for effect in EffectType::ALL {
            assert_eq!(EffectType::parse(effect.as_str()), Some(effect));
        }
        for target in EffectTarget::ALL {
            assert_eq!(EffectTarget::parse(target.as_str()), Some(target));
        }
        assert_eq!(EffectType::parse("spin"), None);
    }
}
