//! Per-target transition stage
//!
//! Tracks every node a manager has mounted on its surface together with the
//! deadline of its running animation. A new render sends all visible layers
//! into their exit animation and mounts the replacement; exiting layers are
//! removed by [`TransitionStage::settle`] once their own deadline passes, so
//! a render that lands mid-transition never touches the wrong node.

use std::time::Instant;
use tracing::trace;

use super::StyleAnim;
use crate::screen::surface::{NodeContent, NodeId, RenderNode, RenderSurface};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerState {
    Entering { until: Instant },
    Shown,
    Exiting { until: Instant },
}

#[derive(Debug, Clone)]
struct Layer {
    node: NodeId,
    base_style: String,
    state: LayerState,
}

#[derive(Debug, Default)]
pub struct TransitionStage {
    layers: Vec<Layer>,
}

impl TransitionStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever is visible with `node` (or nothing).
    ///
    /// `anim` is the style captured when the render started; layers already
    /// exiting keep the deadline of the animation that sent them out.
    pub fn present(
        &mut self,
        surface: &mut dyn RenderSurface,
        node: Option<RenderNode>,
        anim: &StyleAnim,
        now: Instant,
    ) -> Option<NodeId> {
        self.settle(surface, now);

        let mut kept = Vec::with_capacity(self.layers.len() + 1);
        for mut layer in self.layers.drain(..) {
            if matches!(layer.state, LayerState::Exiting { .. }) {
                kept.push(layer);
                continue;
            }
            if anim.duration.is_zero() {
                surface.remove(layer.node);
                continue;
            }
            let until = anim.anim_out(surface, layer.node, &layer.base_style, now);
            layer.state = LayerState::Exiting { until };
            kept.push(layer);
        }
        self.layers = kept;

        let node = node?;
        let base_style = node.style.clone();
        let id = surface.mount(node);
        let until = anim.anim_in(surface, id, &base_style, now);
        let state = if anim.duration.is_zero() {
            LayerState::Shown
        } else {
            LayerState::Entering { until }
        };
        trace!(node = id.0, effect = anim.effect.as_str(), "Presented layer");
        self.layers.push(Layer {
            node: id,
            base_style,
            state,
        });
        Some(id)
    }

    /// Update the visible layer in place, no animation. Returns false when
    /// nothing is visible.
    pub fn update_current(&mut self, surface: &mut dyn RenderSurface, content: NodeContent) -> bool {
        match self.current() {
            Some(node) => {
                surface.update(node, content);
                true
            }
            None => false,
        }
    }

    /// Finish animations whose deadline has passed; returns removed node count
    pub fn settle(&mut self, surface: &mut dyn RenderSurface, now: Instant) -> usize {
        let mut removed = 0;
        self.layers.retain_mut(|layer| match layer.state {
            LayerState::Exiting { until } if until <= now => {
                surface.remove(layer.node);
                removed += 1;
                false
            }
            LayerState::Entering { until } if until <= now => {
                layer.state = LayerState::Shown;
                true
            }
            _ => true,
        });
        removed
    }

    /// Drop every layer immediately
    pub fn clear(&mut self, surface: &mut dyn RenderSurface) {
        for layer in self.layers.drain(..) {
            surface.remove(layer.node);
        }
    }

    /// Forget layers without touching a surface (the surface went away)
    pub fn forget(&mut self) {
        self.layers.clear();
    }

    /// The layer that is entering or shown
    pub fn current(&self) -> Option<NodeId> {
        self.layers
            .iter()
            .rev()
            .find(|l| !matches!(l.state, LayerState::Exiting { .. }))
            .map(|l| l.node)
    }

    #[cfg(test)]
    pub fn state_of(&self, node: NodeId) -> Option<LayerState> {
        self.layers.iter().find(|l| l.node == node).map(|l| l.state)
    }

    #[cfg(test)]
    pub fn exiting_count(&self) -> usize {
        self.layers
            .iter()
            .filter(|l| matches!(l.state, LayerState::Exiting { .. }))
            .count()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Earliest pending animation deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.layers
            .iter()
            .filter_map(|l| match l.state {
                LayerState::Entering { until } | LayerState::Exiting { until } => Some(until),
                LayerState::Shown => None,
            })
            .min()
    }
}
